//! Public → internal room id resolution
//!
//! One GET against the room-info endpoint; no retries.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ResolutionError;
use crate::types::RoomId;

/// Fallback when a rejection carries no message
const DEFAULT_REJECTION: &str = "failed to fetch room info";

/// Maps a public room id to the id the upstream socket expects
#[async_trait]
pub trait RoomResolver: Send + Sync {
    async fn resolve(&self, room_id: &RoomId) -> Result<u64, ResolutionError>;
}

/// Resolver backed by the room-info HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpRoomResolver {
    endpoint: String,
    user_agent: String,
    referer: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RoomInitResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<RoomInitData>,
}

#[derive(Debug, Deserialize)]
struct RoomInitData {
    room_id: u64,
}

impl HttpRoomResolver {
    pub fn new(
        endpoint: impl Into<String>,
        user_agent: impl Into<String>,
        referer: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
            referer: referer.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RoomResolver for HttpRoomResolver {
    async fn resolve(&self, room_id: &RoomId) -> Result<u64, ResolutionError> {
        debug!(room = %room_id, endpoint = %self.endpoint, "resolving room id");

        let body: RoomInitResponse = self
            .client
            .get(&self.endpoint)
            .query(&[("id", room_id.as_str())])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::REFERER, &self.referer)
            .send()
            .await?
            .json()
            .await?;

        if body.code != 0 {
            let message = body
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION.to_string());
            return Err(ResolutionError::Rejected {
                code: body.code,
                message,
            });
        }

        let real = body
            .data
            .map(|d| d.room_id)
            .ok_or_else(|| ResolutionError::Malformed("missing data.room_id".to_string()))?;

        info!(room = %room_id, real_room = real, "resolved room id");
        Ok(real)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn resolver(server: &MockServer) -> HttpRoomResolver {
        HttpRoomResolver::new(
            format!("{}/room_init", server.uri()),
            "test-agent",
            "https://live.example.com",
        )
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room_init"))
            .and(query_param("id", "123"))
            .and(header("user-agent", "test-agent"))
            .and(header("referer", "https://live.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "msg": "ok",
                "message": "ok",
                "data": { "room_id": 456, "short_id": 123 }
            })))
            .mount(&server)
            .await;

        let real = resolver(&server).resolve(&RoomId::new("123")).await.unwrap();
        assert_eq!(real, 456);
    }

    #[tokio::test]
    async fn test_resolve_rejected_with_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room_init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 60004,
                "message": "room does not exist"
            })))
            .mount(&server)
            .await;

        let err = resolver(&server).resolve(&RoomId::new("1")).await.unwrap_err();
        match err {
            ResolutionError::Rejected { code, message } => {
                assert_eq!(code, 60004);
                assert_eq!(message, "room does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_rejected_without_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": -1})))
            .mount(&server)
            .await;

        let err = resolver(&server).resolve(&RoomId::new("1")).await.unwrap_err();
        assert_eq!(err.to_string(), DEFAULT_REJECTION);
    }

    #[tokio::test]
    async fn test_resolve_missing_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0})))
            .mount(&server)
            .await;

        let err = resolver(&server).resolve(&RoomId::new("1")).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_resolve_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = resolver(&server).resolve(&RoomId::new("1")).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Transport(_)));
    }
}
