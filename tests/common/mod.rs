//! In-memory resolver/connector fakes shared by the integration tests
#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tokio::sync::mpsc;
use tokio::time::Instant;

use danmaku_bridge::codec::{self, FrameHeader, HEADER_LEN};
use danmaku_bridge::session::{SessionConfig, SessionContext};
use danmaku_bridge::{
    ResolutionError, RoomId, RoomResolver, SessionError, UpstreamConnector, UpstreamEvent,
    UpstreamLink,
};

pub enum ResolverMode {
    Ok(u64),
    Reject(String),
    Hang,
}

pub struct FakeResolver {
    mode: ResolverMode,
    pub requested: Mutex<Vec<RoomId>>,
}

impl FakeResolver {
    pub fn ok(real: u64) -> Arc<Self> {
        Self::with_mode(ResolverMode::Ok(real))
    }

    pub fn with_mode(mode: ResolverMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.to_string())
            .collect()
    }
}

#[async_trait]
impl RoomResolver for FakeResolver {
    async fn resolve(&self, room_id: &RoomId) -> Result<u64, ResolutionError> {
        self.requested.lock().unwrap().push(room_id.clone());
        match &self.mode {
            ResolverMode::Ok(real) => Ok(*real),
            ResolverMode::Reject(message) => Err(ResolutionError::Rejected {
                code: -1,
                message: message.clone(),
            }),
            ResolverMode::Hang => std::future::pending().await,
        }
    }
}

/// Upstream side of one fake connection
pub struct UpstreamPeer {
    pub from_session: mpsc::Receiver<Vec<u8>>,
    pub to_session: mpsc::Sender<UpstreamEvent>,
}

impl UpstreamPeer {
    /// Next frame the session wrote, header + raw body
    pub async fn next_frame(&mut self) -> Option<(FrameHeader, Vec<u8>)> {
        let bytes = self.from_session.recv().await?;
        let header = codec::decode_header(&bytes).expect("session wrote a valid frame");
        Some((header, bytes[HEADER_LEN..].to_vec()))
    }

    pub async fn send_plain(&self, operation: u32, body: &[u8]) {
        self.send_bytes(codec::encode_frame_versioned(codec::protover::PLAIN, operation, body))
            .await;
    }

    pub async fn send_bytes(&self, bytes: Vec<u8>) {
        self.to_session
            .send(UpstreamEvent::Binary(bytes))
            .await
            .expect("session listening");
    }

    pub async fn authenticate(&mut self) {
        let (header, _) = self.next_frame().await.expect("auth frame");
        assert_eq!(header.operation, codec::op::AUTH);
        self.send_plain(codec::op::AUTH_REPLY, br#"{"code":0}"#).await;
    }
}

pub struct FakeConnector {
    fail_handshake: bool,
    peers: mpsc::UnboundedSender<UpstreamPeer>,
    pub connects: Mutex<Vec<Instant>>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<UpstreamPeer>) {
        Self::build(false)
    }

    pub fn failing() -> (Arc<Self>, mpsc::UnboundedReceiver<UpstreamPeer>) {
        Self::build(true)
    }

    fn build(fail_handshake: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<UpstreamPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            fail_handshake,
            peers: tx,
            connects: Mutex::new(Vec::new()),
        });
        (connector, rx)
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(&self) -> Result<UpstreamLink, SessionError> {
        self.connects.lock().unwrap().push(Instant::now());
        if self.fail_handshake {
            return Err(SessionError::Handshake("refused".to_string()));
        }

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let _ = self.peers.send(UpstreamPeer {
            from_session: out_rx,
            to_session: in_tx,
        });
        Ok(UpstreamLink::new(out_tx, in_rx))
    }
}

pub fn context(resolver: Arc<FakeResolver>, connector: Arc<FakeConnector>) -> SessionContext {
    SessionContext::new(resolver, connector, SessionConfig::default())
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn danmu_payload(content: &str, uid: u64) -> String {
    serde_json::json!({
        "cmd": "DANMU_MSG",
        "info": [
            [0, 1, 25],
            content,
            [uid, "viewer", 0, 1, 0],
            [],
            [12],
            null,
            0,
            0
        ]
    })
    .to_string()
}
