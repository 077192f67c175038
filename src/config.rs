//! Bridge configuration
//!
//! Defaults match the public service; every field can be overridden through
//! a `DANMAKU_*` environment variable.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

use crate::error::AppError;
use crate::session::{SessionConfig, HEARTBEAT_INTERVAL, MAX_RECONNECT_ATTEMPTS};

pub const DEFAULT_WS_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_STATUS_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_UPSTREAM_URL: &str = "wss://hw-bj-live-comet-05.chat.bilibili.com/sub";
pub const DEFAULT_ROOM_INFO_URL: &str = "https://api.live.bilibili.com/room/v1/Room/room_init";
pub const DEFAULT_ORIGIN: &str = "https://live.bilibili.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Process configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Downstream WebSocket bind address
    pub ws_addr: SocketAddr,
    /// Status HTTP bind address
    pub status_addr: SocketAddr,
    /// Upstream socket endpoint
    pub upstream_url: String,
    /// Room-info lookup endpoint
    pub room_info_url: String,
    /// Browser-like user agent for both upstream calls
    pub user_agent: String,
    /// `Origin` for the socket, `Referer` for the lookup
    pub origin: String,
    pub handshake_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ws_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            status_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            room_info_url: DEFAULT_ROOM_INFO_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl BridgeConfig {
    /// Defaults with process environment overrides applied
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides read through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("DANMAKU_WS_ADDR") {
            cfg.ws_addr = parse_addr("DANMAKU_WS_ADDR", &v)?;
            info!("config: ws_addr overridden by env");
        }
        if let Some(v) = get("DANMAKU_STATUS_ADDR") {
            cfg.status_addr = parse_addr("DANMAKU_STATUS_ADDR", &v)?;
            info!("config: status_addr overridden by env");
        }
        if let Some(v) = get("DANMAKU_UPSTREAM_URL") {
            cfg.upstream_url = v;
            info!("config: upstream_url overridden by env");
        }
        if let Some(v) = get("DANMAKU_ROOM_INFO_URL") {
            cfg.room_info_url = v;
            info!("config: room_info_url overridden by env");
        }
        if let Some(v) = get("DANMAKU_USER_AGENT") {
            cfg.user_agent = v;
            info!("config: user_agent overridden by env");
        }
        if let Some(v) = get("DANMAKU_ORIGIN") {
            cfg.origin = v;
            info!("config: origin overridden by env");
        }
        if let Some(v) = get("DANMAKU_HANDSHAKE_TIMEOUT_MS") {
            let ms = parse_num("DANMAKU_HANDSHAKE_TIMEOUT_MS", &v)?;
            cfg.handshake_timeout = Duration::from_millis(ms);
            info!(ms, "config: handshake_timeout overridden by env");
        }
        if let Some(v) = get("DANMAKU_HEARTBEAT_INTERVAL_MS") {
            let ms = parse_num("DANMAKU_HEARTBEAT_INTERVAL_MS", &v)?;
            if ms == 0 {
                return Err(AppError::Config(
                    "DANMAKU_HEARTBEAT_INTERVAL_MS must be > 0".to_string(),
                ));
            }
            cfg.heartbeat_interval = Duration::from_millis(ms);
            info!(ms, "config: heartbeat_interval overridden by env");
        }
        if let Some(v) = get("DANMAKU_MAX_RECONNECT_ATTEMPTS") {
            cfg.max_reconnect_attempts = parse_num("DANMAKU_MAX_RECONNECT_ATTEMPTS", &v)?;
            info!(
                attempts = cfg.max_reconnect_attempts,
                "config: max_reconnect_attempts overridden by env"
            );
        }

        Ok(cfg)
    }

    /// Session tunables derived from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: self.heartbeat_interval,
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, AppError> {
    value
        .parse()
        .map_err(|e| AppError::Config(format!("{}={}: {}", key, value, e)))
}

fn parse_num<T>(key: &str, value: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::Config(format!("{}={}: {}", key, value, e)))
}
