use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use danmaku_core::CredentialStore;

/// Maximum number of characters of a response body kept for diagnostics.
pub const EXCERPT_CHARS: usize = 1000;

/// Credentials shared between the caller and the HTTP clients.
///
/// The caller is the only writer; clients take a snapshot per request.
pub type SharedCredentials = Arc<RwLock<CredentialStore>>;

pub fn shared_credentials(store: CredentialStore) -> SharedCredentials {
    Arc::new(RwLock::new(store))
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub send_url: String,
    pub nav_url: String,
    pub live_origin: String,
    pub site_referer: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            send_url: "https://api.live.bilibili.com/msg/send".to_string(),
            nav_url: "https://api.bilibili.com/x/web-interface/nav".to_string(),
            live_origin: "https://live.bilibili.com".to_string(),
            site_referer: "https://www.bilibili.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
        }
    }
}

pub(crate) fn build_client(
    settings: &ClientSettings,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout.min(timeout))
        .timeout(timeout)
        .build()
}

pub(crate) fn snapshot(credentials: &SharedCredentials) -> CredentialStore {
    credentials
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_CHARS).collect()
}

pub(crate) fn describe_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timeout: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("network error: {err}")
    }
}
