use std::time::Duration;

use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use serde::Deserialize;

use crate::http::{build_client, describe_error, excerpt, snapshot};
use crate::{AuthOutcome, ClientSettings, SharedCredentials};

pub const DEFAULT_VALIDATE_TIMEOUT: Duration = Duration::from_secs(8);

#[async_trait::async_trait]
pub trait AuthValidator: Send + Sync {
    /// Asks the identity endpoint whether the current credentials are logged in.
    async fn validate(&self, timeout: Duration) -> AuthOutcome;
}

#[derive(Debug, Clone)]
pub struct ReqwestAuthValidator {
    settings: ClientSettings,
    credentials: SharedCredentials,
}

impl ReqwestAuthValidator {
    pub fn new(settings: ClientSettings, credentials: SharedCredentials) -> Self {
        Self {
            settings,
            credentials,
        }
    }
}

#[async_trait::async_trait]
impl AuthValidator for ReqwestAuthValidator {
    async fn validate(&self, timeout: Duration) -> AuthOutcome {
        let credentials = snapshot(&self.credentials);
        let client = match build_client(&self.settings, timeout) {
            Ok(client) => client,
            Err(err) => return transport(&err),
        };

        let mut request = client
            .get(&self.settings.nav_url)
            .header(USER_AGENT, &self.settings.user_agent)
            .header(REFERER, &self.settings.site_referer);
        if let Some(cookie) = credentials.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return transport(&err),
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => classify_nav_response(status, &body),
            Err(err) => transport(&err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NavEnvelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<NavData>,
}

#[derive(Debug, Default, Deserialize)]
struct NavData {
    #[serde(default, rename = "isLogin", alias = "is_login")]
    is_login: Option<bool>,
    #[serde(default, alias = "username")]
    uname: Option<String>,
}

pub(crate) fn classify_nav_response(status: u16, body: &str) -> AuthOutcome {
    let envelope: NavEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) => {
            return AuthOutcome::Malformed {
                http_status: status,
                excerpt: excerpt(body),
            }
        }
    };
    let data = envelope.data.unwrap_or_default();
    let username = data.uname.filter(|name| !name.is_empty());
    if envelope.code == 0 && (data.is_login.unwrap_or(false) || username.is_some()) {
        return AuthOutcome::LoggedIn { username };
    }
    AuthOutcome::NotLoggedIn {
        code: Some(envelope.code),
        message: envelope.message,
        excerpt: excerpt(body),
    }
}

fn transport(err: &reqwest::Error) -> AuthOutcome {
    AuthOutcome::Transport {
        timed_out: err.is_timeout(),
        message: describe_error(err),
    }
}
