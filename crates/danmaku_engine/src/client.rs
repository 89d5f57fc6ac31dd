use log::Level;
use reqwest::header::{CONTENT_TYPE, COOKIE, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;

use crate::http::{build_client, describe_error, excerpt, snapshot};
use crate::{report, ClientSettings, LogSink, SendOutcome, SendResult, SharedCredentials};

// Fixed display styling: white, medium font, scrolling mode, no bubble.
const COLOR: &str = "16777215";
const FONT_SIZE: &str = "25";
const MODE: &str = "1";
const BUBBLE: &str = "0";

#[async_trait::async_trait]
pub trait DispatchClient: Send + Sync {
    /// Makes exactly one send attempt and reports its outcome to `sink`.
    async fn send(&self, target: &str, text: &str, sink: &dyn LogSink) -> SendResult;
}

#[derive(Debug, Clone)]
pub struct ReqwestDispatchClient {
    settings: ClientSettings,
    credentials: SharedCredentials,
}

impl ReqwestDispatchClient {
    pub fn new(settings: ClientSettings, credentials: SharedCredentials) -> Self {
        Self {
            settings,
            credentials,
        }
    }

    pub fn credentials(&self) -> &SharedCredentials {
        &self.credentials
    }

    fn form_body(&self, target: &str, text: &str, csrf: &str) -> String {
        let nonce = chrono::Utc::now().timestamp().to_string();
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("color", COLOR)
            .append_pair("fontsize", FONT_SIZE)
            .append_pair("mode", MODE)
            .append_pair("msg", text)
            .append_pair("rnd", &nonce)
            .append_pair("roomid", target)
            .append_pair("bubble", BUBBLE)
            .append_pair("csrf_token", csrf)
            .append_pair("csrf", csrf)
            .finish()
    }

    async fn post(&self, target: &str, text: &str) -> SendResult {
        let credentials = snapshot(&self.credentials);
        let Some(csrf) = credentials.csrf_token() else {
            return SendResult {
                message: Some("missing bili_jct (csrf) in cookie".to_string()),
                ..SendResult::new(SendOutcome::PreconditionFailed)
            };
        };

        let client = match build_client(&self.settings, self.settings.send_timeout) {
            Ok(client) => client,
            Err(err) => return transport_failure(&err),
        };

        let mut request = client
            .post(&self.settings.send_url)
            .header(USER_AGENT, &self.settings.user_agent)
            .header(ORIGIN, &self.settings.live_origin)
            .header(REFERER, format!("{}/{}", self.settings.live_origin, target))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(self.form_body(target, text, csrf));
        if let Some(cookie) = credentials.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return transport_failure(&err),
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => classify_send_response(status, &body),
            Err(err) => SendResult {
                http_status: Some(status),
                ..transport_failure(&err)
            },
        }
    }
}

#[async_trait::async_trait]
impl DispatchClient for ReqwestDispatchClient {
    async fn send(&self, target: &str, text: &str, sink: &dyn LogSink) -> SendResult {
        let result = self.post(target, text).await;
        let level = if result.is_ok() {
            Level::Debug
        } else {
            Level::Warn
        };
        report(sink, level, format!("send to room {target}: {result}"));
        result
    }
}

#[derive(Debug, Deserialize)]
struct SendEnvelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Classifies a completed send response by HTTP status and JSON envelope.
pub(crate) fn classify_send_response(status: u16, body: &str) -> SendResult {
    let base = SendResult {
        http_status: Some(status),
        excerpt: Some(excerpt(body)),
        ..SendResult::new(SendOutcome::MalformedResponse)
    };
    let envelope: SendEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) => return base,
    };
    let message = envelope
        .message
        .filter(|m| !m.is_empty())
        .or(envelope.msg)
        .filter(|m| !m.is_empty());
    let outcome = if status == 200 && envelope.code == 0 {
        SendOutcome::Ok
    } else {
        SendOutcome::ServerRejected
    };
    SendResult {
        outcome,
        code: Some(envelope.code),
        message,
        ..base
    }
}

fn transport_failure(err: &reqwest::Error) -> SendResult {
    SendResult {
        message: Some(describe_error(err)),
        ..SendResult::new(SendOutcome::TransportFailure)
    }
}
