use std::fmt;

use danmaku_core::BreakerPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// HTTP 200 with server code 0.
    Ok,
    /// No CSRF token; nothing was sent.
    PreconditionFailed,
    /// Well-formed response carrying a non-success code.
    ServerRejected,
    /// The request never completed.
    TransportFailure,
    /// The body was not the expected JSON envelope.
    MalformedResponse,
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub outcome: SendOutcome,
    pub http_status: Option<u16>,
    pub code: Option<i64>,
    pub message: Option<String>,
    pub excerpt: Option<String>,
}

impl SendResult {
    pub(crate) fn new(outcome: SendOutcome) -> Self {
        Self {
            outcome,
            http_status: None,
            code: None,
            message: None,
            excerpt: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == SendOutcome::Ok
    }

    /// Maps a failed attempt onto the error taxonomy; `None` for a success.
    ///
    /// The breaker check runs first: a throttling status wins over the shape
    /// of the body, since gateways answer 412 with an HTML page.
    pub fn failure_kind(&self, policy: &BreakerPolicy) -> Option<FailureKind> {
        if self.is_ok() {
            return None;
        }
        if self.outcome != SendOutcome::PreconditionFailed
            && policy.trips(self.http_status, self.code)
        {
            return Some(FailureKind::RateLimitOrAuth);
        }
        Some(match self.outcome {
            SendOutcome::PreconditionFailed => FailureKind::Validation,
            SendOutcome::TransportFailure => FailureKind::Transport,
            SendOutcome::MalformedResponse => FailureKind::Protocol,
            SendOutcome::ServerRejected | SendOutcome::Ok => FailureKind::ServerRejection,
        })
    }
}

impl fmt::Display for SendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.outcome)?;
        if let Some(status) = self.http_status {
            write!(f, " http_status={status}")?;
        }
        if let Some(code) = self.code {
            write!(f, " code={code}")?;
        }
        if let Some(message) = self.message.as_deref() {
            write!(f, " message={message}")?;
        }
        if let Some(excerpt) = self.excerpt.as_deref() {
            write!(f, " body={excerpt}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Transport,
    Protocol,
    ServerRejection,
    RateLimitOrAuth,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "validation error"),
            FailureKind::Transport => write!(f, "transport error"),
            FailureKind::Protocol => write!(f, "protocol error"),
            FailureKind::ServerRejection => write!(f, "server rejection"),
            FailureKind::RateLimitOrAuth => write!(f, "rate limit or auth rejection"),
        }
    }
}

/// Result of the identity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    LoggedIn {
        username: Option<String>,
    },
    NotLoggedIn {
        code: Option<i64>,
        message: Option<String>,
        excerpt: String,
    },
    Transport {
        timed_out: bool,
        message: String,
    },
    Malformed {
        http_status: u16,
        excerpt: String,
    },
}

impl AuthOutcome {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthOutcome::LoggedIn { .. })
    }
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOutcome::LoggedIn { username } => {
                write!(f, "logged in as {}", username.as_deref().unwrap_or("<unknown>"))
            }
            AuthOutcome::NotLoggedIn { code, message, .. } => write!(
                f,
                "not logged in or cookie invalid (code={}, message={})",
                code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                message.as_deref().unwrap_or("")
            ),
            AuthOutcome::Transport { timed_out, message } => {
                let what = if *timed_out { "timeout" } else { "network error" };
                write!(f, "{what}: {message}")
            }
            AuthOutcome::Malformed { http_status, .. } => {
                write!(f, "non-JSON response, HTTP {http_status}")
            }
        }
    }
}
