use std::collections::BTreeMap;

use thiserror::Error;

/// Cookie field carrying the CSRF token echoed on mutation requests.
pub const CSRF_COOKIE: &str = "bili_jct";
/// Cookie field carrying the session credential.
pub const SESSION_COOKIE: &str = "SESSDATA";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("missing {CSRF_COOKIE} (csrf) in cookie")]
    MissingCsrf,
}

/// Presence flags for the fields that matter, safe to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CredentialSummary {
    pub fields: usize,
    pub has_csrf: bool,
    pub has_session: bool,
}

/// Credentials parsed from a browser cookie string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CredentialStore {
    cookies: BTreeMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cookie(cookie: &str) -> Self {
        Self {
            cookies: Self::parse(cookie),
        }
    }

    /// Splits `a=1; b=2` into a map. The first `=` separates key from value;
    /// segments without one are dropped.
    pub fn parse(cookie: &str) -> BTreeMap<String, String> {
        cookie
            .split(';')
            .filter_map(|segment| {
                let (key, value) = segment.trim().split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Replaces the whole credential set with the one parsed from `cookie`.
    pub fn apply(&mut self, cookie: &str) -> CredentialSummary {
        self.cookies = Self::parse(cookie);
        self.summary()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cookies.get(key).map(String::as_str)
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.non_empty(CSRF_COOKIE)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.non_empty(SESSION_COOKIE)
    }

    pub fn require_csrf(&self) -> Result<&str, CredentialError> {
        self.csrf_token().ok_or(CredentialError::MissingCsrf)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Renders the set as a `Cookie` request header value, pairs sorted by key.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        Some(pairs.join("; "))
    }

    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            fields: self.cookies.len(),
            has_csrf: self.csrf_token().is_some(),
            has_session: self.session_id().is_some(),
        }
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }
}
