/// Responses that stop a run for good instead of being retried next tick.
///
/// HTTP statuses cover the gateway's throttling and auth rejections; server
/// codes cover the same signals reported inside a 200 response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerPolicy {
    pub http_statuses: Vec<u16>,
    pub server_codes: Vec<i64>,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            http_statuses: vec![401, 403, 412, 429],
            // -101 not logged in, -111 csrf check failed, -352 risk control, -412 intercepted
            server_codes: vec![-101, -111, -352, -412],
        }
    }
}

impl BreakerPolicy {
    /// Only HTTP statuses trip the breaker.
    pub fn http_only() -> Self {
        Self {
            server_codes: Vec::new(),
            ..Self::default()
        }
    }

    pub fn trips(&self, http_status: Option<u16>, server_code: Option<i64>) -> bool {
        http_status.is_some_and(|status| self.http_statuses.contains(&status))
            || server_code.is_some_and(|code| self.server_codes.contains(&code))
    }
}
