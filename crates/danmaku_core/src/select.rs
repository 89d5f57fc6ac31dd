use std::time::Duration;

/// Floor applied to the configured interval, in seconds.
pub const MIN_INTERVAL_SECS: f64 = 0.1;
/// Upper bound (exclusive) of the random delay added to every pause.
pub const MAX_JITTER_SECS: f64 = 0.5;

/// Source of randomness for message selection and jitter.
pub trait RandomSource: Send {
    /// Uniform index in `0..len`. `len` is never zero.
    fn index(&mut self, len: usize) -> usize;
    /// Uniform value in `[0, 1)`.
    fn unit(&mut self) -> f64;
}

/// Picks the message for a 1-based `attempt`.
pub fn select_message<'a>(
    messages: &'a [String],
    attempt: u64,
    randomize: bool,
    rng: &mut dyn RandomSource,
) -> Option<&'a str> {
    if messages.is_empty() {
        return None;
    }
    let idx = if randomize {
        rng.index(messages.len()).min(messages.len() - 1)
    } else {
        (attempt.saturating_sub(1) % messages.len() as u64) as usize
    };
    messages.get(idx).map(String::as_str)
}

/// Pause between two attempts: the interval (at least [`MIN_INTERVAL_SECS`])
/// plus jitter in `[0, MAX_JITTER_SECS)`.
pub fn pacing_delay(interval_secs: f64, rng: &mut dyn RandomSource) -> Duration {
    let base = if interval_secs.is_finite() {
        interval_secs.max(MIN_INTERVAL_SECS)
    } else {
        MIN_INTERVAL_SECS
    };
    let unit = rng.unit().clamp(0.0, 1.0);
    let jitter = (unit * MAX_JITTER_SECS).min(MAX_JITTER_SECS - f64::EPSILON);
    Duration::try_from_secs_f64(base + jitter).unwrap_or(Duration::MAX)
}
