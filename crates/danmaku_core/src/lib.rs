//! Danmaku core: pure chunking, credential and pacing logic.
mod breaker;
mod chunk;
mod cookie;
mod error;
mod select;
mod state;

pub use breaker::BreakerPolicy;
pub use chunk::{chunk_text, normalize, parse_message_lines, ChunkSize, DEFAULT_CHUNK_SIZE};
pub use cookie::{
    CredentialError, CredentialStore, CredentialSummary, CSRF_COOKIE, SESSION_COOKIE,
};
pub use error::ConfigError;
pub use select::{
    pacing_delay, select_message, RandomSource, MAX_JITTER_SECS, MIN_INTERVAL_SECS,
};
pub use state::RunState;
