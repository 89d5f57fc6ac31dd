use thiserror::Error;

/// Rejected run or chunking parameters. Nothing is started when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("chunk size must be a positive integer, got {0}")]
    InvalidChunkSize(usize),
    #[error("message list is empty")]
    EmptyMessages,
    #[error("target room id is empty")]
    EmptyTarget,
    #[error("interval must be a finite number of seconds, got {0}")]
    InvalidInterval(f64),
}
