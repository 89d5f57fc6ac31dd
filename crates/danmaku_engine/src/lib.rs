//! Danmaku engine: HTTP dispatch, credential validation and the paced send loop.
mod auth;
mod client;
mod engine;
mod http;
mod rng;
mod sink;
mod types;

pub use auth::{AuthValidator, ReqwestAuthValidator, DEFAULT_VALIDATE_TIMEOUT};
pub use client::{DispatchClient, ReqwestDispatchClient};
pub use engine::{
    DispatchEngine, EngineSettings, RunRequest, StartError, StartOutcome, LOG_CHANNEL_CAPACITY,
};
pub use http::{shared_credentials, ClientSettings, SharedCredentials, EXCERPT_CHARS};
pub use rng::ThreadRandom;
pub use sink::{report, ChannelLogSink, LogLine, LogSink};
pub use types::{AuthOutcome, FailureKind, SendOutcome, SendResult};
