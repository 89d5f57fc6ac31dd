use std::fmt;
use std::sync::mpsc;

use chrono::{DateTime, Local};
use engine_logging::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};
use log::Level;

/// One timestamped line for an external log consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: Level,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%Y-%m-%d %H:%M:%S"), self.text)
    }
}

/// Receives log lines from the send loop. Implementations must return quickly
/// and swallow their own failures.
pub trait LogSink: Send + Sync {
    fn emit(&self, line: LogLine);
}

/// Forwards lines over a bounded channel. A full or closed channel drops the
/// line instead of blocking the send loop.
pub struct ChannelLogSink {
    tx: mpsc::SyncSender<LogLine>,
}

impl ChannelLogSink {
    pub fn new(tx: mpsc::SyncSender<LogLine>) -> Self {
        Self { tx }
    }
}

impl LogSink for ChannelLogSink {
    fn emit(&self, line: LogLine) {
        let _ = self.tx.try_send(line);
    }
}

/// Stamps `text`, writes it to the global logger and hands it to `sink`.
pub fn report(sink: &dyn LogSink, level: Level, text: impl Into<String>) {
    let text = text.into();
    match level {
        Level::Error => engine_error!("{}", text),
        Level::Warn => engine_warn!("{}", text),
        Level::Info => engine_info!("{}", text),
        Level::Debug => engine_debug!("{}", text),
        Level::Trace => engine_trace!("{}", text),
    }
    sink.emit(LogLine {
        at: Local::now(),
        level,
        text,
    });
}
