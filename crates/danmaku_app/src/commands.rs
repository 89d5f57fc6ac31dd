use std::io::{self, BufRead};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use danmaku_core::{CredentialStore, RunState};
use danmaku_engine::{
    shared_credentials, AuthValidator, ClientSettings, DispatchClient, DispatchEngine, LogLine,
    LogSink, ReqwestAuthValidator, ReqwestDispatchClient, RunRequest, SharedCredentials,
    StartOutcome, DEFAULT_VALIDATE_TIMEOUT,
};
use engine_logging::{engine_info, engine_warn};

use crate::config::{self, AppConfig};
use crate::messages;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Prints engine log lines the way a log panel would show them.
struct StdoutSink;

impl LogSink for StdoutSink {
    fn emit(&self, line: LogLine) {
        println!("{line}");
    }
}

fn credentials(config: &AppConfig) -> SharedCredentials {
    let store = CredentialStore::from_cookie(&config.cookie);
    let summary = store.summary();
    engine_info!(
        "Parsed cookie: {} field(s), bili_jct={} SESSDATA={}",
        summary.fields,
        summary.has_csrf,
        summary.has_session
    );
    shared_credentials(store)
}

fn require_room(config: &AppConfig) -> anyhow::Result<&str> {
    let room = config.room_id.trim();
    if room.is_empty() {
        bail!("room id is not set; pass --room or set room_id in the config");
    }
    Ok(room)
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")
}

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let room = require_room(config)?.to_string();
    let messages = messages::resolve(config)?;
    let credentials = credentials(config);
    let settings = ClientSettings::default();

    let engine = DispatchEngine::new(
        Arc::new(ReqwestDispatchClient::new(settings.clone(), credentials.clone())),
        Arc::new(ReqwestAuthValidator::new(settings, credentials)),
        config.engine_settings(),
    );
    let outcome = engine.start(RunRequest {
        target: room,
        messages,
        interval_secs: config.interval_secs,
        randomize: config.randomize,
        require_login: config.require_login,
    })?;
    if outcome != StartOutcome::Started {
        bail!("dispatch did not start: {outcome:?}");
    }
    println!("Running. Type `stop` and press Enter to stop.");

    let stop_rx = watch_stdin();
    loop {
        print_pending(&engine);
        if stop_rx.try_recv().is_ok() {
            engine.stop();
            break;
        }
        if engine.state().is_terminal() {
            engine.wait_for_exit(Duration::from_secs(1));
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    print_pending(&engine);
    let state = engine.state();
    println!("Final state: {}, {} attempt(s)", state, engine.attempts());
    if state == RunState::StoppedByFailure {
        bail!("dispatch run ended by failure; see the log for details");
    }
    Ok(())
}

pub fn validate(config: &AppConfig) -> anyhow::Result<()> {
    let validator = ReqwestAuthValidator::new(ClientSettings::default(), credentials(config));
    let outcome = runtime()?.block_on(validator.validate(DEFAULT_VALIDATE_TIMEOUT));
    engine_info!("Credential check: {:?}", outcome);
    if !outcome.is_logged_in() {
        bail!("cookie validation failed: {outcome}");
    }
    println!("Cookie is valid: {outcome}");
    Ok(())
}

pub fn send_once(config: &AppConfig, message: Option<String>) -> anyhow::Result<()> {
    let room = require_room(config)?;
    let text = match message {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => messages::resolve(config)?
            .into_iter()
            .next()
            .context("no message to send")?,
    };

    let client = ReqwestDispatchClient::new(ClientSettings::default(), credentials(config));
    let result = runtime()?.block_on(client.send(room, &text, &StdoutSink));
    if !result.is_ok() {
        bail!("single send failed: {result}");
    }
    println!("Sent: {text}");
    Ok(())
}

pub fn preview(config: &AppConfig) -> anyhow::Result<()> {
    let messages = messages::resolve(config)?;
    for (idx, message) in messages.iter().enumerate() {
        println!("{:>4}  {message}", idx + 1);
    }
    println!("{} message(s)", messages.len());
    Ok(())
}

pub fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; use --force to overwrite", path.display());
    }
    config::save(path, &AppConfig::default())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

pub fn delete_config(path: &Path) -> anyhow::Result<()> {
    if config::delete(path)? {
        println!("Deleted {}", path.display());
    } else {
        engine_warn!("No config at {:?} to delete", path);
        println!("No config at {}", path.display());
    }
    Ok(())
}

fn print_pending(engine: &DispatchEngine) {
    while let Some(line) = engine.try_recv() {
        println!("{line}");
    }
}

/// Signals once the user types `stop`, `q` or `quit`. End of input is ignored
/// so a detached process keeps running.
fn watch_stdin() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                return;
            };
            if is_stop_command(&line) {
                let _ = tx.send(());
                return;
            }
        }
    });
    rx
}

fn is_stop_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "stop" | "q" | "quit")
}
