use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use danmaku_core::{
    pacing_delay, select_message, BreakerPolicy, ConfigError, RandomSource, RunState,
};
use log::Level;

use crate::auth::DEFAULT_VALIDATE_TIMEOUT;
use crate::{
    report, AuthValidator, ChannelLogSink, DispatchClient, FailureKind, LogLine, LogSink,
    ThreadRandom,
};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long `stop` waits for the worker before giving up.
    pub stop_timeout: Duration,
    pub preflight_timeout: Duration,
    /// Granularity at which a pause notices a stop request.
    pub sleep_slice: Duration,
    pub breaker: BreakerPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
            preflight_timeout: DEFAULT_VALIDATE_TIMEOUT,
            sleep_slice: Duration::from_millis(100),
            breaker: BreakerPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub target: String,
    pub messages: Vec<String>,
    pub interval_secs: f64,
    pub randomize: bool,
    /// End the run when the pre-flight check says the cookie is not logged in.
    pub require_login: bool,
}

impl RunRequest {
    fn check(&self) -> Result<(), ConfigError> {
        if self.messages.is_empty() {
            return Err(ConfigError::EmptyMessages);
        }
        if self.target.trim().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if !self.interval_secs.is_finite() {
            return Err(ConfigError::InvalidInterval(self.interval_secs));
        }
        Ok(())
    }
}

/// Log lines buffered for `try_recv`. Lines beyond this are dropped from the
/// channel but still reach the global logger.
pub const LOG_CHANNEL_CAPACITY: usize = 4096;

/// What `start` did with an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// A stopped worker has not exited yet; nothing new was started.
    PreviousRunStopping,
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error("failed to spawn dispatch worker: {0}")]
    Spawn(#[from] std::io::Error),
}

type RandomFactory = dyn Fn() -> Box<dyn RandomSource> + Send + Sync;

struct RunShared {
    running: AtomicBool,
    attempts: AtomicU64,
    state: Mutex<RunState>,
}

impl RunShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

struct Worker {
    handle: thread::JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

/// Owns the background send loop.
///
/// At most one worker thread exists per engine. The caller and the worker
/// share a running flag, the run state and the log channel; everything else
/// is moved into the worker when a run starts.
pub struct DispatchEngine {
    client: Arc<dyn DispatchClient>,
    validator: Arc<dyn AuthValidator>,
    settings: EngineSettings,
    random: Arc<RandomFactory>,
    shared: Arc<RunShared>,
    sink: Arc<dyn LogSink>,
    log_rx: mpsc::Receiver<LogLine>,
    worker: Mutex<Option<Worker>>,
}

impl DispatchEngine {
    pub fn new(
        client: Arc<dyn DispatchClient>,
        validator: Arc<dyn AuthValidator>,
        settings: EngineSettings,
    ) -> Self {
        let (log_tx, log_rx) = mpsc::sync_channel(LOG_CHANNEL_CAPACITY);
        Self {
            client,
            validator,
            settings,
            random: Arc::new(|| -> Box<dyn RandomSource> { Box::new(ThreadRandom) }),
            shared: Arc::new(RunShared {
                running: AtomicBool::new(false),
                attempts: AtomicU64::new(0),
                state: Mutex::new(RunState::Idle),
            }),
            sink: Arc::new(ChannelLogSink::new(log_tx)),
            log_rx,
            worker: Mutex::new(None),
        }
    }

    /// Replaces the randomness used for message selection and jitter.
    pub fn with_random_source<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn RandomSource> + Send + Sync + 'static,
    {
        self.random = Arc::new(factory);
        self
    }

    pub fn state(&self) -> RunState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Attempts made by the current (or last) run.
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Next pending log line, if any. Callers that want every line must drain
    /// this regularly; at most [`LOG_CHANNEL_CAPACITY`] lines are held.
    pub fn try_recv(&self) -> Option<LogLine> {
        self.log_rx.try_recv().ok()
    }

    /// Starts a run in the background and returns immediately.
    ///
    /// An invalid request is rejected without starting. A request arriving
    /// while a run is active (or still winding down) is logged and ignored,
    /// and the returned outcome says so.
    pub fn start(&self, request: RunRequest) -> Result<StartOutcome, StartError> {
        if let Err(err) = request.check() {
            report(self.sink.as_ref(), Level::Error, format!("not starting: {err}"));
            return Err(err.into());
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.is_running() {
            report(self.sink.as_ref(), Level::Info, "already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        if let Some(previous) = worker.take() {
            if !previous.handle.is_finished() {
                report(
                    self.sink.as_ref(),
                    Level::Warn,
                    "previous run is still shutting down; start ignored",
                );
                *worker = Some(previous);
                return Ok(StartOutcome::PreviousRunStopping);
            }
            let _ = previous.handle.join();
        }

        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.set_state(RunState::Running);
        self.shared.running.store(true, Ordering::SeqCst);

        report(
            self.sink.as_ref(),
            Level::Info,
            format!(
                "starting dispatch to room {}: {} message(s), interval {}s, randomize={}",
                request.target.trim(),
                request.messages.len(),
                request.interval_secs,
                request.randomize
            ),
        );

        let (done_tx, done_rx) = mpsc::channel();
        let context = WorkerContext {
            run: Arc::new(CapturedRun {
                target: request.target.trim().to_string(),
                messages: request.messages.into(),
                interval_secs: request.interval_secs,
                randomize: request.randomize,
                require_login: request.require_login,
            }),
            client: self.client.clone(),
            validator: self.validator.clone(),
            settings: self.settings.clone(),
            shared: self.shared.clone(),
            sink: self.sink.clone(),
            random: (self.random)(),
        };
        let spawned = thread::Builder::new()
            .name("danmaku-dispatch".to_string())
            .spawn(move || {
                run_worker(context);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker { handle, done_rx });
                Ok(StartOutcome::Started)
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.set_state(RunState::StoppedByFailure);
                report(
                    self.sink.as_ref(),
                    Level::Error,
                    format!("failed to spawn dispatch worker: {err}"),
                );
                Err(err.into())
            }
        }
    }

    /// Asks the worker to stop and waits up to the configured timeout.
    ///
    /// An in-flight request is never interrupted; the worker stops once it
    /// returns. Returns the state observed after waiting.
    pub fn stop(&self) -> RunState {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            // A worker that cleared the flag itself may not have published its
            // final state yet.
            self.wait_for_exit(self.settings.stop_timeout);
            report(self.sink.as_ref(), Level::Info, "no dispatch run in progress");
            return self.state();
        }
        report(
            self.sink.as_ref(),
            Level::Info,
            "stop requested, waiting for dispatch worker to exit",
        );
        if self.wait_for_exit(self.settings.stop_timeout) {
            report(self.sink.as_ref(), Level::Info, "dispatch stopped");
        } else {
            report(
                self.sink.as_ref(),
                Level::Warn,
                format!(
                    "dispatch worker did not exit within {:?}; it stops after the current request",
                    self.settings.stop_timeout
                ),
            );
        }
        self.state()
    }

    /// Waits for the worker thread to finish. Returns `false` on timeout.
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        let taken = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = taken else {
            return true;
        };
        match worker.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some(worker);
                }
                false
            }
        }
    }
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

struct CapturedRun {
    target: String,
    messages: Arc<[String]>,
    interval_secs: f64,
    randomize: bool,
    require_login: bool,
}

struct WorkerContext {
    run: Arc<CapturedRun>,
    client: Arc<dyn DispatchClient>,
    validator: Arc<dyn AuthValidator>,
    settings: EngineSettings,
    shared: Arc<RunShared>,
    sink: Arc<dyn LogSink>,
    random: Box<dyn RandomSource>,
}

#[derive(Debug, thiserror::Error)]
enum WorkerError {
    #[error("failed to build async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn run_worker(mut context: WorkerContext) {
    let sink = context.sink.clone();
    let shared = context.shared.clone();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| drive(&mut context)));
    let final_state = match outcome {
        Ok(Ok(state)) => state,
        Ok(Err(err)) => {
            report(sink.as_ref(), Level::Error, format!("dispatch worker error: {err:?}"));
            RunState::StoppedByFailure
        }
        Err(payload) => {
            report(
                sink.as_ref(),
                Level::Error,
                format!("dispatch worker panicked: {}", panic_message(payload.as_ref())),
            );
            RunState::StoppedByFailure
        }
    };

    shared.running.store(false, Ordering::SeqCst);
    shared.set_state(final_state);
    let attempts = shared.attempts.load(Ordering::SeqCst);
    match final_state {
        RunState::StoppedByFailure => report(
            sink.as_ref(),
            Level::Error,
            format!("dispatch run ended by failure after {attempts} attempt(s)"),
        ),
        _ => report(
            sink.as_ref(),
            Level::Info,
            format!("dispatch run stopped by user after {attempts} attempt(s)"),
        ),
    }
}

fn drive(context: &mut WorkerContext) -> Result<RunState, WorkerError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(run_loop(context)))
}

async fn run_loop(context: &mut WorkerContext) -> RunState {
    if !preflight(context).await {
        return RunState::StoppedByFailure;
    }

    let run = context.run.clone();
    let sink = context.sink.as_ref();
    while context.shared.is_running() {
        let attempt = context.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(message) =
            select_message(&run.messages, attempt, run.randomize, context.random.as_mut())
        else {
            report(sink, Level::Error, "message list is empty");
            return RunState::StoppedByFailure;
        };

        let result = context.client.send(&run.target, message, sink).await;
        match result.failure_kind(&context.settings.breaker) {
            None => report(sink, Level::Info, format!("#{attempt} sent: {message}")),
            Some(kind) => {
                report(sink, Level::Warn, format!("#{attempt} failed ({kind}): {result}"));
                if kind == FailureKind::RateLimitOrAuth {
                    context.shared.running.store(false, Ordering::SeqCst);
                    report(
                        sink,
                        Level::Error,
                        format!(
                            "CIRCUIT BREAKER: http_status={:?} code={:?} signals throttling or rejected credentials; halting to avoid escalation (check cookie/csrf/referer)",
                            result.http_status, result.code
                        ),
                    );
                    return RunState::StoppedByFailure;
                }
            }
        }

        let delay = pacing_delay(run.interval_secs, context.random.as_mut());
        pause(&context.shared, delay, context.settings.sleep_slice).await;
    }
    RunState::StoppedByUser
}

async fn preflight(context: &WorkerContext) -> bool {
    let sink = context.sink.as_ref();
    let outcome = context
        .validator
        .validate(context.settings.preflight_timeout)
        .await;
    if outcome.is_logged_in() {
        report(sink, Level::Info, format!("credential check passed: {outcome}"));
        return true;
    }
    if context.run.require_login {
        context.shared.running.store(false, Ordering::SeqCst);
        report(
            sink,
            Level::Error,
            format!("credential check failed, not sending: {outcome} {outcome:?}"),
        );
        return false;
    }
    report(
        sink,
        Level::Warn,
        format!("credential check failed, sending anyway: {outcome} {outcome:?}"),
    );
    true
}

/// Sleeps for `total` in `slice` steps, returning early once the run stops.
/// A pause too long to represent as a deadline lasts until the stop.
async fn pause(shared: &RunShared, total: Duration, slice: Duration) {
    let deadline = tokio::time::Instant::now().checked_add(total);
    let slice = slice.max(Duration::from_millis(1));
    while shared.is_running() {
        let step = match deadline {
            Some(deadline) => {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    break;
                }
                (deadline - now).min(slice)
            }
            None => slice,
        };
        tokio::time::sleep(step).await;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
