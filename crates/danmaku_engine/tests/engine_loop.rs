use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use danmaku_core::{ConfigError, RandomSource, RunState};
use danmaku_engine::{
    AuthOutcome, AuthValidator, DispatchClient, DispatchEngine, EngineSettings, LogSink,
    RunRequest, SendOutcome, SendResult, StartError, StartOutcome,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn ok_result() -> SendResult {
    SendResult {
        outcome: SendOutcome::Ok,
        http_status: Some(200),
        code: Some(0),
        message: None,
        excerpt: None,
    }
}

fn failure(outcome: SendOutcome, http_status: Option<u16>, code: Option<i64>) -> SendResult {
    SendResult {
        outcome,
        http_status,
        code,
        message: Some("stub".to_string()),
        excerpt: None,
    }
}

/// Records every message and replays scripted results (then `fallback`).
struct StubClient {
    sent: Mutex<Vec<String>>,
    script: Mutex<VecDeque<SendResult>>,
    fallback: SendResult,
    panic_on_send: bool,
}

impl StubClient {
    fn always(result: SendResult) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: result,
            panic_on_send: false,
        })
    }

    fn scripted(script: Vec<SendResult>, fallback: SendResult) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            fallback,
            panic_on_send: false,
        })
    }

    fn panicking() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: ok_result(),
            panic_on_send: true,
        })
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DispatchClient for StubClient {
    async fn send(&self, _target: &str, text: &str, _sink: &dyn LogSink) -> SendResult {
        if self.panic_on_send {
            panic!("stub transport exploded");
        }
        self.sent.lock().unwrap().push(text.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Succeeds on every send, but only after `delay`.
struct SlowClient {
    delay: Duration,
    sent: Mutex<Vec<String>>,
}

impl SlowClient {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DispatchClient for SlowClient {
    async fn send(&self, _target: &str, text: &str, _sink: &dyn LogSink) -> SendResult {
        self.sent.lock().unwrap().push(text.to_string());
        tokio::time::sleep(self.delay).await;
        ok_result()
    }
}

struct StubValidator {
    outcome: AuthOutcome,
}

#[async_trait::async_trait]
impl AuthValidator for StubValidator {
    async fn validate(&self, _timeout: Duration) -> AuthOutcome {
        self.outcome.clone()
    }
}

fn logged_in() -> Arc<StubValidator> {
    Arc::new(StubValidator {
        outcome: AuthOutcome::LoggedIn {
            username: Some("tester".to_string()),
        },
    })
}

fn logged_out() -> Arc<StubValidator> {
    Arc::new(StubValidator {
        outcome: AuthOutcome::NotLoggedIn {
            code: Some(-101),
            message: Some("not logged in".to_string()),
            excerpt: String::new(),
        },
    })
}

struct ScriptedRandom {
    indices: VecDeque<usize>,
}

impl RandomSource for ScriptedRandom {
    fn index(&mut self, _len: usize) -> usize {
        self.indices.pop_front().unwrap_or(0)
    }

    fn unit(&mut self) -> f64 {
        0.0
    }
}

fn engine(client: Arc<StubClient>, validator: Arc<StubValidator>) -> DispatchEngine {
    init_logging();
    DispatchEngine::new(client, validator, EngineSettings::default()).with_random_source(|| {
        Box::new(ScriptedRandom {
            indices: VecDeque::new(),
        })
    })
}

fn request(messages: &[&str]) -> RunRequest {
    RunRequest {
        target: "12345".to_string(),
        messages: messages.iter().map(|m| m.to_string()).collect(),
        interval_secs: 0.0,
        randomize: false,
        require_login: true,
    }
}

fn slow_engine(client: Arc<SlowClient>) -> DispatchEngine {
    init_logging();
    let settings = EngineSettings {
        stop_timeout: Duration::from_millis(200),
        ..EngineSettings::default()
    };
    DispatchEngine::new(client, logged_in(), settings)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn drain_logs(engine: &DispatchEngine) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(line) = engine.try_recv() {
        lines.push(line.text);
    }
    lines
}

#[test]
fn breaker_status_stops_after_single_send() {
    for status in [401, 403, 412, 429] {
        let client = StubClient::always(failure(SendOutcome::MalformedResponse, Some(status), None));
        let engine = engine(client.clone(), logged_in());

        engine.start(request(&["hello"])).unwrap();
        assert!(engine.wait_for_exit(Duration::from_secs(5)));

        assert_eq!(engine.state(), RunState::StoppedByFailure);
        assert_eq!(client.sent(), vec!["hello".to_string()]);
        assert_eq!(engine.attempts(), 1);
        let logs = drain_logs(&engine);
        assert!(logs.iter().any(|l| l.contains("CIRCUIT BREAKER")), "{logs:?}");
    }
}

#[test]
fn breaker_server_code_stops_run() {
    let client = StubClient::scripted(
        vec![ok_result()],
        failure(SendOutcome::ServerRejected, Some(200), Some(-111)),
    );
    let engine = engine(client.clone(), logged_in());

    engine.start(request(&["a", "b", "c"])).unwrap();
    assert!(engine.wait_for_exit(Duration::from_secs(5)));

    assert_eq!(engine.state(), RunState::StoppedByFailure);
    assert_eq!(client.sent(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn ordinary_rejection_keeps_running() {
    let client = StubClient::always(failure(SendOutcome::ServerRejected, Some(200), Some(10030)));
    let engine = engine(client.clone(), logged_in());

    engine.start(request(&["a"])).unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() >= 3));
    assert_eq!(engine.state(), RunState::Running);

    assert_eq!(engine.stop(), RunState::StoppedByUser);
}

#[test]
fn stop_on_idle_engine_is_noop() {
    let engine = engine(StubClient::always(ok_result()), logged_in());
    assert_eq!(engine.stop(), RunState::Idle);
    assert!(!engine.is_running());
    let logs = drain_logs(&engine);
    assert!(logs.iter().any(|l| l.contains("no dispatch run in progress")));
}

#[test]
fn stop_during_run_ends_as_stopped_by_user() {
    let client = StubClient::always(ok_result());
    let engine = engine(client.clone(), logged_in());

    engine.start(request(&["x"])).unwrap();
    assert_eq!(engine.state(), RunState::Running);
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() >= 2));

    assert_eq!(engine.stop(), RunState::StoppedByUser);
    let sent_at_stop = client.sent().len();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(client.sent().len(), sent_at_stop);

    let logs = drain_logs(&engine);
    assert!(logs.iter().any(|l| l.contains("stopped by user")), "{logs:?}");
    assert!(!logs.iter().any(|l| l.contains("CIRCUIT BREAKER")));
}

#[test]
fn sequential_run_cycles_through_messages() {
    let client = StubClient::always(ok_result());
    let engine = engine(client.clone(), logged_in());

    engine.start(request(&["x", "y"])).unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() >= 5));
    engine.stop();

    let sent = client.sent();
    assert_eq!(&sent[..5], &["x", "y", "x", "y", "x"]);
}

#[test]
fn randomized_run_uses_injected_source() {
    init_logging();
    let client = StubClient::always(ok_result());
    let engine = DispatchEngine::new(client.clone(), logged_in(), EngineSettings::default())
        .with_random_source(|| {
            Box::new(ScriptedRandom {
                indices: VecDeque::from(vec![2, 2, 0, 1]),
            })
        });

    let mut req = request(&["a", "b", "c"]);
    req.randomize = true;
    engine.start(req).unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() >= 4));
    engine.stop();

    assert_eq!(&client.sent()[..4], &["c", "c", "a", "b"]);
}

#[test]
fn empty_message_list_is_rejected() {
    let client = StubClient::always(ok_result());
    let engine = engine(client.clone(), logged_in());

    let result = engine.start(request(&[]));
    assert!(
        matches!(result, Err(StartError::Invalid(ConfigError::EmptyMessages))),
        "{result:?}"
    );
    assert_eq!(engine.state(), RunState::Idle);
    assert!(client.sent().is_empty());
}

#[test]
fn blank_target_is_rejected() {
    let engine = engine(StubClient::always(ok_result()), logged_in());
    let mut req = request(&["a"]);
    req.target = "  ".to_string();
    let result = engine.start(req);
    assert!(
        matches!(result, Err(StartError::Invalid(ConfigError::EmptyTarget))),
        "{result:?}"
    );
    assert_eq!(engine.state(), RunState::Idle);
}

#[test]
fn second_start_while_running_is_ignored() {
    let client = StubClient::always(ok_result());
    let engine = engine(client.clone(), logged_in());

    assert_eq!(engine.start(request(&["first"])).unwrap(), StartOutcome::Started);
    assert_eq!(
        engine.start(request(&["second"])).unwrap(),
        StartOutcome::AlreadyRunning
    );
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() >= 3));
    engine.stop();

    assert!(client.sent().iter().all(|m| m == "first"));
    let logs = drain_logs(&engine);
    assert!(logs.iter().any(|l| l.contains("already running")));
}

#[test]
fn engine_can_start_again_after_terminal_state() {
    let client = StubClient::scripted(
        vec![failure(SendOutcome::MalformedResponse, Some(412), None)],
        ok_result(),
    );
    let engine = engine(client.clone(), logged_in());

    engine.start(request(&["a"])).unwrap();
    assert!(engine.wait_for_exit(Duration::from_secs(5)));
    assert_eq!(engine.state(), RunState::StoppedByFailure);

    engine.start(request(&["b"])).unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() >= 2));
    assert_eq!(engine.stop(), RunState::StoppedByUser);
    assert_eq!(client.sent()[1], "b");
}

#[test]
fn failed_preflight_blocks_run_when_login_required() {
    let client = StubClient::always(ok_result());
    let engine = engine(client.clone(), logged_out());

    engine.start(request(&["a"])).unwrap();
    assert!(engine.wait_for_exit(Duration::from_secs(5)));

    assert_eq!(engine.state(), RunState::StoppedByFailure);
    assert!(client.sent().is_empty());
}

#[test]
fn failed_preflight_only_warns_when_login_optional() {
    let client = StubClient::always(ok_result());
    let engine = engine(client.clone(), logged_out());

    let mut req = request(&["a"]);
    req.require_login = false;
    engine.start(req).unwrap();
    assert!(wait_until(Duration::from_secs(5), || !client.sent().is_empty()));
    assert_eq!(engine.stop(), RunState::StoppedByUser);

    let logs = drain_logs(&engine);
    assert!(logs.iter().any(|l| l.contains("sending anyway")));
}

#[test]
fn panic_in_client_ends_run_without_crashing() {
    let engine = engine(StubClient::panicking(), logged_in());

    engine.start(request(&["boom"])).unwrap();
    assert!(engine.wait_for_exit(Duration::from_secs(5)));

    assert_eq!(engine.state(), RunState::StoppedByFailure);
    let logs = drain_logs(&engine);
    assert!(
        logs.iter().any(|l| l.contains("stub transport exploded")),
        "{logs:?}"
    );
}

#[test]
fn huge_interval_pauses_until_stopped() {
    let client = StubClient::always(ok_result());
    let engine = engine(client.clone(), logged_in());

    let mut req = request(&["a"]);
    req.interval_secs = 1e19;
    engine.start(req).unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() == 1));
    thread::sleep(Duration::from_millis(300));

    assert_eq!(engine.state(), RunState::Running);
    assert_eq!(client.sent().len(), 1);
    assert_eq!(engine.stop(), RunState::StoppedByUser);

    let logs = drain_logs(&engine);
    assert!(!logs.iter().any(|l| l.contains("panicked")), "{logs:?}");
}

#[test]
fn stop_reports_worker_still_busy_after_timeout() {
    let client = SlowClient::new(Duration::from_millis(1500));
    let engine = slow_engine(client.clone());

    engine.start(request(&["slow"])).unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() == 1));

    assert_eq!(engine.stop(), RunState::Running);
    let logs = drain_logs(&engine);
    assert!(
        logs.iter().any(|l| l.contains("did not exit within")),
        "{logs:?}"
    );

    assert!(engine.wait_for_exit(Duration::from_secs(5)));
    assert_eq!(engine.state(), RunState::StoppedByUser);
    assert_eq!(client.sent(), vec!["slow".to_string()]);
    assert_eq!(engine.attempts(), 1);
}

#[test]
fn start_during_shutdown_says_nothing_started() {
    let client = SlowClient::new(Duration::from_millis(1500));
    let engine = slow_engine(client.clone());

    engine.start(request(&["first"])).unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() == 1));
    assert_eq!(engine.stop(), RunState::Running);

    assert_eq!(
        engine.start(request(&["second"])).unwrap(),
        StartOutcome::PreviousRunStopping
    );
    assert!(engine.wait_for_exit(Duration::from_secs(5)));
    assert_eq!(client.sent(), vec!["first".to_string()]);

    assert_eq!(engine.start(request(&["second"])).unwrap(), StartOutcome::Started);
    assert!(wait_until(Duration::from_secs(5), || client.sent().len() == 2));
    engine.stop();
    assert!(engine.wait_for_exit(Duration::from_secs(5)));
    assert_eq!(client.sent()[1], "second");
}

#[test]
fn stop_right_after_breaker_returns_final_state() {
    let client = StubClient::always(failure(SendOutcome::MalformedResponse, Some(412), None));
    let engine = engine(client.clone(), logged_in());

    engine.start(request(&["a"])).unwrap();
    assert!(wait_until(Duration::from_secs(5), || !engine.is_running()));

    assert_eq!(engine.stop(), RunState::StoppedByFailure);
    assert_eq!(client.sent().len(), 1);
}
