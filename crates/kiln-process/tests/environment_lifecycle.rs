//! Lifecycle scenarios against real pty children

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kiln_process::{
    ConsoleSink, Environment, EnvironmentSettings, ExecutionRequest, ProcessError, StatusEvent,
    StatusSink,
};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingStatus(Mutex<Vec<StatusEvent>>);

impl RecordingStatus {
    fn events(&self) -> Vec<StatusEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingStatus {
    fn publish(&self, event: StatusEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct RecordingConsole(Mutex<Vec<u8>>);

impl RecordingConsole {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl ConsoleSink for RecordingConsole {
    fn write_output(&self, data: &[u8]) {
        self.0.lock().unwrap().extend_from_slice(data);
    }
}

struct Fixture {
    _dir: TempDir,
    environment: Environment,
    status: Arc<RecordingStatus>,
    console: Arc<RecordingConsole>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let status = Arc::new(RecordingStatus::default());
    let console = Arc::new(RecordingConsole::default());
    let environment = Environment::builder(dir.path())
        .settings(EnvironmentSettings {
            stats_window_ms: 200,
            ..EnvironmentSettings::default()
        })
        .status_sink(status.clone())
        .console_sink(console.clone())
        .build();

    Fixture {
        _dir: dir,
        environment,
        status,
        console,
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

async fn stop(environment: &Environment) {
    environment
        .wait_for_main_process_for(Duration::from_millis(10))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sleep_scenario() {
    let f = fixture();
    assert!(!f.environment.is_running().unwrap());

    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["2"]))
        .await
        .unwrap();
    assert!(f.environment.is_running().unwrap());

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(!f.environment.is_running().unwrap());
    assert_eq!(f.environment.last_exit_code(), Some(0));
    assert!(f.environment.pid().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exit_code_recorded_verbatim() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sh").args(["-c", "exit 42"]))
        .await
        .unwrap();

    f.environment.wait_for_main_process().await.unwrap();
    assert_eq!(f.environment.last_exit_code(), Some(42));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_events_bracket_the_run() {
    let f = fixture();
    f.environment.set_installing(true);
    f.environment
        .launch(ExecutionRequest::new("/bin/true"))
        .await
        .unwrap();

    f.environment.wait_for_main_process().await.unwrap();
    assert!(eventually(|| f.status.events().len() == 2).await);
    assert_eq!(
        f.status.events(),
        vec![
            StatusEvent {
                running: true,
                installing: true
            },
            StatusEvent {
                running: false,
                installing: true
            },
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shared_install_flag() {
    let dir = tempfile::tempdir().unwrap();
    let flag = Arc::new(AtomicBool::new(true));
    let environment = Environment::builder(dir.path())
        .install_flag(flag.clone())
        .build();

    assert!(environment.is_installing());
    flag.store(false, std::sync::atomic::Ordering::SeqCst);
    assert!(!environment.is_installing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_launch_while_running_is_rejected() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["30"]))
        .await
        .unwrap();
    let pid = f.environment.pid();

    let err = f
        .environment
        .launch(ExecutionRequest::new("/bin/true"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::ProcessAlreadyRunning));
    assert_eq!(f.environment.pid(), pid);
    assert!(f.environment.is_running().unwrap());

    stop(&f.environment).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawn_failure_leaves_environment_idle() {
    let f = fixture();
    let err = f
        .environment
        .launch(ExecutionRequest::new("/definitely/not/a/server"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Spawn(_)));
    assert!(!f.environment.is_running().unwrap());
    assert!(f.environment.pid().is_none());
    assert!(f.status.events().is_empty());

    // Still usable afterwards.
    f.environment
        .launch(ExecutionRequest::new("/bin/true"))
        .await
        .unwrap();
    f.environment.wait_for_main_process().await.unwrap();
    assert_eq!(f.environment.last_exit_code(), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_working_directory_fails_launch() {
    let f = fixture();
    let err = f
        .environment
        .launch(ExecutionRequest::new("/bin/true").working_dir("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Spawn(_)));
    assert!(!f.environment.is_running().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_input_while_offline() {
    let f = fixture();
    let err = f.environment.send_input("stop").await.unwrap_err();
    assert!(matches!(err, ProcessError::ServerOffline));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_input_reaches_child() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sh").args(["-c", "read code; exit $code"]))
        .await
        .unwrap();

    f.environment.send_input("5").await.unwrap();
    f.environment
        .wait_for_main_process_for(Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(f.environment.last_exit_code(), Some(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_console_receives_output() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/echo").args(["ready", "for", "players"]))
        .await
        .unwrap();
    f.environment.wait_for_main_process().await.unwrap();

    assert!(eventually(|| f.console.text().contains("ready for players")).await);
    assert!(f
        .console
        .text()
        .starts_with("Starting process: /bin/echo ready for players"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_child_environment_and_working_directory() {
    let f = fixture();
    std::env::set_var("KILN_LIFECYCLE_TEST_SECRET", "leaked");
    std::fs::create_dir(f.environment.root_directory().join("world")).unwrap();

    let script = "echo \"home=$HOME\"; echo \"term=$TERM\"; \
                  echo \"secret=${KILN_LIFECYCLE_TEST_SECRET:-none}\"; echo \"foo=$FOO\"; pwd";
    f.environment
        .launch(
            ExecutionRequest::new("/bin/sh")
                .args(["-c", script])
                .working_dir("world")
                .env("TERM", "vt100")
                .env("FOO", "bar"),
        )
        .await
        .unwrap();
    f.environment.wait_for_main_process().await.unwrap();

    let root = f.environment.root_directory().display().to_string();
    assert!(eventually(|| f.console.text().contains("foo=bar")).await);
    let output = f.console.text();
    assert!(output.contains(&format!("home={root}")));
    assert!(output.contains("term=vt100"));
    assert!(output.contains("secret=none"));
    assert!(output.contains(&format!("{root}/world")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_kill_records_abnormal_exit() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["30"]))
        .await
        .unwrap();

    f.environment.kill().unwrap();
    f.environment.wait_for_main_process().await.unwrap();

    assert!(eventually(|| f.status.events().len() == 2).await);
    assert!(!f.status.events()[1].running);
    assert_ne!(f.environment.last_exit_code(), Some(0));
    assert!(f.environment.last_exit_code().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_control_surface_is_noop_when_idle() {
    let f = fixture();
    assert!(f.environment.kill().is_ok());
    assert!(f.environment.send_signal(15).is_ok());

    let started = Instant::now();
    f.environment
        .wait_for_main_process_for(Duration::ZERO)
        .await
        .unwrap();
    f.environment
        .wait_for_main_process_for(Duration::from_secs(60))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    let stats = f.environment.get_stats().await.unwrap();
    assert_eq!(stats.cpu, 0.0);
    assert_eq!(stats.memory, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_signal_terminates() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["30"]))
        .await
        .unwrap();

    f.environment.send_signal(15).unwrap();
    f.environment
        .wait_for_main_process_for(Duration::from_secs(10))
        .await
        .unwrap();

    assert!(!f.environment.is_running().unwrap());
    assert_ne!(f.environment.last_exit_code(), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_signal_is_rejected() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["30"]))
        .await
        .unwrap();

    let err = f.environment.send_signal(9999).unwrap_err();
    assert!(matches!(err, ProcessError::InvalidSignal(9999)));
    assert!(f.environment.is_running().unwrap());

    stop(&f.environment).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_wait_degrades_to_kill() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["30"]))
        .await
        .unwrap();

    let started = Instant::now();
    f.environment
        .wait_for_main_process_for(Duration::from_millis(300))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!f.environment.is_running().unwrap());
    assert_ne!(f.environment.last_exit_code(), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_wait_returns_on_natural_exit() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["1"]))
        .await
        .unwrap();

    f.environment
        .wait_for_main_process_for(Duration::from_secs(20))
        .await
        .unwrap();
    assert_eq!(f.environment.last_exit_code(), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_waiters_all_released() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["1"]))
        .await
        .unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let environment = f.environment.clone();
            tokio::spawn(async move { environment.wait_for_main_process().await })
        })
        .collect();

    for waiter in waiters {
        tokio::time::timeout(Duration::from_secs(10), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
    assert!(!f.environment.is_running().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stats_while_running() {
    let f = fixture();
    f.environment
        .launch(ExecutionRequest::new("/bin/sleep").args(["30"]))
        .await
        .unwrap();

    let stats = f.environment.get_stats().await.unwrap();
    assert!(stats.memory > 0.0);
    assert!(stats.cpu >= 0.0);

    stop(&f.environment).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_callback_can_relaunch() {
    let f = fixture();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let relauncher = f.environment.clone();

    f.environment
        .launch(
            ExecutionRequest::new("/bin/sh")
                .args(["-c", "exit 3"])
                .on_exit(move |code| {
                    tokio::spawn(async move {
                        let result = relauncher
                            .launch(ExecutionRequest::new("/bin/sleep").args(["30"]))
                            .await;
                        let _ = tx.send((code, result.is_ok()));
                    });
                }),
        )
        .await
        .unwrap();

    let (code, relaunched) = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, 3);
    assert!(relaunched);
    assert!(f.environment.is_running().unwrap());

    stop(&f.environment).await;
}

#[tokio::test]
async fn test_create_root_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("server-1");
    let environment = Environment::new(&root);

    environment.create().await.unwrap();
    assert!(root.is_dir());

    let err = environment.create().await.unwrap_err();
    match err {
        ProcessError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
        other => panic!("unexpected error: {other}"),
    }
}
