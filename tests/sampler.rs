//! Sampler-level tests driving the acquisition chain through a scripted
//! command runner.

use async_trait::async_trait;
use dsmon::chart::{DEFAULT_CONN_TICKS, DEFAULT_CPU_TICKS, SERIES_LEN};
use dsmon::command::{CommandError, CommandRunner};
use dsmon::sampler::{MetricsSampler, Snapshot, DEFAULT_PERIOD};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

const PS_LINE: &str = "dirsrv     1234      1  0 10:02 ?        00:00:10 /usr/sbin/ns-slapd -D /etc/dirsrv/slapd-localhost\n";
const TOP_LINE: &str = " 1234 dirsrv    20   0  2,5g 512m  18m S   6.7   3.2   0:01.02 ns-slapd\n";
const MEMTOTAL: &str = "8000000\n";
const DSCONF_JSON: &str =
    r#"{"type":"config","attrs":{"nsslapd-port":["389"],"nsslapd-secureport":["636"]}}"#;

/// Canned command channel. Commands containing the configured failure
/// substring fail; everything else returns fixture output.
struct ScriptedRunner {
    fail_substring: Mutex<Option<String>>,
    connections: String,
    dsconf_output: Result<String, ()>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn new() -> Self {
        Self {
            fail_substring: Mutex::new(None),
            connections: "8\n".to_string(),
            dsconf_output: Ok(DSCONF_JSON.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_connections(connections: &str) -> Self {
        Self {
            connections: connections.to_string(),
            ..Self::new()
        }
    }

    fn fail_commands_containing(&self, substring: &str) {
        *self.fail_substring.lock().unwrap() = Some(substring.to_string());
    }

    fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn injected_failure() -> CommandError {
        CommandError::Failed {
            status: 1,
            stderr: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn script(&self, script: &str) -> Result<String, CommandError> {
        self.calls.lock().unwrap().push(script.to_string());

        if let Some(ref substring) = *self.fail_substring.lock().unwrap() {
            if script.contains(substring.as_str()) {
                return Err(Self::injected_failure());
            }
        }

        if script.contains("ps -ef") {
            Ok(PS_LINE.to_string())
        } else if script.starts_with("top") {
            Ok(TOP_LINE.to_string())
        } else if script.contains("MemTotal") {
            Ok(MEMTOTAL.to_string())
        } else if script.starts_with("netstat") {
            Ok(self.connections.clone())
        } else {
            Err(Self::injected_failure())
        }
    }

    async fn spawn(&self, argv: &[&str]) -> Result<String, CommandError> {
        self.calls.lock().unwrap().push(argv.join(" "));
        match &self.dsconf_output {
            Ok(json) => Ok(json.clone()),
            Err(()) => Err(Self::injected_failure()),
        }
    }
}

fn start_sampler(runner: Arc<ScriptedRunner>) -> (dsmon::sampler::SamplerHandle, watch::Receiver<Snapshot>) {
    let handle = MetricsSampler::new(runner, "localhost").start(DEFAULT_PERIOD);
    let rx = handle.watch();
    (handle, rx)
}

fn assert_baseline(snapshot: &Snapshot) {
    for series in [
        &snapshot.cpu_series,
        &snapshot.virt_memory_series,
        &snapshot.res_memory_series,
        &snapshot.connection_series,
    ] {
        assert_eq!(series.len(), SERIES_LEN);
        for (idx, sample) in series.iter().enumerate() {
            assert_eq!(sample.value, 0);
            assert_eq!(sample.label, "");
            assert_eq!(sample.sequence, idx as u32 + 1);
        }
    }
    assert_eq!(snapshot.cpu_ticks, DEFAULT_CPU_TICKS);
    assert_eq!(snapshot.conn_ticks, DEFAULT_CONN_TICKS);
    assert!(snapshot.mem_ticks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn successful_tick_publishes_committed_snapshot() {
    let runner = Arc::new(ScriptedRunner::new());
    let (handle, mut rx) = start_sampler(runner);

    rx.changed().await.unwrap();
    let snapshot = rx.borrow_and_update().clone();

    assert_eq!(snapshot.sequence, 11);
    assert_eq!(snapshot.cpu_percent, 6);
    assert_eq!(snapshot.virt_memory_kb, 2_621_440);
    assert_eq!(snapshot.res_memory_kb, 524_288);
    assert_eq!(snapshot.memory_ratio_percent, 33);
    assert_eq!(snapshot.current_connections, 8);

    assert_eq!(snapshot.cpu_series.len(), SERIES_LEN);
    assert_eq!(snapshot.cpu_series.last().unwrap().value, 6);
    assert_eq!(snapshot.cpu_series.last().unwrap().label, "CPU");
    assert_eq!(snapshot.virt_memory_series.last().unwrap().value, 33);
    assert_eq!(snapshot.res_memory_series.last().unwrap().value, 7);
    assert_eq!(snapshot.connection_series.last().unwrap().value, 8);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failure_at_any_step_resets_to_baseline() {
    for step in ["ps -ef", "top", "MemTotal", "netstat"] {
        let runner = Arc::new(ScriptedRunner::new());
        let (handle, mut rx) = start_sampler(runner.clone());

        // One good tick first so there is real history to discard
        rx.changed().await.unwrap();
        let committed = rx.borrow_and_update().clone();
        assert_eq!(committed.cpu_series.last().unwrap().value, 6);

        runner.fail_commands_containing(step);
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();

        assert_baseline(&snapshot);
        // The sequence counter is not rewound by a reset
        assert_eq!(snapshot.sequence, 11, "failing step: {}", step);

        handle.stop().await;
    }
}

#[tokio::test(start_paused = true)]
async fn recovery_after_failure_appends_to_fresh_baseline() {
    let runner = Arc::new(ScriptedRunner::new());
    let (handle, mut rx) = start_sampler(runner.clone());

    rx.changed().await.unwrap();
    rx.borrow_and_update();

    runner.fail_commands_containing("netstat");
    rx.changed().await.unwrap();
    assert_baseline(&rx.borrow_and_update());

    runner.fail_commands_containing("nothing-matches-this");
    rx.changed().await.unwrap();
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.sequence, 12);
    assert_eq!(snapshot.cpu_series.last().unwrap().value, 6);
    assert!(snapshot.cpu_series.iter().take(9).all(|s| s.value == 0));

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn connection_rescale_follows_highmark_rule() {
    let runner = Arc::new(ScriptedRunner::with_connections("1450\n"));
    let (handle, mut rx) = start_sampler(runner);

    rx.changed().await.unwrap();
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.current_connections, 1450);
    assert_eq!(snapshot.conn_ticks, vec![500, 1000, 1500, 2000]);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn sequence_stays_in_range_and_wraps() {
    let runner = Arc::new(ScriptedRunner::new());
    let (handle, mut rx) = start_sampler(runner);

    let mut wrapped = false;
    let mut prev = 10;
    for _ in 0..95 {
        rx.changed().await.unwrap();
        let seq = rx.borrow_and_update().sequence;
        assert!(seq >= 1 && seq <= 99, "sequence {} out of range", seq);
        if seq < prev {
            wrapped = true;
        }
        prev = seq;
    }
    assert!(wrapped, "counter never wrapped after 95 ticks");

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_halts_publication() {
    let runner = Arc::new(ScriptedRunner::new());
    let (handle, mut rx) = start_sampler(runner);

    rx.changed().await.unwrap();
    rx.borrow_and_update();

    handle.stop().await;

    // The task is gone: no further snapshot ever arrives
    assert!(rx.changed().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn configured_ports_parametrize_connection_counting() {
    let runner = Arc::new(ScriptedRunner::new());
    let (handle, mut rx) = start_sampler(runner.clone());

    rx.changed().await.unwrap();
    let netstat = runner
        .recorded_calls()
        .into_iter()
        .find(|c| c.starts_with("netstat"))
        .expect("no netstat call recorded");
    assert!(netstat.contains(":389"));
    assert!(netstat.contains(":636"));
    assert!(netstat.contains("ESTABLISHED"));
    assert!(netstat.contains("ns-slapd"));

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn port_lookup_failure_keeps_defaults() {
    let mut runner = ScriptedRunner::new();
    runner.dsconf_output = Err(());
    let runner = Arc::new(runner);
    let (handle, mut rx) = start_sampler(runner.clone());

    rx.changed().await.unwrap();
    let netstat = runner
        .recorded_calls()
        .into_iter()
        .find(|c| c.starts_with("netstat"))
        .expect("no netstat call recorded");
    assert!(netstat.contains(":389"));
    assert!(netstat.contains(":636"));

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn missing_secure_port_uses_sentinel() {
    let mut runner = ScriptedRunner::new();
    runner.dsconf_output =
        Ok(r#"{"type":"config","attrs":{"nsslapd-port":["3389"]}}"#.to_string());
    let runner = Arc::new(runner);
    let (handle, mut rx) = start_sampler(runner.clone());

    rx.changed().await.unwrap();
    let netstat = runner
        .recorded_calls()
        .into_iter()
        .find(|c| c.starts_with("netstat"))
        .expect("no netstat call recorded");
    assert!(netstat.contains(":3389"));
    assert!(netstat.contains(":-1"));

    handle.stop().await;
}
