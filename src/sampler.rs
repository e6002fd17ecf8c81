//! Periodic sampling engine.
//!
//! A [`MetricsSampler`] owns the acquisition and windowing state for one
//! server instance. `start` launches a tokio task that runs one acquisition
//! chain per tick and publishes the committed state through a watch
//! channel; the presentation layer only ever reads the last snapshot.

use crate::acquire;
use crate::chart::{ChartState, LiveStats, Sample};
use crate::command::CommandRunner;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default sampling period, matching the console's 3 second refresh.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(3);

/// Last-committed observable state, published after every tick.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: u64,
    pub current_connections: u64,
    pub virt_memory_kb: u64,
    pub res_memory_kb: u64,
    pub memory_ratio_percent: u64,
    pub sequence: u32,
    pub cpu_series: Vec<Sample>,
    pub virt_memory_series: Vec<Sample>,
    pub res_memory_series: Vec<Sample>,
    pub connection_series: Vec<Sample>,
    pub cpu_ticks: Vec<u64>,
    pub mem_ticks: Vec<u64>,
    pub conn_ticks: Vec<u64>,
}

fn snapshot_of(state: &ChartState) -> Snapshot {
    let LiveStats {
        cpu_percent,
        connections,
        virt_memory_kb,
        res_memory_kb,
        memory_ratio_percent,
    } = state.live();

    Snapshot {
        timestamp: Utc::now(),
        cpu_percent,
        current_connections: connections,
        virt_memory_kb,
        res_memory_kb,
        memory_ratio_percent,
        sequence: state.sequence(),
        cpu_series: state.cpu_series().to_vec(),
        virt_memory_series: state.virt_memory_series().to_vec(),
        res_memory_series: state.res_memory_series().to_vec(),
        connection_series: state.connection_series().to_vec(),
        cpu_ticks: state.cpu_ticks().to_vec(),
        mem_ticks: state.mem_ticks().to_vec(),
        conn_ticks: state.conn_ticks().to_vec(),
    }
}

/// Polling-based live-metrics refresh engine for one server instance.
pub struct MetricsSampler {
    runner: Arc<dyn CommandRunner>,
    instance: String,
}

impl MetricsSampler {
    pub fn new(runner: Arc<dyn CommandRunner>, instance: impl Into<String>) -> Self {
        Self {
            runner,
            instance: instance.into(),
        }
    }

    /// Launch the periodic sampling task.
    ///
    /// The first chain runs immediately; afterwards one chain runs per
    /// period. Chains never overlap: each runs to completion inside the
    /// task before the next tick is awaited, so a slow chain delays later
    /// ticks instead of racing them. An acquisition failure at any step
    /// resets the windowed state to its baseline; a snapshot is published
    /// either way.
    pub fn start(self, period: Duration) -> SamplerHandle {
        let mut state = ChartState::new();
        let (tx, rx) = watch::channel(snapshot_of(&state));

        let task = tokio::spawn(async move {
            // Listening ports are fetched once, lazily; if the config tool
            // is unreachable the 389/636 defaults stay in place.
            let ports = acquire::get_configured_ports(self.runner.as_ref(), &self.instance)
                .await
                .unwrap_or_default();

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match acquire::acquire(self.runner.as_ref(), &self.instance, &ports).await {
                    Ok(reading) => state.commit(&reading),
                    Err(_) => state.reset(),
                }
                if tx.send(snapshot_of(&state)).is_err() {
                    // Every receiver is gone; nothing left to feed.
                    break;
                }
            }
        });

        SamplerHandle {
            task: Some(task),
            rx,
        }
    }
}

/// Handle to a running sampler task. Dropping the handle aborts the task.
pub struct SamplerHandle {
    task: Option<JoinHandle<()>>,
    rx: watch::Receiver<Snapshot>,
}

impl SamplerHandle {
    /// Subscribe to published snapshots.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.rx.clone()
    }

    /// Stop the sampling task. When this returns the task has terminated:
    /// no snapshot is published and no state is mutated afterwards, even if
    /// an acquisition chain was in flight.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
