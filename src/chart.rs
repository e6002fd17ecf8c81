//! Bounded chart series and adaptive axis scaling for the monitor charts.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed number of samples retained per series
pub const SERIES_LEN: usize = 10;

/// Default CPU axis ticks (percent)
pub const DEFAULT_CPU_TICKS: [u64; 4] = [25, 50, 75, 100];

/// Default connection axis ticks
pub const DEFAULT_CONN_TICKS: [u64; 4] = [250, 500, 750, 1000];

/// Connection rescale threshold at startup and after a reset
pub const DEFAULT_CONN_HIGHMARK: u64 = 1000;

/// One chart observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Metric name shown in the chart legend (empty for baseline samples)
    pub label: String,
    /// X-axis label, taken from the shared sequence counter
    pub sequence: u32,
    /// Observed value (percent for CPU/memory, count for connections)
    pub value: u64,
}

/// Fixed-capacity FIFO of samples. Always holds exactly [`SERIES_LEN`]
/// entries: appending a sample evicts the oldest one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    samples: VecDeque<Sample>,
}

impl Series {
    /// A neutral series: zero-valued samples labelled with sequences 1..=10.
    pub fn baseline() -> Self {
        let samples = (1..=SERIES_LEN as u32)
            .map(|sequence| Sample {
                label: String::new(),
                sequence,
                value: 0,
            })
            .collect();
        Self { samples }
    }

    /// Append a sample, evicting the oldest.
    pub fn push(&mut self, sample: Sample) {
        self.samples.pop_front();
        self.samples.push_back(sample);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Values in order, oldest first (for sparkline rendering).
    pub fn values(&self) -> Vec<u64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }
}

impl Default for Series {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Live scalar readouts from the last committed tick. A reset leaves these
/// untouched; only the windowed series and scales go back to baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStats {
    pub cpu_percent: u64,
    pub connections: u64,
    pub virt_memory_kb: u64,
    pub res_memory_kb: u64,
    /// Virtual memory as a percentage of total system memory
    pub memory_ratio_percent: u64,
}

/// Normalized result of one successful acquisition chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceReading {
    pub cpu_percent: u64,
    pub virt_kb: u64,
    pub res_kb: u64,
    pub total_kb: u64,
    pub connections: u64,
}

/// Windowed chart state for one monitored instance: four bounded series,
/// the axis tick sets, the connection high-water mark, and the shared
/// sequence counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartState {
    sequence: u32,
    conn_highmark: u64,
    cpu_ticks: Vec<u64>,
    mem_ticks: Vec<u64>,
    conn_ticks: Vec<u64>,
    cpu: Series,
    mem_virt: Series,
    mem_res: Series,
    conns: Series,
    live: LiveStats,
}

impl ChartState {
    pub fn new() -> Self {
        Self {
            sequence: SERIES_LEN as u32,
            conn_highmark: DEFAULT_CONN_HIGHMARK,
            cpu_ticks: DEFAULT_CPU_TICKS.to_vec(),
            mem_ticks: DEFAULT_CPU_TICKS.to_vec(),
            conn_ticks: DEFAULT_CONN_TICKS.to_vec(),
            cpu: Series::baseline(),
            mem_virt: Series::baseline(),
            mem_res: Series::baseline(),
            conns: Series::baseline(),
            live: LiveStats::default(),
        }
    }

    /// Apply one successful reading: advance the sequence counter, rescale
    /// the CPU and connection axes, and append one sample to each series.
    pub fn commit(&mut self, r: &ResourceReading) {
        self.sequence += 1;
        if self.sequence == 100 {
            // Keep the x-axis labels in check
            self.sequence = 1;
        }

        // Grow the CPU axis when the live value climbs past everything in
        // the window; shrink back to the defaults once nothing retained
        // exceeds 100%.
        if r.cpu_percent > 100 {
            if self.cpu.iter().all(|s| s.value <= r.cpu_percent) {
                let incr = r.cpu_percent.div_ceil(4);
                self.cpu_ticks = vec![incr, incr * 2, incr * 4, r.cpu_percent];
            }
        } else if self.cpu.iter().all(|s| s.value <= 100) {
            self.cpu_ticks = DEFAULT_CPU_TICKS.to_vec();
        }

        // The connection axis only ever grows; the high-water mark comes
        // back down on a full reset.
        if r.connections > self.conn_highmark {
            self.conn_highmark = r.connections.div_ceil(1000) * 1000;
            let incr = self.conn_highmark.div_ceil(4);
            self.conn_ticks = vec![incr, incr * 2, incr * 3, incr * 4];
        }

        let virt_percent = percent_of(r.virt_kb, r.total_kb);
        let res_percent = percent_of(r.res_kb, r.total_kb);

        self.cpu.push(Sample {
            label: "CPU".to_string(),
            sequence: self.sequence,
            value: r.cpu_percent,
        });
        self.mem_virt.push(Sample {
            label: "Virtual Memory".to_string(),
            sequence: self.sequence,
            value: virt_percent,
        });
        self.mem_res.push(Sample {
            label: "Resident Memory".to_string(),
            sequence: self.sequence,
            value: res_percent,
        });
        self.conns.push(Sample {
            label: "Connections".to_string(),
            sequence: self.sequence,
            value: r.connections,
        });

        self.live = LiveStats {
            cpu_percent: r.cpu_percent,
            connections: r.connections,
            virt_memory_kb: r.virt_kb,
            res_memory_kb: r.res_kb,
            memory_ratio_percent: virt_percent,
        };
    }

    /// Discard all windowed history after a failed acquisition. The charts
    /// flatten to the zero baseline and the axes return to their defaults.
    pub fn reset(&mut self) {
        self.conn_highmark = DEFAULT_CONN_HIGHMARK;
        self.cpu_ticks = DEFAULT_CPU_TICKS.to_vec();
        self.mem_ticks = Vec::new();
        self.conn_ticks = DEFAULT_CONN_TICKS.to_vec();
        self.cpu = Series::baseline();
        self.mem_virt = Series::baseline();
        self.mem_res = Series::baseline();
        self.conns = Series::baseline();
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn conn_highmark(&self) -> u64 {
        self.conn_highmark
    }

    pub fn cpu_ticks(&self) -> &[u64] {
        &self.cpu_ticks
    }

    pub fn mem_ticks(&self) -> &[u64] {
        &self.mem_ticks
    }

    pub fn conn_ticks(&self) -> &[u64] {
        &self.conn_ticks
    }

    pub fn cpu_series(&self) -> &Series {
        &self.cpu
    }

    pub fn virt_memory_series(&self) -> &Series {
        &self.mem_virt
    }

    pub fn res_memory_series(&self) -> &Series {
        &self.mem_res
    }

    pub fn connection_series(&self) -> &Series {
        &self.conns
    }

    pub fn live(&self) -> LiveStats {
        self.live
    }
}

impl Default for ChartState {
    fn default() -> Self {
        Self::new()
    }
}

fn percent_of(part_kb: u64, total_kb: u64) -> u64 {
    if total_kb == 0 {
        return 0;
    }
    ((part_kb as f64 / total_kb as f64) * 100.0).round() as u64
}
