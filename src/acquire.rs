//! Acquisition chain: resolve the server pid, sample its CPU and memory,
//! read total system memory, and count established client connections.
//!
//! The four steps are strictly sequential; each needs the previous step's
//! result. A failure anywhere aborts the whole tick and the caller resets
//! the chart state. Nothing is retried until the next tick.

use crate::chart::ResourceReading;
use crate::command::{CommandError, CommandRunner};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("no server process found for instance {0}")]
    NoProcess(String),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("unexpected output from {command}: {output:?}")]
    Malformed {
        command: &'static str,
        output: String,
    },
}

/// Listening ports of the monitored instance, as reported by dsconf. A
/// missing secure port is represented by the sentinel "-1", which never
/// matches anything in the connection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ports {
    pub port: String,
    pub secure_port: String,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            port: "389".to_string(),
            secure_port: "636".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct DsconfConfig {
    attrs: HashMap<String, Vec<String>>,
}

/// Query the configured plain and secure ports over the instance's LDAPI
/// socket. Called once at sampler start; on failure the caller keeps the
/// default 389/636.
pub async fn get_configured_ports(
    runner: &dyn CommandRunner,
    instance: &str,
) -> Result<Ports, AcquireError> {
    let socket = format!("ldapi://%2fvar%2frun%2fslapd-{instance}.socket");
    let output = runner
        .spawn(&[
            "dsconf",
            "-j",
            &socket,
            "config",
            "get",
            "nsslapd-port",
            "nsslapd-secureport",
        ])
        .await?;

    let config: DsconfConfig =
        serde_json::from_str(&output).map_err(|_| AcquireError::Malformed {
            command: "dsconf config get",
            output: output.clone(),
        })?;

    let port = config
        .attrs
        .get("nsslapd-port")
        .and_then(|values| values.first())
        .cloned()
        .ok_or(AcquireError::Malformed {
            command: "dsconf config get",
            output,
        })?;
    let secure_port = config
        .attrs
        .get("nsslapd-secureport")
        .and_then(|values| values.first())
        .cloned()
        .unwrap_or_else(|| "-1".to_string());

    Ok(Ports { port, secure_port })
}

/// Run the full acquisition chain once and normalize the results.
pub async fn acquire(
    runner: &dyn CommandRunner,
    instance: &str,
    ports: &Ports,
) -> Result<ResourceReading, AcquireError> {
    let pid = resolve_pid(runner, instance).await?;
    let (virt, res, cpu_percent) = sample_process(runner, pid).await?;
    let total_kb = system_memory_total(runner).await?;
    let connections = count_established(runner, ports).await?;

    Ok(ResourceReading {
        cpu_percent,
        virt_kb: virt.as_kb(),
        res_kb: res.as_kb(),
        total_kb,
        connections,
    })
}

/// Find the slapd process for the instance in the process table.
async fn resolve_pid(runner: &dyn CommandRunner, instance: &str) -> Result<u32, AcquireError> {
    let script = format!("ps -ef | grep -v grep | grep dirsrv/slapd-{instance}");
    let output = runner
        .script(&script)
        .await
        .map_err(|_| AcquireError::NoProcess(instance.to_string()))?;
    parse_pid(&output).ok_or_else(|| AcquireError::NoProcess(instance.to_string()))
}

/// Point-in-time CPU and memory snapshot of the server process.
async fn sample_process(
    runner: &dyn CommandRunner,
    pid: u32,
) -> Result<(MemoryValue, MemoryValue, u64), AcquireError> {
    let script = format!("top -n 1 -b -p {pid} | tail -1");
    let output = runner.script(&script).await?;
    parse_top_line(&output).ok_or(AcquireError::Malformed {
        command: "top",
        output,
    })
}

/// Total system memory in kilobytes.
async fn system_memory_total(runner: &dyn CommandRunner) -> Result<u64, AcquireError> {
    let output = runner
        .script("awk '/MemTotal/{print $2}' /proc/meminfo")
        .await?;
    output
        .split_whitespace()
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or(AcquireError::Malformed {
            command: "meminfo",
            output,
        })
}

/// Count ESTABLISHED connections owned by the server on either listening
/// port.
async fn count_established(
    runner: &dyn CommandRunner,
    ports: &Ports,
) -> Result<u64, AcquireError> {
    let script = format!(
        "netstat -anp | grep ':{}\\|:{}' | grep ESTABLISHED | grep ns-slapd | wc -l",
        ports.port, ports.secure_port
    );
    let output = runner.script(&script).await?;
    output
        .trim()
        .parse()
        .map_err(|_| AcquireError::Malformed {
            command: "netstat",
            output,
        })
}

/// A memory figure from top: converted to kilobytes when the unit suffix
/// was recognized, passed through verbatim otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryValue {
    Kilobytes(u64),
    Raw(String),
}

impl MemoryValue {
    /// Numeric value in kilobytes. top prints plain kilobytes without a
    /// suffix, so raw values parse as already converted.
    pub fn as_kb(&self) -> u64 {
        match self {
            MemoryValue::Kilobytes(kb) => *kb,
            MemoryValue::Raw(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

/// Convert a top memory string ("512m", "1,5g") to kilobytes. A comma
/// decimal separator is normalized to a period before parsing. Input with
/// no recognized suffix is returned unchanged rather than rejected.
pub fn convert_memory(raw: &str) -> MemoryValue {
    let normalized = raw.replace(',', ".");
    let exponent = match normalized.chars().last() {
        Some('m') => 1,
        Some('g') => 2,
        Some('t') => 3,
        Some('p') => 4,
        _ => return MemoryValue::Raw(normalized),
    };
    let number: f64 = normalized[..normalized.len() - 1].parse().unwrap_or(0.0);
    MemoryValue::Kilobytes((number * 1024f64.powi(exponent)).round() as u64)
}

/// The pid is the second whitespace-delimited field of the ps output.
fn parse_pid(output: &str) -> Option<u32> {
    output.split_whitespace().nth(1)?.parse().ok()
}

/// Split the top summary line on whitespace and take the fixed columns:
/// virtual size (4), resident size (5), CPU percent (8).
fn parse_top_line(output: &str) -> Option<(MemoryValue, MemoryValue, u64)> {
    let parts: Vec<&str> = output.trim().split_whitespace().collect();
    if parts.len() < 9 {
        return None;
    }
    let virt = convert_memory(parts[4]);
    let res = convert_memory(parts[5]);
    let cpu = parse_cpu_percent(parts[8])?;
    Some((virt, res, cpu))
}

/// CPU percent is reported with a locale-dependent decimal separator; only
/// the integer part is charted.
fn parse_cpu_percent(field: &str) -> Option<u64> {
    let value: f64 = field.replace(',', ".").parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.trunc() as u64)
}
