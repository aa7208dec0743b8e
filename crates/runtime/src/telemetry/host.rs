//! Host-level sampler: aggregate CPU from /proc/stat, RAM from
//! /proc/meminfo, disk from `df -B1 <data root>`. One sample every 3 s.

use async_stream::stream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::docker::client::RuntimeError;

const SAMPLE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3);
const MIB: f64 = (1u64 << 20) as f64;
const GIB: f64 = (1u64 << 30) as f64;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HostSample {
    pub cpu_percent: f64,
    pub mem_usage_mb: f64,
    pub mem_total_mb: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTotals {
    total: u64,
    idle: u64,
}

/// Open a cold host sampler. The first sample is emitted after one interval
/// so the CPU delta has a baseline.
pub fn host_stream(
    data_root: String,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<HostSample, RuntimeError>> {
    stream! {
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first tick only establishes the CPU baseline.
        interval.tick().await;
        let mut prev_cpu = read_cpu_totals().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let cpu = read_cpu_totals().await;
            let cpu_percent = match (prev_cpu, cpu) {
                (Some(prev), Some(now)) => cpu_percent_between(prev, now),
                _ => 0.0,
            };
            prev_cpu = cpu;

            let (mem_usage_mb, mem_total_mb) = match read_memory().await {
                Some(pair) => pair,
                None => (0.0, 0.0),
            };

            let (disk_used_gb, disk_total_gb) = match read_disk(&data_root).await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::debug!(error = %e, "df probe failed");
                    (0.0, 0.0)
                }
            };

            yield Ok(HostSample {
                cpu_percent,
                mem_usage_mb,
                mem_total_mb,
                disk_used_gb,
                disk_total_gb,
            });
        }
    }
}

async fn read_cpu_totals() -> Option<CpuTotals> {
    let stat = tokio::fs::read_to_string("/proc/stat").await.ok()?;
    parse_proc_stat(&stat)
}

async fn read_memory() -> Option<(f64, f64)> {
    let meminfo = tokio::fs::read_to_string("/proc/meminfo").await.ok()?;
    parse_meminfo(&meminfo)
}

async fn read_disk(path: &str) -> Result<(f64, f64), RuntimeError> {
    let output = tokio::process::Command::new("df")
        .arg("-B1")
        .arg(path)
        .output()
        .await?;
    if !output.status.success() {
        return Err(RuntimeError::HostProbe(format!(
            "df exited with {}",
            output.status
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_df_output(&stdout)
        .map(|(total, used)| (used as f64 / GIB, total as f64 / GIB))
        .ok_or_else(|| RuntimeError::HostProbe("unparseable df output".to_string()))
}

/// Aggregate CPU line: `cpu  user nice system idle iowait irq softirq steal ...`
fn parse_proc_stat(stat: &str) -> Option<CpuTotals> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 5 {
        return None;
    }
    let total: u64 = fields.iter().take(8).sum();
    let idle = fields[3] + fields[4]; // idle + iowait
    Some(CpuTotals { total, idle })
}

fn cpu_percent_between(prev: CpuTotals, now: CpuTotals) -> f64 {
    let total_delta = now.total.saturating_sub(prev.total);
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = now.idle.saturating_sub(prev.idle);
    let busy = total_delta.saturating_sub(idle_delta) as f64;
    (busy / total_delta as f64 * 100.0).clamp(0.0, 100.0)
}

/// `mem_usage = MemTotal − MemAvailable`, both reported in kB.
fn parse_meminfo(meminfo: &str) -> Option<(f64, f64)> {
    let mut total_kb = None;
    let mut available_kb = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = rest.trim().split_whitespace().next()?.parse::<u64>().ok();
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = rest.trim().split_whitespace().next()?.parse::<u64>().ok();
        }
    }
    let total_kb = total_kb?;
    let available_kb = available_kb?;
    let used_kb = total_kb.saturating_sub(available_kb);
    Some((
        used_kb as f64 * 1024.0 / MIB,
        total_kb as f64 * 1024.0 / MIB,
    ))
}

/// Second line of `df -B1`: `<fs> <total> <used> <avail> <use%> <mount>`.
fn parse_df_output(output: &str) -> Option<(u64, u64)> {
    let line = output.lines().nth(1)?;
    let mut fields = line.split_whitespace();
    let _fs = fields.next()?;
    let total = fields.next()?.parse().ok()?;
    let used = fields.next()?.parse().ok()?;
    Some((total, used))
}
