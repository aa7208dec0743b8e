//! Per-container stats producer.
//!
//! The engine streams cumulative CPU counters; each sample carries the
//! previous read in `precpu_stats`, so the percentage is a pure function of
//! one sample.

use async_stream::stream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::docker::client::{DockerClient, RuntimeError};

const MIB: f64 = (1u64 << 20) as f64;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ContainerStatsSample {
    pub cpu_percent: f64,
    pub mem_usage_mb: f64,
    pub mem_limit_mb: f64,
}

/// Open a cold stats producer for one subscriber. Ends when the engine
/// closes the stream (container stopped) or the token fires.
pub fn stats_stream(
    docker: DockerClient,
    name: String,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<ContainerStatsSample, RuntimeError>> {
    stream! {
        let mut raw = std::pin::pin!(docker.stats(&name, true));
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = raw.next() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            match item {
                Ok(stats) => yield Ok(sample_from(&stats)),
                Err(e) => {
                    yield Err(RuntimeError::from(e));
                    break;
                }
            }
        }
    }
}

/// Reduce one engine sample to the dashboard's `{cpu, mem}` record.
pub fn sample_from(stats: &bollard::models::ContainerStatsResponse) -> ContainerStatsSample {
    let (usage, limit) = stats
        .memory_stats
        .as_ref()
        .map(|m| (m.usage.unwrap_or(0), m.limit.unwrap_or(0)))
        .unwrap_or((0, 0));

    ContainerStatsSample {
        cpu_percent: cpu_percent(stats),
        mem_usage_mb: usage as f64 / MIB,
        mem_limit_mb: limit as f64 / MIB,
    }
}

/// `clamp(0, 100, (cpuΔ / systemΔ) × onlineCPUs × 100)`; a non-positive
/// system delta (first sample, counter reset) yields 0.
fn cpu_percent(stats: &bollard::models::ContainerStatsResponse) -> f64 {
    let cpu = match &stats.cpu_stats {
        Some(cpu) => cpu,
        None => return 0.0,
    };
    let precpu = match &stats.precpu_stats {
        Some(precpu) => precpu,
        None => return 0.0,
    };

    let total = cpu
        .cpu_usage
        .as_ref()
        .and_then(|u| u.total_usage)
        .unwrap_or(0);
    let prev_total = precpu
        .cpu_usage
        .as_ref()
        .and_then(|u| u.total_usage)
        .unwrap_or(0);
    let cpu_delta = total.saturating_sub(prev_total) as f64;

    let system = cpu.system_cpu_usage.unwrap_or(0);
    let prev_system = precpu.system_cpu_usage.unwrap_or(0);
    if system <= prev_system {
        return 0.0;
    }
    let system_delta = (system - prev_system) as f64;

    let online = cpu.online_cpus.unwrap_or(1).max(1) as f64;
    let pct = (cpu_delta / system_delta) * online * 100.0;
    if pct.is_finite() {
        pct.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{
        ContainerCpuStats, ContainerCpuUsage, ContainerMemoryStats,
        ContainerStatsResponse,
    };

    fn with_cpu(
        total: u64,
        prev_total: u64,
        system: u64,
        prev_system: u64,
        online: u32,
    ) -> ContainerStatsResponse {
        ContainerStatsResponse {
            cpu_stats: Some(ContainerCpuStats {
                cpu_usage: Some(ContainerCpuUsage {
                    total_usage: Some(total),
                    ..Default::default()
                }),
                system_cpu_usage: Some(system),
                online_cpus: Some(online),
                ..Default::default()
            }),
            precpu_stats: Some(ContainerCpuStats {
                cpu_usage: Some(ContainerCpuUsage {
                    total_usage: Some(prev_total),
                    ..Default::default()
                }),
                system_cpu_usage: Some(prev_system),
                online_cpus: Some(online),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn half_of_one_core() {
        let stats = with_cpu(200_000_000, 100_000_000, 2_000_000_000, 1_800_000_000, 1);
        let sample = sample_from(&stats);
        assert!((sample.cpu_percent - 50.0).abs() < 0.01);
    }

    #[test]
    fn multi_core_is_clamped_to_100() {
        let stats = with_cpu(200_000_000, 100_000_000, 2_000_000_000, 1_800_000_000, 4);
        let sample = sample_from(&stats);
        assert_eq!(sample.cpu_percent, 100.0);
    }

    #[test]
    fn zero_system_delta_yields_zero() {
        let stats = with_cpu(200, 100, 1000, 1000, 1);
        assert_eq!(sample_from(&stats).cpu_percent, 0.0);
    }

    #[test]
    fn counter_reset_yields_zero() {
        let stats = with_cpu(50, 100, 2000, 1800, 2);
        assert_eq!(sample_from(&stats).cpu_percent, 0.0);
    }

    #[test]
    fn missing_cpu_stats_yields_zero() {
        let stats = ContainerStatsResponse::default();
        assert_eq!(sample_from(&stats).cpu_percent, 0.0);
    }

    #[test]
    fn memory_converted_to_mib() {
        let stats = ContainerStatsResponse {
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(512 * 1024 * 1024),
                limit: Some(6 * 1024 * 1024 * 1024),
                ..Default::default()
            }),
            ..Default::default()
        };
        let sample = sample_from(&stats);
        assert_eq!(sample.mem_usage_mb, 512.0);
        assert_eq!(sample.mem_limit_mb, 6144.0);
    }

    #[test]
    fn percentage_always_within_bounds() {
        let cases = [
            (u64::MAX, 0, u64::MAX, 0, 64),
            (1, 0, 1, 0, 1),
            (0, 0, 0, 0, 0),
            (10, 5, 1_000_000, 999_999, 32),
        ];
        for (total, prev_total, system, prev_system, online) in cases {
            let stats = with_cpu(total, prev_total, system, prev_system, online);
            let pct = sample_from(&stats).cpu_percent;
            assert!((0.0..=100.0).contains(&pct), "pct {} out of range", pct);
        }
    }
}
