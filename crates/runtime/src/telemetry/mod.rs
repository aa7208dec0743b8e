//! Telemetry fabric — engine byte streams turned into normalized records.
//!
//! Each subscriber gets its own cold producer: `logs::tail_lines` for log
//! lines, `stats::stats_stream` for per-container CPU/RAM samples, and
//! `host::host_stream` for machine-level samples. Producers stop within one
//! record of their cancellation token firing and release the underlying
//! socket or engine stream on every exit path.

pub mod ansi;
pub mod frame;
pub mod host;
pub mod line;
pub mod logs;
pub mod stats;

pub use host::HostSample;
pub use stats::ContainerStatsSample;
