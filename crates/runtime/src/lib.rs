//! Container runtime adapter and telemetry fabric for the game panel.
//!
//! `docker` wraps the local engine API (list, inspect, create, lifecycle,
//! pull, stats). `telemetry` turns engine byte streams into normalized
//! records: log lines, per-container stats samples, and host-level samples.

pub mod docker;
pub mod telemetry;

pub use docker::client::{DockerClient, RuntimeError};
pub use docker::inventory::{ContainerInfo, ContainerStateInfo};
