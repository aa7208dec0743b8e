//! Docker client — core struct, constructor, error types.
//!
//! Domain methods live in sibling modules (`container`, `image`) which add
//! `impl DockerClient` blocks.

use bollard::Docker;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Docker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Container not found: {0}")]
    ContainerNotFound(String),
    #[error("Image pull failed for {image}: {detail}")]
    PullFailed { image: String, detail: String },
    #[error("Stream closed")]
    StreamClosed,
    #[error("Engine protocol error: {0}")]
    Protocol(String),
    #[error("Host probe failed: {0}")]
    HostProbe(String),
    #[error("Bollard error: {0}")]
    BollardError(#[from] bollard::errors::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    /// The bollard Docker client.  `pub(super)` so that domain modules
    /// in sibling files can call bollard APIs directly.
    pub(super) client: Docker,
    /// The Docker socket path this client is connected to.
    socket_path: String,
}

impl DockerClient {
    pub fn new(socket_path: &str) -> Result<Self, RuntimeError> {
        let connection = if socket_path.is_empty() {
            Docker::connect_with_defaults()
                .map_err(|e| RuntimeError::ConnectionFailed(e.to_string()))?
        } else {
            let clean_path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(clean_path, 120, &bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeError::ConnectionFailed(e.to_string()))?
        };

        Ok(DockerClient {
            client: connection,
            socket_path: socket_path.to_string(),
        })
    }

    /// Filesystem path of the engine socket, without any `unix://` scheme.
    /// The log tailer opens this directly (see `telemetry::logs`).
    pub fn socket_path(&self) -> &str {
        let path = self.socket_path.trim_start_matches("unix://");
        if path.is_empty() {
            "/var/run/docker.sock"
        } else {
            path
        }
    }
}
