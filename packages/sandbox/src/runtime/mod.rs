// ABOUTME: Container runtime client interface used by the sandbox orchestrator
// ABOUTME: Defines image, container, wait, and log operations independent of any engine

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::oneshot;

pub mod docker;

pub use docker::DockerRuntime;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Image build failed: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Image known to the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub tags: Vec<String>,
}

/// Isolation applied to a sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub network_disabled: bool,
    pub privileged: bool,
    /// Host devices exposed to the container; sandboxes get none.
    pub devices: Vec<String>,
}

/// Everything needed to create one sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub limits: ResourceLimits,
}

/// Outcome reported by the runtime once the container stops running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    pub status_code: i64,
    /// Error the runtime attached to the wait itself, distinct from a
    /// non-zero exit of the process.
    pub error: Option<String>,
}

/// The two independent completion signals of a container wait.
///
/// Exactly one is expected to fire. A sender dropped without sending
/// closes its receiver.
pub struct WaitSignals {
    pub result: oneshot::Receiver<WaitResult>,
    pub transport: oneshot::Receiver<RuntimeError>,
}

/// Producer half of [`WaitSignals`], held by the runtime implementation.
pub struct WaitNotifier {
    pub result: oneshot::Sender<WaitResult>,
    pub transport: oneshot::Sender<RuntimeError>,
}

impl WaitSignals {
    pub fn channel() -> (WaitNotifier, WaitSignals) {
        let (result_tx, result_rx) = oneshot::channel();
        let (transport_tx, transport_rx) = oneshot::channel();
        (
            WaitNotifier {
                result: result_tx,
                transport: transport_tx,
            },
            WaitSignals {
                result: result_rx,
                transport: transport_rx,
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogsRequest {
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
}

impl Default for LogsRequest {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            timestamps: false,
        }
    }
}

/// Multiplexed log bytes, framed as described in [`crate::demux`].
/// Chunk boundaries carry no meaning.
pub type LogStream = BoxStream<'static, Result<Vec<u8>>>;

/// Control interface of a container engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List images whose reference matches `reference`, in runtime order
    async fn list_images(&self, reference: &str) -> Result<Vec<ImageRecord>>;

    /// Build an image from a tarred build context and wait for the build to finish
    async fn build_image(&self, context: Vec<u8>, tag: &str) -> Result<()>;

    /// Create a container, returning its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Extract a tar archive into `target_path` inside the container
    async fn upload_archive(
        &self,
        container_id: &str,
        target_path: &str,
        archive: Vec<u8>,
        allow_overwrite_dir_with_file: bool,
    ) -> Result<()>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Begin waiting for the container to stop running. Does not block.
    fn wait_container(&self, container_id: &str) -> WaitSignals;

    async fn container_logs(&self, container_id: &str, request: LogsRequest)
        -> Result<LogStream>;

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;
}
