// ABOUTME: Error types for sandbox runs
// ABOUTME: One variant per lifecycle step, plus aggregation of cleanup failures

use crate::archive::ArchiveError;
use crate::bundle::BundleError;
use crate::demux::DemuxError;
use crate::image::ProvisionError;
use crate::runtime::RuntimeError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for a sandbox run
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The bundle could not be loaded from its source
    #[error("Failed to load bundle: {0}")]
    Bundle(#[from] BundleError),

    /// Runner image query or build failed; no container was created
    #[error("Image provisioning failed: {0}")]
    Provisioning(#[from] ProvisionError),

    /// Container creation failed; nothing to clean up
    #[error("Container creation failed: {0}")]
    Setup(#[source] RuntimeError),

    /// Bundle could not be packed for injection
    #[error("Failed to build bundle archive: {0}")]
    Archive(#[from] ArchiveError),

    /// Bundle upload into the container failed
    #[error("Failed to inject bundle into container: {0}")]
    Injection(#[source] RuntimeError),

    #[error("Container failed to start: {0}")]
    Start(#[source] RuntimeError),

    /// The wait request itself failed before the container stopped
    #[error("Waiting for container failed: {0}")]
    Wait(#[source] RuntimeError),

    /// The runtime reported an error alongside the wait result
    #[error("Container wait reported an error: {0}")]
    ProcessWait(String),

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    /// Output could not be retrieved or demultiplexed
    #[error("Failed to collect container output: {0}")]
    Collection(#[from] DemuxError),

    /// The run finished but its container could not be removed
    #[error("Failed to remove container {container_id}: {source}")]
    Disposal {
        container_id: String,
        #[source]
        source: RuntimeError,
    },

    /// A step failed and removing the container failed as well
    #[error("{primary} (container {container_id} could not be removed: {disposal})")]
    Cleanup {
        primary: Box<SandboxError>,
        container_id: String,
        disposal: RuntimeError,
    },
}

impl SandboxError {
    /// Whether this failure happened after a container existed.
    pub fn requires_cleanup(&self) -> bool {
        !matches!(
            self,
            Self::Bundle(_) | Self::Provisioning(_) | Self::Setup(_)
        )
    }

    /// The failure that ended the run, ignoring any cleanup failure layered on top.
    pub fn primary(&self) -> &SandboxError {
        match self {
            Self::Cleanup { primary, .. } => primary.as_ref(),
            other => other,
        }
    }

    /// The container removal failure, if one occurred.
    pub fn disposal_error(&self) -> Option<&RuntimeError> {
        match self {
            Self::Disposal { source, .. } => Some(source),
            Self::Cleanup { disposal, .. } => Some(disposal),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.primary(), Self::Timeout(_))
    }
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
