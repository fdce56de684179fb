// ABOUTME: Per-run sandbox container lifecycle orchestration
// ABOUTME: Provision, create, inject, start, wait, collect, and always dispose

use crate::archive::ArchiveBuilder;
use crate::bundle::{BundleError, BundleSource, CodeBundle};
use crate::config::SandboxConfig;
use crate::demux::{DemuxError, DemuxedOutput, OutputDemuxer};
use crate::error::{Result, SandboxError};
use crate::image::ImageProvisioner;
use crate::runtime::{
    ContainerRuntime, ContainerSpec, LogsRequest, ResourceLimits, RuntimeError, WaitSignals,
};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of a sandbox container as seen by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    /// Bundle injected into the working directory
    Injected,
    Started,
    /// Process exited and its status was observed
    Waited,
    Collected,
    Disposed,
}

impl ContainerState {
    /// Whether the process is known to have stopped
    pub fn has_exited(self) -> bool {
        matches!(self, Self::Waited | Self::Collected)
    }
}

/// Output of one completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub container_id: String,
    pub image_id: String,
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// A container owned by exactly one run. Disposal consumes it.
struct SandboxContainer {
    id: String,
    state: ContainerState,
}

impl SandboxContainer {
    fn transition(&mut self, next: ContainerState) {
        debug!("Container {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    async fn dispose(
        mut self,
        runtime: &dyn ContainerRuntime,
    ) -> std::result::Result<(), RuntimeError> {
        // A container that may still be running (timeout, failed wait) is killed
        let force = !self.state.has_exited();
        debug!("Removing container {} (force={})", self.id, force);

        runtime.remove_container(&self.id, force).await?;
        self.transition(ContainerState::Disposed);
        info!("Removed container {}", self.id);
        Ok(())
    }
}

/// Command the container runs: the harness through a shell
fn harness_command(harness_name: &str) -> Vec<String> {
    vec!["sh".to_string(), format!("./{}", harness_name)]
}

/// What a container produced between start and collection
struct Finished {
    exit_code: i64,
    output: DemuxedOutput,
    started_at: DateTime<Utc>,
}

/// Runs bundles in throwaway containers, one container per run.
///
/// The runtime connection is shared; every run gets its own container and
/// that container is removed before [`SandboxOrchestrator::run`] returns.
pub struct SandboxOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    provisioner: ImageProvisioner,
    config: SandboxConfig,
}

impl SandboxOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SandboxConfig) -> Self {
        Self {
            provisioner: ImageProvisioner::new(runtime.clone()),
            runtime,
            config,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn provisioner(&self) -> &ImageProvisioner {
        &self.provisioner
    }

    /// Load a bundle from `source` for the configured harness and run it.
    pub async fn run_source(&self, source: &dyn BundleSource) -> Result<ExecutionResult> {
        let bundle = source.load(&self.config.harness_name)?;
        self.run(&bundle).await
    }

    /// Run `bundle` to completion and return its separated output.
    pub async fn run(&self, bundle: &CodeBundle) -> Result<ExecutionResult> {
        info!(
            "Running bundle of {} file(s), {} bytes",
            bundle.len(),
            bundle.total_bytes()
        );

        // The bundle reserved a name for the harness; it must be the one we inject.
        if bundle.harness_name() != self.config.harness_name {
            return Err(BundleError::HarnessMismatch {
                expected: self.config.harness_name.clone(),
                found: bundle.harness_name().to_string(),
            }
            .into());
        }

        let image_id = self
            .provisioner
            .ensure(&self.config.image_reference, &self.config.build_context)
            .await?;

        let mut container = self.create_container(&image_id).await?;
        let container_id = container.id.clone();

        let outcome = self.execute(&mut container, bundle).await;
        let disposal = container.dispose(self.runtime.as_ref()).await;

        match (outcome, disposal) {
            (Ok(finished), Ok(())) => {
                let result = ExecutionResult {
                    container_id,
                    image_id,
                    exit_code: finished.exit_code,
                    stdout: finished.output.stdout,
                    stderr: finished.output.stderr,
                    started_at: finished.started_at,
                    finished_at: Utc::now(),
                };
                info!(
                    "Run finished with exit code {} in {}ms",
                    result.exit_code,
                    result.duration().num_milliseconds()
                );
                Ok(result)
            }
            (Ok(_), Err(source)) => {
                error!("Failed to remove container {}: {}", container_id, source);
                Err(SandboxError::Disposal {
                    container_id,
                    source,
                })
            }
            (Err(primary), Ok(())) => {
                warn!("Run failed: {}", primary);
                Err(primary)
            }
            (Err(primary), Err(disposal)) => {
                error!(
                    "Run failed ({}) and container {} could not be removed: {}",
                    primary, container_id, disposal
                );
                Err(SandboxError::Cleanup {
                    primary: Box::new(primary),
                    container_id,
                    disposal,
                })
            }
        }
    }

    fn container_spec(&self, image_id: &str) -> ContainerSpec {
        ContainerSpec {
            name: format!("{}-{}", self.config.container_prefix, Uuid::new_v4().simple()),
            image: image_id.to_string(),
            command: harness_command(&self.config.harness_name),
            working_dir: self.config.working_dir.clone(),
            limits: ResourceLimits {
                memory_bytes: self.config.memory_limit_bytes,
                network_disabled: true,
                privileged: false,
                devices: Vec::new(),
            },
        }
    }

    async fn create_container(&self, image_id: &str) -> Result<SandboxContainer> {
        let spec = self.container_spec(image_id);
        debug!("Creating container {} from image {}", spec.name, image_id);

        let id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(SandboxError::Setup)?;

        info!("Created container {} ({})", spec.name, id);
        Ok(SandboxContainer {
            id,
            state: ContainerState::Created,
        })
    }

    /// Every step between creation and disposal. The caller disposes.
    async fn execute(
        &self,
        container: &mut SandboxContainer,
        bundle: &CodeBundle,
    ) -> Result<Finished> {
        let archive = ArchiveBuilder::build(bundle, &self.config.harness_source)?;
        self.runtime
            .upload_archive(&container.id, &self.config.working_dir, archive, true)
            .await
            .map_err(SandboxError::Injection)?;
        container.transition(ContainerState::Injected);
        debug!(
            "Injected bundle into {}:{}",
            container.id, self.config.working_dir
        );

        self.runtime
            .start_container(&container.id)
            .await
            .map_err(SandboxError::Start)?;
        let started_at = Utc::now();
        container.transition(ContainerState::Started);

        let exit_code = self.wait(&container.id).await?;
        container.transition(ContainerState::Waited);

        let logs = self
            .runtime
            .container_logs(&container.id, LogsRequest::default())
            .await
            .map_err(DemuxError::Transport)?;
        let output = OutputDemuxer::split(logs).await?;
        container.transition(ContainerState::Collected);
        debug!(
            "Collected {} stdout / {} stderr bytes from {}",
            output.stdout.len(),
            output.stderr.len(),
            container.id
        );

        Ok(Finished {
            exit_code,
            output,
            started_at,
        })
    }

    /// Block until the wait result or a transport error arrives, whichever is
    /// first, bounded by the configured timeout.
    async fn wait(&self, container_id: &str) -> Result<i64> {
        let signals: WaitSignals = self.runtime.wait_container(container_id);

        let race = async move {
            tokio::select! {
                Ok(outcome) = signals.result => match outcome.error {
                    Some(message) => Err(SandboxError::ProcessWait(message)),
                    None => Ok(outcome.status_code),
                },
                Ok(transport) = signals.transport => Err(SandboxError::Wait(transport)),
                else => Err(SandboxError::Wait(RuntimeError::Transport(
                    "wait signals closed without a result".to_string(),
                ))),
            }
        };

        match self.config.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, race).await.unwrap_or_else(|_| {
                warn!("Container {} still running after {:?}", container_id, limit);
                Err(SandboxError::Timeout(limit))
            }),
            None => race.await,
        }
    }
}
