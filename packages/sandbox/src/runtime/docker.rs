// ABOUTME: Docker Engine implementation of the container runtime interface
// ABOUTME: Uses bollard to query, build, create, wait on, and remove sandbox containers

use super::{
    ContainerRuntime, ContainerSpec, ImageRecord, LogStream, LogsRequest, Result, RuntimeError,
    WaitResult, WaitSignals,
};
use crate::demux::{encode_frame, StreamSelector};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
        StartContainerOptions, UploadToContainerOptions, WaitContainerOptions,
    },
    errors::Error as BollardError,
    image::{BuildImageOptions, ListImagesOptions},
    models::{DeviceMapping, HostConfig},
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Wait condition that resolves once the container's process has exited
const WAIT_CONDITION_NOT_RUNNING: &str = "not-running";

/// Docker runtime connection, shared read-only across runs
#[derive(Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform default socket, negotiate
    /// the API version, and verify the daemon answers.
    pub async fn connect() -> Result<Self> {
        debug!(
            "Connecting to Docker (DOCKER_HOST={})",
            runbox_config::string_env(runbox_config::constants::DOCKER_HOST)
                .as_deref()
                .unwrap_or("default socket")
        );
        let client = Docker::connect_with_defaults()?;
        let client = client.negotiate_version().await?;

        client.ping().await.map_err(|e| {
            error!("Failed to connect to Docker daemon: {}", e);
            RuntimeError::Docker(e)
        })?;

        info!(
            "Connected to Docker daemon (API {:?})",
            client.client_version()
        );
        Ok(Self { client })
    }

    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }

    fn to_bollard_config(spec: &ContainerSpec) -> Config<String> {
        let devices: Vec<DeviceMapping> = spec
            .limits
            .devices
            .iter()
            .map(|path| DeviceMapping {
                path_on_host: Some(path.clone()),
                path_in_container: Some(path.clone()),
                cgroup_permissions: Some("rwm".to_string()),
            })
            .collect();

        let host_config = HostConfig {
            memory: Some(spec.limits.memory_bytes),
            privileged: Some(spec.limits.privileged),
            devices: Some(devices),
            network_mode: spec
                .limits
                .network_disabled
                .then(|| "none".to_string()),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            network_disabled: Some(spec.limits.network_disabled),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_images(&self, reference: &str) -> Result<Vec<ImageRecord>> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![reference.to_string()]);

        let options = ListImagesOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let images = self.client.list_images(Some(options)).await?;
        debug!("Found {} image(s) for reference {}", images.len(), reference);

        Ok(images
            .into_iter()
            .map(|image| ImageRecord {
                id: image.id,
                tags: image.repo_tags,
            })
            .collect())
    }

    async fn build_image(&self, context: Vec<u8>, tag: &str) -> Result<()> {
        info!("Building image {} ({} byte context)", tag, context.len());

        let options = BuildImageOptions {
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = Box::pin(self.client.build_image(options, None, Some(context.into())));

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(line) = info.stream.as_deref().map(str::trim_end) {
                if !line.is_empty() {
                    debug!("Build: {}", line);
                }
            }
            if let Some(error) = info.error {
                error!("Image build for {} failed: {}", tag, error);
                return Err(RuntimeError::Build(error));
            }
        }

        info!("Built image {}", tag);
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .client
            .create_container(Some(options), Self::to_bollard_config(spec))
            .await?;

        for warning in &response.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }

        Ok(response.id)
    }

    async fn upload_archive(
        &self,
        container_id: &str,
        target_path: &str,
        archive: Vec<u8>,
        allow_overwrite_dir_with_file: bool,
    ) -> Result<()> {
        let options = UploadToContainerOptions {
            path: target_path.to_string(),
            no_overwrite_dir_non_dir: (!allow_overwrite_dir_with_file).to_string(),
        };

        self.client
            .upload_to_container(container_id, Some(options), archive.into())
            .await?;
        Ok(())
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    fn wait_container(&self, container_id: &str) -> WaitSignals {
        let (notifier, signals) = WaitSignals::channel();
        let client = self.client.clone();
        let container_id = container_id.to_string();

        tokio::spawn(async move {
            let options = WaitContainerOptions {
                condition: WAIT_CONDITION_NOT_RUNNING.to_string(),
            };
            let mut stream = Box::pin(client.wait_container(&container_id, Some(options)));

            // Receivers may already be gone if the caller timed out.
            match stream.next().await {
                Some(Ok(response)) => {
                    let _ = notifier.result.send(WaitResult {
                        status_code: response.status_code,
                        error: response.error.and_then(|e| e.message),
                    });
                }
                // bollard reports a non-zero exit as an error; it is still a
                // completed wait.
                Some(Err(BollardError::DockerContainerWaitError { error, code })) => {
                    let _ = notifier.result.send(WaitResult {
                        status_code: code,
                        error: Some(error).filter(|e| !e.is_empty()),
                    });
                }
                Some(Err(e)) => {
                    let _ = notifier.transport.send(RuntimeError::Docker(e));
                }
                None => {
                    let _ = notifier.transport.send(RuntimeError::Transport(format!(
                        "wait stream for {} ended without a result",
                        container_id
                    )));
                }
            }
        });

        signals
    }

    async fn container_logs(
        &self,
        container_id: &str,
        request: LogsRequest,
    ) -> Result<LogStream> {
        let options = LogsOptions::<String> {
            stdout: request.stdout,
            stderr: request.stderr,
            timestamps: request.timestamps,
            follow: false,
            ..Default::default()
        };

        // bollard already splits frames; re-frame them so callers see the
        // engine-neutral multiplexed format.
        let stream = self
            .client
            .logs(container_id, Some(options))
            .map(|item| {
                item.map(|output| match output {
                    LogOutput::StdErr { message } => {
                        encode_frame(StreamSelector::Stderr, &message)
                    }
                    LogOutput::StdIn { message } => encode_frame(StreamSelector::Stdin, &message),
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        encode_frame(StreamSelector::Stdout, &message)
                    }
                })
                .map_err(RuntimeError::Docker)
            })
            .boxed();

        Ok(stream)
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            v: true, // Remove anonymous volumes
            ..Default::default()
        };

        match self
            .client
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(_) => Ok(()),
            // Container already removed is not an error
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!("Container {} already removed", container_id);
                Ok(())
            }
            Err(e) => Err(RuntimeError::Docker(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ResourceLimits;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "runbox-test".to_string(),
            image: "sha256:abc".to_string(),
            command: vec!["sh".to_string(), "./timer.sh".to_string()],
            working_dir: "/code".to_string(),
            limits: ResourceLimits {
                memory_bytes: 10_000_000,
                network_disabled: true,
                privileged: false,
                devices: Vec::new(),
            },
        }
    }

    #[test]
    fn test_container_config_conversion() {
        let config = DockerRuntime::to_bollard_config(&spec());

        assert_eq!(config.image.as_deref(), Some("sha256:abc"));
        assert_eq!(config.working_dir.as_deref(), Some("/code"));
        assert_eq!(config.network_disabled, Some(true));
        assert_eq!(
            config.cmd,
            Some(vec!["sh".to_string(), "./timer.sh".to_string()])
        );

        let host = config.host_config.unwrap();
        assert_eq!(host.memory, Some(10_000_000));
        assert_eq!(host.privileged, Some(false));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.devices, Some(Vec::new()));
    }

    #[test]
    fn test_network_mode_left_default_when_enabled() {
        let mut spec = spec();
        spec.limits.network_disabled = false;

        let config = DockerRuntime::to_bollard_config(&spec);
        assert_eq!(config.network_disabled, Some(false));
        assert_eq!(config.host_config.unwrap().network_mode, None);
    }

    #[tokio::test]
    #[ignore] // Requires Docker daemon
    async fn test_connect_docker() {
        let result = DockerRuntime::connect().await;
        assert!(result.is_ok(), "Failed to connect to Docker: {:?}", result.err());
    }
}
