// ABOUTME: Shared helpers for runbox CLI commands
// ABOUTME: Config loading with flag overrides and runtime connection

use anyhow::{Context, Result};
use clap::Args;
use runbox_sandbox::{DockerRuntime, SandboxConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Flags that select and build the runner image
#[derive(Args, Debug, Default)]
pub struct ImageArgs {
    /// Runner image reference (default: runner)
    #[arg(long)]
    pub image: Option<String>,

    /// Directory used as the image build context (default: runner)
    #[arg(long)]
    pub build_context: Option<PathBuf>,
}

impl ImageArgs {
    pub fn apply(&self, config: &mut SandboxConfig) {
        if let Some(image) = &self.image {
            config.image_reference = image.clone();
        }
        if let Some(context) = &self.build_context {
            config.set_build_context(context.clone());
        }
    }
}

/// Environment configuration, then `apply` for command-line overrides.
pub fn load_config(apply: impl FnOnce(&mut SandboxConfig)) -> Result<SandboxConfig> {
    let mut config = SandboxConfig::from_env().context("Invalid sandbox configuration")?;
    apply(&mut config);
    Ok(config)
}

pub async fn connect() -> Result<Arc<DockerRuntime>> {
    let runtime = DockerRuntime::connect()
        .await
        .context("Failed to connect to Docker. Is the daemon running?")?;
    Ok(Arc::new(runtime))
}
