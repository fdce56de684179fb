// ABOUTME: CLI command that runs a code bundle in a sandbox container
// ABOUTME: Loads the bundle from a directory and prints separated stdout and stderr

use super::utils::{connect, load_config, ImageArgs};
use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use runbox_config::{constants, string_env};
use runbox_sandbox::debug::dump;
use runbox_sandbox::{BundleSource, DirectorySource, SandboxConfig, SandboxOrchestrator};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SOURCE_DIR: &str = "demos/python";

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory holding the code to run (default: demos/python)
    #[arg(long)]
    pub source: Option<PathBuf>,

    #[command(flatten)]
    pub image: ImageArgs,

    /// Host path of the harness script
    #[arg(long)]
    pub harness: Option<PathBuf>,

    /// Container memory limit in bytes
    #[arg(long)]
    pub memory: Option<i64>,

    /// Seconds to wait for the run before killing it (0 = no limit)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the loaded bundle before running it
    #[arg(long)]
    pub dump_bundle: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut SandboxConfig) {
        self.image.apply(config);
        if let Some(harness) = &self.harness {
            config.harness_source = harness.clone();
        }
        if let Some(memory) = self.memory {
            config.memory_limit_bytes = memory;
        }
        if let Some(secs) = self.timeout {
            config.wait_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
    }

    fn source_dir(&self) -> PathBuf {
        self.source
            .clone()
            .or_else(|| string_env(constants::RUNBOX_SOURCE_DIR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DIR))
    }
}

pub async fn handle_run(args: RunArgs) -> Result<i32> {
    let config = load_config(|config| args.apply(config))?;

    let source_dir = args.source_dir();
    let bundle = DirectorySource::new(&source_dir)
        .load(&config.harness_name)
        .with_context(|| format!("Failed to load bundle from {}", source_dir.display()))?;

    if args.dump_bundle {
        eprintln!("{}", dump(&bundle.text_view())?);
    }

    let sandbox = SandboxOrchestrator::new(connect().await?, config);
    let result = sandbox.run(&bundle).await?;

    println!("{}", "STDOUT:".bold());
    print!("{}", result.stdout_lossy());
    println!("{}", "STDERR:".bold());
    print!("{}", result.stderr_lossy());

    if !result.success() {
        eprintln!(
            "{} process exited with code {}",
            "Warning:".yellow().bold(),
            result.exit_code
        );
    }

    Ok(exit_status(result.exit_code))
}

/// Map a container exit code onto a process exit status.
fn exit_status(code: i64) -> i32 {
    i32::try_from(code).unwrap_or(1)
}
