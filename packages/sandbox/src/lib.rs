// ABOUTME: Sandboxed execution of untrusted code bundles in throwaway containers
// ABOUTME: Image provisioning, bundle archiving, container lifecycle, and output demultiplexing

pub mod archive;
pub mod bundle;
pub mod config;
pub mod debug;
pub mod demux;
pub mod error;
pub mod image;
pub mod orchestrator;
pub mod runtime;

pub use archive::{ArchiveBuilder, ArchiveError};
pub use bundle::{BundleError, BundleSource, CodeBundle, DirectorySource, InlineSource};
pub use config::{ConfigError, SandboxConfig};
pub use demux::{DemuxError, DemuxedOutput, OutputDemuxer, StreamSelector};
pub use error::{Result, SandboxError};
pub use image::{ImageProvisioner, ProvisionError};
pub use orchestrator::{ContainerState, ExecutionResult, SandboxOrchestrator};
pub use runtime::{ContainerRuntime, DockerRuntime, RuntimeError};
