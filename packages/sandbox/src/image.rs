// ABOUTME: Runner image provisioning with build-on-demand
// ABOUTME: Queries the runtime by reference and builds from a local context only when missing

use crate::archive::directory_archive;
use crate::runtime::{ContainerRuntime, RuntimeError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to query images for {reference}: {source}")]
    Query {
        reference: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to read build context {path}: {source}")]
    Context {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build image {tag}: {source}")]
    Build {
        tag: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Image {0} still missing after a successful build")]
    MissingAfterBuild(String),
}

impl ProvisionError {
    fn context(path: &Path, source: std::io::Error) -> Self {
        Self::Context {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Makes sure the runner image exists before containers are created from it.
///
/// There is no locking around query-then-build. Two first-time callers racing
/// on the same reference may both build; the later tag wins.
pub struct ImageProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ImageProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Return the id of the image tagged `reference`, building it from
    /// `build_context` when no such image exists.
    pub async fn ensure(&self, reference: &str, build_context: &Path) -> Result<String> {
        if let Some(id) = self.find(reference).await? {
            debug!("Image {} already present as {}", reference, id);
            return Ok(id);
        }

        info!(
            "Image {} not found, building from {}",
            reference,
            build_context.display()
        );

        let context = directory_archive(build_context)
            .map_err(|source| ProvisionError::context(build_context, source))?;

        let tag = format!("{}:latest", reference);
        self.runtime
            .build_image(context, &tag)
            .await
            .map_err(|source| ProvisionError::Build {
                tag: tag.clone(),
                source,
            })?;

        let id = self
            .find(reference)
            .await?
            .ok_or_else(|| ProvisionError::MissingAfterBuild(reference.to_string()))?;

        info!("Provisioned image {} as {}", reference, id);
        Ok(id)
    }

    async fn find(&self, reference: &str) -> Result<Option<String>> {
        let images = self
            .runtime
            .list_images(reference)
            .await
            .map_err(|source| ProvisionError::Query {
                reference: reference.to_string(),
                source,
            })?;

        Ok(images.into_iter().next().map(|image| image.id))
    }
}
