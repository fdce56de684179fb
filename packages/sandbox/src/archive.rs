// ABOUTME: Tar archive construction for injecting bundles into containers
// ABOUTME: Packs the harness script and every bundle file as world-executable entries

use crate::bundle::CodeBundle;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use thiserror::Error;
use tracing::debug;

/// Permission bits applied to every injected entry.
pub const ENTRY_MODE: u32 = 0o777;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read harness script {path}: {source}")]
    Harness {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write archive entry {name}: {source}")]
    Entry {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to finalize archive: {0}")]
    Finalize(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Serializes a bundle into an in-memory tar stream.
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    /// Build the archive for `bundle`, reading the harness from `harness_source`.
    ///
    /// The harness is stored under the bundle's harness name; bundle files keep
    /// their paths verbatim. The returned bytes are a complete, sealed archive.
    pub fn build(bundle: &CodeBundle, harness_source: &Path) -> Result<Vec<u8>> {
        let harness = std::fs::read(harness_source).map_err(|source| ArchiveError::Harness {
            path: harness_source.to_path_buf(),
            source,
        })?;

        let mut archive = Builder::new(Vec::new());
        append_entry(&mut archive, bundle.harness_name(), &harness)?;

        for (path, content) in bundle.files() {
            append_entry(&mut archive, path, content)?;
        }

        let data = archive.into_inner().map_err(ArchiveError::Finalize)?;
        debug!(
            "Built archive with {} entries ({} bytes)",
            bundle.len() + 1,
            data.len()
        );
        Ok(data)
    }
}

fn append_entry(archive: &mut Builder<Vec<u8>>, name: &str, content: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(ENTRY_MODE);
    header.set_size(content.len() as u64);

    archive
        .append_data(&mut header, name, content)
        .map_err(|source| ArchiveError::Entry {
            name: name.to_string(),
            source,
        })
}

/// Tar an entire directory, used as an image build context.
pub fn directory_archive(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut archive = Builder::new(Vec::new());
    archive.append_dir_all(".", path)?;
    archive.into_inner()
}
