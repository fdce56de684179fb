// ABOUTME: In-memory source bundles and the sources that load them
// ABOUTME: Validates bundle paths and keeps them clear of the harness entry point

use serde::Serialize;
use std::borrow::Cow;
use std::collections::{btree_map, BTreeMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// File name the runner image executes inside the working directory.
pub const DEFAULT_HARNESS_NAME: &str = "timer.sh";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Bundle path must not be empty")]
    EmptyPath,

    #[error("Bundle path must be relative without empty, '.' or '..' segments: {0}")]
    InvalidPath(String),

    #[error("Bundle path collides with the harness entry point: {0}")]
    HarnessCollision(String),

    #[error("Bundle was built for harness {found}, but the sandbox runs {expected}")]
    HarnessMismatch { expected: String, found: String },

    #[error("Duplicate bundle path: {0}")]
    Duplicate(String),

    #[error("Failed to read bundle source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk bundle source directory: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, BundleError>;

/// Source files destined for one sandbox run.
///
/// Paths are relative to the container working directory and are injected
/// verbatim. The harness name is reserved: the harness script itself is
/// supplied separately when the archive is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBundle {
    harness_name: String,
    files: BTreeMap<String, Vec<u8>>,
}

impl CodeBundle {
    pub fn new() -> Self {
        Self::with_harness(DEFAULT_HARNESS_NAME)
    }

    pub fn with_harness(harness_name: impl Into<String>) -> Self {
        Self {
            harness_name: harness_name.into(),
            files: BTreeMap::new(),
        }
    }

    /// Add a file, rejecting invalid, duplicate, or harness-colliding paths.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<()> {
        let path = path.into();
        validate_path(&path)?;

        if path == self.harness_name {
            return Err(BundleError::HarnessCollision(path));
        }

        match self.files.entry(path) {
            btree_map::Entry::Occupied(entry) => Err(BundleError::Duplicate(entry.key().clone())),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(content.into());
                Ok(())
            }
        }
    }

    pub fn harness_name(&self) -> &str {
        &self.harness_name
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Text view of the bundle for diagnostics, decoding content lossily.
    pub fn text_view(&self) -> BundleView<'_> {
        BundleView {
            harness: &self.harness_name,
            files: self
                .files
                .iter()
                .map(|(p, c)| (p.as_str(), String::from_utf8_lossy(c)))
                .collect(),
        }
    }
}

impl Default for CodeBundle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct BundleView<'a> {
    pub harness: &'a str,
    pub files: BTreeMap<&'a str, Cow<'a, str>>,
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(BundleError::EmptyPath);
    }

    // Checked on the raw text: `Path::components` silently drops `.` and
    // trailing separators, which tar would then normalize into collisions.
    let valid = path
        .split('/')
        .all(|segment| !matches!(segment, "" | "." | ".."));
    if !valid || path.contains('\\') {
        return Err(BundleError::InvalidPath(path.to_string()));
    }

    Ok(())
}

/// Anything that can produce a bundle for a run.
///
/// The harness name is owned by whoever runs the bundle, so sources receive
/// it instead of choosing one.
pub trait BundleSource {
    fn load(&self, harness_name: &str) -> Result<CodeBundle>;
}

/// Loads every regular file under a directory, keyed by its path relative
/// to that directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BundleSource for DirectorySource {
    fn load(&self, harness_name: &str) -> Result<CodeBundle> {
        let mut bundle = CodeBundle::with_harness(harness_name);

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| BundleError::InvalidPath(entry.path().display().to_string()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let content = std::fs::read(entry.path()).map_err(|source| BundleError::Read {
                path: entry.path().to_path_buf(),
                source,
            })?;

            debug!("Loaded bundle file {} ({} bytes)", key, content.len());
            bundle.insert(key, content)?;
        }

        Ok(bundle)
    }
}

/// Bundle built from in-memory `(path, content)` pairs, e.g. embedded snippets.
#[derive(Debug, Clone, Default)]
pub struct InlineSource {
    files: Vec<(String, Vec<u8>)>,
}

impl InlineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }
}

impl BundleSource for InlineSource {
    fn load(&self, harness_name: &str) -> Result<CodeBundle> {
        let mut bundle = CodeBundle::with_harness(harness_name);
        for (path, content) in &self.files {
            bundle.insert(path.clone(), content.clone())?;
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_insert_and_get() {
        let mut bundle = CodeBundle::new();
        bundle.insert("main.py", "print(1+1)").unwrap();
        bundle
            .insert("lib/util.py", vec![0u8, 159, 146, 150])
            .unwrap();

        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get("main.py"), Some(&b"print(1+1)"[..]));
        assert_eq!(bundle.get("lib/util.py"), Some(&[0u8, 159, 146, 150][..]));
        assert_eq!(bundle.total_bytes(), 14);
    }

    #[test]
    fn test_rejects_bad_paths() {
        let mut bundle = CodeBundle::new();
        assert!(matches!(
            bundle.insert("", "x"),
            Err(BundleError::EmptyPath)
        ));
        assert!(matches!(
            bundle.insert("/etc/passwd", "x"),
            Err(BundleError::InvalidPath(_))
        ));
        assert!(matches!(
            bundle.insert("../escape.py", "x"),
            Err(BundleError::InvalidPath(_))
        ));
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_rejects_segments_tar_would_normalize() {
        let mut bundle = CodeBundle::new();
        for path in ["timer.sh/.", "a/", "a//b", "pkg/./mod.py", "a\\b"] {
            assert!(
                matches!(bundle.insert(path, "x"), Err(BundleError::InvalidPath(_))),
                "accepted {path:?}"
            );
        }
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_harness_cannot_be_smuggled_into_archive() {
        let mut bundle = CodeBundle::new();
        bundle.insert("pkg/mod.py", "Y").unwrap();
        assert!(bundle.insert("pkg/./mod.py", "X").is_err());
        assert!(bundle.insert("timer.sh/.", "echo replaced").is_err());

        let paths: Vec<&str> = bundle.files().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["pkg/mod.py"]);
    }

    #[test]
    fn test_rejects_harness_collision() {
        let mut bundle = CodeBundle::new();
        let err = bundle.insert(DEFAULT_HARNESS_NAME, "echo hi").unwrap_err();
        assert!(matches!(err, BundleError::HarnessCollision(_)));
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut bundle = CodeBundle::new();
        bundle.insert("main.py", "a").unwrap();
        let err = bundle.insert("main.py", "b").unwrap_err();
        assert!(matches!(err, BundleError::Duplicate(_)));
        assert_eq!(bundle.get("main.py"), Some(&b"a"[..]));
    }

    #[test]
    fn test_directory_source_keeps_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "import pkg.mod\n").unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/mod.py"), "X = 1\n").unwrap();

        let source = DirectorySource::new(dir.path());
        let bundle = source.load(DEFAULT_HARNESS_NAME).unwrap();

        let paths: Vec<&str> = bundle.files().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["main.py", "pkg/mod.py"]);
        assert_eq!(bundle.get("pkg/mod.py"), Some(&b"X = 1\n"[..]));
    }

    #[test]
    fn test_directory_source_missing_root() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path().join("missing"));
        let result = source.load(DEFAULT_HARNESS_NAME);
        assert!(matches!(result, Err(BundleError::Walk(_))));
    }

    #[test]
    fn test_directory_source_harness_collision() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("run.sh"), "echo").unwrap();

        let result = DirectorySource::new(dir.path()).load("run.sh");
        assert!(matches!(result, Err(BundleError::HarnessCollision(_))));
    }

    #[test]
    fn test_inline_source() {
        let bundle = InlineSource::new()
            .file("main.py", "print(1+1)")
            .load("run.sh")
            .unwrap();
        assert_eq!(bundle.harness_name(), "run.sh");
        assert_eq!(bundle.get("main.py"), Some(&b"print(1+1)"[..]));
    }

    #[test]
    fn test_text_view_serializes() {
        let mut bundle = CodeBundle::new();
        bundle.insert("main.py", "print(1+1)").unwrap();
        let json = serde_json::to_value(bundle.text_view()).unwrap();
        assert_eq!(json["harness"], "timer.sh");
        assert_eq!(json["files"]["main.py"], "print(1+1)");
    }
}
