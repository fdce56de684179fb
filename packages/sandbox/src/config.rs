// ABOUTME: Sandbox run configuration with defaults and environment overrides
// ABOUTME: Image reference, harness location, container limits, and wait timeout

use runbox_config::{constants, parse_env, string_env, EnvError};
use std::path::PathBuf;
use std::time::Duration;

use crate::bundle::DEFAULT_HARNESS_NAME;

pub const DEFAULT_IMAGE_REFERENCE: &str = "runner";
pub const DEFAULT_BUILD_CONTEXT: &str = "runner";
pub const DEFAULT_WORKING_DIR: &str = "/code";
pub const DEFAULT_MEMORY_LIMIT_BYTES: i64 = 10_000_000;
pub const DEFAULT_CONTAINER_PREFIX: &str = "runbox";

pub type ConfigError = EnvError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Reference the runner image is looked up and tagged by
    pub image_reference: String,
    /// Directory tarred as the runner image build context
    pub build_context: PathBuf,
    /// Host path of the harness script injected with every bundle
    pub harness_source: PathBuf,
    /// Name of the harness inside the working directory
    pub harness_name: String,
    /// Container directory the bundle is injected into and run from
    pub working_dir: String,
    pub memory_limit_bytes: i64,
    /// Upper bound on waiting for the bundle to finish; `None` waits forever
    pub wait_timeout: Option<Duration>,
    pub container_prefix: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let build_context = PathBuf::from(DEFAULT_BUILD_CONTEXT);
        Self {
            image_reference: DEFAULT_IMAGE_REFERENCE.to_string(),
            harness_source: build_context.join(DEFAULT_HARNESS_NAME),
            build_context,
            harness_name: DEFAULT_HARNESS_NAME.to_string(),
            working_dir: DEFAULT_WORKING_DIR.to_string(),
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            wait_timeout: None,
            container_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
        }
    }
}

impl SandboxConfig {
    /// Defaults overridden by `RUNBOX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(image) = string_env(constants::RUNBOX_IMAGE) {
            config.image_reference = image;
        }
        if let Some(name) = string_env(constants::RUNBOX_HARNESS_NAME) {
            config.set_harness_name(name);
        }
        if let Some(context) = string_env(constants::RUNBOX_BUILD_CONTEXT) {
            config.set_build_context(context);
        }
        if let Some(harness) = string_env(constants::RUNBOX_HARNESS) {
            config.harness_source = PathBuf::from(harness);
        }
        if let Some(dir) = string_env(constants::RUNBOX_WORKDIR) {
            config.working_dir = dir;
        }
        if let Some(memory) = parse_env::<i64>(constants::RUNBOX_MEMORY_LIMIT_BYTES)? {
            config.memory_limit_bytes = memory;
        }
        if let Some(secs) = parse_env::<u64>(constants::RUNBOX_WAIT_TIMEOUT_SECS)? {
            config.wait_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(prefix) = string_env(constants::RUNBOX_CONTAINER_PREFIX) {
            config.container_prefix = prefix;
        }

        Ok(config)
    }

    /// Whether the harness is still the one shipped in the build context
    fn harness_is_derived(&self) -> bool {
        self.harness_source == self.build_context.join(&self.harness_name)
    }

    /// Switch the build context. A harness that lived in the old context moves
    /// along; an explicitly chosen harness stays put.
    pub fn set_build_context(&mut self, context: impl Into<PathBuf>) {
        let derived = self.harness_is_derived();
        self.build_context = context.into();
        if derived {
            self.harness_source = self.build_context.join(&self.harness_name);
        }
    }

    /// Rename the harness, moving a derived harness source to match.
    pub fn set_harness_name(&mut self, name: impl Into<String>) {
        let derived = self.harness_is_derived();
        self.harness_name = name.into();
        if derived {
            self.harness_source = self.build_context.join(&self.harness_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.image_reference, "runner");
        assert_eq!(config.harness_source, PathBuf::from("runner/timer.sh"));
        assert_eq!(config.working_dir, "/code");
        assert_eq!(config.memory_limit_bytes, 10_000_000);
        assert_eq!(config.wait_timeout, None);
        assert_eq!(config.harness_name, "timer.sh");
    }

    #[test]
    fn test_build_context_moves_derived_harness() {
        let mut config = SandboxConfig::default();
        config.set_build_context("images/py");
        assert_eq!(config.harness_source, PathBuf::from("images/py/timer.sh"));

        config.set_harness_name("run.sh");
        assert_eq!(config.harness_source, PathBuf::from("images/py/run.sh"));
    }

    #[test]
    fn test_build_context_keeps_explicit_harness() {
        let mut config = SandboxConfig {
            harness_source: PathBuf::from("/opt/harness.sh"),
            ..SandboxConfig::default()
        };
        config.set_build_context("images/py");
        config.set_harness_name("run.sh");

        assert_eq!(config.build_context, PathBuf::from("images/py"));
        assert_eq!(config.harness_source, PathBuf::from("/opt/harness.sh"));
    }

    // The only test that touches RUNBOX_* variables, so it cannot race others.
    #[test]
    fn test_from_env_overrides() {
        std::env::set_var(constants::RUNBOX_IMAGE, "py-runner");
        std::env::set_var(constants::RUNBOX_BUILD_CONTEXT, "images/python");
        std::env::set_var(constants::RUNBOX_WAIT_TIMEOUT_SECS, "30");
        std::env::set_var(constants::RUNBOX_HARNESS_NAME, "run.sh");
        std::env::set_var(constants::RUNBOX_MEMORY_LIMIT_BYTES, "64000000");

        let config = SandboxConfig::from_env().unwrap();
        assert_eq!(config.image_reference, "py-runner");
        assert_eq!(config.build_context, PathBuf::from("images/python"));
        assert_eq!(
            config.harness_source,
            PathBuf::from("images/python/run.sh")
        );
        assert_eq!(config.harness_name, "run.sh");
        assert_eq!(config.wait_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.memory_limit_bytes, 64_000_000);

        std::env::set_var(constants::RUNBOX_MEMORY_LIMIT_BYTES, "ten megs");
        assert!(SandboxConfig::from_env().is_err());

        for name in [
            constants::RUNBOX_IMAGE,
            constants::RUNBOX_BUILD_CONTEXT,
            constants::RUNBOX_WAIT_TIMEOUT_SECS,
            constants::RUNBOX_MEMORY_LIMIT_BYTES,
            constants::RUNBOX_HARNESS_NAME,
        ] {
            std::env::remove_var(name);
        }
    }
}
