// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across runbox

// Runner Image
pub const RUNBOX_IMAGE: &str = "RUNBOX_IMAGE";
pub const RUNBOX_BUILD_CONTEXT: &str = "RUNBOX_BUILD_CONTEXT";

// Harness
pub const RUNBOX_HARNESS: &str = "RUNBOX_HARNESS";
pub const RUNBOX_HARNESS_NAME: &str = "RUNBOX_HARNESS_NAME";

// Container Limits
pub const RUNBOX_WORKDIR: &str = "RUNBOX_WORKDIR";
pub const RUNBOX_MEMORY_LIMIT_BYTES: &str = "RUNBOX_MEMORY_LIMIT_BYTES";
pub const RUNBOX_WAIT_TIMEOUT_SECS: &str = "RUNBOX_WAIT_TIMEOUT_SECS";
pub const RUNBOX_CONTAINER_PREFIX: &str = "RUNBOX_CONTAINER_PREFIX";

// Bundle Source
pub const RUNBOX_SOURCE_DIR: &str = "RUNBOX_SOURCE_DIR";

// Docker Connection (read by the Docker client itself)
pub const DOCKER_HOST: &str = "DOCKER_HOST";

// Logging
pub const RUST_LOG: &str = "RUST_LOG";
