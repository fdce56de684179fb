// ABOUTME: Configuration primitives shared across runbox packages
// ABOUTME: Exposes environment variable names and typed environment parsing helpers

pub mod constants;
pub mod env;

pub use env::{parse_env, string_env, EnvError};
