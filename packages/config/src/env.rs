// ABOUTME: Typed environment variable parsing
// ABOUTME: Unset and blank values are absent, malformed values are errors

use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Read a string variable, treating unset and blank values as absent.
pub fn string_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable into `T`.
///
/// Returns `Ok(None)` when the variable is unset or blank and an error when
/// it is set to something that does not parse.
pub fn parse_env<T>(name: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match string_env(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| EnvError::InvalidValue {
                name: name.to_string(),
                value: raw,
                reason: e.to_string(),
            }),
    }
}
