use std::fmt;

use ollama_relay::{RelayAppError, RelayError};

/// Message printed to stderr before exiting with status 1
#[derive(Debug)]
pub struct CliError(pub String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

impl From<RelayAppError> for CliError {
    fn from(e: RelayAppError) -> Self {
        CliError(e.to_string())
    }
}

impl From<RelayError> for CliError {
    fn from(e: RelayError) -> Self {
        match e.remediation_hint() {
            Some(hint) => CliError(format!("{e}\nHint: {hint}")),
            None => CliError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("JSON error: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError(format!("IO error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;
