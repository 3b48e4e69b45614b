use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the simulation core.
///
/// Numerical edge cases such as an `acos` argument drifting outside `[-1, 1]`
/// are absorbed where they occur and never reach this type.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad enum name, out-of-range selector or malformed probability vector.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A Markov model whose shape or distributions cannot be used.
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("no sequence of length in [{lower}, {upper}] after {attempts} attempts")]
    ExhaustedRetries {
        attempts: usize,
        lower: usize,
        upper: usize,
    },
    #[error("division by zero while computing {0}")]
    DivisionByZero(&'static str),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn model(message: impl Into<String>) -> Self {
        Error::InvalidModel(message.into())
    }

    pub(crate) fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            what: what.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
