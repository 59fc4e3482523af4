use std::time::Duration;

use crate::options::BackendKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Terminal failure of a render request.
///
/// Every backend failure is classified into one of four kinds (see [`ErrorKind`]). The pipeline
/// never retries; callers decide whether a larger budget or another backend is worth a second try.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{backend} backend unavailable: {detail} ({hint})")]
    BackendUnavailable {
        backend: BackendKind,
        detail: String,
        hint: String,
    },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("render timed out after {}ms while {stage}", budget.as_millis())]
    Timeout { budget: Duration, stage: String },

    #[error("render failed: {message}")]
    Render { message: String },

    #[error("invalid render options: {message}")]
    InvalidOptions { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BackendUnavailable,
    Protocol,
    Timeout,
    Render,
    InvalidOptions,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Render { .. } => ErrorKind::Render,
            Error::InvalidOptions { .. } => ErrorKind::InvalidOptions,
        }
    }

    pub fn unavailable(
        backend: BackendKind,
        detail: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Error::BackendUnavailable {
            backend,
            detail: detail.into(),
            hint: hint.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    pub fn timeout(budget: Duration, stage: impl Into<String>) -> Self {
        Error::Timeout {
            budget,
            stage: stage.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Error::Render {
            message: message.into(),
        }
    }

    pub fn invalid_options(message: impl Into<String>) -> Self {
        Error::InvalidOptions {
            message: message.into(),
        }
    }
}

impl From<crate::envelope::EnvelopeError> for Error {
    fn from(value: crate::envelope::EnvelopeError) -> Self {
        Error::protocol(value.to_string())
    }
}

/// Errors raised while reading an [`ExportConfig`](crate::ExportConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported image format: {value}")]
    UnsupportedFormat { value: String },

    #[error("unknown backend: {value} (expected embed, local or cli)")]
    UnknownBackend { value: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}
