//! Crate-wide error type.
//!
//! Every layer funnels its failures into [`Error`]; the HTTP adapter derives a
//! status code from it through [`Error::http_status`].

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity is unknown.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Request or input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The source could not be inspected.
    #[error("Probe error: {0}")]
    Probe(String),

    /// The source lacks a stream the asset requires.
    #[error("Source has no {0} stream")]
    MissingStream(&'static str),

    /// An encoder subprocess failed.
    #[error("Encode error [{track}]: {message}")]
    Encode { track: String, message: String },

    /// A transcode run for this id ended without producing a playable stream.
    #[error("Transcode aborted for {id}: {reason}")]
    Aborted { id: String, reason: String },

    /// The stream did not become playable in time.
    #[error("Timed out after {waited:?} waiting for {id}")]
    Timeout { id: String, waited: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Map this error to an HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Probe(_) | Error::MissingStream(_) => 422,
            Error::Encode { .. } | Error::Aborted { .. } => 502,
            Error::Timeout { .. } => 504,
            Error::Io(_) | Error::Serialization(_) => 500,
        }
    }

    /// Short machine-readable code for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation_error",
            Error::Probe(_) => "probe_error",
            Error::MissingStream(_) => "missing_stream",
            Error::Encode { .. } => "encode_error",
            Error::Aborted { .. } => "aborted",
            Error::Timeout { .. } => "timeout",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn encode(track: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Encode {
            track: track.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
