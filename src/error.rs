//! Error kinds of a batch run.
//!
//! Run-level errors ([`RunError`]) abort before or during listing. Per-file
//! errors ([`FileError`]) are caught by the orchestrator, counted, and never
//! escape the run.

use std::process::ExitStatus;
use thiserror::Error;

/// Errors raised by a [`crate::store::FileStore`] backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    /// Transport or service error from a remote backend
    #[error("remote store error: {0}")]
    Remote(String),
}

/// Errors from the external conversion step.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to run converter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("converter output is not valid JSON: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    /// Used by in-process converters
    #[error("{0}")]
    Other(String),
}

/// Failure of one file; names the stage that failed.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("download failed: {0}")]
    Download(#[source] StoreError),

    #[error("staging temp file failed: {0}")]
    Stage(#[source] std::io::Error),

    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("encoding output failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("upload failed: {0}")]
    Upload(#[source] StoreError),
}

/// Fatal errors: nothing is processed after one of these.
#[derive(Error, Debug)]
pub enum RunError {
    /// bad path, credentials, or argument combination
    #[error("setup error: {0}")]
    Setup(String),

    #[error("listing '{prefix}' failed: {source}")]
    Listing {
        prefix: String,
        #[source]
        source: StoreError,
    },
}
