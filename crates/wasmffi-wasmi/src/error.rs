//! Host construction errors.

use thiserror::Error;
use wasmffi_types::MarshalError;

/// Errors raised while setting up a [`crate::WasmiHost`].
///
/// Failures during a call are reported as [`MarshalError`] instead.
#[derive(Debug, Error)]
pub enum WasmiError {
    #[error("wasmi: {0}")]
    Wasmi(#[from] wasmi::Error),

    #[error("link failed: {0}")]
    Link(String),

    /// The instance does not export something the host needs.
    #[error("missing export `{0}`")]
    MissingExport(String),

    /// The generated thunk module did not validate.
    #[error("thunk module failed validation: {0}")]
    ThunkValidation(String),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

pub type WasmiResult<T> = Result<T, WasmiError>;
