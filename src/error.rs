//! Error types for the verification workflow.
//!
//! - [`ServiceError`] covers everything that can go wrong talking to the
//!   remote sheet service.
//! - [`ValidationError`] covers local preconditions checked before anything
//!   is sent.
//! - [`VerifyError`] is what an operator action returns: every failure is
//!   surfaced to the action that caused it, with the underlying message.
//!
//! Every error reports a stable [`ErrorCategory`] used as a log field and a
//! metrics label.

use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Coarse classification for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Transport,
    Protocol,
    Application,
    UpdateRejected,
    Validation,
    Busy,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// The service answered with something that is not the expected envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The endpoint returned an HTML page, which is what the script host
    /// serves when the backend is not published as a public web app.
    #[error(
        "the service returned a web page instead of data; make sure the script is deployed as a web app with access for everyone"
    )]
    NotDeployed,
    #[error("invalid response from server")]
    InvalidBody,
    #[error("unexpected response payload: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// `success: false` from the backend; the message is passed through.
    #[error("{0}")]
    Application(String),
    #[error("the service did not confirm the update")]
    UpdateRejected,
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Transport(_) | ServiceError::Status(_) => ErrorCategory::Transport,
            ServiceError::Protocol(_) => ErrorCategory::Protocol,
            ServiceError::Application(_) => ErrorCategory::Application,
            ServiceError::UpdateRejected => ErrorCategory::UpdateRejected,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => ServiceError::Status(status.as_u16()),
            None => ServiceError::Transport(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("select a record first")]
    NoRecordSelected,
    #[error("enable verification before saving")]
    VerificationNotEnabled,
    #[error("'{input}' is not a valid number")]
    InvalidNumber { input: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("a save is already in progress")]
    SaveInProgress,
    #[error("could not save: {0}")]
    SaveFailed(#[source] ServiceError),
    #[error("could not load sheet data; verify the API URL or the connection. Detail: {0}")]
    LoadFailed(#[source] ServiceError),
}

impl VerifyError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            VerifyError::Validation(_) => ErrorCategory::Validation,
            VerifyError::SaveInProgress => ErrorCategory::Busy,
            VerifyError::SaveFailed(source) | VerifyError::LoadFailed(source) => source.category(),
        }
    }
}
