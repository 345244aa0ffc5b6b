//! Errors raised by the editing session.
//!
//! Everything except [`SessionError::Transport`] is caught before a request is
//! dispatched and never reaches the remote service.

use thiserror::Error;

use super::state::{Operation, Stage};
use crate::client::client::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The selected carrier is not of the supported container type.
    #[error("Please select a carrier image of type {expected} (got {mime}).")]
    UnsupportedImage { expected: String, mime: String },

    /// Embed was submitted with nothing admitted.
    #[error("Please select at least one file to embed.")]
    EmptySelection,

    /// Extraction requested on a carrier with no payload.
    #[error("The carrier image has no embedded files.")]
    NotCoded,

    /// The same operation is already waiting on the service.
    #[error("{0} already in progress")]
    OperationInFlight(Operation),

    /// The operation is not available in the current stage.
    #[error("cannot {operation} while session is {stage}")]
    InvalidTransition { operation: Operation, stage: Stage },

    /// The request never produced a usable response.
    #[error("{operation} failed: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: TransportError,
    },
}

impl SessionError {
    /// Pre-flight failures are shown as blocking warnings.
    pub fn is_preflight(&self) -> bool {
        !matches!(self, SessionError::Transport { .. })
    }
}
