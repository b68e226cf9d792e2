//! Session Error types

use thiserror::Error;

use super::control::ResetStep;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Another connect or disconnect is already in progress")]
    AlreadyInProgress,

    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] TransportError),

    #[error("Transport fault: {0}")]
    TransportFault(#[source] TransportError),

    #[error("Failed to {step}: {source}")]
    ControlFault {
        step: ResetStep,
        #[source]
        source: TransportError,
    },

    #[error("Error closing port: {0}")]
    CloseFault(#[source] TransportError),
}

// Errors travel to the presentation layer as plain strings
impl serde::Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
