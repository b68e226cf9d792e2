//! Transport Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Port not found: {0}")]
    NotFound(String),

    #[error("Invalid port settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("Transport closed")]
    Closed,

    #[error("Unexpected transport failure: {0}")]
    Unexpected(String),
}

impl TransportError {
    /// Whether the handle should be considered dead after this error.
    ///
    /// `Unexpected` covers failures that do not say anything about the
    /// link itself (driver quirks, bookkeeping bugs); everything else means
    /// the device or the OS handle is gone.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Unexpected(_))
    }
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => TransportError::NotFound(err.description),
            serialport::ErrorKind::InvalidInput => {
                TransportError::InvalidSettings(err.description)
            }
            serialport::ErrorKind::Io(kind) => {
                TransportError::Io(std::io::Error::new(kind, err.description))
            }
            _ => TransportError::Unexpected(err.description),
        }
    }
}

// Errors travel to the presentation layer as plain strings
impl serde::Serialize for TransportError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(TransportError::Closed.is_fatal());
        assert!(TransportError::Disconnected("unplugged".into()).is_fatal());
        assert!(TransportError::Io(std::io::Error::other("broken pipe")).is_fatal());
        assert!(!TransportError::Unexpected("driver hiccup".into()).is_fatal());
    }

    #[test]
    fn test_serialport_error_mapping() {
        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "no such port");
        assert!(matches!(
            TransportError::from(err),
            TransportError::NotFound(msg) if msg == "no such port"
        ));

        let err = serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud");
        assert!(matches!(
            TransportError::from(err),
            TransportError::InvalidSettings(_)
        ));
    }
}
