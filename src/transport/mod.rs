//! Serial transport layer
//!
//! Defines the handle abstraction the session core drives, plus the native
//! implementation on top of the `serialport` crate and port discovery.
//!
//! A transport handle is never shared: the session hands it to the reader
//! thread, which becomes its only owner until the link is torn down.

pub mod discovery;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;
pub mod native;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use discovery::{available_ports, preferred_port, PortInfo};
pub use error::TransportError;
pub use native::{NativeOpener, NativeSerialPort};

/// Hardware control lines that can be driven independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlLine {
    /// Data Terminal Ready
    Dtr,
    /// Request To Send
    Rts,
}

impl std::fmt::Display for ControlLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlLine::Dtr => write!(f, "DTR"),
            ControlLine::Rts => write!(f, "RTS"),
        }
    }
}

/// An open, bidirectional serial handle
pub trait SerialTransport: Send {
    /// Read one `\n`-terminated line.
    ///
    /// Returns `Ok(None)` when `timeout` expires with no data. Bytes received
    /// before the timeout without a terminator are returned as a partial line.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Drive a control line high (`true`) or low (`false`)
    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<(), TransportError>;

    /// Close the handle. Later calls on a closed handle fail with `Closed`.
    fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Identifier the handle was opened with (e.g. `/dev/ttyUSB0`, `COM3`)
    fn name(&self) -> &str;
}

/// Opens transport handles by identifier
pub trait TransportOpener: Send + Sync {
    fn open(
        &self,
        port_id: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialTransport>, TransportError>;
}
