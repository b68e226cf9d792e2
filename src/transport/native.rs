//! Native serial port handle
//!
//! Wraps `serialport` to provide line framing on top of its raw byte reads.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;

use super::{ControlLine, SerialTransport, TransportError, TransportOpener};

/// Upper bound for a single framed line. A device that never sends `\n`
/// still gets its output delivered in chunks of this size.
const MAX_LINE: usize = 4096;

/// Opens OS serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOpener;

impl TransportOpener for NativeOpener {
    fn open(
        &self,
        port_id: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialTransport>, TransportError> {
        if baud_rate == 0 {
            return Err(TransportError::InvalidSettings(
                "baud rate must be positive".to_string(),
            ));
        }

        let port = serialport::new(port_id, baud_rate)
            .timeout(read_timeout)
            .open()?;

        tracing::info!("Opened serial port {} at {} bps", port_id, baud_rate);
        Ok(Box::new(NativeSerialPort::new(port_id, port)))
    }
}

/// An open OS serial port with a line buffer
pub struct NativeSerialPort {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl NativeSerialPort {
    pub fn new(name: impl Into<String>, port: Box<dyn SerialPort>) -> Self {
        Self {
            name: name.into(),
            port: Some(port),
            pending: Vec::new(),
        }
    }
}

impl SerialTransport for NativeSerialPort {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;

        if let Some(line) = take_line(&mut self.pending) {
            return Ok(Some(line));
        }

        // Each read only gets what is left of the budget, so a trickle of
        // bytes cannot stretch one call past `timeout`
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 1024];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            port.set_timeout(remaining)?;

            match port.read(&mut chunk) {
                Ok(0) => {
                    // poll reported readiness but there is nothing to read
                    return Err(TransportError::Disconnected(
                        "device reports readiness to read but returned no data".to_string(),
                    ));
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if let Some(line) = take_line(&mut self.pending) {
                        return Ok(Some(line));
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::Io(e)),
            }
        }

        if self.pending.is_empty() {
            Ok(None)
        } else {
            Ok(Some(std::mem::take(&mut self.pending)))
        }
    }

    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        match line {
            ControlLine::Dtr => port.write_data_terminal_ready(level)?,
            ControlLine::Rts => port.write_request_to_send(level)?,
        }
        tracing::debug!("{} {} -> {}", self.name, line, level);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the port releases the OS handle even if the flush fails
        match self.port.take() {
            Some(mut port) => {
                let flushed = port.flush();
                drop(port);
                self.pending.clear();
                tracing::info!("Closed serial port {}", self.name);
                flushed.map_err(TransportError::Io)
            }
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Split the first `\n`-terminated line (terminator included) off `buf`.
/// An oversized buffer without a terminator is released whole.
fn take_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let rest = buf.split_off(pos + 1);
        return Some(std::mem::replace(buf, rest));
    }
    if buf.len() >= MAX_LINE {
        return Some(std::mem::take(buf));
    }
    None
}
