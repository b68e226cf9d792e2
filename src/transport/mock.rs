//! Scripted in-memory transport for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{ControlLine, SerialTransport, TransportError, TransportOpener};

/// What the next `read_line` call yields
pub(crate) enum MockRead {
    Line(Vec<u8>),
    Fault(String),
    Unexpected(String),
}

/// Operations observed on a handle, in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockOp {
    SetLine(ControlLine, bool),
    Close,
}

/// Shared state behind every handle a `MockOpener` hands out
#[derive(Default)]
pub(crate) struct MockDevice {
    incoming: Mutex<VecDeque<MockRead>>,
    ops: Mutex<Vec<MockOp>>,
    open_handles: AtomicUsize,
    max_open_handles: AtomicUsize,
    total_opens: AtomicUsize,
    open_error: Mutex<Option<String>>,
    close_error: Mutex<Option<String>>,
    /// Number of control-line writes that succeed before the next one fails
    set_line_budget: Mutex<Option<usize>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_line(&self, line: &str) {
        self.push_bytes(format!("{}\r\n", line).as_bytes());
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.incoming.lock().push_back(MockRead::Line(bytes.to_vec()));
    }

    pub fn push_fault(&self, msg: &str) {
        self.incoming.lock().push_back(MockRead::Fault(msg.to_string()));
    }

    pub fn push_unexpected(&self, msg: &str) {
        self.incoming
            .lock()
            .push_back(MockRead::Unexpected(msg.to_string()));
    }

    pub fn fail_open(&self, msg: &str) {
        *self.open_error.lock() = Some(msg.to_string());
    }

    pub fn fail_close(&self, msg: &str) {
        *self.close_error.lock() = Some(msg.to_string());
    }

    pub fn fail_set_line_after(&self, successes: usize) {
        *self.set_line_budget.lock() = Some(successes);
    }

    pub fn ops(&self) -> Vec<MockOp> {
        self.ops.lock().clone()
    }

    pub fn set_line_ops(&self) -> Vec<(ControlLine, bool)> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                MockOp::SetLine(line, level) => Some((*line, *level)),
                MockOp::Close => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.ops.lock().iter().filter(|op| **op == MockOp::Close).count()
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn max_open_handles(&self) -> usize {
        self.max_open_handles.load(Ordering::SeqCst)
    }

    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockOpener {
    device: Arc<MockDevice>,
}

impl MockOpener {
    pub fn new(device: Arc<MockDevice>) -> Self {
        Self { device }
    }
}

impl TransportOpener for MockOpener {
    fn open(
        &self,
        port_id: &str,
        baud_rate: u32,
        _read_timeout: Duration,
    ) -> Result<Box<dyn SerialTransport>, TransportError> {
        if let Some(msg) = self.device.open_error.lock().clone() {
            return Err(TransportError::NotFound(msg));
        }
        if baud_rate == 0 {
            return Err(TransportError::InvalidSettings("baud rate".to_string()));
        }

        let now_open = self.device.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.device
            .max_open_handles
            .fetch_max(now_open, Ordering::SeqCst);
        self.device.total_opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockTransport {
            device: self.device.clone(),
            name: port_id.to_string(),
            open: true,
        }))
    }
}

pub(crate) struct MockTransport {
    device: Arc<MockDevice>,
    name: String,
    open: bool,
}

impl SerialTransport for MockTransport {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let next = self.device.incoming.lock().pop_front();
        match next {
            Some(MockRead::Line(bytes)) => Ok(Some(bytes)),
            Some(MockRead::Fault(msg)) => Err(TransportError::Disconnected(msg)),
            Some(MockRead::Unexpected(msg)) => Err(TransportError::Unexpected(msg)),
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn set_control_line(&mut self, line: ControlLine, level: bool) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        {
            let mut budget = self.device.set_line_budget.lock();
            match budget.as_mut() {
                Some(0) => {
                    return Err(TransportError::Io(std::io::Error::other(
                        "control line write failed",
                    )))
                }
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.device.ops.lock().push(MockOp::SetLine(line, level));
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.device.release();
        self.device.ops.lock().push(MockOp::Close);
        match self.device.close_error.lock().clone() {
            Some(msg) => Err(TransportError::Io(std::io::Error::other(msg))),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if self.open {
            self.device.release();
        }
    }
}
