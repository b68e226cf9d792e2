//! Reader Loop / Handle Owner
//!
//! This module implements the "single owner" pattern for the serial handle.
//!
//! # Architecture
//!
//! Once a port is open, exactly one blocking thread owns the
//! `Box<dyn SerialTransport>`. It alternates between reading a line (bounded
//! by the read timeout) and executing control-line commands that other
//! components send through a `TransportController`. Reads, control writes
//! and close can therefore never overlap.
//!
//! When the thread exits it hands the handle back through its `JoinHandle`,
//! and the disconnect path closes it.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::SessionError;
use crate::events::{EventSink, LogKind, NotificationEvent, Severity, SinkClosed};
use crate::transport::{ControlLine, SerialTransport, TransportError};

/// Dotted quad of 1-3 digit groups. Syntactic only: `999.999.999.999` matches.
static ADDRESS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").ok());

/// Commands executed by the owner thread between reads
pub(crate) enum OwnerCommand {
    SetControlLine {
        line: ControlLine,
        level: bool,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// Sends commands to the thread that owns the handle
#[derive(Clone)]
pub(crate) struct TransportController {
    cmd_tx: mpsc::UnboundedSender<OwnerCommand>,
}

impl TransportController {
    /// Drive a control line. Waits at most one read interval for the owner
    /// to pick the command up; fails with `Closed` once the owner is gone.
    pub async fn set_control_line(&self, line: ControlLine, level: bool) -> Result<(), TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(OwnerCommand::SetControlLine {
                line,
                level,
                reply: reply_tx,
            })
            .map_err(|_| TransportError::Closed)?;
        reply_rx.await.map_err(|_| TransportError::Closed)?
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ReaderConfig {
    pub read_timeout: Duration,
    pub notification_timeout_secs: u32,
}

/// Why the reader stopped
#[derive(Debug)]
pub(crate) enum ReaderExit {
    /// Cancellation was observed; nothing is reported
    Cancelled,
    /// Nobody is listening to the event stream any more
    SinkClosed,
    /// The device or OS handle failed
    Fault(SessionError),
    /// A failure that says nothing about the link itself
    Unexpected(SessionError),
}

impl ReaderExit {
    /// Whether the session has to be torn down after this exit
    pub fn requires_disconnect(&self) -> bool {
        !matches!(self, ReaderExit::Cancelled)
    }
}

/// What the owner thread hands back when it stops
pub(crate) struct ReaderOutcome {
    pub transport: Box<dyn SerialTransport>,
    pub exit: ReaderExit,
}

/// Spawn the owner thread.
///
/// `on_exit` runs on the owner thread after the loop has stopped, queued
/// commands have been failed and every exit report has been emitted, but
/// before the handle is returned.
pub(crate) fn spawn_reader<F>(
    transport: Box<dyn SerialTransport>,
    config: ReaderConfig,
    sink: EventSink,
    cancel: CancellationToken,
    on_exit: F,
) -> (TransportController, JoinHandle<ReaderOutcome>)
where
    F: FnOnce(&ReaderExit) + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = tokio::task::spawn_blocking(move || {
        let mut transport = transport;
        let mut cmd_rx = cmd_rx;
        let exit = read_loop(&mut *transport, &config, &sink, &cancel, &mut cmd_rx);

        drain_pending_commands(&mut cmd_rx);
        report_exit(&exit, transport.name(), &sink);
        on_exit(&exit);

        ReaderOutcome { transport, exit }
    });

    (TransportController { cmd_tx }, handle)
}

fn read_loop(
    transport: &mut dyn SerialTransport,
    config: &ReaderConfig,
    sink: &EventSink,
    cancel: &CancellationToken,
    cmd_rx: &mut mpsc::UnboundedReceiver<OwnerCommand>,
) -> ReaderExit {
    info!("Reader started for {}", transport.name());

    loop {
        if cancel.is_cancelled() {
            debug!("Reader for {} cancelled", transport.name());
            return ReaderExit::Cancelled;
        }

        while let Ok(cmd) = cmd_rx.try_recv() {
            execute(transport, cmd);
        }

        match transport.read_line(config.read_timeout) {
            Ok(None) => continue,
            Ok(Some(bytes)) => {
                // Data that raced with cancellation is dropped
                if cancel.is_cancelled() {
                    debug!("Reader for {} cancelled mid-read", transport.name());
                    return ReaderExit::Cancelled;
                }
                if forward_line(&bytes, sink, config.notification_timeout_secs).is_err() {
                    return ReaderExit::SinkClosed;
                }
            }
            Err(e) if e.is_fatal() => return ReaderExit::Fault(SessionError::TransportFault(e)),
            Err(e) => return ReaderExit::Unexpected(SessionError::TransportFault(e)),
        }
    }
}

fn execute(transport: &mut dyn SerialTransport, cmd: OwnerCommand) {
    match cmd {
        OwnerCommand::SetControlLine { line, level, reply } => {
            let result = transport.set_control_line(line, level);
            if reply.send(result).is_err() {
                warn!("Caller dropped before receiving {} result", line);
            }
        }
    }
}

/// Fail every command still queued; the receiver is closed first so
/// nothing new can slip in.
fn drain_pending_commands(cmd_rx: &mut mpsc::UnboundedReceiver<OwnerCommand>) {
    cmd_rx.close();
    while let Ok(cmd) = cmd_rx.try_recv() {
        match cmd {
            OwnerCommand::SetControlLine { reply, .. } => {
                let _ = reply.send(Err(TransportError::Closed));
            }
        }
    }
}

fn report_exit(exit: &ReaderExit, port: &str, sink: &EventSink) {
    match exit {
        ReaderExit::Cancelled => {}
        ReaderExit::SinkClosed => {
            warn!("Event stream closed, reader for {} stopping", port);
        }
        ReaderExit::Fault(e) => {
            error!("Reader for {} stopped: {}", port, e);
            let _ = sink.log(LogKind::Error, "Error: Device disconnected or port error.");
            let _ = sink.notify(NotificationEvent::app(
                "Connection Lost",
                "Device disconnected or port error.",
                Severity::Error,
            ));
        }
        ReaderExit::Unexpected(e) => {
            error!("Reader for {} hit an unexpected error: {}", port, e);
            let _ = sink.log(
                LogKind::Error,
                format!("An unexpected error occurred in reader thread: {}", e),
            );
            let _ = sink.notify(NotificationEvent::app(
                "Worker Error",
                "An error occurred while reading.",
                Severity::Error,
            ));
        }
    }
}

/// Decode a raw line and push it to the sink, plus an address notification
/// when the line carries something that looks like an IPv4 address.
pub(crate) fn forward_line(
    bytes: &[u8],
    sink: &EventSink,
    notification_timeout_secs: u32,
) -> Result<(), SinkClosed> {
    let decoded = String::from_utf8_lossy(bytes);
    let text = decoded.trim();
    if text.is_empty() {
        return Ok(());
    }

    sink.log(LogKind::Device, text)?;

    if let Some(address) = find_address(text) {
        debug!("Address detected in device output: {}", address);
        sink.notify(NotificationEvent::desktop(
            "IP Address Detected",
            format!("Device reported IP: {}", address),
            Severity::Information,
            notification_timeout_secs,
        ))?;
    }
    Ok(())
}

/// First dotted-quad in `line`, if any
pub fn find_address(line: &str) -> Option<&str> {
    ADDRESS_PATTERN
        .as_ref()?
        .find(line)
        .map(|m| m.as_str())
}
