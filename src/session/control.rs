//! Control Dispatcher
//!
//! Processes reset requests for one link, strictly in submission order.
//! Every line change is sent to the handle owner as its own command, so a
//! reset interleaves with reads but never with another reset.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::reader::TransportController;
use crate::events::{EventSink, LogKind, NotificationEvent, Severity};
use crate::transport::ControlLine;

/// One control-line assignment within a reset sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetStep {
    pub line: ControlLine,
    pub level: bool,
}

impl ResetStep {
    pub const fn assert(line: ControlLine) -> Self {
        Self { line, level: true }
    }

    pub const fn deassert(line: ControlLine) -> Self {
        Self { line, level: false }
    }
}

impl std::fmt::Display for ResetStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = if self.level { "assert" } else { "deassert" };
        write!(f, "{} {}", verb, self.line)
    }
}

const RELEASE: [ResetStep; 2] = [
    ResetStep::deassert(ControlLine::Dtr),
    ResetStep::deassert(ControlLine::Rts),
];

const ENGAGE: [ResetStep; 2] = [
    ResetStep::assert(ControlLine::Dtr),
    ResetStep::assert(ControlLine::Rts),
];

/// Handle to a submitted reset
#[derive(Debug)]
pub struct ResetTicket {
    rx: oneshot::Receiver<Result<(), SessionError>>,
}

impl ResetTicket {
    /// Wait for the reset to finish. A reset dropped before it ran
    /// (the link went away) reports `NotConnected`.
    pub async fn outcome(self) -> Result<(), SessionError> {
        self.rx.await.unwrap_or(Err(SessionError::NotConnected))
    }
}

struct ResetRequest {
    reply: oneshot::Sender<Result<(), SessionError>>,
}

pub(crate) struct ControlDispatcher {
    tx: mpsc::UnboundedSender<ResetRequest>,
    closing: CancellationToken,
    task: JoinHandle<()>,
}

impl ControlDispatcher {
    pub fn spawn(controller: TransportController, sink: EventSink, settle: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let closing = CancellationToken::new();
        let task = tokio::spawn(dispatch_loop(rx, controller, sink, settle, closing.clone()));
        Self { tx, closing, task }
    }

    pub fn submit(&self) -> Result<ResetTicket, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ResetRequest { reply })
            .map_err(|_| SessionError::NotConnected)?;
        Ok(ResetTicket { rx })
    }

    /// Stop accepting work and wait for the in-flight reset, if any.
    /// Requests still queued are skipped.
    pub async fn shutdown(self) {
        self.closing.cancel();
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!("Control dispatcher task failed: {}", e);
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<ResetRequest>,
    controller: TransportController,
    sink: EventSink,
    settle: Duration,
    closing: CancellationToken,
) {
    while let Some(request) = rx.recv().await {
        if closing.is_cancelled() {
            warn!("Skipping queued reset, link is closing");
            let _ = sink.log(LogKind::Warning, "Restart skipped: disconnecting.");
            let _ = request.reply.send(Err(SessionError::NotConnected));
            continue;
        }

        let result = run_reset_sequence(&controller, settle).await;
        report_reset(&result, &sink);
        let _ = request.reply.send(result);
    }
    debug!("Control dispatcher stopped");
}

async fn run_reset_sequence(
    controller: &TransportController,
    settle: Duration,
) -> Result<(), SessionError> {
    apply(controller, &RELEASE).await?;
    tokio::time::sleep(settle).await;
    apply(controller, &ENGAGE).await
}

async fn apply(controller: &TransportController, steps: &[ResetStep]) -> Result<(), SessionError> {
    for step in steps {
        controller
            .set_control_line(step.line, step.level)
            .await
            .map_err(|source| SessionError::ControlFault { step: *step, source })?;
    }
    Ok(())
}

fn report_reset(result: &Result<(), SessionError>, sink: &EventSink) {
    match result {
        Ok(()) => {
            info!("Reset sequence completed");
            let _ = sink.log(
                LogKind::Success,
                "Restart signal sent. Device should be rebooting.",
            );
            let _ = sink.notify(NotificationEvent::app(
                "Device Control",
                "Restart signal sent successfully.",
                Severity::Information,
            ));
        }
        Err(e) => {
            warn!("Reset sequence failed: {}", e);
            let mut text = format!("Failed to send restart signal: {}", e);
            if let SessionError::ControlFault { step, .. } = e {
                if *step != RELEASE[0] {
                    text.push_str(" (control lines may be left deasserted)");
                }
            }
            let _ = sink.log(LogKind::Error, text);
            let _ = sink.notify(NotificationEvent::app(
                "Device Control",
                format!("Failed to send restart signal: {}", e),
                Severity::Error,
            ));
        }
    }
}
