//! Serial Session
//!
//! Owns the connection lifecycle for one serial link: validates and opens
//! the port, starts the reader and control dispatcher, and tears everything
//! down again, whether the user asked for it or the reader hit a fault.
//!
//! The session is a cheap, cloneable handle. The reader thread only keeps a
//! weak reference, used to request a disconnect when it stops on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::control::{ControlDispatcher, ResetTicket};
use super::error::SessionError;
use super::reader::{spawn_reader, ReaderConfig, ReaderExit, ReaderOutcome};
use super::state::{SessionState, StateCell};
use crate::config::MonitorConfig;
use crate::events::{EventSink, LogKind, NotificationEvent, Severity};
use crate::transport::{NativeOpener, TransportError, TransportOpener};

/// Display time for connection failure notifications
const CONNECT_ERROR_TIMEOUT_SECS: u32 = 10;

/// Runtime knobs for a session, usually derived from `MonitorConfig`
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub read_timeout: Duration,
    pub reset_settle: Duration,
    pub notification_timeout_secs: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for SessionSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            reset_settle: config.reset_settle(),
            notification_timeout_secs: config.notification_timeout_secs,
        }
    }
}

/// The port and speed of the current link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    pub port_id: String,
    pub baud_rate: u32,
}

#[derive(Clone)]
pub struct SerialSession {
    shared: Arc<Shared>,
}

struct Shared {
    opener: Arc<dyn TransportOpener>,
    sink: EventSink,
    settings: SessionSettings,
    inner: Mutex<Inner>,
    /// Bumped on every connect so stale automatic disconnects can be told apart
    generation: AtomicU64,
}

struct Inner {
    state: StateCell,
    link: Option<ActiveLink>,
}

/// Everything that lives exactly as long as one successful connect
struct ActiveLink {
    generation: u64,
    info: LinkInfo,
    cancel: CancellationToken,
    reader: JoinHandle<ReaderOutcome>,
    control: ControlDispatcher,
    _guard: DropGuard,
}

impl SerialSession {
    pub fn new(opener: Arc<dyn TransportOpener>, sink: EventSink, settings: SessionSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                opener,
                sink,
                settings,
                inner: Mutex::new(Inner {
                    state: StateCell::new(),
                    link: None,
                }),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Session backed by the operating system's serial ports
    pub fn native(sink: EventSink, settings: SessionSettings) -> Self {
        Self::new(Arc::new(NativeOpener), sink, settings)
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state.get()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.inner.lock().state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Port and baud rate of the current link
    pub fn port(&self) -> Option<LinkInfo> {
        self.shared
            .inner
            .lock()
            .link
            .as_ref()
            .map(|link| link.info.clone())
    }

    /// Open `port_id` at `baud_rate` and start streaming.
    ///
    /// Only valid from `Idle`; a second call while a connect is running, or
    /// while connected, is rejected with `AlreadyInProgress`.
    pub async fn connect(
        &self,
        port_id: Option<&str>,
        baud_rate: Option<u32>,
    ) -> Result<LinkInfo, SessionError> {
        let shared = &self.shared;

        let (port_id, baud_rate) = match validate(port_id, baud_rate) {
            Ok(params) => params,
            Err(e) => {
                warn!("Connect rejected: {}", e);
                shared.report(
                    LogKind::Error,
                    "Port and Baud Rate must be selected.",
                    NotificationEvent::app(
                        "Connection Error",
                        "Port and Baud Rate must be selected.",
                        Severity::Warning,
                    ),
                );
                return Err(e);
            }
        };

        let (attempt, generation) = {
            let mut inner = shared.inner.lock();
            let current = inner.state.get();
            if current != SessionState::Idle {
                warn!("Connect to {} rejected, session is {}", port_id, current);
                let text = match &inner.link {
                    Some(link) => format!("Already connected to {}.", link.info.port_id),
                    None => "A connection change is already in progress.".to_string(),
                };
                shared.report_busy(text);
                return Err(SessionError::AlreadyInProgress);
            }
            inner.state.transition(SessionState::Connecting);
            let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (ConnectAttempt::new(shared), generation)
        };

        info!("Connecting to {} at {} bps", port_id, baud_rate);
        let _ = shared.sink.log(
            LogKind::Status,
            format!("Attempting to connect to {} at {} bps...", port_id, baud_rate),
        );

        let opener = shared.opener.clone();
        let read_timeout = shared.settings.read_timeout;
        let id = port_id.clone();
        let opened = tokio::task::spawn_blocking(move || opener.open(&id, baud_rate, read_timeout))
            .await
            .unwrap_or_else(|e| Err(TransportError::Unexpected(format!("open task failed: {}", e))));

        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                drop(attempt);
                error!("Failed to open {}: {}", port_id, e);
                shared.report(
                    LogKind::Error,
                    format!("Connection failed: {}", e),
                    NotificationEvent::app(
                        "Connection Error",
                        format!("Failed to connect: {}", e),
                        Severity::Error,
                    )
                    .with_timeout(CONNECT_ERROR_TIMEOUT_SECS),
                );
                return Err(SessionError::ConnectionFailed(e));
            }
        };

        let info = LinkInfo { port_id, baud_rate };
        let mut inner = shared.inner.lock();
        attempt.disarm();
        inner.state.transition(SessionState::Connected);

        info!("Connected to {}", info.port_id);
        shared.report(
            LogKind::Success,
            format!("Successfully connected to {}", info.port_id),
            NotificationEvent::app(
                "Connected",
                format!("Connected to {}", info.port_id),
                Severity::Information,
            ),
        );

        let cancel = CancellationToken::new();
        let (controller, reader) = spawn_reader(
            transport,
            ReaderConfig {
                read_timeout,
                notification_timeout_secs: shared.settings.notification_timeout_secs,
            },
            shared.sink.clone(),
            cancel.clone(),
            disconnect_on_exit(Arc::downgrade(shared), generation),
        );
        let control = ControlDispatcher::spawn(
            controller,
            shared.sink.clone(),
            shared.settings.reset_settle,
        );

        inner.link = Some(ActiveLink {
            generation,
            info: info.clone(),
            _guard: cancel.clone().drop_guard(),
            cancel,
            reader,
            control,
        });
        Ok(info)
    }

    /// Stop the reader, close the port and return to `Idle`.
    ///
    /// Disconnecting an idle session does nothing. A disconnect that overlaps
    /// another one waits for it and reports nothing itself. A close error is
    /// returned, but the session still ends up `Idle`.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.teardown(None).await
    }

    /// Queue a reset sequence (DTR/RTS pulse) on the current link
    pub fn reset(&self) -> Result<ResetTicket, SessionError> {
        let inner = self.shared.inner.lock();
        let link = match inner.link.as_ref() {
            Some(link) if inner.state.get().accepts_control() => link,
            _ => {
                warn!("Reset rejected, session is {}", inner.state.get());
                self.shared.report(
                    LogKind::Warning,
                    "Cannot restart: Not connected.",
                    NotificationEvent::app(
                        "Device Control",
                        "Cannot restart: Not connected.",
                        Severity::Warning,
                    ),
                );
                return Err(SessionError::NotConnected);
            }
        };

        info!("Reset requested on {}", link.info.port_id);
        self.shared.report(
            LogKind::Status,
            "Sending restart signal to device...",
            NotificationEvent::app("Device Control", "Sending restart signal...", Severity::Information),
        );
        link.control.submit()
    }

    /// Shared disconnect path. `expected` is set for automatic requests and
    /// names the link generation that asked for it.
    async fn teardown(&self, expected: Option<u64>) -> Result<(), SessionError> {
        let step = {
            let mut inner = self.shared.inner.lock();
            match inner.state.get() {
                SessionState::Idle => Teardown::Done(Ok(())),
                SessionState::Connecting if expected.is_some() => Teardown::Done(Ok(())),
                SessionState::Connecting => {
                    warn!("Disconnect rejected, connection attempt in progress");
                    self.shared
                        .report_busy("Cannot disconnect while a connection attempt is in progress.");
                    Teardown::Done(Err(SessionError::AlreadyInProgress))
                }
                SessionState::Disconnecting if expected.is_some() => Teardown::Done(Ok(())),
                SessionState::Disconnecting => Teardown::Wait(inner.state.subscribe()),
                SessionState::Connected => {
                    let current = inner.link.as_ref().map(|link| link.generation);
                    if expected.is_some() && expected != current {
                        debug!("Ignoring stale disconnect request for link {:?}", expected);
                        Teardown::Done(Ok(()))
                    } else if let Some(link) = inner.link.take() {
                        inner.state.transition(SessionState::Disconnecting);
                        Teardown::Close(link)
                    } else {
                        error!("Session connected without an active link");
                        Teardown::Done(Ok(()))
                    }
                }
            }
        };

        match step {
            Teardown::Done(result) => result,
            Teardown::Wait(mut state_rx) => {
                debug!("Disconnect already running, waiting for it");
                let _ = state_rx
                    .wait_for(|state| *state != SessionState::Disconnecting)
                    .await;
                Ok(())
            }
            Teardown::Close(link) => {
                // Run to completion even if the caller stops waiting
                let shared = self.shared.clone();
                match tokio::spawn(async move { shared.close_link(link).await }).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Disconnect task failed: {}", e);
                        self.shared.inner.lock().state.transition(SessionState::Idle);
                        Err(SessionError::CloseFault(TransportError::Unexpected(e.to_string())))
                    }
                }
            }
        }
    }
}

/// What a disconnect request turns into once the state has been inspected
enum Teardown {
    Done(Result<(), SessionError>),
    Wait(watch::Receiver<SessionState>),
    Close(ActiveLink),
}

impl Shared {
    /// Emit a log line and a notification, in that order
    fn report(&self, kind: LogKind, text: impl Into<String>, notification: NotificationEvent) {
        if self.sink.log(kind, text).is_err() || self.sink.notify(notification).is_err() {
            debug!("Event stream closed, dropping report");
        }
    }

    /// Report a request refused because another lifecycle change is running
    fn report_busy(&self, text: impl Into<String>) {
        let text = text.into();
        self.report(
            LogKind::Warning,
            text.clone(),
            NotificationEvent::app("Connection Busy", text, Severity::Warning),
        );
    }

    async fn close_link(&self, link: ActiveLink) -> Result<(), SessionError> {
        let ActiveLink {
            info,
            cancel,
            reader,
            control,
            ..
        } = link;
        info!("Disconnecting from {}", info.port_id);

        // In-flight reset finishes first, then the reader releases the handle
        control.shutdown().await;
        cancel.cancel();

        let closed = match reader.await {
            Ok(ReaderOutcome { mut transport, exit }) => {
                debug!("Reader for {} exited: {:?}", info.port_id, exit);
                tokio::task::spawn_blocking(move || transport.close())
                    .await
                    .unwrap_or_else(|e| Err(TransportError::Unexpected(e.to_string())))
            }
            Err(e) => Err(TransportError::Unexpected(format!("reader task failed: {}", e))),
        };

        let result = match closed {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Error closing {}: {}", info.port_id, e);
                self.report(
                    LogKind::Error,
                    format!("Error closing port: {}", e),
                    NotificationEvent::app(
                        "Disconnect Error",
                        format!("Error closing port: {}", e),
                        Severity::Error,
                    ),
                );
                Err(SessionError::CloseFault(e))
            }
        };

        self.report(
            LogKind::Status,
            "Disconnected.",
            NotificationEvent::app("Disconnected", "Disconnected from serial port.", Severity::Information),
        );
        self.inner.lock().state.transition(SessionState::Idle);
        info!("Disconnected from {}", info.port_id);
        result
    }
}

/// Reader exit hook: ask the session to tear the link down unless the
/// reader was cancelled by a disconnect already under way.
fn disconnect_on_exit(
    shared: Weak<Shared>,
    generation: u64,
) -> impl FnOnce(&ReaderExit) + Send + 'static {
    let runtime = tokio::runtime::Handle::current();
    move |exit: &ReaderExit| {
        if !exit.requires_disconnect() {
            return;
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        runtime.spawn(async move {
            let session = SerialSession { shared };
            if let Err(e) = session.teardown(Some(generation)).await {
                warn!("Automatic disconnect finished with error: {}", e);
            }
        });
    }
}

fn validate(port_id: Option<&str>, baud_rate: Option<u32>) -> Result<(String, u32), SessionError> {
    let port_id = port_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SessionError::InvalidParameters("no port selected".to_string()))?;
    let baud_rate = baud_rate
        .filter(|baud| *baud > 0)
        .ok_or_else(|| SessionError::InvalidParameters("no baud rate selected".to_string()))?;
    Ok((port_id.to_string(), baud_rate))
}

/// Puts the session back to `Idle` if a connect is abandoned before it
/// finishes (open failed or the caller dropped the future).
struct ConnectAttempt<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl<'a> ConnectAttempt<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self { shared, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.shared.inner.lock();
        if inner.state.get() == SessionState::Connecting {
            inner.state.transition(SessionState::Idle);
        }
    }
}
