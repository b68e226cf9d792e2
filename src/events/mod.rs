//! Monitor Event System
//!
//! Background work (reader thread, control dispatcher, session transitions)
//! never touches presentation state. Everything user-visible is pushed as a
//! `MonitorEvent` through the `EventSink` and drained by the presentation
//! loop in production order.

pub mod notifier;
pub mod sink;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub use notifier::{DesktopNotifier, NotifyError, SystemNotifier};
pub use sink::{EventSink, EventStream, SinkClosed};

/// Timestamp format used when rendering log lines (millisecond precision)
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

/// Category of a log line, used by renderers for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogKind {
    /// A line received from the device
    Device,
    /// Lifecycle progress ("Attempting to connect...")
    Status,
    Success,
    Warning,
    Error,
}

/// A timestamped line for the log view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub kind: LogKind,
    pub text: String,
}

impl LogEvent {
    pub fn new(kind: LogKind, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            text: text.into(),
        }
    }

    /// `HH:MM:SS.mmm text`
    pub fn render(&self) -> String {
        format!("{} {}", self.timestamp.format(TIMESTAMP_FORMAT), self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Information,
    Warning,
    Error,
}

/// Where a notification should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationTarget {
    /// In-app toast
    App,
    /// OS-level notification, delivered best-effort
    Desktop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub target: NotificationTarget,
    /// Display time in seconds; `None` leaves it to the renderer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

impl NotificationEvent {
    pub fn app(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            target: NotificationTarget::App,
            timeout_secs: None,
        }
    }

    pub fn desktop(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        timeout_secs: u32,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            target: NotificationTarget::Desktop,
            timeout_secs: Some(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Everything the presentation layer receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    Log(LogEvent),
    Notification(NotificationEvent),
}

impl MonitorEvent {
    pub fn as_log(&self) -> Option<&LogEvent> {
        match self {
            MonitorEvent::Log(log) => Some(log),
            MonitorEvent::Notification(_) => None,
        }
    }

    pub fn as_notification(&self) -> Option<&NotificationEvent> {
        match self {
            MonitorEvent::Notification(n) => Some(n),
            MonitorEvent::Log(_) => None,
        }
    }
}
