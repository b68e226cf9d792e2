//! Event Sink
//!
//! Ordered, thread-safe channel from background work to the presentation
//! loop. Unbounded so that the reader thread never blocks on a slow
//! renderer; the presentation loop drains it on its own schedule.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::notifier::DesktopNotifier;
use super::{LogEvent, LogKind, MonitorEvent, NotificationEvent, NotificationTarget};

/// The receiving side of the sink has been dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event stream closed")]
pub struct SinkClosed;

/// Producer handle, cheap to clone into background tasks
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<MonitorEvent>,
    desktop: Option<mpsc::UnboundedSender<NotificationEvent>>,
}

impl EventSink {
    /// Create a connected sink/stream pair with no desktop notifier
    pub fn channel() -> (EventSink, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink { tx, desktop: None }, EventStream { rx })
    }

    /// Deliver `Desktop` notifications through `notifier` as well.
    ///
    /// Delivery runs on its own blocking thread, so a slow notification
    /// tool never holds up the caller of `notify`. Must be called from
    /// within a tokio runtime.
    pub fn with_desktop_notifier(mut self, notifier: Arc<dyn DesktopNotifier>) -> Self {
        let (desktop_tx, desktop_rx) = mpsc::unbounded_channel();
        let events = self.tx.clone();
        tokio::task::spawn_blocking(move || relay_desktop(desktop_rx, notifier, events));
        self.desktop = Some(desktop_tx);
        self
    }

    pub fn emit(&self, event: MonitorEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).map_err(|_| SinkClosed)
    }

    pub fn log(&self, kind: LogKind, text: impl Into<String>) -> Result<(), SinkClosed> {
        self.emit(MonitorEvent::Log(LogEvent::new(kind, text)))
    }

    /// Queue a notification. `Desktop` notifications are additionally handed
    /// to the desktop notifier, if one is installed; a failed delivery is
    /// reported later as a warning line and otherwise ignored.
    pub fn notify(&self, notification: NotificationEvent) -> Result<(), SinkClosed> {
        let desktop = match (&self.desktop, notification.target) {
            (Some(desktop), NotificationTarget::Desktop) => Some(desktop),
            _ => None,
        };

        match desktop {
            Some(desktop) => {
                self.emit(MonitorEvent::Notification(notification.clone()))?;
                if desktop.send(notification).is_err() {
                    tracing::warn!("Desktop notification relay stopped");
                }
                Ok(())
            }
            None => self.emit(MonitorEvent::Notification(notification)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Desktop delivery loop. Ends once every sink holding the relay is gone.
fn relay_desktop(
    mut rx: mpsc::UnboundedReceiver<NotificationEvent>,
    notifier: Arc<dyn DesktopNotifier>,
    events: mpsc::UnboundedSender<MonitorEvent>,
) {
    while let Some(notification) = rx.blocking_recv() {
        if let Err(e) = notifier.deliver(
            &notification.title,
            &notification.message,
            notification.severity,
            notification.timeout_secs,
        ) {
            tracing::warn!("Desktop notification failed: {}", e);
            let warning = LogEvent::new(LogKind::Warning, format!("System notification failed: {}", e));
            if events.send(MonitorEvent::Log(warning)).is_err() {
                break;
            }
        }
    }
    tracing::debug!("Desktop notification relay stopped");
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.tx.is_closed())
            .field("has_desktop_notifier", &self.desktop.is_some())
            .finish()
    }
}

/// Consumer side, owned by the presentation loop
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<MonitorEvent>,
}

impl EventStream {
    /// Wait for the next event; `None` once every sink is dropped
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        self.rx.recv().await
    }

    /// Take everything currently queued
    pub fn drain(&mut self) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NotifyError, Severity};
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    struct RecordingNotifier {
        delivered: Mutex<Vec<String>>,
        fail: bool,
        delay: Duration,
    }

    impl DesktopNotifier for RecordingNotifier {
        fn deliver(
            &self,
            title: &str,
            _message: &str,
            _severity: Severity,
            _timeout_secs: Option<u32>,
        ) -> Result<(), NotifyError> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(NotifyError::Unavailable("no notification daemon".into()));
            }
            self.delivered.lock().push(title.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, mut stream) = EventSink::channel();
        sink.log(LogKind::Status, "one").unwrap();
        sink.notify(NotificationEvent::app("t", "two", Severity::Information))
            .unwrap();
        sink.log(LogKind::Device, "three").unwrap();

        let events = stream.drain();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_log().unwrap().text, "one");
        assert_eq!(events[1].as_notification().unwrap().message, "two");
        assert_eq!(events[2].as_log().unwrap().text, "three");
    }

    #[test]
    fn test_closed_stream_reports_error() {
        let (sink, stream) = EventSink::channel();
        drop(stream);
        assert!(sink.is_closed());
        assert_eq!(sink.log(LogKind::Status, "lost"), Err(SinkClosed));
    }

    async fn next_event(stream: &mut EventStream) -> MonitorEvent {
        tokio::time::timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("event not delivered in time")
            .unwrap()
    }

    #[tokio::test]
    async fn test_desktop_notification_delivered() {
        let notifier = Arc::new(RecordingNotifier {
            delivered: Mutex::new(Vec::new()),
            fail: false,
            delay: Duration::ZERO,
        });
        let (sink, mut stream) = EventSink::channel();
        let sink = sink.with_desktop_notifier(notifier.clone());

        sink.notify(NotificationEvent::desktop("IP", "10.0.0.5", Severity::Information, 10))
            .unwrap();
        // App notifications never reach the desktop
        sink.notify(NotificationEvent::app("Status", "ok", Severity::Information))
            .unwrap();
        assert_eq!(stream.drain().len(), 2);

        // Dropping the last sink stops the relay after it has drained its queue
        drop(sink);
        assert!(stream.recv().await.is_none());
        assert_eq!(*notifier.delivered.lock(), vec!["IP".to_string()]);
    }

    #[tokio::test]
    async fn test_desktop_failure_becomes_warning_log() {
        let notifier = Arc::new(RecordingNotifier {
            delivered: Mutex::new(Vec::new()),
            fail: true,
            delay: Duration::ZERO,
        });
        let (sink, mut stream) = EventSink::channel();
        let sink = sink.with_desktop_notifier(notifier);

        sink.notify(NotificationEvent::desktop("IP", "10.0.0.5", Severity::Information, 10))
            .unwrap();

        assert!(next_event(&mut stream).await.as_notification().is_some());
        let warning = next_event(&mut stream).await;
        let warning = warning.as_log().unwrap();
        assert_eq!(warning.kind, LogKind::Warning);
        assert!(warning.text.starts_with("System notification failed"));
    }

    #[tokio::test]
    async fn test_slow_notifier_does_not_block_notify() {
        let notifier = Arc::new(RecordingNotifier {
            delivered: Mutex::new(Vec::new()),
            fail: false,
            delay: Duration::from_secs(1),
        });
        let (sink, mut stream) = EventSink::channel();
        let sink = sink.with_desktop_notifier(notifier);

        let started = Instant::now();
        sink.notify(NotificationEvent::desktop("IP", "10.0.0.5", Severity::Information, 10))
            .unwrap();
        sink.log(LogKind::Device, "next line").unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        let events = stream.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].as_log().unwrap().text, "next line");
    }
}
