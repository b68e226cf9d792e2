//! Front-end startup helpers
//!
//! Glue between discovery, configuration and the event stream that any
//! front end needs before and after the first connect.

use std::sync::Arc;

use crate::config::{ConfigStorage, MonitorConfig, StorageError, BAUD_RATES};
use crate::events::{DesktopNotifier, EventSink, LogKind, NotificationEvent, Severity};
use crate::session::LinkInfo;
use crate::transport::{PortInfo, TransportError};

/// Report the outcome of a port scan and return the ports found.
/// An empty list and a failed scan are both reported, never fatal.
pub fn report_port_scan(
    scan: Result<Vec<PortInfo>, TransportError>,
    sink: &EventSink,
) -> Vec<PortInfo> {
    match scan {
        Ok(ports) if ports.is_empty() => {
            tracing::warn!("Port scan found nothing");
            let _ = sink.log(LogKind::Warning, "No serial ports found.");
            let _ = sink.notify(NotificationEvent::app(
                "Scan Complete",
                "No serial ports found.",
                Severity::Warning,
            ));
            ports
        }
        Ok(ports) => {
            tracing::info!("Port scan found {} port(s)", ports.len());
            for port in &ports {
                let _ = sink.log(LogKind::Status, format!("Found {}", port.label()));
            }
            ports
        }
        Err(e) => {
            tracing::error!("Port scan failed: {}", e);
            let message = format!("Could not scan for ports: {}", e);
            let _ = sink.log(LogKind::Error, message.clone());
            let _ = sink.notify(NotificationEvent::app("Error", message, Severity::Error));
            Vec::new()
        }
    }
}

/// Install `notifier` on `sink` when desktop notifications are enabled.
/// Enabled but unavailable is reported once as a warning.
pub fn attach_desktop_notifier(
    sink: EventSink,
    enabled: bool,
    notifier: Option<Arc<dyn DesktopNotifier>>,
) -> EventSink {
    match (enabled, notifier) {
        (false, _) => sink,
        (true, Some(notifier)) => sink.with_desktop_notifier(notifier),
        (true, None) => {
            let _ = sink.notify(NotificationEvent::app(
                "Optional Feature",
                "Install a desktop notification tool (notify-send) for system notifications.",
                Severity::Warning,
            ));
            sink
        }
    }
}

/// Parse a baud rate argument. Rates outside `BAUD_RATES` are accepted
/// with a warning; garbage is reported and yields `None`.
pub fn parse_baud_rate(raw: &str, sink: &EventSink) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(baud) if BAUD_RATES.contains(&baud) => Some(baud),
        Ok(baud) => {
            let _ = sink.log(
                LogKind::Warning,
                format!("{} bps is not a standard baud rate.", baud),
            );
            Some(baud)
        }
        Err(_) => {
            let _ = sink.log(LogKind::Error, format!("Invalid baud rate: {}", raw));
            None
        }
    }
}

/// Persist the port and baud rate of a successful connect so the next
/// start selects them again. Returns whether anything changed.
pub async fn remember_link(
    storage: &ConfigStorage,
    config: &mut MonitorConfig,
    link: &LinkInfo,
) -> Result<bool, StorageError> {
    if config.preferred_port.as_deref() == Some(link.port_id.as_str())
        && config.default_baud_rate == link.baud_rate
    {
        return Ok(false);
    }
    config.preferred_port = Some(link.port_id.clone());
    config.default_baud_rate = link.baud_rate;
    storage.save(config).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NotifyError;
    use tempfile::tempdir;

    struct NullNotifier;

    impl DesktopNotifier for NullNotifier {
        fn deliver(
            &self,
            _title: &str,
            _message: &str,
            _severity: Severity,
            _timeout_secs: Option<u32>,
        ) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_scan_is_reported() {
        let (sink, mut stream) = EventSink::channel();
        let ports = report_port_scan(Ok(Vec::new()), &sink);
        assert!(ports.is_empty());

        let events = stream.drain();
        let log = events[0].as_log().unwrap();
        assert_eq!(log.kind, LogKind::Warning);
        assert_eq!(log.text, "No serial ports found.");
        let notification = events[1].as_notification().unwrap();
        assert_eq!(notification.title, "Scan Complete");
        assert_eq!(notification.severity, Severity::Warning);
    }

    #[test]
    fn test_failed_scan_is_reported() {
        let (sink, mut stream) = EventSink::channel();
        let ports = report_port_scan(Err(TransportError::Unexpected("sysfs gone".into())), &sink);
        assert!(ports.is_empty());

        let events = stream.drain();
        let log = events[0].as_log().unwrap();
        assert_eq!(log.kind, LogKind::Error);
        assert!(log.text.starts_with("Could not scan for ports:"));
        assert_eq!(events[1].as_notification().unwrap().severity, Severity::Error);
    }

    #[test]
    fn test_found_ports_are_listed() {
        let (sink, mut stream) = EventSink::channel();
        let ports = report_port_scan(
            Ok(vec![PortInfo::new("/dev/ttyUSB0", "CP2102")]),
            &sink,
        );
        assert_eq!(ports.len(), 1);

        let events = stream.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_log().unwrap().text, "Found /dev/ttyUSB0: CP2102");
    }

    #[test]
    fn test_missing_notifier_is_reported_once() {
        let (sink, mut stream) = EventSink::channel();
        let _sink = attach_desktop_notifier(sink, true, None);

        let events = stream.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_notification().unwrap().title, "Optional Feature");
    }

    #[test]
    fn test_disabled_notifications_stay_silent() {
        let (sink, mut stream) = EventSink::channel();
        let _sink = attach_desktop_notifier(sink, false, None);
        assert!(stream.drain().is_empty());
    }

    #[tokio::test]
    async fn test_available_notifier_is_attached_silently() {
        let (sink, mut stream) = EventSink::channel();
        let sink = attach_desktop_notifier(sink, true, Some(Arc::new(NullNotifier)));
        assert!(format!("{:?}", sink).contains("has_desktop_notifier: true"));
        assert!(stream.drain().is_empty());
    }

    #[test]
    fn test_parse_baud_rate() {
        let (sink, mut stream) = EventSink::channel();
        assert_eq!(parse_baud_rate("115200", &sink), Some(115200));
        assert!(stream.drain().is_empty());

        assert_eq!(parse_baud_rate("250000", &sink), Some(250000));
        assert_eq!(stream.drain()[0].as_log().unwrap().kind, LogKind::Warning);

        assert_eq!(parse_baud_rate("fast", &sink), None);
        assert_eq!(stream.drain()[0].as_log().unwrap().text, "Invalid baud rate: fast");
    }

    #[tokio::test]
    async fn test_remember_link_saves_once() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("config.json"));
        let mut config = MonitorConfig::default();
        let link = LinkInfo {
            port_id: "/dev/ttyACM0".into(),
            baud_rate: 9600,
        };

        assert!(remember_link(&storage, &mut config, &link).await.unwrap());
        assert!(!remember_link(&storage, &mut config, &link).await.unwrap());

        let saved = storage.load().await.unwrap();
        assert_eq!(saved.preferred_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(saved.default_baud_rate, 9600);
    }
}
