//! SirialX: serial monitor session core
//!
//! Opens a serial port, streams its output line by line, pulses DTR/RTS to
//! reset the attached board and reports everything as `MonitorEvent`s that a
//! front end renders on its own schedule.

pub mod app;
pub mod config;
pub mod events;
pub mod session;
pub mod transport;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{ConfigStorage, MonitorConfig};
pub use events::{EventSink, EventStream, LogKind, MonitorEvent, NotificationEvent, Severity};
pub use session::{SerialSession, SessionError, SessionSettings, SessionState};
pub use transport::{available_ports, preferred_port, PortInfo};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
