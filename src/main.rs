//! SirialX terminal front end
//!
//! `sirialx [PORT] [BAUD]`
//!
//! Streams device output to stdout. Commands on stdin: `r` resets the board,
//! `c` toggles the connection, `q` quits.

use std::sync::Arc;
use std::time::Duration;

use sirialx_lib::events::{DesktopNotifier, SystemNotifier};
use sirialx_lib::session::LinkInfo;
use sirialx_lib::{
    app, available_ports, init_logging, preferred_port, ConfigStorage, EventSink, LogKind,
    MonitorConfig, MonitorEvent, SerialSession, SessionSettings,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const APP_NAME: &str = "SirialX";

#[tokio::main]
async fn main() {
    init_logging();
    tracing::info!("Starting {}...", APP_NAME);

    let storage = ConfigStorage::new()
        .map_err(|e| tracing::warn!("Config location unavailable, settings won't persist: {}", e))
        .ok();
    let mut config = load_config(storage.as_ref()).await;

    let (sink, mut stream) = EventSink::channel();
    let renderer = tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            render(&event);
        }
    });

    let notifier = config
        .desktop_notifications
        .then(|| SystemNotifier::detect(APP_NAME))
        .flatten()
        .map(|notifier| Arc::new(notifier) as Arc<dyn DesktopNotifier>);
    let sink = app::attach_desktop_notifier(sink, config.desktop_notifications, notifier);

    let ports = app::report_port_scan(available_ports(), &sink);

    let mut args = std::env::args().skip(1);
    let port_id = args
        .next()
        .or_else(|| config.preferred_port.clone())
        .or_else(|| preferred_port(&ports).map(|p| p.id.clone()));
    let baud_rate = match args.next() {
        Some(raw) => app::parse_baud_rate(&raw, &sink),
        None => Some(config.default_baud_rate),
    };

    let session = SerialSession::native(sink, SessionSettings::from(&config));

    // Failures are reported through the event stream
    if let Ok(link) = session.connect(port_id.as_deref(), baud_rate).await {
        remember(storage.as_ref(), &mut config, &link).await;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut commands = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            line = commands.next_line() => match line {
                Ok(Some(cmd)) => match cmd.trim() {
                    "r" => {
                        let _ = session.reset();
                    }
                    "c" if session.is_connected() => {
                        let _ = session.disconnect().await;
                    }
                    "c" => {
                        if let Ok(link) = session.connect(port_id.as_deref(), baud_rate).await {
                            remember(storage.as_ref(), &mut config, &link).await;
                        }
                    }
                    "q" => break,
                    "" => {}
                    other => println!(
                        "Unknown command '{}' (r = reset, c = connect/disconnect, q = quit)",
                        other
                    ),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    }

    let _ = session.disconnect().await;
    drop(session);
    let _ = tokio::time::timeout(Duration::from_millis(500), renderer).await;
    tracing::info!("{} stopped", APP_NAME);
}

async fn load_config(storage: Option<&ConfigStorage>) -> MonitorConfig {
    let Some(storage) = storage else {
        return MonitorConfig::default();
    };

    match storage.load().await {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config from {:?}, using defaults: {}", storage.path(), e);
            MonitorConfig::default()
        }
    }
}

async fn remember(storage: Option<&ConfigStorage>, config: &mut MonitorConfig, link: &LinkInfo) {
    let Some(storage) = storage else {
        return;
    };
    match app::remember_link(storage, config, link).await {
        Ok(true) => tracing::debug!("Saved {} as preferred port", link.port_id),
        Ok(false) => {}
        Err(e) => tracing::warn!("Failed to save config: {}", e),
    }
}

fn render(event: &MonitorEvent) {
    match event {
        MonitorEvent::Log(log) => {
            let marker = match log.kind {
                LogKind::Device => " ",
                LogKind::Status => "*",
                LogKind::Success => "+",
                LogKind::Warning => "!",
                LogKind::Error => "x",
            };
            println!("{} {}", marker, log.render());
        }
        MonitorEvent::Notification(n) => println!("  [{}] {}", n.title, n.message),
    }
}
