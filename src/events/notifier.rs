//! Desktop notifications
//!
//! Best-effort delivery of OS notifications. Platforms without a supported
//! mechanism simply have no notifier; callers treat that as "feature off".

use std::process::Command;

use super::Severity;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notifications unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Notifier exited with failure: {0}")]
    Failed(String),
}

/// Delivers a notification to the desktop
pub trait DesktopNotifier: Send + Sync {
    fn deliver(
        &self,
        title: &str,
        message: &str,
        severity: Severity,
        timeout_secs: Option<u32>,
    ) -> Result<(), NotifyError>;
}

/// Shells out to the platform notification tool
/// (`notify-send` on Linux, `osascript` on macOS)
#[derive(Debug, Clone)]
pub struct SystemNotifier {
    app_name: String,
}

impl SystemNotifier {
    /// Returns `None` when this platform has no usable notification tool
    pub fn detect(app_name: impl Into<String>) -> Option<Self> {
        let tool = if cfg!(target_os = "linux") {
            "notify-send"
        } else if cfg!(target_os = "macos") {
            "osascript"
        } else {
            return None;
        };

        if !in_path(tool) {
            tracing::info!("{} not found, desktop notifications disabled", tool);
            return None;
        }

        Some(Self {
            app_name: app_name.into(),
        })
    }

    #[cfg(target_os = "linux")]
    fn command(
        &self,
        title: &str,
        message: &str,
        severity: Severity,
        timeout_secs: Option<u32>,
    ) -> Command {
        let urgency = match severity {
            Severity::Information => "normal",
            Severity::Warning => "normal",
            Severity::Error => "critical",
        };
        let mut cmd = Command::new("notify-send");
        cmd.arg("--app-name").arg(&self.app_name);
        cmd.arg("--urgency").arg(urgency);
        if let Some(secs) = timeout_secs {
            cmd.arg("--expire-time").arg((secs * 1000).to_string());
        }
        cmd.arg(title).arg(message);
        cmd
    }

    #[cfg(target_os = "macos")]
    fn command(
        &self,
        title: &str,
        message: &str,
        _severity: Severity,
        _timeout_secs: Option<u32>,
    ) -> Command {
        let script = format!(
            "display notification {} with title {} subtitle {}",
            applescript_quote(message),
            applescript_quote(&self.app_name),
            applescript_quote(title)
        );
        let mut cmd = Command::new("osascript");
        cmd.arg("-e").arg(script);
        cmd
    }
}

impl DesktopNotifier for SystemNotifier {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    fn deliver(
        &self,
        title: &str,
        message: &str,
        severity: Severity,
        timeout_secs: Option<u32>,
    ) -> Result<(), NotifyError> {
        let output = self.command(title, message, severity, timeout_secs).output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(NotifyError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn deliver(
        &self,
        _title: &str,
        _message: &str,
        _severity: Severity,
        _timeout_secs: Option<u32>,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable(format!(
            "no desktop notifier for {}",
            self.app_name
        )))
    }
}

fn in_path(tool: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file()))
        .unwrap_or(false)
}

#[cfg(any(target_os = "macos", test))]
fn applescript_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
