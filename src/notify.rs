//! Notification Dispatcher
//!
//! Turns tracker [`Decision`]s into user-visible alerts. Rendering is a pure
//! function ([`render`]); delivery goes through a [`NotificationSink`]. Delivery is
//! best-effort: a failed send is logged and dropped, never retried, because the
//! next polling cycle re-evaluates state on its own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::NotificationConfig;
use crate::models::SessionIdentity;
use crate::tracker::Decision;

/// Rendered alert text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// How loudly a crossed threshold is announced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Notice,
    Caution,
    Warning,
}

impl Severity {
    pub fn for_threshold(threshold: u8) -> Self {
        match threshold {
            95.. => Severity::Warning,
            90..=94 => Severity::Caution,
            _ => Severity::Notice,
        }
    }

    fn word(&self) -> &'static str {
        match self {
            Severity::Notice => "notice",
            Severity::Caution => "caution",
            Severity::Warning => "warning",
        }
    }
}

/// Map a decision to its message; `NoAction` renders nothing
pub fn render(identity: SessionIdentity, decision: Decision) -> Option<Notification> {
    let service = identity.service();
    match decision {
        Decision::NoAction => None,
        Decision::ResetDetected => Some(Notification {
            title: format!("{service} session reset"),
            body: format!("Your {} has reset", identity.label()),
        }),
        Decision::ThresholdCrossed(threshold) => Some(Notification {
            title: format!(
                "{service} usage {}",
                Severity::for_threshold(threshold).word()
            ),
            body: format!("You have used {threshold}% of your {}", identity.label()),
        }),
    }
}

/// OS notification collaborator
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, title: &str, body: &str) -> Result<()>;
}

/// Writes notifications to the log instead of the desktop
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, title: &str, body: &str) -> Result<()> {
        info!(title, body, "Notification");
        Ok(())
    }
}

/// Shells out to a desktop notifier
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
    style: ArgumentStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgumentStyle {
    /// `<program> <args...> <title> <body>`
    TitleBody,
    /// `osascript -e 'display notification ...'`
    AppleScript,
}

impl CommandSink {
    /// Custom notifier: title and body are appended to `args`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            style: ArgumentStyle::TitleBody,
        }
    }

    /// Platform notifier, if this platform has one we know how to drive
    pub fn platform_default() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self {
                program: "osascript".to_string(),
                args: Vec::new(),
                style: ArgumentStyle::AppleScript,
            })
        } else if cfg!(target_os = "linux") {
            Some(Self::new("notify-send", vec!["--app-name=usage-watch".to_string()]))
        } else {
            None
        }
    }

    fn command_args(&self, title: &str, body: &str) -> Vec<String> {
        let mut args = self.args.clone();
        match self.style {
            ArgumentStyle::TitleBody => {
                args.push(title.to_string());
                args.push(body.to_string());
            }
            ArgumentStyle::AppleScript => {
                args.push("-e".to_string());
                args.push(format!(
                    "display notification \"{}\" with title \"{}\"",
                    escape_applescript(body),
                    escape_applescript(title)
                ));
            }
        }
        args
    }
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl NotificationSink for CommandSink {
    async fn send(&self, title: &str, body: &str) -> Result<()> {
        let output = Command::new(&self.program)
            .args(self.command_args(title, body))
            .output()
            .await
            .with_context(|| format!("Failed to spawn notifier: {}", self.program))?;

        if !output.status.success() {
            anyhow::bail!(
                "Notifier {} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Build the sink described by `[notifications]`
pub fn sink_from_config(config: &NotificationConfig) -> Arc<dyn NotificationSink> {
    match config.sink.as_str() {
        "command" => match &config.command {
            Some(program) => Arc::new(CommandSink::new(program.clone(), config.args.clone())),
            None => {
                warn!("Notification sink 'command' has no command configured, logging instead");
                Arc::new(LogSink)
            }
        },
        "desktop" => match CommandSink::platform_default() {
            Some(sink) => Arc::new(sink),
            None => {
                warn!("No desktop notifier on this platform, logging instead");
                Arc::new(LogSink)
            }
        },
        _ => Arc::new(LogSink),
    }
}

/// Stateless fan-out from decisions to the sink
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Render and deliver; returns what was sent, if anything
    pub async fn dispatch(
        &self,
        identity: SessionIdentity,
        decision: Decision,
    ) -> Option<Notification> {
        let notification = render(identity, decision)?;

        match self.sink.send(&notification.title, &notification.body).await {
            Ok(()) => info!(
                session = %identity,
                title = %notification.title,
                "Notification sent"
            ),
            Err(e) => warn!(
                session = %identity,
                error = %e,
                "Notification delivery failed, dropping"
            ),
        }

        Some(notification)
    }
}
