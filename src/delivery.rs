//! Message delivery.
//!
//! [`MessageSender`] is the "deliver text to an address" seam. The production
//! implementation drives Messages.app through `osascript`; [`DryRunSender`]
//! only logs. Dispatch is strictly sequential with an optional pause between
//! messages, and one failed delivery never stops the rest.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{DeliveryError, Result};

/// Delivers one text to one phone number.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send `text` to `phone`.
    async fn send(&self, phone: &str, text: &str) -> std::result::Result<(), DeliveryError>;
}

/// Escape text for a double-quoted AppleScript string literal.
///
/// Backslashes are escaped before quotes so the added backslashes are not
/// doubled.
#[must_use]
pub fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Script that sends `text` to `phone` through the named Messages service type.
#[must_use]
pub fn build_send_script(service: &str, phone: &str, text: &str) -> String {
    format!(
        r#"tell application "Messages"
  try
    set smsService to 1st service whose service type = {service}
    set targetBuddy to participant "{phone}" of smsService
    send "{text}" to targetBuddy
    return "{service}"
  on error errMsg
    error "Failed to send via {service}: " & errMsg
  end try
end tell"#,
        phone = escape_applescript(phone),
        text = escape_applescript(text),
    )
}

/// Sends through Messages.app by piping a script into `osascript -`.
#[derive(Debug, Clone)]
pub struct AppleScriptSender {
    osascript_path: String,
    service: String,
    timeout: Duration,
}

impl AppleScriptSender {
    /// Create a sender using `osascript_path` and the given service type.
    pub fn new(osascript_path: impl Into<String>, service: impl Into<String>, timeout: Duration) -> Self {
        Self {
            osascript_path: osascript_path.into(),
            service: service.into(),
            timeout,
        }
    }

    async fn run_script(&self, script: &str) -> std::result::Result<(), DeliveryError> {
        let mut child = Command::new(&self.osascript_path)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
        }

        let output = child.wait_with_output();
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| DeliveryError::Timeout(self.timeout.as_secs()))??;

        if output.status.success() {
            Ok(())
        } else {
            Err(DeliveryError::ScriptFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl MessageSender for AppleScriptSender {
    async fn send(&self, phone: &str, text: &str) -> std::result::Result<(), DeliveryError> {
        debug!(phone = %phone, service = %self.service, "Sending message via osascript");
        self.run_script(&build_send_script(&self.service, phone, text)).await
    }
}

/// Logs instead of sending.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSender;

#[async_trait]
impl MessageSender for DryRunSender {
    async fn send(&self, phone: &str, text: &str) -> std::result::Result<(), DeliveryError> {
        info!(phone = %phone, chars = text.chars().count(), "Dry run: message not sent");
        Ok(())
    }
}

/// A stored message queued for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Campaign message id the outcome is recorded against
    pub message_id: i64,
    /// Recipient phone
    pub phone: String,
    /// Resolved text
    pub text: String,
}

/// Counts from one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Delivered
    pub sent: usize,
    /// Failed
    pub failed: usize,
}

/// Deliver `messages` one after another in the given order.
///
/// Sleeps `delay` between consecutive messages, never before the first.
/// `on_outcome` records each result; a delivery failure is passed to it and
/// the run continues, while an error returned by `on_outcome` itself (a store
/// failure) stops the run.
pub async fn dispatch_sequential<F>(
    sender: &dyn MessageSender,
    messages: &[Outgoing],
    delay: Duration,
    mut on_outcome: F,
) -> Result<DispatchSummary>
where
    F: FnMut(&Outgoing, std::result::Result<(), DeliveryError>) -> Result<()>,
{
    let mut summary = DispatchSummary::default();
    let total = messages.len();

    for (index, message) in messages.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "Waiting before next message");
            tokio::time::sleep(delay).await;
        }

        let outcome = sender.send(&message.phone, &message.text).await;
        match &outcome {
            Ok(()) => {
                summary.sent += 1;
                info!(message_id = message.message_id, position = index + 1, total, "Message sent");
            }
            Err(e) => {
                summary.failed += 1;
                warn!(message_id = message.message_id, position = index + 1, total, error = %e, "Message failed");
            }
        }
        on_outcome(message, outcome)?;
    }

    info!(sent = summary.sent, failed = summary.failed, "Dispatch complete");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_backslashes_before_quotes() {
        assert_eq!(escape_applescript(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_applescript(r"a\b"), r"a\\b");
        assert_eq!(escape_applescript(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn test_script_targets_service_and_escapes_text() {
        let script = build_send_script("SMS", "+1555", "He said \"yes\"");
        assert!(script.contains("service type = SMS"));
        assert!(script.contains(r#"participant "+1555""#));
        assert!(script.contains(r#"send "He said \"yes\"" to targetBuddy"#));
    }

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        assert!(DryRunSender.send("+1555", "hello").await.is_ok());
    }
}
