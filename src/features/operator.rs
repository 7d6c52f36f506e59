//! Human-in-the-loop suspension points.
//!
//! Share pages may put a verification challenge in front of the conversation.
//! The fetch pipeline stops at a [`VerificationGate`] until a human says the
//! page is ready. On a terminal that is an Enter key press; embedded callers
//! can hand in a [`SignalGate`] and resume it from elsewhere.

use crate::core::config;
use async_trait::async_trait;
use std::io::{BufRead, Write};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::info;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("interactive confirmation required (stdin is not a terminal); set CHAT_EXTRACTOR_AUTO_CONTINUE=1 to skip the pause")]
    InteractiveRequired,

    #[error("cancelled by operator")]
    Cancelled,

    #[error("resume signal dropped before the page was cleared")]
    SignalDropped,

    #[error("failed to read operator input: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait VerificationGate: Send + Sync {
    /// Suspend until the page at `url` is cleared for scraping. No timeout.
    async fn wait_for_clearance(&self, url: &str) -> Result<(), VerificationError>;
}

/// Blocks on Enter from an attached terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalGate;

#[async_trait]
impl VerificationGate for TerminalGate {
    async fn wait_for_clearance(&self, url: &str) -> Result<(), VerificationError> {
        if !atty::is(atty::Stream::Stdin) {
            return Err(VerificationError::InteractiveRequired);
        }
        info!("⏳ Waiting for page to load: {}", url);
        println!("\n⏳ Waiting for page to load...");
        println!("   If you see a CAPTCHA or verification, please complete it.");
        let line = read_operator_line("   Press Enter once the chat content is fully loaded... ").await?;
        match line {
            Some(_) => Ok(()),
            None => Err(VerificationError::Cancelled),
        }
    }
}

/// Waits for an external resume signal instead of a terminal.
pub struct SignalGate {
    rx: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Sending half of a [`SignalGate`].
#[derive(Debug)]
pub struct ResumeHandle {
    tx: oneshot::Sender<()>,
}

impl ResumeHandle {
    pub fn resume(self) {
        let _ = self.tx.send(());
    }
}

impl SignalGate {
    pub fn new() -> (Self, ResumeHandle) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            ResumeHandle { tx },
        )
    }
}

#[async_trait]
impl VerificationGate for SignalGate {
    async fn wait_for_clearance(&self, url: &str) -> Result<(), VerificationError> {
        let rx = self.rx.lock().await.take();
        let Some(rx) = rx else {
            // Already resumed once; the gate stays open.
            return Ok(());
        };
        info!("⏳ Waiting for resume signal: {}", url);
        rx.await.map_err(|_| VerificationError::SignalDropped)
    }
}

/// Never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoGate;

#[async_trait]
impl VerificationGate for AutoGate {
    async fn wait_for_clearance(&self, url: &str) -> Result<(), VerificationError> {
        info!("verification pause skipped for {} (auto-continue)", url);
        Ok(())
    }
}

/// Terminal gate, or [`AutoGate`] when `CHAT_EXTRACTOR_AUTO_CONTINUE` is set.
pub fn default_gate() -> Box<dyn VerificationGate> {
    if config::auto_continue_enabled() {
        Box::new(AutoGate)
    } else {
        Box::new(TerminalGate)
    }
}

/// Ask a yes/no question; only `y`/`yes` counts as yes. EOF is a no.
pub async fn confirm(prompt: &str) -> Result<bool, VerificationError> {
    let answer = read_operator_line(prompt).await?;
    Ok(answer
        .map(|a| is_affirmative(&a))
        .unwrap_or(false))
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Print `prompt` and read one line from stdin. `None` on EOF.
async fn read_operator_line(prompt: &str) -> Result<Option<String>, VerificationError> {
    let prompt = prompt.to_string();
    let read = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;
        let mut line = String::new();
        let n = std::io::stdin().lock().read_line(&mut line)?;
        Ok((n > 0).then_some(line))
    })
    .await
    .map_err(|e| VerificationError::Io(std::io::Error::other(e)))?;
    Ok(read?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("yeah"));
    }

    #[tokio::test]
    async fn signal_gate_opens_on_resume() {
        let (gate, handle) = SignalGate::new();
        let waiter = tokio::spawn(async move { gate.wait_for_clearance("https://x").await });
        handle.resume();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn signal_gate_reports_dropped_handle() {
        let (gate, handle) = SignalGate::new();
        drop(handle);
        let err = gate.wait_for_clearance("https://x").await.unwrap_err();
        assert!(matches!(err, VerificationError::SignalDropped));
    }

    #[tokio::test]
    async fn auto_gate_never_blocks() {
        assert!(AutoGate.wait_for_clearance("https://x").await.is_ok());
    }
}
