//! Collaborator seams for the confirmation workflow.
//!
//! The confirmation manager talks to a human (or a relay acting for one)
//! through these traits so tests can substitute scripted implementations.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::confirm::types::{parse_relayed_decision, Decision, TradeProposal};

/// How the human decision for a pending proposal is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMethod {
    /// Block on a direct stdin prompt.
    Prompt,
    /// Push the proposal through the notification channel, then prompt.
    Notification,
    /// Try to detect the submission automatically, then prompt.
    Auto,
}

impl FromStr for ConfirmationMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(ConfirmationMethod::Prompt),
            "notification" | "notify" => Ok(ConfirmationMethod::Notification),
            "auto" => Ok(ConfirmationMethod::Auto),
            other => Err(anyhow::anyhow!("Unknown confirmation method: {}", other)),
        }
    }
}

/// Outbound notification channel (push message, chat relay, ...).
pub trait Notifier {
    fn send(&mut self, message: &str) -> Result<()>;
}

/// Starts or verifies the external position monitor after an entry.
pub trait MonitorLauncher {
    /// Returns true when the monitor is confirmed running.
    fn ensure_running(&mut self, symbol: &str) -> Result<bool>;
}

/// Source of the human decision for a pending proposal.
pub trait DecisionSource {
    /// Obtain one decision attempt. `Ok(None)` means the input was not
    /// understood and the caller should ask again.
    fn acquire(&mut self, proposal: &TradeProposal) -> Result<Option<Decision>>;
}

/// Interactive decision source reading from standard input.
pub struct PromptDecisionSource;

impl DecisionSource for PromptDecisionSource {
    fn acquire(&mut self, proposal: &TradeProposal) -> Result<Option<Decision>> {
        let mut out = std::io::stdout().lock();
        writeln!(
            out,
            "\nProposed trade: {} {} ${} x{} @ ${} ({})",
            proposal.symbol,
            proposal.side,
            proposal.strike.normalize(),
            proposal.quantity,
            proposal.premium.normalize(),
            proposal.reason
        )?;
        write!(out, "Enter decision [submitted / filled <price> / cancelled]: ")?;
        out.flush()?;

        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read decision from stdin")?;

        let trimmed = line.trim();
        // A bare number is shorthand for "filled <price>".
        if let Ok(price) = trimmed.parse::<rust_decimal::Decimal>() {
            return Ok(Some(Decision::Submitted {
                fill_price: Some(price),
            }));
        }
        Ok(parse_relayed_decision(trimmed))
    }
}

/// Notification round-trip acquisition: pushes the proposal through the
/// notification channel so the human sees it on their device, then degrades
/// to the fallback source for the actual decision. A failed send is logged
/// and never blocks the decision itself.
pub struct NotificationDecisionSource<S: DecisionSource> {
    notifier: Box<dyn Notifier>,
    fallback: S,
}

impl<S: DecisionSource> NotificationDecisionSource<S> {
    pub fn new(notifier: Box<dyn Notifier>, fallback: S) -> Self {
        Self { notifier, fallback }
    }
}

impl<S: DecisionSource> DecisionSource for NotificationDecisionSource<S> {
    fn acquire(&mut self, proposal: &TradeProposal) -> Result<Option<Decision>> {
        let message = format!(
            "⏳ Awaiting confirmation: {} {} ${} x{} @ ${:.2} — reply submitted / filled <price> / cancelled",
            proposal.symbol,
            proposal.side,
            proposal.strike.normalize(),
            proposal.quantity,
            proposal.premium
        );
        if let Err(err) = self.notifier.send(&message) {
            warn!("Confirmation notification failed, prompting directly: {:#}", err);
        }
        self.fallback.acquire(proposal)
    }
}

/// Best-effort automatic submission detection. No detection backend is
/// wired in this process, so it always falls through to the fallback
/// source; the hook exists so an order-screen watcher can slot in.
pub struct AutoDetectDecisionSource<S: DecisionSource> {
    fallback: S,
}

impl<S: DecisionSource> AutoDetectDecisionSource<S> {
    pub fn new(fallback: S) -> Self {
        Self { fallback }
    }
}

impl<S: DecisionSource> DecisionSource for AutoDetectDecisionSource<S> {
    fn acquire(&mut self, proposal: &TradeProposal) -> Result<Option<Decision>> {
        debug!(
            "No submission signal detected for {}; falling back to prompt",
            proposal.symbol
        );
        self.fallback.acquire(proposal)
    }
}

/// Notifier that writes to the structured log instead of an external
/// channel. The fallback when no relay is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&mut self, message: &str) -> Result<()> {
        info!("Notification: {}", message);
        Ok(())
    }
}
