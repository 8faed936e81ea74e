//! Run notifications.
//!
//! Notifiers receive the finished [`RunOutcome`] and its rendered [`Report`].
//! Delivery failures are logged and never change the run's verdict.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, instrument};

use crate::core::types::{RunOutcome, Verdict};
use crate::io::report::{Report, truncate_middle};

/// Discord rejects embed descriptions longer than this many characters.
const DISCORD_DESCRIPTION_LIMIT: usize = 4096;
const COLOR_GREEN: u32 = 0x00ff00;
const COLOR_ORANGE: u32 = 0xffa500;
const COLOR_RED: u32 = 0xff0000;

/// Verdict class used by the `sendon` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyOn {
    Success,
    Warning,
    Error,
}

impl NotifyOn {
    pub fn for_verdict(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Success => NotifyOn::Success,
            Verdict::Warning => NotifyOn::Warning,
            Verdict::Aborted | Verdict::Failed => NotifyOn::Error,
        }
    }
}

pub fn should_notify(sendon: &[NotifyOn], verdict: Verdict) -> bool {
    sendon.contains(&NotifyOn::for_verdict(verdict))
}

/// Abstraction over notification channels.
pub trait Notifier {
    fn name(&self) -> &str;

    fn notify(&self, outcome: &RunOutcome, report: &Report) -> Result<()>;
}

/// Posts a message with one embed to a Discord webhook.
pub struct DiscordNotifier {
    webhook_url: String,
    client: reqwest::blocking::Client,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;
        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
        })
    }

    /// Webhook payload for `outcome`.
    pub fn payload(outcome: &RunOutcome, report: &Report) -> Value {
        let (content, color) = match outcome.verdict {
            Verdict::Success => ("SnapRAID job completed successfully.", COLOR_GREEN),
            Verdict::Warning => ("SnapRAID job completed with warnings.", COLOR_ORANGE),
            Verdict::Aborted => ("SnapRAID job aborted:", COLOR_RED),
            Verdict::Failed => ("Error during SnapRAID job:", COLOR_RED),
        };
        // Capped in bytes, which never undercounts characters.
        let description = truncate_middle(&report.body, DISCORD_DESCRIPTION_LIMIT);
        json!({
            "content": content,
            "embeds": [{
                "title": report.subject,
                "description": description,
                "color": color,
            }],
        })
    }
}

impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    #[instrument(skip_all)]
    fn notify(&self, outcome: &RunOutcome, report: &Report) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .json(&Self::payload(outcome, report))
            .send()
            .context("send Discord webhook")?
            .error_for_status()
            .context("Discord webhook rejected notification")?;
        Ok(())
    }
}

/// Deliver `report` through every notifier if the verdict matches `sendon`.
///
/// Returns the number of successful deliveries.
pub fn dispatch(
    notifiers: &[Box<dyn Notifier>],
    sendon: &[NotifyOn],
    outcome: &RunOutcome,
    report: &Report,
) -> usize {
    if !should_notify(sendon, outcome.verdict) {
        return 0;
    }
    let mut delivered = 0;
    for notifier in notifiers {
        match notifier.notify(outcome, report) {
            Ok(()) => {
                info!(notifier = notifier.name(), "notification sent");
                delivered += 1;
            }
            Err(err) => {
                error!(
                    notifier = notifier.name(),
                    err = %format!("{err:#}"),
                    "failed to send notification"
                );
            }
        }
    }
    delivered
}
