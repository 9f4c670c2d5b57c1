//! Slack delivery.
//!
//! Renders a resolved schedule as a Slack message (Norwegian date headings,
//! one bullet per meeting, a per-organization summary) and posts it to an
//! incoming webhook.
//!
//! # Message Layout
//!
//! ```text
//! 📅 *Politiske møter de neste 10 dagene* – Standardkanal
//!
//! *Torsdag 02. oktober 2025*
//! • <https://…|Ungdomsrådet (Sauda kommune)> - kl. 09:00
//!   Formannskapssalen
//!
//! *Oppsummering per kommune*
//! • Sauda kommune: 1 møte
//! • Strand kommune: 0 møter
//! ```

use crate::error::{ConfigurationError, DeliveryError};
use crate::models::{Meeting, PipelineConfig};
use crate::resolver::Resolution;
use chrono::{Datelike, NaiveDate, Weekday};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{info, instrument};

const BOT_NAME: &str = "Politikk-bot";
const BOT_ICON: &str = ":classical_building:";
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do with a rendered message. Chosen once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeliveryMode {
    /// Render and print only.
    Debug,
    /// Post to the pipeline's webhook.
    Forced,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mandag",
        Weekday::Tue => "Tirsdag",
        Weekday::Wed => "Onsdag",
        Weekday::Thu => "Torsdag",
        Weekday::Fri => "Fredag",
        Weekday::Sat => "Lørdag",
        Weekday::Sun => "Søndag",
    }
}

fn month_name(month: u32) -> &'static str {
    const MONTHS: [&str; 12] = [
        "januar", "februar", "mars", "april", "mai", "juni", "juli", "august", "september",
        "oktober", "november", "desember",
    ];
    MONTHS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or_default()
}

/// `Torsdag 02. oktober 2025`.
pub fn date_heading(date: NaiveDate) -> String {
    format!(
        "{} {:02}. {} {}",
        weekday_name(date.weekday()),
        date.day(),
        month_name(date.month()),
        date.year()
    )
}

fn meeting_line(m: &Meeting) -> String {
    let label = if m.title().contains(m.committee()) {
        format!("{} ({})", m.title(), m.organization())
    } else {
        format!("{} – {} ({})", m.title(), m.committee(), m.organization())
    };
    let mut line = match m.url() {
        Some(url) => format!("• <{url}|{label}>"),
        None => format!("• {label}"),
    };
    if let Some(t) = m.time() {
        let _ = write!(line, " - kl. {}", t.format("%H:%M"));
    }
    line.push('\n');
    if let Some(loc) = m.location() {
        let _ = writeln!(line, "  {loc}");
    }
    line
}

/// Render the Slack text for one resolved pipeline.
///
/// `description` is appended to the heading when non-empty. Every
/// organization the pipeline covers appears in the summary, with zero counts
/// where nothing was found.
pub fn render_message(res: &Resolution, description: &str) -> String {
    let mut msg = format!(
        "📅 *Politiske møter de neste {} dagene*",
        res.window.days()
    );
    if !description.trim().is_empty() {
        let _ = write!(msg, " – {}", description.trim());
    }
    msg.push_str("\n\n");

    if res.used_fallback {
        msg.push_str("_Fikk ikke hentet ferske data. Viser reserveoversikt._\n");
    }
    if res.meetings.is_empty() {
        msg.push_str("Ingen møter funnet i perioden.\n");
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut current: Option<NaiveDate> = None;
    for m in &res.meetings {
        if current != Some(m.date()) {
            current = Some(m.date());
            let _ = write!(msg, "\n*{}*\n", date_heading(m.date()));
        }
        msg.push_str(&meeting_line(m));
        *counts.entry(m.organization()).or_default() += 1;
    }
    for org in &res.organizations {
        counts.entry(org.as_str()).or_default();
    }

    if !counts.is_empty() {
        msg.push_str("\n*Oppsummering per kommune*\n");
        for (org, count) in &counts {
            let label = if *count == 1 { "møte" } else { "møter" };
            let _ = writeln!(msg, "• {org}: {count} {label}");
        }
    }
    msg
}

/// Webhook URL for a pipeline, looked up with `lookup` (normally the
/// process environment).
///
/// # Errors
///
/// [`ConfigurationError`] if the pipeline names no variable or the variable
/// is unset or blank.
pub fn destination(
    pipeline: &PipelineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigurationError> {
    let env = pipeline.destination_env.trim();
    if env.is_empty() {
        return Err(ConfigurationError::MissingDestination {
            pipeline: pipeline.name.clone(),
        });
    }
    lookup(env)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigurationError::UnresolvedDestination {
            pipeline: pipeline.name.clone(),
            env: env.to_string(),
        })
}

/// Post `text` to a Slack incoming webhook.
#[instrument(level = "info", skip_all)]
pub async fn post(client: &reqwest::Client, webhook: &str, text: &str) -> Result<(), DeliveryError> {
    let payload = WebhookPayload {
        text,
        username: BOT_NAME,
        icon_emoji: BOT_ICON,
    };
    let resp = client
        .post(webhook)
        .timeout(WEBHOOK_TIMEOUT)
        .json(&payload)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(DeliveryError::Status(status.as_u16()));
    }
    info!(chars = text.chars().count(), "Message posted to Slack");
    Ok(())
}
