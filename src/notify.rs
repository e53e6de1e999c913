//! Outbound messages: formatting plus a Telegram Bot API sender.

use crate::{
    error::MonitorError, license::LicenseRecord, runner::RunSummary, storage::SiteReport, text,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const MAX_SUMMARY_CHARS: usize = 4000;
const FRAGMENTS_PER_SITE: usize = 3;
const API_BASE: &str = "https://api.telegram.org";

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Fire and forget. Returns whether the message was delivered; failures
    /// are logged here and never abort a run.
    async fn send(&self, text: &str) -> bool;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Posts to `sendMessage`. Without credentials messages go to stdout.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    credentials: Option<(String, String)>,
}

impl TelegramNotifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Result<Self, MonitorError> {
        let credentials = match (bot_token, chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token, chat))
            }
            _ => None,
        };

        Ok(TelegramNotifier {
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            credentials,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        let Some((token, chat_id)) = self.credentials.as_ref() else {
            println!("{}", text);
            return false;
        };

        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let url = format!("{}/bot{}/sendMessage", API_BASE, token);

        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Message delivered");
                true
            }
            Ok(response) => {
                warn!("Message rejected with status {}", response.status());
                false
            }
            Err(e) => {
                warn!("Failed to send message: {}", e.without_url());
                false
            }
        }
    }
}

pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn promo_summary(summary: &RunSummary, reports: &[SiteReport]) -> String {
    let mut message = format!(
        "<b>Promo Scraper Results</b>\nSuccess: {}/{}\nGeo-blocked: {}\nErrors: {}\n\n",
        summary.success, summary.total, summary.blocked, summary.errors
    );

    for report in reports.iter().filter(|r| !r.promos.is_empty()) {
        let fragments = report
            .promos
            .iter()
            .take(FRAGMENTS_PER_SITE)
            .map(|p| escape_html(p))
            .collect::<Vec<_>>()
            .join(", ");
        message.push_str(&format!("\n<b>{}</b>: {}", escape_html(&report.name), fragments));
    }

    text::truncate_chars(&message, MAX_SUMMARY_CHARS)
}

pub fn license_summary(count: usize, now: DateTime<Utc>) -> String {
    format!(
        "🎰 <b>{} New License(s) Found!</b>\nTime: {}\n{}",
        count,
        now.format("%Y-%m-%d %H:%M UTC"),
        "─".repeat(20)
    )
}

pub fn license_message(record: &LicenseRecord) -> String {
    let websites = if record.websites.is_empty() {
        "N/A".to_string()
    } else {
        record
            .websites
            .iter()
            .map(|w| escape_html(w))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "<b>New License</b>\nOperator: {}\nLicense: <code>{}</code>\nWebsites: {}",
        escape_html(&record.operator),
        escape_html(&record.license_id),
        websites
    )
}

pub fn error_message(detail: &str) -> String {
    format!(
        "⚠️ License Scraper Error: Scraping failed: {}",
        escape_html(&text::truncate_chars(detail, text::MAX_DIAGNOSTIC_CHARS))
    )
}
