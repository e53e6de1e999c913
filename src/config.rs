use crate::error::MonitorError;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const PROMO_SITES: &[(&str, &str)] = &[
    ("Instant Casino", "https://www.instantcasino.com/promotions"),
    ("24Slots", "https://24slots.com/promotions"),
    ("PalmSlots", "https://palmslots.com/promotions"),
    ("Dolfwin", "https://dolfwin.com/promotions"),
    ("OlympusBet", "https://olympusbet.com/promotions"),
    ("Dream.bet", "https://dream.bet/promotions"),
    ("FestivalPlay", "https://festivalplay.com/promotions"),
    ("Bety", "https://www.bety.com/bonus"),
    ("Eagle777", "https://eagle777.com/promotions"),
    ("InterCasino", "https://www.intercasino.com/en/our-casino-bonuses/"),
    ("BookOfCasino", "https://bookofcasino.net/promotions"),
    ("VegasDukes", "https://vegasdukes.com/promotions"),
    ("Pinnacle Casino", "https://casino.pinnacle.com/en/promotions"),
    ("StarBets", "https://starbets.io/bonus"),
    ("Sikwin", "https://sikwin.com/promotions"),
];

const REGISTER_SITES: &[(&str, &str)] = &[(
    "Anjouan Gaming",
    "https://anjouangaming.com/license-register/",
)];

/// A statically configured page to visit. Identity is the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTarget {
    pub name: String,
    pub url: String,
}

impl SiteTarget {
    pub fn new(name: &str, url: &str) -> Self {
        SiteTarget {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

fn targets(list: &[(&str, &str)]) -> Vec<SiteTarget> {
    list.iter()
        .map(|(name, url)| SiteTarget::new(name, url))
        .collect()
}

pub fn promo_sites() -> Vec<SiteTarget> {
    targets(PROMO_SITES)
}

pub fn register_sites() -> Vec<SiteTarget> {
    targets(REGISTER_SITES)
}

/// Reads a JSON array of `{name, url}` objects.
pub async fn load_sites<P: AsRef<Path>>(path: P) -> Result<Vec<SiteTarget>, MonitorError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// Tunables for fetching and pacing. Defaults match the production cadence.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub user_agent: String,
    pub proxy: Option<String>,
    /// Pause between consecutive site visits.
    pub site_delay: Duration,
    /// Hard bound on a single site's fetch, challenge handling included.
    pub fetch_timeout: Duration,
    /// Challenge wait and settle run on their own clock after the page is open.
    pub challenge_wait: Duration,
    pub settle_timeout: Duration,
    pub min_content_chars: usize,
    /// Any of these triggers one wait-and-settle cycle.
    pub challenge_markers: Vec<String>,
    /// Still present after the cycle means the challenge never cleared.
    pub interstitial_markers: Vec<String>,
    pub geo_markers: Vec<String>,
    /// Links containing this are the register's own pages, not operator sites.
    pub register_host: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            user_agent: USER_AGENT.to_string(),
            proxy: None,
            site_delay: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(30),
            challenge_wait: Duration::from_secs(8),
            settle_timeout: Duration::from_secs(20),
            min_content_chars: 100,
            challenge_markers: vec!["just a moment".to_string(), "challenge".to_string()],
            interstitial_markers: vec!["just a moment".to_string()],
            geo_markers: vec!["not accept players".to_string(), "restricted".to_string()],
            register_host: "anjouangaming".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Register pages legitimately mention restricted territories and
    /// challenges, so only the interstitial's own wording counts there.
    pub fn for_register(self) -> Self {
        MonitorConfig {
            challenge_markers: vec!["just a moment".to_string()],
            geo_markers: vec![],
            ..self
        }
    }
}

impl From<&Args> for MonitorConfig {
    fn from(args: &Args) -> Self {
        MonitorConfig {
            proxy: args.proxy.clone().filter(|p| !p.trim().is_empty()),
            site_delay: Duration::from_millis(args.site_delay_ms),
            fetch_timeout: Duration::from_millis(args.fetch_timeout_ms),
            challenge_wait: Duration::from_millis(args.challenge_wait_ms),
            settle_timeout: Duration::from_millis(args.settle_timeout_ms),
            ..MonitorConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    Json,
    Sqlite,
}

#[derive(Debug, Parser)]
#[command(name = "offer-watch", version, about = "Watch casino promotions and license registers")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Outbound proxy, `scheme://[user:pass@]host:port`
    #[arg(long, env = "PROXY_SERVER", global = true)]
    pub proxy: Option<String>,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true, global = true)]
    pub telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHAT_ID", global = true)]
    pub telegram_chat_id: Option<String>,

    #[arg(long, value_enum, default_value_t = StorageKind::Json, global = true)]
    pub storage: StorageKind,

    /// Seen-license file for the JSON backend
    #[arg(long, default_value = "seen_licenses.json", global = true)]
    pub seen_file: PathBuf,

    /// Promo results file for the JSON backend
    #[arg(long, default_value = "promo_results.json", global = true)]
    pub results_file: PathBuf,

    /// Database name for the SQLite backend (`<name>.db`)
    #[arg(long, default_value = "offer_watch", global = true)]
    pub db_name: String,

    /// JSON file with `[{"name": ..., "url": ...}]` replacing the built-in list
    #[arg(long, global = true)]
    pub sites: Option<PathBuf>,

    #[arg(long, default_value_t = 2_000, global = true)]
    pub site_delay_ms: u64,

    #[arg(long, default_value_t = 30_000, global = true)]
    pub fetch_timeout_ms: u64,

    #[arg(long, default_value_t = 8_000, global = true)]
    pub challenge_wait_ms: u64,

    #[arg(long, default_value_t = 20_000, global = true)]
    pub settle_timeout_ms: u64,

    /// Render promotion pages in headless Chromium
    #[cfg(feature = "browser")]
    #[arg(long, global = true)]
    pub browser: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape promotion pages and report bonus patterns
    Promos,
    /// Scrape the license register and report newly issued licenses
    Licenses {
        /// Seed the seen set from an existing JSON seen file before running
        #[arg(long)]
        import_json: Option<PathBuf>,
    },
}
