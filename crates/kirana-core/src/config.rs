//! Kirana configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KiranaError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KiranaConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

impl KiranaConfig {
    /// Load config from `KIRANA_CONFIG` or the default path; missing file
    /// means defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("KIRANA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KiranaError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| KiranaError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| KiranaError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Default config path (~/.kirana/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// The Kirana home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kirana")
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. Empty means `~/.kirana/kirana.db`.
    #[serde(default)]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: String::new() }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if self.db_path.is_empty() {
            KiranaConfig::home_dir().join("kirana.db")
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

/// WhatsApp Cloud API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Facebook Graph API access token.
    #[serde(default)]
    pub access_token: String,
    /// WhatsApp Phone Number ID.
    #[serde(default)]
    pub phone_number_id: String,
    /// Graph API base, overridable for tests.
    #[serde(default = "default_graph_base")]
    pub api_base: String,
}

fn default_graph_base() -> String {
    "https://graph.facebook.com/v21.0".into()
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            api_base: default_graph_base(),
        }
    }
}

/// Control API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8990
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Orchestrator tick settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between orchestrator ticks in `serve` mode.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Wall-clock budget for one tick; checked before every send.
    #[serde(default = "default_tick_budget")]
    pub tick_budget_secs: u64,
    /// How many due scheduled campaigns to promote per tick.
    #[serde(default = "default_promote_batch")]
    pub promote_batch: usize,
    /// How many sending campaigns to drain per tick.
    #[serde(default = "default_drain_batch")]
    pub drain_batch: usize,
    /// Claims older than this are released back to pending.
    #[serde(default = "default_stale_claim")]
    pub stale_claim_secs: i64,
}

fn default_tick_interval() -> u64 {
    60
}
fn default_tick_budget() -> u64 {
    300
}
fn default_promote_batch() -> usize {
    5
}
fn default_drain_batch() -> usize {
    3
}
fn default_stale_claim() -> i64 {
    600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            tick_budget_secs: default_tick_budget(),
            promote_batch: default_promote_batch(),
            drain_batch: default_drain_batch(),
            stale_claim_secs: default_stale_claim(),
        }
    }
}

/// Lifecycle reminder thresholds. All windows are checked against seeded
/// timestamps, so tests steer selection by writing the clock into rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Candidates processed per procedure per tick.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Pause between lifecycle sends, in ms.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,

    /// Carts below this value are never reminded.
    #[serde(default = "default_cart_min_value")]
    pub cart_min_value: f64,
    #[serde(default = "default_cart_max_reminders")]
    pub cart_max_reminders: i64,
    /// Delay before reminder 1/2/3, in minutes.
    #[serde(default = "default_cart_delays")]
    pub cart_delays_mins: Vec<i64>,

    #[serde(default = "default_payment_min_age")]
    pub payment_min_age_mins: i64,
    #[serde(default = "default_payment_max_age")]
    pub payment_max_age_hours: i64,
    #[serde(default = "default_payment_cooldown")]
    pub payment_cooldown_hours: i64,

    #[serde(default = "default_delivery_confirm_days")]
    pub delivery_confirm_after_days: i64,

    #[serde(default = "default_review_min_days")]
    pub review_min_days: i64,
    #[serde(default = "default_review_max_days")]
    pub review_max_days: i64,

    #[serde(default = "default_winback_min_inactive")]
    pub winback_min_inactive_days: i64,
    #[serde(default = "default_winback_max_inactive")]
    pub winback_max_inactive_days: i64,
    #[serde(default = "default_winback_seen_within")]
    pub winback_seen_within_days: i64,
    #[serde(default = "default_winback_cooldown")]
    pub winback_cooldown_days: i64,
    #[serde(default = "default_winback_min_orders")]
    pub winback_min_orders: i64,
}

fn default_page_size() -> usize {
    20
}
fn default_send_delay_ms() -> u64 {
    2000
}
fn default_cart_min_value() -> f64 {
    200.0
}
fn default_cart_max_reminders() -> i64 {
    3
}
fn default_cart_delays() -> Vec<i64> {
    vec![60, 1440, 2880]
}
fn default_payment_min_age() -> i64 {
    30
}
fn default_payment_max_age() -> i64 {
    24
}
fn default_payment_cooldown() -> i64 {
    2
}
fn default_delivery_confirm_days() -> i64 {
    5
}
fn default_review_min_days() -> i64 {
    3
}
fn default_review_max_days() -> i64 {
    7
}
fn default_winback_min_inactive() -> i64 {
    30
}
fn default_winback_max_inactive() -> i64 {
    60
}
fn default_winback_seen_within() -> i64 {
    7
}
fn default_winback_cooldown() -> i64 {
    14
}
fn default_winback_min_orders() -> i64 {
    2
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            send_delay_ms: default_send_delay_ms(),
            cart_min_value: default_cart_min_value(),
            cart_max_reminders: default_cart_max_reminders(),
            cart_delays_mins: default_cart_delays(),
            payment_min_age_mins: default_payment_min_age(),
            payment_max_age_hours: default_payment_max_age(),
            payment_cooldown_hours: default_payment_cooldown(),
            delivery_confirm_after_days: default_delivery_confirm_days(),
            review_min_days: default_review_min_days(),
            review_max_days: default_review_max_days(),
            winback_min_inactive_days: default_winback_min_inactive(),
            winback_max_inactive_days: default_winback_max_inactive(),
            winback_seen_within_days: default_winback_seen_within(),
            winback_cooldown_days: default_winback_cooldown(),
            winback_min_orders: default_winback_min_orders(),
        }
    }
}

impl ReminderConfig {
    /// Delay before reminder number `n` (1-based), in minutes.
    pub fn cart_delay_for(&self, n: i64) -> i64 {
        let idx = (n - 1).max(0) as usize;
        self.cart_delays_mins
            .get(idx)
            .copied()
            .or_else(|| self.cart_delays_mins.last().copied())
            .unwrap_or(60)
    }
}
