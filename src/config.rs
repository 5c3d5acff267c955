// ⚙️ Configuration - thresholds and role tiers as data
//
// Loaded from a JSON file (--config or CLINIC_CONFIG). Every field has a
// default so a partial file is enough; a few secrets can come from the
// environment instead of the file.

use crate::records::RecordKind;
use crate::roles::ApprovalTier;
use anyhow::{Context as AnyhowContext, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "CLINIC_CONFIG";
pub const DB_PATH_ENV: &str = "CLINIC_DB_PATH";
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHAT_ENV: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{kind}: auto_approve_below ({auto}) must not exceed manager_above ({manager})")]
    ThresholdOrder {
        kind: RecordKind,
        auto: Decimal,
        manager: Decimal,
    },

    #[error("{kind}: thresholds must not be negative")]
    NegativeThreshold { kind: RecordKind },

    #[error("bulk.batch_size must be greater than zero")]
    ZeroBatchSize,

    #[error("telegram is enabled but {0} is not set")]
    TelegramIncomplete(&'static str),
}

// ============================================================================
// VALIDATION THRESHOLDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindThresholds {
    /// Amounts strictly below this are approved by the system on submission
    pub auto_approve_below: Decimal,
    /// Amounts strictly above this need a manager; the rest need a supervisor
    pub manager_above: Decimal,
}

impl KindThresholds {
    pub fn new(auto_approve_below: i64, manager_above: i64) -> Self {
        KindThresholds {
            auto_approve_below: Decimal::from(auto_approve_below),
            manager_above: Decimal::from(manager_above),
        }
    }

    /// None means the amount qualifies for auto-approval
    pub fn required_tier(&self, amount: Decimal) -> Option<ApprovalTier> {
        if amount < self.auto_approve_below {
            None
        } else if amount > self.manager_above {
            Some(ApprovalTier::Manager)
        } else {
            Some(ApprovalTier::Supervisor)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub tindakan: KindThresholds,
    pub pendapatan_harian: KindThresholds,
    pub pengeluaran_harian: KindThresholds,
    pub pengeluaran: KindThresholds,
    /// Role name (lowercase) → tier. Unknown roles get `none`.
    #[serde(deserialize_with = "lowercase_role_keys")]
    pub role_tiers: HashMap<String, ApprovalTier>,
}

fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase()
}

fn lowercase_role_keys<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, ApprovalTier>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, ApprovalTier>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(role, tier)| (normalize_role(&role), tier))
        .collect())
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let role_tiers = [
            ("supervisor", ApprovalTier::Supervisor),
            ("bendahara", ApprovalTier::Supervisor),
            ("manager", ApprovalTier::Manager),
            ("manajer", ApprovalTier::Manager),
            ("admin", ApprovalTier::Manager),
        ]
        .into_iter()
        .map(|(role, tier)| (role.to_string(), tier))
        .collect();

        ValidationConfig {
            tindakan: KindThresholds::new(100_000, 500_000),
            pendapatan_harian: KindThresholds::new(500_000, 5_000_000),
            pengeluaran_harian: KindThresholds::new(100_000, 1_000_000),
            pengeluaran: KindThresholds::new(100_000, 1_000_000),
            role_tiers,
        }
    }
}

impl ValidationConfig {
    pub fn thresholds(&self, kind: RecordKind) -> &KindThresholds {
        match kind {
            RecordKind::Tindakan => &self.tindakan,
            RecordKind::PendapatanHarian => &self.pendapatan_harian,
            RecordKind::PengeluaranHarian => &self.pengeluaran_harian,
            RecordKind::Pengeluaran => &self.pengeluaran,
        }
    }

    pub fn required_tier(&self, kind: RecordKind, amount: Decimal) -> Option<ApprovalTier> {
        self.thresholds(kind).required_tier(amount)
    }

    pub fn tier_for_role(&self, role: &str) -> ApprovalTier {
        self.role_tiers
            .get(&normalize_role(role))
            .copied()
            .unwrap_or(ApprovalTier::None)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for kind in RecordKind::ALL {
            let t = self.thresholds(kind);
            if t.auto_approve_below < Decimal::ZERO || t.manager_above < Decimal::ZERO {
                return Err(ConfigError::NegativeThreshold { kind });
            }
            if t.auto_approve_below > t.manager_above {
                return Err(ConfigError::ThresholdOrder {
                    kind,
                    auto: t.auto_approve_below,
                    manager: t.manager_above,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// CHANNELS AND SERVICES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig {
            enabled: false,
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            cache_ttl_secs: 300,
            cache_capacity: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub batch_size: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        BulkConfig { batch_size: 100 }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub validation: ValidationConfig,
    pub telegram: TelegramConfig,
    pub stats: StatsConfig,
    pub bulk: BulkConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("clinic.db"),
            validation: ValidationConfig::default(),
            telegram: TelegramConfig::default(),
            stats: StatsConfig::default(),
            bulk: BulkConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AppConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// Explicit path first, then CLINIC_CONFIG, then defaults; env overrides on top
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.trim().is_empty());

        let mut config = match (path, env_path) {
            (Some(p), _) => AppConfig::from_file(p)?,
            (None, Some(p)) => AppConfig::from_file(&p)?,
            (None, None) => AppConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var(DB_PATH_ENV) {
            if !db.trim().is_empty() {
                self.database_path = PathBuf::from(db);
            }
        }
        if let Ok(token) = std::env::var(TELEGRAM_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.telegram.bot_token = Some(token);
            }
        }
        if let Ok(chat) = std::env::var(TELEGRAM_CHAT_ENV) {
            if !chat.trim().is_empty() {
                self.telegram.chat_id = Some(chat);
            }
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.validation.validate()?;

        if self.bulk.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }

        if self.telegram.enabled {
            if self.telegram.bot_token.is_none() {
                return Err(ConfigError::TelegramIncomplete("bot_token"));
            }
            if self.telegram.chat_id.is_none() {
                return Err(ConfigError::TelegramIncomplete("chat_id"));
            }
        }

        Ok(())
    }
}
