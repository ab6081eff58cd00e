use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

fn default_cash() -> f64 {
    1000.0
}

fn default_cash_asset() -> String {
    "USDT".to_string()
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_fund_start_value() -> f64 {
    100.0
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_commission_rate() -> f64 {
    0.00075
}

fn default_leverage() -> f64 {
    1.0
}

fn default_stock_like() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_pace_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionSettings {
    #[serde(default = "default_commission_rate")]
    pub rate: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_stock_like")]
    pub stock_like: bool,
    /// Annualized holding-interest rate; 0 disables accrual.
    #[serde(default)]
    pub interest_rate: f64,
}

impl Default for CommissionSettings {
    fn default() -> Self {
        Self {
            rate: default_commission_rate(),
            leverage: default_leverage(),
            stock_like: default_stock_like(),
            interest_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed pause before every gateway attempt (API rate limit).
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            pace_ms: default_pace_ms(),
        }
    }
}

/// Broker configuration, layered from an optional file and `BROKER_`
/// environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Requested starting cash; clamped to the exchange-reported free
    /// balance at startup.
    #[serde(default = "default_cash")]
    pub cash: f64,
    /// Asset the account is denominated in.
    #[serde(default = "default_cash_asset")]
    pub cash_asset: String,
    /// Most recent unmatched fill events retained (drop-oldest beyond).
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Value-based instead of cost-based open/close bookkeeping.
    #[serde(default)]
    pub value_based: bool,
    #[serde(default = "default_fund_start_value")]
    pub fund_start_value: f64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub commission: CommissionSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cash: default_cash(),
            cash_asset: default_cash_asset(),
            buffer_capacity: default_buffer_capacity(),
            value_based: false,
            fund_start_value: default_fund_start_value(),
            tick_ms: default_tick_ms(),
            commission: CommissionSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("BROKER").separator("__"))
            .build()?
            .try_deserialize()
    }
}
