use crate::errors::{EngineError, EngineResult};
use crate::models::OptionParams;

/// Session configuration. Defaults describe the reference book:
/// short 10 ETH calls, K=3000, sigma=70%, r=5%, T=1y, polled every 3s.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub asset_symbol: String,
    pub strike: f64,
    pub volatility: f64,
    pub risk_free_rate: f64,
    pub expiry_years: f64,
    /// Signed contract count, negative = short
    pub position_contracts: f64,
    pub poll_interval_ms: u64,
    pub history_capacity: usize,
    pub log_capacity: usize,
    pub analyst_debounce_ms: u64,
    pub action_log_probability: f64,
    pub bootstrap_step_ms: u64,
    pub primary_feed_url: String,
    pub secondary_feed_url: String,
    pub feed_timeout_ms: u64,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            asset_symbol: "ETH".into(),
            strike: 3000.0,
            volatility: 0.70,
            risk_free_rate: 0.05,
            expiry_years: 1.0,
            position_contracts: -10.0,
            poll_interval_ms: 3000,
            history_capacity: 30,
            log_capacity: 50,
            analyst_debounce_ms: 5000,
            action_log_probability: 0.3,
            bootstrap_step_ms: 800,
            primary_feed_url: "https://api.binance.com/api/v3/ticker/price?symbol=ETHUSDT".into(),
            secondary_feed_url: "https://min-api.cryptocompare.com/data/price?fsym=ETH&tsyms=USD".into(),
            feed_timeout_ms: 5000,
            gemini_api_key: None,
            gemini_model: "gemini-3-flash-preview".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            server_port: 3001,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();
        let d = Self::default();

        let cfg = Self {
            asset_symbol: env_var_or("ASSET_SYMBOL", &d.asset_symbol),
            strike: env_parse("STRIKE", d.strike)?,
            volatility: env_parse("VOLATILITY", d.volatility)?,
            risk_free_rate: env_parse("RISK_FREE_RATE", d.risk_free_rate)?,
            expiry_years: env_parse("EXPIRY_YEARS", d.expiry_years)?,
            position_contracts: env_parse("POSITION_CONTRACTS", d.position_contracts)?,
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", d.poll_interval_ms)?,
            history_capacity: env_parse("HISTORY_CAPACITY", d.history_capacity)?,
            log_capacity: env_parse("LOG_CAPACITY", d.log_capacity)?,
            analyst_debounce_ms: env_parse("ANALYST_DEBOUNCE_MS", d.analyst_debounce_ms)?,
            action_log_probability: env_parse("ACTION_LOG_PROBABILITY", d.action_log_probability)?,
            bootstrap_step_ms: env_parse("BOOTSTRAP_STEP_MS", d.bootstrap_step_ms)?,
            primary_feed_url: env_var_or("PRIMARY_FEED_URL", &d.primary_feed_url),
            secondary_feed_url: env_var_or("SECONDARY_FEED_URL", &d.secondary_feed_url),
            feed_timeout_ms: env_parse("FEED_TIMEOUT_MS", d.feed_timeout_ms)?,
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            gemini_model: env_var_or("GEMINI_MODEL", &d.gemini_model),
            gemini_base_url: env_var_or("GEMINI_BASE_URL", &d.gemini_base_url),
            server_port: env_parse("SERVER_PORT", d.server_port)?,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.history_capacity == 0 || self.log_capacity == 0 {
            return Err(EngineError::Config("buffer capacities must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(EngineError::Config("POLL_INTERVAL_MS must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.action_log_probability) {
            return Err(EngineError::Config(format!(
                "ACTION_LOG_PROBABILITY must be in [0, 1], got {}",
                self.action_log_probability
            )));
        }
        if !self.position_contracts.is_finite() {
            return Err(EngineError::Config("POSITION_CONTRACTS must be finite".into()));
        }
        // A positive reference spot exercises every other pricing guard.
        crate::models::black_scholes::price(&self.option_params(self.strike))
            .map_err(|e| EngineError::Config(e.to_string()))?;
        Ok(())
    }

    /// Session option parameters at the given spot.
    #[inline]
    pub fn option_params(&self, spot: f64) -> OptionParams {
        OptionParams {
            spot,
            strike: self.strike,
            ttl_years: self.expiry_years,
            rate: self.risk_free_rate,
            sigma: self.volatility,
        }
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> EngineResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| EngineError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}
