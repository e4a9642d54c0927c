pub mod debounce;
pub mod gemini;

use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::models::PricingResult;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;

pub const OFFLINE_PLACEHOLDER: &str = "AI Analyst offline: Check API Key.";
pub const FAILURE_PLACEHOLDER: &str = "AI Analysis failed due to connectivity.";
pub const EMPTY_PLACEHOLDER: &str = "Analysis unavailable.";

/// Text-summarization service that turns the current book state into a
/// one-line risk comment. Opaque to the engine; mocked in tests.
pub trait RiskAnalyst: Send + Sync {
    fn name(&self) -> &'static str;

    fn analyze<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, EngineResult<String>>;
}

/// Used when no credentials are configured. Always fails with a config error.
pub struct OfflineAnalyst;

impl RiskAnalyst for OfflineAnalyst {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn analyze<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, EngineResult<String>> {
        async { Err(EngineError::Config("GEMINI_API_KEY not set".into())) }.boxed()
    }
}

/// Gemini when a key is present, otherwise offline.
pub fn from_config(config: &AppConfig) -> Arc<dyn RiskAnalyst> {
    match &config.gemini_api_key {
        Some(key) => Arc::new(gemini::GeminiAnalyst::new(
            &config.gemini_base_url,
            &config.gemini_model,
            key,
        )),
        None => {
            tracing::warn!("GEMINI_API_KEY not set, risk analyst offline");
            Arc::new(OfflineAnalyst)
        }
    }
}

/// Everything the prompt needs. Stack-allocated except the symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskInput {
    pub asset: String,
    pub price: f64,
    pub pricing: PricingResult,
    pub hedge_amount: f64,
    pub strike: f64,
    pub volatility: f64,
    pub position_contracts: f64,
}

impl RiskInput {
    pub fn new(config: &AppConfig, price: f64, pricing: PricingResult, hedge_amount: f64) -> Self {
        Self {
            asset: config.asset_symbol.clone(),
            price,
            pricing,
            hedge_amount,
            strike: config.strike,
            volatility: config.volatility,
            position_contracts: config.position_contracts,
        }
    }
}

pub fn build_prompt(input: &RiskInput) -> String {
    let side = if input.position_contracts < 0.0 { "Short" } else { "Long" };
    format!(
        "You are a Lead Quantitative Risk Manager at a High-Frequency Trading firm.

Market Data:
- Asset: {asset}/USD
- Spot Price: ${price:.2}
- Implied Volatility: {vol:.0}%
- Strategy: {side} {contracts} Call Options (Strike ${strike:.0})

Model Output (Black-Scholes PINN):
- Theoretical Option Price: ${value:.2}
- Delta (Sensitivity): {delta:.4}
- Gamma (Convexity): {gamma:.6}

Current Hedge Requirement:
- We need to hold {hedge:.4} {asset} to be Delta Neutral.

Task: Provide a concise, 1-sentence analytical comment on the current risk exposure or the \"Greeks\". Sound professional and mathematical.",
        asset = input.asset,
        price = input.price,
        vol = input.volatility * 100.0,
        side = side,
        contracts = input.position_contracts.abs(),
        strike = input.strike,
        value = input.pricing.value,
        delta = input.pricing.delta,
        gamma = input.pricing.gamma,
        hedge = input.hedge_amount,
    )
}

/// Ask the analyst for a comment. Never fails: errors become placeholders.
pub async fn analyze_risk(analyst: &dyn RiskAnalyst, input: &RiskInput) -> String {
    let prompt = build_prompt(input);
    match analyst.analyze(&prompt).await {
        Ok(text) if text.trim().is_empty() => EMPTY_PLACEHOLDER.to_string(),
        Ok(text) => text.trim().to_string(),
        Err(EngineError::Config(reason)) => {
            tracing::debug!(analyst = analyst.name(), %reason, "risk analyst offline");
            OFFLINE_PLACEHOLDER.to_string()
        }
        Err(e) => {
            tracing::error!(analyst = analyst.name(), error = %e, "risk analyst call failed");
            FAILURE_PLACEHOLDER.to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records prompts and replies with a canned result.
    pub(crate) struct MockAnalyst {
        pub reply: Result<String, String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl MockAnalyst {
        pub(crate) fn replying(text: &str) -> Self {
            Self { reply: Ok(text.to_string()), prompts: Mutex::new(Vec::new()) }
        }

        pub(crate) fn failing(reason: &str) -> Self {
            Self { reply: Err(reason.to_string()), prompts: Mutex::new(Vec::new()) }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl RiskAnalyst for MockAnalyst {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn analyze<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, EngineResult<String>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let reply = self.reply.clone().map_err(EngineError::Network);
            async move { reply }.boxed()
        }
    }

    fn input() -> RiskInput {
        let pricing = PricingResult { value: 876.08, delta: 0.6633, gamma: 0.000174, theta: -438.98, d1: 0.42, d2: -0.28 };
        RiskInput::new(&AppConfig::default(), 3000.0, pricing, 6.633)
    }

    #[test]
    fn test_prompt_carries_book_state() {
        let prompt = build_prompt(&input());
        assert!(prompt.contains("ETH/USD"));
        assert!(prompt.contains("Spot Price: $3000.00"));
        assert!(prompt.contains("Implied Volatility: 70%"));
        assert!(prompt.contains("Short 10 Call Options (Strike $3000)"));
        assert!(prompt.contains("Delta (Sensitivity): 0.6633"));
        assert!(prompt.contains("Gamma (Convexity): 0.000174"));
        assert!(prompt.contains("hold 6.6330 ETH"));
    }

    #[tokio::test]
    async fn test_reply_is_trimmed() {
        let analyst = MockAnalyst::replying("  Gamma is modest; hedge drift is contained.\n");
        let text = analyze_risk(&analyst, &input()).await;
        assert_eq!(text, "Gamma is modest; hedge drift is contained.");
        assert_eq!(analyst.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_maps_to_placeholder() {
        let analyst = MockAnalyst::failing("quota exceeded");
        assert_eq!(analyze_risk(&analyst, &input()).await, FAILURE_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_empty_reply_placeholder() {
        let analyst = MockAnalyst::replying("   ");
        assert_eq!(analyze_risk(&analyst, &input()).await, EMPTY_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_offline_placeholder() {
        assert_eq!(analyze_risk(&OfflineAnalyst, &input()).await, OFFLINE_PLACEHOLDER);
    }

    #[test]
    fn test_from_config_without_key_is_offline() {
        let analyst = from_config(&AppConfig::default());
        assert_eq!(analyst.name(), "offline");
    }
}
