pub mod black_scholes;

use crate::errors::EngineResult;

/// All pricing models implement this trait.
/// price() must be a pure function: deterministic output from inputs only.
/// Send + Sync required for use across tokio tasks.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Value and Greeks of a European call. Rejects inputs that would
    /// otherwise produce NaN instead of returning them.
    fn price(&self, params: &OptionParams) -> EngineResult<PricingResult>;
}

/// Inputs for one evaluation. Stack-allocated, Copy.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct OptionParams {
    pub spot: f64,
    pub strike: f64,
    /// Time to expiry in years
    pub ttl_years: f64,
    pub rate: f64,
    pub sigma: f64,
}

/// Theoretical value plus first/second-order sensitivities.
/// Recomputed every tick, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct PricingResult {
    pub value: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub d1: f64,
    pub d2: f64,
}
