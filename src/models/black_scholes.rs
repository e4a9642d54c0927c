use crate::errors::{EngineError, EngineResult};
use crate::models::{OptionParams, PricingModel, PricingResult};

/// Floor applied to time-to-expiry so sigma*sqrt(T) never hits zero.
pub const MIN_TTL_YEARS: f64 = 1e-5;

// Abramowitz & Stegun 7.1.26 coefficients (|error| <= 1.5e-7)
const A1: f64 = 0.254829592;
const A2: f64 = -0.284496736;
const A3: f64 = 1.421413741;
const A4: f64 = -1.453152027;
const A5: f64 = 1.061405429;
const P: f64 = 0.3275911;

const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Error function via the Abramowitz & Stegun rational approximation.
#[inline]
pub fn erf(x: f64) -> f64 {
    let sign = if x >= 0.0 { 1.0 } else { -1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    let y = 1.0 - poly * (-x * x).exp();

    sign * y
}

/// Standard normal CDF: Phi(x) = (1 + erf(x / sqrt 2)) / 2
#[inline]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF
#[inline]
pub fn norm_pdf(x: f64) -> f64 {
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Black-Scholes European call.
///
/// d1 = (ln(S/K) + (r + sigma^2/2)*T) / (sigma * sqrt(T))
/// d2 = d1 - sigma * sqrt(T)
/// V  = S*Phi(d1) - K*exp(-rT)*Phi(d2)
///
/// The upstream dashboard called this a "PINN inference pass"; the network
/// converges to this closed form, so the closed form is all we run.
pub struct BlackScholesCall;

impl PricingModel for BlackScholesCall {
    #[inline]
    fn name(&self) -> &'static str {
        "Black-Scholes"
    }

    fn price(&self, params: &OptionParams) -> EngineResult<PricingResult> {
        price(params)
    }
}

/// Price a call and its Greeks. Pure function.
pub fn price(params: &OptionParams) -> EngineResult<PricingResult> {
    validate(params)?;

    let OptionParams {
        spot: s,
        strike: k,
        rate: r,
        sigma,
        ..
    } = *params;
    let t = params.ttl_years.max(MIN_TTL_YEARS);

    let sqrt_t = t.sqrt();
    let sigma_sqrt_t = sigma * sqrt_t;
    let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / sigma_sqrt_t;
    let d2 = d1 - sigma_sqrt_t;

    let discount = (-r * t).exp();
    let cdf_d1 = norm_cdf(d1);
    let cdf_d2 = norm_cdf(d2);
    let pdf_d1 = norm_pdf(d1);

    let value = s * cdf_d1 - k * discount * cdf_d2;
    let delta = cdf_d1;
    let gamma = pdf_d1 / (s * sigma_sqrt_t);
    let theta = -(s * pdf_d1 * sigma) / (2.0 * sqrt_t) - r * k * discount * cdf_d2;

    Ok(PricingResult {
        value,
        delta,
        gamma,
        theta,
        d1,
        d2,
    })
}

fn validate(params: &OptionParams) -> EngineResult<()> {
    let fields = [
        ("spot", params.spot),
        ("strike", params.strike),
        ("ttl_years", params.ttl_years),
        ("rate", params.rate),
        ("sigma", params.sigma),
    ];
    if let Some((name, v)) = fields.iter().find(|(_, v)| !v.is_finite()) {
        return Err(EngineError::Validation(format!("{name} is not finite: {v}")));
    }
    if params.spot <= 0.0 {
        return Err(EngineError::Validation(format!("spot must be positive, got {}", params.spot)));
    }
    if params.strike <= 0.0 {
        return Err(EngineError::Validation(format!("strike must be positive, got {}", params.strike)));
    }
    if params.sigma <= 0.0 {
        return Err(EngineError::Validation(format!("sigma must be positive, got {}", params.sigma)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::distribution::{Continuous, ContinuousCDF, Normal};

    fn session(spot: f64) -> OptionParams {
        OptionParams { spot, strike: 3000.0, ttl_years: 1.0, rate: 0.05, sigma: 0.70 }
    }

    #[test]
    fn test_atm_session_scenario() {
        let res = price(&session(3000.0)).unwrap();
        assert!((res.d1 - 0.421_428_571).abs() < 1e-6, "d1={}", res.d1);
        assert!((res.delta - 0.6635).abs() < 0.001, "delta={}", res.delta);
        // Closed form: 3000*Phi(d1) - 3000*e^-0.05*Phi(d2)
        assert!((res.value - 876.08).abs() < 0.5, "value={}", res.value);
        assert!(res.gamma > 0.0);
        assert!(res.theta < 0.0);
    }

    #[test]
    fn test_erf_matches_reference_cdf() {
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut x = -6.0;
        while x <= 6.0 {
            let err = (norm_cdf(x) - normal.cdf(x)).abs();
            assert!(err < 1.5e-7, "cdf error {err} at x={x}");
            assert!((norm_pdf(x) - normal.pdf(x)).abs() < 1e-12);
            x += 0.05;
        }
    }

    #[test]
    fn test_erf_odd_symmetry() {
        for x in [0.1, 0.5, 1.3, 2.7] {
            assert!((erf(x) + erf(-x)).abs() < 1e-15);
        }
        assert!(erf(0.0).abs() < 1e-8);
    }

    #[test]
    fn test_bounds_across_grid() {
        for &spot in &[500.0, 1500.0, 2900.0, 3000.0, 3100.0, 6000.0, 20_000.0] {
            for &ttl in &[1e-4, 0.01, 0.25, 1.0, 5.0] {
                for &sigma in &[0.05, 0.3, 0.7, 1.5] {
                    let p = OptionParams { spot, strike: 3000.0, ttl_years: ttl, rate: 0.05, sigma };
                    let res = price(&p).unwrap();
                    let lower = (spot - 3000.0 * (-0.05 * ttl).exp()).max(0.0);
                    assert!(res.delta >= -1e-6 && res.delta <= 1.0 + 1e-6, "delta={} for {p:?}", res.delta);
                    assert!(res.gamma >= -1e-6, "gamma={} for {p:?}", res.gamma);
                    assert!(res.value >= lower - 1e-6, "value={} < {lower} for {p:?}", res.value);
                }
            }
        }
    }

    #[test]
    fn test_expiry_is_step_function() {
        let mut p = session(3300.0);
        p.ttl_years = 0.0;
        let itm = price(&p).unwrap();
        assert!(itm.delta > 0.999 && itm.gamma.is_finite() && itm.value.is_finite());

        p.spot = 2700.0;
        let otm = price(&p).unwrap();
        assert!(otm.delta < 0.001 && otm.value.is_finite());

        p.spot = 3000.0;
        let atm = price(&p).unwrap();
        assert!((atm.delta - 0.5).abs() < 0.01, "atm delta={}", atm.delta);
        assert!(atm.gamma.is_finite() && atm.theta.is_finite());
    }

    #[test]
    fn test_negative_ttl_is_floored() {
        let mut p = session(3000.0);
        p.ttl_years = -2.0;
        let res = price(&p).unwrap();
        assert!(res.delta.is_finite() && res.value.is_finite());
    }

    #[test]
    fn test_rejects_non_positive_inputs() {
        assert!(matches!(price(&session(0.0)), Err(EngineError::Validation(_))));
        assert!(matches!(price(&session(-5.0)), Err(EngineError::Validation(_))));

        let mut p = session(3000.0);
        p.strike = 0.0;
        assert!(matches!(price(&p), Err(EngineError::Validation(_))));

        let mut p = session(3000.0);
        p.sigma = 0.0;
        assert!(matches!(price(&p), Err(EngineError::Validation(_))));

        let mut p = session(3000.0);
        p.spot = f64::NAN;
        assert!(matches!(price(&p), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_trait_delegates() {
        let model = BlackScholesCall;
        assert_eq!(model.name(), "Black-Scholes");
        assert_eq!(model.price(&session(3000.0)).unwrap(), price(&session(3000.0)).unwrap());
    }
}
