/// Last-resort price when every upstream source is down. Keeps the chart
/// and the pricing engine alive with a finite value near recent ETH levels.
pub const BASELINE: f64 = 2500.0;
pub const AMPLITUDE: f64 = 10.0;
/// Oscillation period scale in milliseconds (sin(t / 5000))
pub const PERIOD_MS: f64 = 5000.0;
/// Jitter is drawn uniformly from [0, MAX_JITTER)
pub const MAX_JITTER: f64 = 5.0;

/// baseline + smooth oscillation + bounded jitter. Pure function of its
/// inputs, always within [BASELINE - AMPLITUDE, BASELINE + AMPLITUDE + MAX_JITTER].
#[inline]
pub fn synthetic_price(now_ms: i64, jitter: f64) -> f64 {
    let jitter = if jitter.is_finite() {
        jitter.clamp(0.0, MAX_JITTER)
    } else {
        0.0
    };
    BASELINE + (now_ms as f64 / PERIOD_MS).sin() * AMPLITUDE + jitter
}

/// Draw a jitter value and synthesize the current price.
pub fn sample(now_ms: i64) -> f64 {
    use rand::Rng;
    let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER);
    synthetic_price(now_ms, jitter)
}
