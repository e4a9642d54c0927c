//! Delta hedging for a fixed option book.
//!
//! A book of `n` calls has portfolio delta n * delta. Holding
//! |n| * delta of the underlying offsets a short book exactly:
//!
//!   hedge = |position| * delta
//!
//! The system only computes and reports this quantity; it never sends orders.

/// Required holding of the underlying for delta neutrality. Pure function.
///
/// Finite inputs never fail. A NaN/inf delta propagates, so callers must
/// only pass deltas produced by a validated pricing call.
#[inline]
pub fn calculate_hedge(position_size: f64, delta: f64) -> f64 {
    position_size.abs() * delta
}

/// Current hedge ticket for the book. Stack-allocated.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HedgePosition {
    /// Negative for short, positive for long
    pub contracts: f64,
    /// Units of underlying per contract (1 for crypto options)
    pub contract_size: f64,
    pub current_delta: f64,
    /// Amount of underlying to hold
    pub hedge_required: f64,
}

impl HedgePosition {
    pub fn new(contracts: f64, delta: f64) -> Self {
        Self::with_contract_size(contracts, 1.0, delta)
    }

    pub fn with_contract_size(contracts: f64, contract_size: f64, delta: f64) -> Self {
        Self {
            contracts,
            contract_size,
            current_delta: delta,
            hedge_required: calculate_hedge(contracts * contract_size, delta),
        }
    }

    /// Net delta of options plus hedge, for a short book this is zero.
    #[inline]
    pub fn net_delta(&self) -> f64 {
        let option_delta = self.contracts * self.contract_size * self.current_delta;
        if self.contracts < 0.0 {
            option_delta + self.hedge_required
        } else {
            option_delta - self.hedge_required
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Implied trade to move the hedge from one target to the next.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Rebalance {
    pub side: TradeSide,
    pub quantity: f64,
}

/// Changes smaller than this are treated as no trade.
const MIN_REBALANCE_QTY: f64 = 1e-9;

impl Rebalance {
    /// `previous` is None before the first hedge is established, in which
    /// case the whole target is bought.
    pub fn between(previous: Option<f64>, target: f64) -> Self {
        let change = target - previous.unwrap_or(0.0);
        let side = if change > MIN_REBALANCE_QTY {
            TradeSide::Buy
        } else if change < -MIN_REBALANCE_QTY {
            TradeSide::Sell
        } else {
            TradeSide::Hold
        };
        Self {
            side,
            quantity: change.abs(),
        }
    }

    #[inline]
    pub fn is_trade(&self) -> bool {
        self.side != TradeSide::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_book_hedge() {
        let h = calculate_hedge(-10.0, 0.6635);
        assert!((h - 6.635).abs() < 1e-3);
    }

    #[test]
    fn test_hedge_is_abs_times_delta_exactly() {
        for &pos in &[-10.0, -3.0, 0.0, 1.0, 7.5, -250.0] {
            for &delta in &[0.0, 0.123, 0.5, 0.6635, 0.999, 1.0] {
                let expected: f64 = f64::abs(pos) * delta;
                assert_eq!(calculate_hedge(pos, delta), expected);
                assert!(calculate_hedge(pos, delta) >= 0.0);
            }
        }
    }

    #[test]
    fn test_nan_delta_propagates() {
        assert!(calculate_hedge(-10.0, f64::NAN).is_nan());
    }

    #[test]
    fn test_short_book_is_delta_neutral() {
        let pos = HedgePosition::new(-10.0, 0.42);
        assert!((pos.hedge_required - 4.2).abs() < 1e-12);
        assert!(pos.net_delta().abs() < 1e-12);
    }

    #[test]
    fn test_contract_size_scales_hedge() {
        let pos = HedgePosition::with_contract_size(-2.0, 100.0, 0.5);
        assert!((pos.hedge_required - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_rebalance_sides() {
        let first = Rebalance::between(None, 6.6);
        assert_eq!(first.side, TradeSide::Buy);
        assert!((first.quantity - 6.6).abs() < 1e-12);

        let down = Rebalance::between(Some(6.6), 6.1);
        assert_eq!(down.side, TradeSide::Sell);
        assert!((down.quantity - 0.5).abs() < 1e-9);

        let flat = Rebalance::between(Some(6.6), 6.6);
        assert!(!flat.is_trade());
        assert_eq!(flat.side.to_string(), "HOLD");
    }
}
