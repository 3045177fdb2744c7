//! Order sizing policy.

use common::SizingMode;

/// Contracts to buy for one opportunity.
///
/// * `Contracts`: `floor(amount)`, at least 1.
/// * `Dollars`: `floor(amount / price)`, at least 1. A non-positive price
///   falls back to a single contract.
pub fn order_count(mode: SizingMode, amount: f64, price: f64) -> i64 {
    let raw = match mode {
        SizingMode::Contracts => amount.floor(),
        SizingMode::Dollars => {
            if price.is_nan() || price <= 0.0 {
                return 1;
            }
            (amount / price).floor()
        }
    };
    if raw.is_finite() {
        (raw as i64).max(1)
    } else {
        1
    }
}
