use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the exchange once an order is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeOrderId(u64);

impl ExchangeOrderId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangeOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fill reported inline on a submission acknowledgment (market
/// orders with a FULL response carry these).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckFill {
    pub size: f64,
    pub price: f64,
    pub commission: f64,
    pub commission_asset: String,
}

/// Acknowledgment returned by the gateway for a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub exchange_order_id: ExchangeOrderId,
    pub executed_size: f64,
    pub fills: Vec<AckFill>,
}

/// Outcome of a cancel request. Canceling an order the exchange has
/// already fully filled is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    AlreadyFilled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssetBalance {
    pub free: f64,
    pub locked: f64,
}

/// Exchange precision filters for one instrument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub price_step: f64,
    pub size_step: f64,
    pub min_size: f64,
    pub min_notional: f64,
}

impl SymbolFilters {
    /// Round `value` down to an exchange-precision multiple of `step`.
    fn round_to_step(value: f64, step: f64) -> f64 {
        if step <= 0.0 {
            return value;
        }
        (value / step).floor() * step
    }

    pub fn format_price(&self, value: f64) -> f64 {
        Self::round_to_step(value, self.price_step)
    }

    pub fn format_quantity(&self, value: f64) -> f64 {
        Self::round_to_step(value, self.size_step)
    }
}
