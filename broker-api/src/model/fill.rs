use super::exchange::ExchangeOrderId;
use serde::{Deserialize, Serialize};

/// Order state reported alongside a fill by the exchange stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillStatus {
    PartiallyFilled,
    Filled,
}

/// A trade-fill notification pushed by the exchange, parsed once at
/// the gateway boundary. The core never inspects raw wire shapes.
///
/// Transient: consumed and discarded once matched to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub exchange_order_id: ExchangeOrderId,
    pub status: FillStatus,
    pub size: f64,
    pub price: f64,
    pub commission: f64,
    pub commission_asset: String,
}
