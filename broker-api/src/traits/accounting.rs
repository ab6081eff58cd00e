use crate::model::error::GatewayError;
use crate::model::order::Order;
use uuid::Uuid;

/// Surface the strategy engine drives the broker through.
///
/// One tick of reconciliation and valuation happens per `advance`
/// call; order state changes are observed via the notification queue.
pub trait PortfolioAccounting {
    /// Available cash.
    fn cash(&self) -> f64;

    /// Total account value (cash + unleveraged position value).
    fn value(&self) -> f64;

    /// Transmit an order (or park it if it is a bracket child).
    fn submit(&mut self, order: Order) -> Result<Uuid, GatewayError>;

    /// Best-effort cancel. Canceling an already-filled order is a
    /// no-op.
    fn cancel(&mut self, order_id: Uuid) -> Result<(), GatewayError>;

    /// Run one reconciliation tick at the given wall-clock millis.
    fn advance(&mut self, now_ms: i64);

    /// Pop the next order-state notification, oldest first.
    fn pop_notification(&mut self) -> Option<Order>;
}
