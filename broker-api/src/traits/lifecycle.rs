use crate::model::order::{Order, OrderStatus};

/// Lifecycle view the reconciliation loop depends on, decoupled from
/// the concrete order type.
pub trait OrderLifecycle {
    fn status(&self) -> OrderStatus;

    /// Not yet in a terminal state.
    fn alive(&self) -> bool;

    /// Acknowledged at the exchange and able to receive fills.
    fn active(&self) -> bool;

    fn remaining_size(&self) -> f64;

    fn expired(&self, now_ms: i64) -> bool;
}

impl OrderLifecycle for Order {
    fn status(&self) -> OrderStatus {
        Order::status(self)
    }

    fn alive(&self) -> bool {
        Order::alive(self)
    }

    fn active(&self) -> bool {
        Order::active(self)
    }

    fn remaining_size(&self) -> f64 {
        Order::remaining_size(self)
    }

    fn expired(&self, now_ms: i64) -> bool {
        Order::expired(self, now_ms)
    }
}
