use super::exchange::ExchangeOrderId;
use super::instrument::Instrument;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SIZE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign applied to fill sizes when mutating a position.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit(f64),
    Stop(f64),
    StopLimit { stop: f64, limit: f64 },
}

impl OrderType {
    /// Price the gateway should transmit (limit price, or the stop
    /// trigger for plain stop orders). None for market orders.
    pub fn price(&self) -> Option<f64> {
        match self {
            OrderType::Market => None,
            OrderType::Limit(p) => Some(*p),
            OrderType::Stop(p) => Some(*p),
            OrderType::StopLimit { limit, .. } => Some(*limit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created locally, not yet transmitted (bracket children wait here).
    Created,
    /// Transmitted to the gateway, awaiting acknowledgment.
    Submitted,
    /// Acknowledged by the exchange, exchange order id assigned.
    Accepted,
    /// One or more fills applied, remaining size > 0. Not terminal.
    Partial,
    /// Remaining size reached zero.
    Completed,
    /// Canceled explicitly or by an OCO/bracket trigger.
    Canceled,
    /// Validity window elapsed before completion.
    Expired,
    /// Insufficient cash to open; the opened portion was nullified.
    Margin,
    /// Refused by the gateway/exchange.
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Canceled
                | OrderStatus::Expired
                | OrderStatus::Margin
                | OrderStatus::Rejected
        )
    }
}

/// One executed fill, accumulated on the order for audit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fill {
    pub size: f64,
    pub price: f64,
    pub commission: f64,
    pub timestamp: i64,
}

/// An instruction to buy or sell an instrument, owning its own
/// lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    instrument: Instrument,
    side: Side,
    order_type: OrderType,
    size: f64,
    /// Spend this many quote units instead of `size` base units
    /// (market buys only; the exchange reports the base size back).
    quote_size: Option<f64>,
    status: OrderStatus,
    exchange_order_id: Option<ExchangeOrderId>,
    executed_size: f64,
    executed_price: f64,
    commission: f64,
    fills: Vec<Fill>,
    parent: Option<Uuid>,
    oco_group: Option<Uuid>,
    valid_until_ms: Option<i64>,
    created_ms: i64,
}

impl Order {
    pub fn new(
        instrument: Instrument,
        side: Side,
        size: f64,
        order_type: OrderType,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument,
            side,
            order_type,
            size,
            quote_size: None,
            status: OrderStatus::Created,
            exchange_order_id: None,
            executed_size: 0.0,
            executed_price: 0.0,
            commission: 0.0,
            fills: Vec::new(),
            parent: None,
            oco_group: None,
            valid_until_ms: None,
            created_ms: timestamp,
        }
    }

    pub fn market(instrument: Instrument, side: Side, size: f64, timestamp: i64) -> Self {
        Self::new(instrument, side, size, OrderType::Market, timestamp)
    }

    pub fn limit(
        instrument: Instrument,
        side: Side,
        size: f64,
        price: f64,
        timestamp: i64,
    ) -> Self {
        Self::new(instrument, side, size, OrderType::Limit(price), timestamp)
    }

    /// Mark this order as the child of a bracket parent. It stays in
    /// `Created` and untransmitted until the parent completes.
    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_oco_group(mut self, group: Uuid) -> Self {
        self.oco_group = Some(group);
        self
    }

    pub fn with_validity(mut self, valid_until_ms: i64) -> Self {
        self.valid_until_ms = Some(valid_until_ms);
        self
    }

    pub fn with_quote_size(mut self, quote_size: f64) -> Self {
        self.quote_size = Some(quote_size);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn order_type(&self) -> &OrderType {
        &self.order_type
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn quote_size(&self) -> Option<f64> {
        self.quote_size
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn exchange_order_id(&self) -> Option<ExchangeOrderId> {
        self.exchange_order_id
    }

    pub fn executed_size(&self) -> f64 {
        self.executed_size
    }

    pub fn executed_price(&self) -> f64 {
        self.executed_price
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    pub fn oco_group(&self) -> Option<Uuid> {
        self.oco_group
    }

    pub fn valid_until_ms(&self) -> Option<i64> {
        self.valid_until_ms
    }

    pub fn created_ms(&self) -> i64 {
        self.created_ms
    }

    pub fn remaining_size(&self) -> f64 {
        (self.size - self.executed_size).max(0.0)
    }

    /// Adopt the exchange-reported base size. Quote-quantity orders
    /// are created with a size of zero; the acknowledgment reports how
    /// many base units the quote amount bought.
    pub fn set_size(&mut self, size: f64) {
        self.size = size;
    }

    /// Still able to receive fills or cancellation.
    pub fn alive(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Live at the exchange: acknowledged and not yet terminal.
    pub fn active(&self) -> bool {
        matches!(self.status, OrderStatus::Accepted | OrderStatus::Partial)
    }

    pub fn expired(&self, now_ms: i64) -> bool {
        self.alive()
            && self
                .valid_until_ms
                .map(|valid| now_ms >= valid)
                .unwrap_or(false)
    }

    // --- lifecycle transitions ---

    /// Created -> Submitted, on transmission to the gateway.
    pub fn submit(&mut self) {
        if self.status == OrderStatus::Created {
            self.status = OrderStatus::Submitted;
        }
    }

    /// Submitted -> Accepted, once the exchange assigns an id.
    pub fn accept(&mut self, exchange_order_id: ExchangeOrderId) {
        self.exchange_order_id = Some(exchange_order_id);
        if self.status == OrderStatus::Submitted {
            self.status = OrderStatus::Accepted;
        }
    }

    /// Record an executed fill and advance Partial/Completed.
    ///
    /// `size` is clamped so cumulative executed size never exceeds the
    /// requested size; the applied size is returned.
    pub fn apply_fill(&mut self, size: f64, price: f64, commission: f64, timestamp: i64) -> f64 {
        let applied = size.min(self.remaining_size());
        if applied <= 0.0 {
            return 0.0;
        }

        let total = self.executed_size + applied;
        self.executed_price = (self.executed_price * self.executed_size + price * applied) / total;
        self.executed_size = total;
        self.commission += commission;
        self.fills.push(Fill {
            size: applied,
            price,
            commission,
            timestamp,
        });

        self.status = if self.remaining_size() <= SIZE_EPSILON {
            OrderStatus::Completed
        } else {
            OrderStatus::Partial
        };

        applied
    }

    /// Best-effort, idempotent: only alive orders transition.
    /// Returns true if the status changed.
    pub fn cancel(&mut self) -> bool {
        if self.alive() {
            self.status = OrderStatus::Canceled;
            true
        } else {
            false
        }
    }

    pub fn expire(&mut self) -> bool {
        if self.alive() {
            self.status = OrderStatus::Expired;
            true
        } else {
            false
        }
    }

    pub fn margin(&mut self) -> bool {
        if self.alive() {
            self.status = OrderStatus::Margin;
            true
        } else {
            false
        }
    }

    pub fn reject(&mut self) -> bool {
        if self.alive() {
            self.status = OrderStatus::Rejected;
            true
        } else {
            false
        }
    }
}
