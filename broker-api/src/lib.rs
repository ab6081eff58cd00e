pub mod model;

pub use model::error::GatewayError;
pub use model::exchange::{AckFill, AssetBalance, CancelOutcome, ExchangeOrderId, OrderAck, SymbolFilters};
pub use model::fill::{FillEvent, FillStatus};
pub use model::instrument::{Instrument, SymbolId};
pub use model::order::{Fill, Order, OrderStatus, OrderType, Side};

pub mod traits;
pub use traits::accounting::PortfolioAccounting;
pub use traits::gateway::ExchangeGateway;
pub use traits::lifecycle::OrderLifecycle;
