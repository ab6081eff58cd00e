use crate::model::error::GatewayError;
use crate::model::exchange::{
    AssetBalance, CancelOutcome, ExchangeOrderId, OrderAck, SymbolFilters,
};
use crate::model::instrument::Instrument;
use crate::model::order::Order;
use std::sync::mpsc::Receiver;

/// Capability set the accounting core consumes from an exchange.
///
/// Submission and cancellation are synchronous, blocking calls from
/// the accounting path's perspective; retry/pacing policy is applied
/// by the caller, uniformly. Fill notifications arrive on the
/// subscription channel as raw wire payloads and are parsed exactly
/// once at the gateway boundary.
pub trait ExchangeGateway: Send {
    fn submit_order(&mut self, order: &Order) -> Result<OrderAck, GatewayError>;

    fn cancel_order(
        &mut self,
        instrument: &Instrument,
        id: ExchangeOrderId,
    ) -> Result<CancelOutcome, GatewayError>;

    fn asset_balance(&mut self, asset: &str) -> Result<AssetBalance, GatewayError>;

    fn symbol_filters(&mut self, instrument: &Instrument) -> Result<SymbolFilters, GatewayError>;

    /// Round a price to exchange precision for this instrument.
    fn format_price(&self, instrument: &Instrument, value: f64) -> f64;

    /// Round a quantity to exchange precision for this instrument.
    fn format_quantity(&self, instrument: &Instrument, value: f64) -> f64;

    /// Resynchronize the local timestamp offset against the exchange
    /// server clock. Invoked by the retry policy on a clock-skew
    /// rejection. Returns the server time in millis.
    fn resync_time(&mut self) -> Result<i64, GatewayError>;

    /// Subscribe to the push stream of raw fill/status events.
    fn subscribe_fills(&mut self) -> Receiver<serde_json::Value>;
}

impl ExchangeGateway for Box<dyn ExchangeGateway> {
    fn submit_order(&mut self, order: &Order) -> Result<OrderAck, GatewayError> {
        (**self).submit_order(order)
    }

    fn cancel_order(
        &mut self,
        instrument: &Instrument,
        id: ExchangeOrderId,
    ) -> Result<CancelOutcome, GatewayError> {
        (**self).cancel_order(instrument, id)
    }

    fn asset_balance(&mut self, asset: &str) -> Result<AssetBalance, GatewayError> {
        (**self).asset_balance(asset)
    }

    fn symbol_filters(&mut self, instrument: &Instrument) -> Result<SymbolFilters, GatewayError> {
        (**self).symbol_filters(instrument)
    }

    fn format_price(&self, instrument: &Instrument, value: f64) -> f64 {
        (**self).format_price(instrument, value)
    }

    fn format_quantity(&self, instrument: &Instrument, value: f64) -> f64 {
        (**self).format_quantity(instrument, value)
    }

    fn resync_time(&mut self) -> Result<i64, GatewayError> {
        (**self).resync_time()
    }

    fn subscribe_fills(&mut self) -> Receiver<serde_json::Value> {
        (**self).subscribe_fills()
    }
}
