use broker::{
    AckFill, AssetBalance, CancelOutcome, ExchangeGateway, ExchangeOrderId, GatewayError,
    Instrument, Order, OrderAck, OrderType, Side, SymbolFilters,
};
use chrono::Utc;
use log::info;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

struct RestingOrder {
    id: ExchangeOrderId,
    instrument: Instrument,
    side: Side,
    order_type: OrderType,
    size: f64,
}

impl RestingOrder {
    /// Price this order executes at once the market crosses it, or
    /// None while it stays resting.
    fn crossed(&self, market: f64) -> Option<f64> {
        match (self.order_type, self.side) {
            (OrderType::Limit(limit), Side::Buy) if market <= limit => Some(limit),
            (OrderType::Limit(limit), Side::Sell) if market >= limit => Some(limit),
            (OrderType::Stop(stop), Side::Buy) if market >= stop => Some(market),
            (OrderType::Stop(stop), Side::Sell) if market <= stop => Some(market),
            // once triggered the limit leg is filled outright
            (OrderType::StopLimit { stop, limit }, Side::Buy) if market >= stop => Some(limit),
            (OrderType::StopLimit { stop, limit }, Side::Sell) if market <= stop => Some(limit),
            _ => None,
        }
    }
}

struct PaperInner {
    fee_rate: f64,
    cash_asset: String,
    balances: HashMap<String, AssetBalance>,
    filters: HashMap<Instrument, SymbolFilters>,
    prices: HashMap<Instrument, f64>,
    resting: Vec<RestingOrder>,
    next_id: u64,
    fills_tx: Option<Sender<Value>>,
}

impl PaperInner {
    fn assign_id(&mut self) -> ExchangeOrderId {
        self.next_id += 1;
        ExchangeOrderId::new(self.next_id)
    }

    fn fee(&self, size: f64, price: f64) -> f64 {
        size.abs() * price * self.fee_rate
    }

    /// Emit an execution report shaped like the live user stream, so
    /// the same parsing path is exercised end to end.
    fn emit_fill(&self, id: ExchangeOrderId, size: f64, price: f64) {
        if let Some(tx) = &self.fills_tx {
            let _ = tx.send(json!({
                "e": "executionReport",
                "X": "FILLED",
                "i": id.value(),
                "l": format!("{:.8}", size),
                "L": format!("{:.8}", price),
                "n": format!("{:.8}", self.fee(size, price)),
                "N": self.cash_asset,
            }));
        }
    }

    fn check_filters(&self, instrument: &Instrument, size: f64, price: f64) -> Result<(), GatewayError> {
        if let Some(filters) = self.filters.get(instrument) {
            if size < filters.min_size || size * price < filters.min_notional {
                return Err(GatewayError::Rejected {
                    code: -1013,
                    message: format!("filter failure for {}", instrument),
                });
            }
        }
        Ok(())
    }

    fn set_price(&mut self, instrument: &Instrument, price: f64) {
        self.prices.insert(instrument.clone(), price);

        let mut index = 0;
        while index < self.resting.len() {
            let order = &self.resting[index];
            if order.instrument != *instrument {
                index += 1;
                continue;
            }
            match order.crossed(price) {
                Some(exec_price) => {
                    let order = self.resting.swap_remove(index);
                    info!(
                        "Paper fill: order {} executed {:.8} @ {:.8}",
                        order.id, order.size, exec_price
                    );
                    self.emit_fill(order.id, order.size, exec_price);
                }
                None => index += 1,
            }
        }
    }
}

/// In-process exchange with real submission/stream mechanics: market
/// orders fill on the acknowledgment, resting orders fill through the
/// event stream when a later price crosses them.
///
/// Cloning shares the same simulated exchange, which lets a test or
/// the demo loop keep driving prices after the broker takes ownership
/// of its handle.
#[derive(Clone)]
pub struct PaperGateway {
    inner: Arc<Mutex<PaperInner>>,
}

impl PaperGateway {
    pub fn new(cash_asset: impl Into<String>, free_balance: f64, fee_rate: f64) -> Self {
        let cash_asset = cash_asset.into();
        let mut balances = HashMap::new();
        balances.insert(
            cash_asset.clone(),
            AssetBalance {
                free: free_balance,
                locked: 0.0,
            },
        );

        Self {
            inner: Arc::new(Mutex::new(PaperInner {
                fee_rate,
                cash_asset,
                balances,
                filters: HashMap::new(),
                prices: HashMap::new(),
                resting: Vec::new(),
                next_id: 0,
                fills_tx: None,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperInner> {
        self.inner.lock().expect("paper gateway poisoned")
    }

    pub fn set_filters(&self, instrument: Instrument, filters: SymbolFilters) {
        self.lock().filters.insert(instrument, filters);
    }

    /// Move the simulated market; any resting order the new price
    /// crosses fills through the event stream.
    pub fn set_price(&self, instrument: &Instrument, price: f64) {
        self.lock().set_price(instrument, price);
    }

    pub fn resting_count(&self) -> usize {
        self.lock().resting.len()
    }
}

impl ExchangeGateway for PaperGateway {
    fn submit_order(&mut self, order: &Order) -> Result<OrderAck, GatewayError> {
        let mut inner = self.lock();
        let id = inner.assign_id();

        match order.order_type() {
            OrderType::Market => {
                let price = inner.prices.get(order.instrument()).copied().ok_or_else(|| {
                    GatewayError::Rejected {
                        code: -1013,
                        message: format!("no market price for {}", order.instrument()),
                    }
                })?;

                // quote-quantity buys spend cash; the base size comes
                // back on the fill
                let size = match order.quote_size() {
                    Some(quote) => quote / price,
                    None => order.size(),
                };
                inner.check_filters(order.instrument(), size, price)?;

                Ok(OrderAck {
                    exchange_order_id: id,
                    executed_size: size,
                    fills: vec![AckFill {
                        size,
                        price,
                        commission: inner.fee(size, price),
                        commission_asset: inner.cash_asset.clone(),
                    }],
                })
            }
            order_type => {
                let reference = order_type.price().unwrap_or_default();
                inner.check_filters(order.instrument(), order.size(), reference)?;

                inner.resting.push(RestingOrder {
                    id,
                    instrument: order.instrument().clone(),
                    side: order.side(),
                    order_type: *order_type,
                    size: order.size(),
                });

                Ok(OrderAck {
                    exchange_order_id: id,
                    executed_size: 0.0,
                    fills: Vec::new(),
                })
            }
        }
    }

    fn cancel_order(
        &mut self,
        _instrument: &Instrument,
        id: ExchangeOrderId,
    ) -> Result<CancelOutcome, GatewayError> {
        let mut inner = self.lock();
        match inner.resting.iter().position(|o| o.id == id) {
            Some(idx) => {
                inner.resting.swap_remove(idx);
                Ok(CancelOutcome::Canceled)
            }
            // no longer resting: it already filled
            None => Ok(CancelOutcome::AlreadyFilled),
        }
    }

    fn asset_balance(&mut self, asset: &str) -> Result<AssetBalance, GatewayError> {
        Ok(self
            .lock()
            .balances
            .get(asset)
            .copied()
            .unwrap_or(AssetBalance {
                free: 0.0,
                locked: 0.0,
            }))
    }

    fn symbol_filters(&mut self, instrument: &Instrument) -> Result<SymbolFilters, GatewayError> {
        Ok(self
            .lock()
            .filters
            .get(instrument)
            .copied()
            .unwrap_or(SymbolFilters {
                price_step: 0.0,
                size_step: 0.0,
                min_size: 0.0,
                min_notional: 0.0,
            }))
    }

    fn format_price(&self, instrument: &Instrument, value: f64) -> f64 {
        match self.lock().filters.get(instrument) {
            Some(filters) => filters.format_price(value),
            None => value,
        }
    }

    fn format_quantity(&self, instrument: &Instrument, value: f64) -> f64 {
        match self.lock().filters.get(instrument) {
            Some(filters) => filters.format_quantity(value),
            None => value,
        }
    }

    fn resync_time(&mut self) -> Result<i64, GatewayError> {
        // in-process clock, never skewed
        Ok(Utc::now().timestamp_millis())
    }

    fn subscribe_fills(&mut self) -> Receiver<Value> {
        let (tx, rx) = channel();
        self.lock().fills_tx = Some(tx);
        rx
    }
}
