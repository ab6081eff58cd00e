use broker::{
    AckFill, AssetBalance, CancelOutcome, ExchangeGateway, ExchangeOrderId, GatewayError,
    Instrument, Order, OrderAck, SymbolFilters,
};
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};

/// Counters and transcripts shared with the test body after the
/// gateway has been boxed away into the broker.
#[derive(Debug, Default)]
pub struct MockState {
    pub submitted: Vec<ExchangeOrderId>,
    pub canceled: Vec<ExchangeOrderId>,
    pub resyncs: u32,
}

/// Scripted gateway for accounting tests: acknowledges everything,
/// with optional per-call failure scripts and inline ack fills.
pub struct MockGateway {
    next_id: u64,
    free_balance: f64,
    submit_failures: VecDeque<GatewayError>,
    next_ack_fills: Vec<AckFill>,
    cancel_outcome: CancelOutcome,
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new(free_balance: f64) -> Self {
        Self {
            next_id: 0,
            free_balance,
            submit_failures: VecDeque::new(),
            next_ack_fills: Vec::new(),
            cancel_outcome: CancelOutcome::Canceled,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    /// Fail the next submissions with these errors, in order, before
    /// acknowledging.
    pub fn fail_submits(&mut self, errors: impl IntoIterator<Item = GatewayError>) {
        self.submit_failures.extend(errors);
    }

    /// Attach inline fills to the next acknowledgment (market-order
    /// FULL response).
    pub fn ack_fills(&mut self, fills: Vec<AckFill>) {
        self.next_ack_fills = fills;
    }

    pub fn cancel_outcome(&mut self, outcome: CancelOutcome) {
        self.cancel_outcome = outcome;
    }
}

impl ExchangeGateway for MockGateway {
    fn submit_order(&mut self, _order: &Order) -> Result<OrderAck, GatewayError> {
        if let Some(error) = self.submit_failures.pop_front() {
            return Err(error);
        }
        self.next_id += 1;
        let id = ExchangeOrderId::new(self.next_id);
        self.state.lock().unwrap().submitted.push(id);

        let fills = std::mem::take(&mut self.next_ack_fills);
        let executed_size = fills.iter().map(|f| f.size).sum();
        Ok(OrderAck {
            exchange_order_id: id,
            executed_size,
            fills,
        })
    }

    fn cancel_order(
        &mut self,
        _instrument: &Instrument,
        id: ExchangeOrderId,
    ) -> Result<CancelOutcome, GatewayError> {
        self.state.lock().unwrap().canceled.push(id);
        Ok(self.cancel_outcome)
    }

    fn asset_balance(&mut self, _asset: &str) -> Result<AssetBalance, GatewayError> {
        Ok(AssetBalance {
            free: self.free_balance,
            locked: 0.0,
        })
    }

    fn symbol_filters(&mut self, _instrument: &Instrument) -> Result<SymbolFilters, GatewayError> {
        Ok(SymbolFilters {
            price_step: 0.0,
            size_step: 0.0,
            min_size: 0.0,
            min_notional: 0.0,
        })
    }

    fn format_price(&self, _instrument: &Instrument, value: f64) -> f64 {
        value
    }

    fn format_quantity(&self, _instrument: &Instrument, value: f64) -> f64 {
        value
    }

    fn resync_time(&mut self) -> Result<i64, GatewayError> {
        self.state.lock().unwrap().resyncs += 1;
        Ok(0)
    }

    fn subscribe_fills(&mut self) -> Receiver<serde_json::Value> {
        let (_tx, rx) = channel();
        rx
    }
}
