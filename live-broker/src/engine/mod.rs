use crate::gateway::retry::RetryPolicy;
use crate::models::{CommissionTable, Portfolio, Position, Price, Prices, Settings};
use broker::{
    AssetBalance, CancelOutcome, ExchangeGateway, FillEvent, GatewayError, Instrument, Order,
    OrderStatus, PortfolioAccounting,
};
use log::{info, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub mod buffer;
pub mod execution;

use buffer::FillBuffer;
use execution::MarginFailure;

/// The accounting side of the live broker.
///
/// Single-writer: all mutation of orders, positions, cash and
/// valuation happens on the thread calling `advance`. The gateway's
/// event stream only ever appends to the shared fill buffer.
pub struct LiveBroker {
    gateway: Box<dyn ExchangeGateway>,
    buffer: Arc<FillBuffer>,
    retry: RetryPolicy,
    comms: CommissionTable,
    value_based: bool,
    cash_asset: String,
    portfolio: Portfolio,
    positions: HashMap<Instrument, Position>,
    prices: Prices,
    /// Orders in flight, processed once per tick.
    pending: VecDeque<Order>,
    /// Bracket children parked untransmitted until their parent
    /// completes.
    parked_children: HashMap<Uuid, Vec<Order>>,
    /// Children unlocked by a parent completion; transmitted at the
    /// start of the *next* tick.
    to_activate: VecDeque<Order>,
    /// Parents seen completing (late-submitted children of these are
    /// transmitted immediately).
    completed: HashSet<Uuid>,
    /// Holding interest accrued per instrument, folded into the
    /// closing commission.
    interest_accrued: HashMap<Instrument, f64>,
    notifications: VecDeque<Order>,
}

impl LiveBroker {
    /// Builds the broker, rehydrating cash from a live balance query:
    /// the configured starting cash is clamped to the exchange's
    /// reported free balance.
    pub fn new(
        mut gateway: Box<dyn ExchangeGateway>,
        buffer: Arc<FillBuffer>,
        comms: CommissionTable,
        settings: &Settings,
    ) -> Result<Self, GatewayError> {
        let retry = RetryPolicy::new(
            settings.retry.max_attempts,
            Duration::from_millis(settings.retry.pace_ms),
        );

        let asset = settings.cash_asset.clone();
        let balance = retry.run(
            &mut gateway,
            |g| g.asset_balance(&asset),
            |g| {
                let _ = g.resync_time();
            },
        )?;

        let cash = settings.cash.min(balance.free);
        info!(
            "Starting with {:.4} {} (requested {:.4}, exchange free {:.4})",
            cash, settings.cash_asset, settings.cash, balance.free
        );

        Ok(Self {
            gateway,
            buffer,
            retry,
            comms,
            value_based: settings.value_based,
            cash_asset: settings.cash_asset.clone(),
            portfolio: Portfolio::new(cash, settings.fund_start_value),
            positions: HashMap::new(),
            prices: Prices::default(),
            pending: VecDeque::new(),
            parked_children: HashMap::new(),
            to_activate: VecDeque::new(),
            completed: HashSet::new(),
            interest_accrued: HashMap::new(),
            notifications: VecDeque::new(),
        })
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn position(&self, instrument: &Instrument) -> Position {
        self.positions.get(instrument).copied().unwrap_or_default()
    }

    pub fn update_price(&mut self, instrument: Instrument, last: f64, timestamp: i64) {
        self.prices.insert(instrument, Price::new(last, timestamp));
    }

    fn notify(&mut self, order: &Order) {
        self.notifications.push_back(order.clone());
    }

    fn query_balance(&mut self) -> Result<AssetBalance, GatewayError> {
        let asset = self.cash_asset.clone();
        self.retry.run(
            &mut self.gateway,
            |g| g.asset_balance(&asset),
            |g| {
                let _ = g.resync_time();
            },
        )
    }

    /// Sets cash, never above the exchange-reported free balance.
    pub fn set_cash(&mut self, cash: f64) -> Result<(), GatewayError> {
        let balance = self.query_balance()?;
        self.portfolio.set_cash(cash.min(balance.free));
        Ok(())
    }

    /// Queues an external cash injection/withdrawal, honored through
    /// fund-share accounting at the next valuation. Ignored when the
    /// exchange balance cannot cover it.
    pub fn add_cash(&mut self, cash: f64) -> Result<(), GatewayError> {
        let balance = self.query_balance()?;
        if self.portfolio.cash() + cash <= balance.free {
            self.portfolio.queue_cash_addition(cash);
        } else {
            warn!(
                "Ignoring cash addition {:.4}: exceeds exchange free balance {:.4}",
                cash, balance.free
            );
        }
        Ok(())
    }

    /// Accept an order. Bracket children whose parent has not
    /// completed are parked locally; everything else is transmitted
    /// to the gateway.
    pub fn submit(&mut self, order: Order) -> Result<Uuid, GatewayError> {
        let id = order.id();

        if let Some(parent) = order.parent() {
            if !self.completed.contains(&parent) {
                info!("Parking bracket child {} under parent {}", id, parent);
                self.parked_children.entry(parent).or_default().push(order);
                return Ok(id);
            }
        }

        self.transmit(order)?;
        Ok(id)
    }

    /// Transmit to the gateway with retry. Exchange rejections become
    /// a terminal `Rejected` transition with notification; transport
    /// failures that outlive the retry budget do the same and then
    /// propagate to the caller.
    fn transmit(&mut self, mut order: Order) -> Result<(), GatewayError> {
        order.submit();
        self.notify(&order);

        let ack = self.retry.run(
            &mut self.gateway,
            |g| g.submit_order(&order),
            |g| {
                let _ = g.resync_time();
            },
        );

        match ack {
            Ok(ack) => {
                order.accept(ack.exchange_order_id);
                info!(
                    "Order {} accepted by exchange as {}",
                    order.id(),
                    ack.exchange_order_id
                );

                // quote-quantity orders learn their base size from the
                // acknowledgment; without it their fills would clamp
                // to a zero remaining size
                if order.quote_size().is_some() && ack.executed_size > 0.0 {
                    order.set_size(ack.executed_size);
                }

                // market acks can already carry fills; they flow
                // through the buffer like streamed ones (the paper
                // gateway does not also stream them)
                for fill in &ack.fills {
                    self.buffer.push(FillEvent {
                        exchange_order_id: ack.exchange_order_id,
                        status: broker::FillStatus::Filled,
                        size: fill.size,
                        price: fill.price,
                        commission: fill.commission,
                        commission_asset: fill.commission_asset.clone(),
                    });
                }

                self.notify(&order);
                self.pending.push_back(order);
                Ok(())
            }
            Err(GatewayError::Rejected { code, message }) => {
                warn!(
                    "Order {} rejected by exchange ({}): {}",
                    order.id(),
                    code,
                    message
                );
                order.reject();
                self.notify(&order);
                self.oco_check(&order);
                self.bracket_check(&order);
                Ok(())
            }
            Err(e) => {
                warn!("Order {} could not be transmitted: {}", order.id(), e);
                order.reject();
                self.notify(&order);
                self.oco_check(&order);
                self.bracket_check(&order);
                Err(e)
            }
        }
    }

    /// Best-effort, idempotent cancel. An order the exchange has
    /// already fully filled is left alone; its fills complete it.
    pub fn cancel(&mut self, order_id: Uuid) -> Result<(), GatewayError> {
        // parked bracket children were never transmitted
        let parked = self.parked_children.iter().find_map(|(parent, children)| {
            children
                .iter()
                .position(|o| o.id() == order_id)
                .map(|idx| (*parent, idx))
        });
        if let Some((parent, idx)) = parked {
            if let Some(children) = self.parked_children.get_mut(&parent) {
                let mut child = children.remove(idx);
                if child.cancel() {
                    self.notify(&child);
                }
            }
            return Ok(());
        }

        let Some(idx) = self.pending.iter().position(|o| o.id() == order_id) else {
            return Ok(()); // unknown or already terminal
        };

        if let Some(exchange_id) = self.pending[idx].exchange_order_id() {
            let instrument = self.pending[idx].instrument().clone();
            let outcome = self.retry.run(
                &mut self.gateway,
                |g| g.cancel_order(&instrument, exchange_id),
                |g| {
                    let _ = g.resync_time();
                },
            )?;

            if outcome == CancelOutcome::AlreadyFilled {
                info!("Cancel {}: already filled at exchange, no-op", order_id);
                return Ok(());
            }
        }

        let mut order = self.pending.remove(idx).expect("index just found");
        if order.cancel() {
            info!("Order {} canceled", order.id());
            self.notify(&order);
            self.oco_check(&order);
            self.bracket_check(&order);
        }
        Ok(())
    }

    /// Cancel all other still-alive members of the order's OCO group.
    /// Idempotent: terminal siblings are left untouched, so re-running
    /// after the whole group is terminal cancels nothing further.
    fn oco_check(&mut self, order: &Order) {
        if !order.status().is_terminal() {
            return;
        }
        let Some(group) = order.oco_group() else {
            return;
        };

        let sibling_ids: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|o| o.oco_group() == Some(group) && o.id() != order.id() && o.alive())
            .map(|o| o.id())
            .chain(
                self.parked_children
                    .values()
                    .flatten()
                    .filter(|o| o.oco_group() == Some(group) && o.id() != order.id() && o.alive())
                    .map(|o| o.id()),
            )
            .collect();

        for id in sibling_ids {
            if let Err(e) = self.cancel(id) {
                warn!("OCO cancel of {} failed: {}", id, e);
            }
        }
    }

    /// Bracket propagation for a terminal order: a completed parent
    /// queues its parked children for activation at the start of the
    /// next tick; any other terminal state cancels them untransmitted.
    fn bracket_check(&mut self, order: &Order) {
        match order.status() {
            OrderStatus::Completed => {
                self.completed.insert(order.id());
                if let Some(children) = self.parked_children.remove(&order.id()) {
                    for child in children {
                        info!(
                            "Bracket child {} unlocked by parent {}",
                            child.id(),
                            order.id()
                        );
                        self.to_activate.push_back(child);
                    }
                }
            }
            OrderStatus::Canceled
            | OrderStatus::Expired
            | OrderStatus::Margin
            | OrderStatus::Rejected => {
                if let Some(children) = self.parked_children.remove(&order.id()) {
                    for mut child in children {
                        if child.cancel() {
                            info!(
                                "Bracket child {} canceled with parent {}",
                                child.id(),
                                order.id()
                            );
                            self.notify(&child);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Apply one buffered fill event to an order through the
    /// execution engine and commit the outcome.
    fn apply_event(&mut self, order: &mut Order, event: &FillEvent, now_ms: i64) {
        if !order.alive() {
            return;
        }

        let size = event.size.min(order.remaining_size());
        if size <= 0.0 {
            return;
        }
        let signed = size * order.side().sign();

        let instrument = order.instrument().clone();
        let position = self.position(&instrument);
        let sched = self.comms.get(&instrument).clone();
        let comp = self.comms.compensation_for(&instrument).clone();

        let result = execution::execute(
            position,
            &sched,
            &comp,
            self.portfolio.cash(),
            signed,
            event.price,
            self.value_based,
        );

        let (outcome, margin) = match result {
            Ok(outcome) => (outcome, false),
            Err(MarginFailure(outcome)) => (outcome, true),
        };

        // commit in one step
        self.portfolio.set_cash(outcome.cash);
        self.positions.insert(instrument.clone(), outcome.position);

        let executed = outcome.executed_size().abs();
        if executed > 0.0 {
            let mut commission = outcome.total_commission();
            if outcome.closed != 0.0 {
                // fold accrued holding interest into the close
                commission += self.interest_accrued.remove(&instrument).unwrap_or(0.0);
            }
            order.apply_fill(executed, event.price, commission, now_ms);
            info!(
                "Order {}: executed {:.8} @ {:.8} (pnl {:.4}, comm {:.4})",
                order.id(),
                executed,
                event.price,
                outcome.pnl,
                commission
            );
        }

        if margin {
            warn!(
                "Order {}: insufficient cash, opening portion nullified",
                order.id()
            );
            order.margin();
            self.oco_check(order);
            self.bracket_check(order);
        }
    }

    /// One reconciliation tick.
    ///
    /// Single pass, not a fixed point: children unlocked during this
    /// tick are transmitted at the start of the next one.
    pub fn advance(&mut self, now_ms: i64) {
        // 1. activate bracket children unlocked last tick
        while let Some(child) = self.to_activate.pop_front() {
            if let Err(e) = self.transmit(child) {
                warn!("Bracket child transmission failed: {}", e);
            }
        }

        // 2. holding interest on open positions
        let mut credit_total = 0.0;
        let mut accrued: Vec<(Instrument, f64)> = Vec::new();
        for (instrument, position) in self.positions.iter_mut() {
            if !position.is_open() {
                continue;
            }
            let sched = self.comms.get(instrument);
            if sched.interest_rate() == 0.0 {
                continue;
            }
            if position.credit_ms() == 0 {
                position.set_credit_ms(now_ms);
                continue;
            }
            let price = self
                .prices
                .last(instrument)
                .unwrap_or_else(|| position.price());
            let credit = sched.credit_interest(position, price, now_ms - position.credit_ms());
            if credit != 0.0 {
                accrued.push((instrument.clone(), credit));
                credit_total += credit;
            }
            position.set_credit_ms(now_ms);
        }
        for (instrument, credit) in accrued {
            *self.interest_accrued.entry(instrument).or_default() += credit;
        }
        self.portfolio.debit(credit_total);

        // 3. single pass over the pending queue
        let mut remaining = self.pending.len();
        while remaining > 0 {
            remaining -= 1;
            let mut order = match self.pending.pop_front() {
                Some(order) => order,
                None => break,
            };

            if order.expired(now_ms) {
                // best-effort removal of the resting exchange order
                if let Some(exchange_id) = order.exchange_order_id() {
                    let instrument = order.instrument().clone();
                    let result = self.retry.run(
                        &mut self.gateway,
                        |g| g.cancel_order(&instrument, exchange_id),
                        |g| {
                            let _ = g.resync_time();
                        },
                    );
                    if let Err(e) = result {
                        warn!("Cancel of expired order {} failed: {}", order.id(), e);
                    }
                }
                order.expire();
                info!("Order {} expired", order.id());
                self.notify(&order);
                self.oco_check(&order);
                self.bracket_check(&order);
                continue;
            }

            if !order.active() {
                self.pending.push_back(order); // cannot yet be processed
                continue;
            }

            let exchange_id = match order.exchange_order_id() {
                Some(id) => id,
                None => {
                    self.pending.push_back(order);
                    continue;
                }
            };

            let events = self.buffer.take_matching(exchange_id);
            let had_fills = !events.is_empty();
            for event in &events {
                self.apply_event(&mut order, event, now_ms);
            }

            if had_fills {
                self.notify(&order);
                self.oco_check(&order);
            }

            if order.alive() {
                self.pending.push_back(order);
            } else if order.status() == OrderStatus::Completed {
                // a bracket parent may have been executed
                self.bracket_check(&order);
            }
        }

        // 4. end-of-tick mark-to-market; futures change cash every tick
        let mut adjust_total = 0.0;
        for (instrument, position) in self.positions.iter_mut() {
            if !position.is_open() {
                continue;
            }
            if let Some(price) = self.prices.last(instrument) {
                let sched = self.comms.get(instrument);
                adjust_total += sched.cash_adjust(position.size(), position.adjbase(), price);
                position.set_adjbase(price);
            }
        }
        self.portfolio.credit(adjust_total);

        // 5. valuation
        self.portfolio
            .revalue(&self.positions, &self.comms, &self.prices, self.value_based);
    }
}

impl PortfolioAccounting for LiveBroker {
    fn cash(&self) -> f64 {
        self.portfolio.cash()
    }

    fn value(&self) -> f64 {
        self.portfolio.value()
    }

    fn submit(&mut self, order: Order) -> Result<Uuid, GatewayError> {
        LiveBroker::submit(self, order)
    }

    fn cancel(&mut self, order_id: Uuid) -> Result<(), GatewayError> {
        LiveBroker::cancel(self, order_id)
    }

    fn advance(&mut self, now_ms: i64) {
        LiveBroker::advance(self, now_ms)
    }

    fn pop_notification(&mut self) -> Option<Order> {
        self.notifications.pop_front()
    }
}

#[cfg(test)]
mod tests;
