use super::*;
use crate::gateway::mock::{MockGateway, MockState};
use crate::models::{CommissionBasis, CommissionSchedule};
use broker::{AckFill, ExchangeOrderId, FillStatus, Side, SymbolId};
use std::sync::Mutex;

const EPSILON: f64 = 1e-6;

fn spot(symbol: &str) -> Instrument {
    Instrument::Spot(SymbolId::new(symbol, "TEST"))
}

fn perp(symbol: &str) -> Instrument {
    Instrument::Perpetual(SymbolId::new(symbol, "TEST"))
}

fn settings(cash: f64) -> Settings {
    let mut settings = Settings::default();
    settings.cash = cash;
    settings.retry.pace_ms = 0;
    settings
}

fn spot_comms() -> CommissionTable {
    CommissionTable::new(CommissionSchedule::spot_default())
}

fn build_with(
    gateway: MockGateway,
    settings: &Settings,
    comms: CommissionTable,
) -> (LiveBroker, Arc<FillBuffer>, Arc<Mutex<MockState>>) {
    let state = gateway.state();
    let buffer = Arc::new(FillBuffer::new(100));
    let broker = LiveBroker::new(Box::new(gateway), Arc::clone(&buffer), comms, settings).unwrap();
    (broker, buffer, state)
}

fn build(
    gateway: MockGateway,
    cash: f64,
    comms: CommissionTable,
) -> (LiveBroker, Arc<FillBuffer>, Arc<Mutex<MockState>>) {
    build_with(gateway, &settings(cash), comms)
}

fn fill(id: ExchangeOrderId, size: f64, price: f64) -> FillEvent {
    FillEvent {
        exchange_order_id: id,
        status: FillStatus::Filled,
        size,
        price,
        commission: 0.0,
        commission_asset: "USDT".into(),
    }
}

/// Drain all notifications, keeping the most recent status per order.
fn drain_statuses(broker: &mut LiveBroker) -> HashMap<Uuid, OrderStatus> {
    let mut statuses = HashMap::new();
    while let Some(order) = broker.pop_notification() {
        statuses.insert(order.id(), order.status());
    }
    statuses
}

fn last_status(broker: &mut LiveBroker, order_id: Uuid) -> Option<OrderStatus> {
    drain_statuses(broker).get(&order_id).copied()
}

#[test]
fn test_round_trip_cash_accounting() {
    let instrument = spot("BTCUSDT");
    let (mut broker, buffer, _) = build(MockGateway::new(1e9), 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let buy = Order::market(instrument.clone(), Side::Buy, 1.0, 0);
    let buy_id = broker.submit(buy).unwrap();
    buffer.push(fill(ExchangeOrderId::new(1), 1.0, 100.0));
    broker.advance(1_000);

    assert!(
        (broker.cash() - 899.925).abs() < EPSILON,
        "cash after buy: {}",
        broker.cash()
    );
    assert!((broker.position(&instrument).size() - 1.0).abs() < EPSILON);
    assert_eq!(last_status(&mut broker, buy_id), Some(OrderStatus::Completed));

    broker.update_price(instrument.clone(), 110.0, 1_000);
    let sell = Order::market(instrument.clone(), Side::Sell, 1.0, 1_000);
    let sell_id = broker.submit(sell).unwrap();
    buffer.push(fill(ExchangeOrderId::new(2), 1.0, 110.0));
    broker.advance(2_000);

    // 100 entry cost back, plus 10 profit net of 0.0825 commission
    assert!(
        (broker.cash() - 1009.8425).abs() < EPSILON,
        "cash after round trip: {}",
        broker.cash()
    );
    assert!(broker.position(&instrument).size().abs() < EPSILON);
    assert!((broker.value() - 1009.8425).abs() < EPSILON);
    assert_eq!(last_status(&mut broker, sell_id), Some(OrderStatus::Completed));
}

#[test]
fn test_margin_failure_nullifies_open_and_keeps_cash() {
    let instrument = spot("BTCUSDT");
    let (mut broker, buffer, _) = build(MockGateway::new(1e9), 50.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let order = Order::market(instrument.clone(), Side::Buy, 1.0, 0);
    let order_id = broker.submit(order).unwrap();
    buffer.push(fill(ExchangeOrderId::new(1), 1.0, 100.0));
    broker.advance(1_000);

    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Margin));
    assert!((broker.cash() - 50.0).abs() < EPSILON, "cash must be untouched");
    assert!(broker.position(&instrument).size().abs() < EPSILON);
}

#[test]
fn test_buffered_events_consumed_at_most_once() {
    let instrument = spot("BTCUSDT");
    let (mut broker, buffer, _) = build(MockGateway::new(1e9), 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    broker.submit(Order::market(instrument.clone(), Side::Buy, 1.0, 0)).unwrap();
    buffer.push(fill(ExchangeOrderId::new(1), 0.4, 100.0));
    buffer.push(fill(ExchangeOrderId::new(1), 0.6, 100.0));
    broker.advance(1_000);

    let cash_after = broker.cash();
    assert!((broker.position(&instrument).size() - 1.0).abs() < EPSILON);
    assert!(buffer.is_empty());

    // nothing left to apply on later ticks
    broker.advance(2_000);
    assert!((broker.cash() - cash_after).abs() < EPSILON);
    assert!((broker.position(&instrument).size() - 1.0).abs() < EPSILON);
}

#[test]
fn test_oversized_event_clamped_to_remaining() {
    let instrument = spot("BTCUSDT");
    let (mut broker, buffer, _) = build(MockGateway::new(1e9), 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let order_id = broker
        .submit(Order::market(instrument.clone(), Side::Buy, 1.0, 0))
        .unwrap();
    buffer.push(fill(ExchangeOrderId::new(1), 5.0, 100.0));
    broker.advance(1_000);

    assert!((broker.position(&instrument).size() - 1.0).abs() < EPSILON);
    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Completed));
}

#[test]
fn test_partial_fills_accumulate_to_completion() {
    let instrument = spot("BTCUSDT");
    let (mut broker, buffer, _) = build(MockGateway::new(1e9), 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let order_id = broker
        .submit(Order::limit(instrument.clone(), Side::Buy, 2.0, 100.0, 0))
        .unwrap();

    buffer.push(fill(ExchangeOrderId::new(1), 0.5, 100.0));
    broker.advance(1_000);
    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Partial));
    assert!((broker.position(&instrument).size() - 0.5).abs() < EPSILON);

    buffer.push(fill(ExchangeOrderId::new(1), 1.5, 101.0));
    broker.advance(2_000);
    let status = last_status(&mut broker, order_id);
    assert_eq!(status, Some(OrderStatus::Completed));
    assert!((broker.position(&instrument).size() - 2.0).abs() < EPSILON);
    // weighted average entry: (0.5 * 100 + 1.5 * 101) / 2
    assert!((broker.position(&instrument).price() - 100.75).abs() < EPSILON);
}

#[test]
fn test_oco_sibling_canceled_exactly_once() {
    let instrument = spot("BTCUSDT");
    let (mut broker, buffer, state) = build(MockGateway::new(1e9), 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let group = Uuid::new_v4();
    let take_profit =
        Order::limit(instrument.clone(), Side::Sell, 1.0, 110.0, 0).with_oco_group(group);
    let stop_loss =
        Order::limit(instrument.clone(), Side::Sell, 1.0, 90.0, 0).with_oco_group(group);
    let tp_id = broker.submit(take_profit).unwrap();
    let sl_id = broker.submit(stop_loss).unwrap();

    buffer.push(fill(ExchangeOrderId::new(1), 1.0, 110.0));
    broker.advance(1_000);

    let statuses = drain_statuses(&mut broker);
    assert_eq!(statuses.get(&tp_id), Some(&OrderStatus::Completed));
    assert_eq!(statuses.get(&sl_id), Some(&OrderStatus::Canceled));
    assert_eq!(state.lock().unwrap().canceled.len(), 1);

    // re-running the group check cancels nothing further
    broker.advance(2_000);
    assert_eq!(state.lock().unwrap().canceled.len(), 1);
}

#[test]
fn test_bracket_children_activate_next_tick() {
    let instrument = spot("BTCUSDT");
    let (mut broker, buffer, state) = build(MockGateway::new(1e9), 10_000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let parent = Order::market(instrument.clone(), Side::Buy, 1.0, 0);
    let parent_id = parent.id();
    let group = Uuid::new_v4();
    let take_profit = Order::limit(instrument.clone(), Side::Sell, 1.0, 110.0, 0)
        .with_parent(parent_id)
        .with_oco_group(group);
    let stop_loss = Order::limit(instrument.clone(), Side::Sell, 1.0, 90.0, 0)
        .with_parent(parent_id)
        .with_oco_group(group);

    broker.submit(parent).unwrap();
    let tp_id = broker.submit(take_profit).unwrap();
    broker.submit(stop_loss).unwrap();
    assert_eq!(state.lock().unwrap().submitted.len(), 1, "children stay parked");

    buffer.push(fill(ExchangeOrderId::new(1), 1.0, 100.0));
    broker.advance(1_000);
    assert_eq!(last_status(&mut broker, parent_id), Some(OrderStatus::Completed));
    // the parent completed during this tick; children wait one more
    assert_eq!(state.lock().unwrap().submitted.len(), 1);

    broker.advance(2_000);
    assert_eq!(state.lock().unwrap().submitted.len(), 3);

    // take-profit fills, stop-loss goes away with it
    buffer.push(fill(ExchangeOrderId::new(2), 1.0, 110.0));
    broker.advance(3_000);
    assert_eq!(last_status(&mut broker, tp_id), Some(OrderStatus::Completed));
    assert_eq!(state.lock().unwrap().canceled.len(), 1);
}

#[test]
fn test_parent_cancel_discards_parked_children() {
    let instrument = spot("BTCUSDT");
    let (mut broker, _, state) = build(MockGateway::new(1e9), 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let parent = Order::limit(instrument.clone(), Side::Buy, 1.0, 95.0, 0);
    let parent_id = parent.id();
    let child = Order::limit(instrument.clone(), Side::Sell, 1.0, 110.0, 0).with_parent(parent_id);
    let child_id = child.id();

    broker.submit(parent).unwrap();
    broker.submit(child).unwrap();
    broker.cancel(parent_id).unwrap();

    assert_eq!(last_status(&mut broker, child_id), Some(OrderStatus::Canceled));
    // the child was never transmitted, so only the parent reached the
    // exchange
    assert_eq!(state.lock().unwrap().canceled.len(), 1);
}

#[test]
fn test_expired_order_is_canceled_at_exchange() {
    let instrument = spot("BTCUSDT");
    let (mut broker, _, state) = build(MockGateway::new(1e9), 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let order =
        Order::limit(instrument.clone(), Side::Buy, 1.0, 95.0, 0).with_validity(5_000);
    let order_id = broker.submit(order).unwrap();

    broker.advance(1_000);
    assert_eq!(
        last_status(&mut broker, order_id),
        Some(OrderStatus::Accepted),
        "still resting"
    );

    broker.advance(5_000);
    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Expired));
    assert_eq!(state.lock().unwrap().canceled.len(), 1);
}

#[test]
fn test_cancel_of_filled_order_is_a_no_op() {
    let instrument = spot("BTCUSDT");
    let mut gateway = MockGateway::new(1e9);
    gateway.cancel_outcome(CancelOutcome::AlreadyFilled);
    let (mut broker, buffer, _) = build(gateway, 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let order_id = broker
        .submit(Order::limit(instrument.clone(), Side::Buy, 1.0, 100.0, 0))
        .unwrap();
    broker.cancel(order_id).unwrap();

    // the in-flight fill still completes the order
    buffer.push(fill(ExchangeOrderId::new(1), 1.0, 100.0));
    broker.advance(1_000);
    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Completed));
}

#[test]
fn test_rejected_submission_notifies_without_failing() {
    let instrument = spot("BTCUSDT");
    let mut gateway = MockGateway::new(1e9);
    gateway.fail_submits([GatewayError::Rejected {
        code: -2010,
        message: "insufficient balance".into(),
    }]);
    let (mut broker, _, state) = build(gateway, 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let order_id = broker
        .submit(Order::market(instrument.clone(), Side::Buy, 1.0, 0))
        .unwrap();

    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Rejected));
    assert!(state.lock().unwrap().submitted.is_empty());
}

#[test]
fn test_transient_submit_failures_are_retried() {
    let instrument = spot("BTCUSDT");
    let mut gateway = MockGateway::new(1e9);
    gateway.fail_submits([
        GatewayError::Transport("reset".into()),
        GatewayError::ClockSkew,
    ]);
    let (mut broker, _, state) = build(gateway, 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let order_id = broker
        .submit(Order::limit(instrument.clone(), Side::Buy, 1.0, 95.0, 0))
        .unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.submitted.len(), 1);
    assert_eq!(state.resyncs, 1, "clock skew must trigger a resync");
    drop(state);
    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Accepted));
}

#[test]
fn test_ack_fills_flow_through_the_buffer() {
    let instrument = spot("BTCUSDT");
    let mut gateway = MockGateway::new(1e9);
    gateway.ack_fills(vec![AckFill {
        size: 1.0,
        price: 100.0,
        commission: 0.075,
        commission_asset: "USDT".into(),
    }]);
    let (mut broker, buffer, _) = build(gateway, 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 100.0, 0);

    let order_id = broker
        .submit(Order::market(instrument.clone(), Side::Buy, 1.0, 0))
        .unwrap();
    assert_eq!(buffer.len(), 1);

    broker.advance(1_000);
    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Completed));
    assert!((broker.cash() - 899.925).abs() < EPSILON);
}

#[test]
fn test_quote_size_order_adopts_ack_base_size() {
    let instrument = spot("BTCUSDT");
    let mut gateway = MockGateway::new(1e9);
    gateway.ack_fills(vec![AckFill {
        size: 2.5,
        price: 200.0,
        commission: 0.375,
        commission_asset: "USDT".into(),
    }]);
    let (mut broker, buffer, _) = build(gateway, 1000.0, spot_comms());
    broker.update_price(instrument.clone(), 200.0, 0);

    // spend 500 quote units; the base size comes back on the ack
    let order =
        Order::market(instrument.clone(), Side::Buy, 0.0, 0).with_quote_size(500.0);
    let order_id = broker.submit(order).unwrap();
    broker.advance(1_000);

    assert!(buffer.is_empty());
    assert!(
        (broker.position(&instrument).size() - 2.5).abs() < EPSILON,
        "position after quote-size buy: {}",
        broker.position(&instrument).size()
    );
    assert!((broker.cash() - 499.625).abs() < EPSILON, "cash: {}", broker.cash());
    assert_eq!(last_status(&mut broker, order_id), Some(OrderStatus::Completed));
}

#[test]
fn test_value_based_short_round_trip() {
    let instrument = spot("BTCUSDT");
    let mut settings = settings(1000.0);
    settings.value_based = true;
    let comms = CommissionTable::new(CommissionSchedule::new(
        0.0,
        CommissionBasis::PercentOfNotional,
        1.0,
        true,
    ));
    let (mut broker, buffer, _) = build_with(MockGateway::new(1e9), &settings, comms);
    broker.update_price(instrument.clone(), 100.0, 0);

    // opening a short credits the proceeds instead of reserving cost
    broker
        .submit(Order::market(instrument.clone(), Side::Sell, 1.0, 0))
        .unwrap();
    buffer.push(fill(ExchangeOrderId::new(1), 1.0, 100.0));
    broker.advance(1_000);
    assert!((broker.cash() - 1100.0).abs() < EPSILON, "cash: {}", broker.cash());
    assert!((broker.position(&instrument).size() - -1.0).abs() < EPSILON);
    assert!((broker.value() - 1000.0).abs() < EPSILON, "value: {}", broker.value());

    broker.update_price(instrument.clone(), 90.0, 1_000);
    broker.advance(2_000);
    assert!((broker.value() - 1010.0).abs() < EPSILON, "value: {}", broker.value());
    assert!((broker.portfolio().unrealized() - 10.0).abs() < EPSILON);

    // covering pays back the entry proceeds and realizes the profit
    broker
        .submit(Order::market(instrument.clone(), Side::Buy, 1.0, 2_000))
        .unwrap();
    buffer.push(fill(ExchangeOrderId::new(2), 1.0, 90.0));
    broker.advance(3_000);
    assert!((broker.cash() - 1010.0).abs() < EPSILON, "cash: {}", broker.cash());
    assert!(broker.position(&instrument).size().abs() < EPSILON);
    assert!((broker.value() - 1010.0).abs() < EPSILON);
}

#[test]
fn test_futures_mark_to_market_each_tick() {
    let instrument = perp("BTCUSDT");
    let mut comms = CommissionTable::new(CommissionSchedule::spot_default());
    comms.insert(
        instrument.clone(),
        CommissionSchedule::new(0.0, CommissionBasis::PercentOfNotional, 10.0, false),
    );
    let (mut broker, buffer, _) = build(MockGateway::new(1e9), 1000.0, comms);
    broker.update_price(instrument.clone(), 100.0, 0);

    broker
        .submit(Order::market(instrument.clone(), Side::Buy, 1.0, 0))
        .unwrap();
    buffer.push(fill(ExchangeOrderId::new(1), 1.0, 100.0));
    broker.advance(1_000);

    // a tenth of the notional is committed at 10x leverage
    assert!((broker.cash() - 990.0).abs() < EPSILON, "cash: {}", broker.cash());

    broker.update_price(instrument.clone(), 105.0, 1_000);
    broker.advance(2_000);
    assert!((broker.cash() - 995.0).abs() < EPSILON);
    assert!((broker.position(&instrument).adjbase() - 105.0).abs() < EPSILON);

    broker.update_price(instrument.clone(), 103.0, 2_000);
    broker.advance(3_000);
    assert!((broker.cash() - 993.0).abs() < EPSILON);

    // closing releases the committed margin; pnl already settled
    broker
        .submit(Order::market(instrument.clone(), Side::Sell, 1.0, 3_000))
        .unwrap();
    buffer.push(fill(ExchangeOrderId::new(2), 1.0, 103.0));
    broker.advance(4_000);
    assert!((broker.cash() - 1003.0).abs() < EPSILON, "cash: {}", broker.cash());
    assert!(broker.position(&instrument).size().abs() < EPSILON);
}

#[test]
fn test_holding_interest_is_charged_and_offsets_at_close() {
    const DAY_MS: i64 = 86_400_000;
    let instrument = spot("ETHUSDT");
    let mut comms = CommissionTable::new(CommissionSchedule::spot_default());
    comms.insert(
        instrument.clone(),
        CommissionSchedule::new(0.0, CommissionBasis::PercentOfNotional, 1.0, true)
            .with_interest(0.365),
    );
    let (mut broker, buffer, _) = build(MockGateway::new(1e9), 1000.0, comms);
    broker.update_price(instrument.clone(), 100.0, 0);

    broker
        .submit(Order::market(instrument.clone(), Side::Buy, 1.0, 0))
        .unwrap();
    buffer.push(fill(ExchangeOrderId::new(1), 1.0, 100.0));
    broker.advance(0);
    assert!((broker.cash() - 900.0).abs() < EPSILON);

    // first tick after the open only arms the accrual clock
    broker.advance(DAY_MS);
    assert!((broker.cash() - 900.0).abs() < EPSILON);

    // one day at 36.5% annual on 100 notional is 0.1
    broker.advance(2 * DAY_MS);
    assert!((broker.cash() - 899.9).abs() < EPSILON, "cash: {}", broker.cash());

    // the accrued charge is folded into the closing commission
    let sell_id = broker
        .submit(Order::market(instrument.clone(), Side::Sell, 1.0, 2 * DAY_MS))
        .unwrap();
    buffer.push(fill(ExchangeOrderId::new(2), 1.0, 100.0));
    broker.advance(2 * DAY_MS);

    let mut closing = None;
    while let Some(order) = broker.pop_notification() {
        if order.id() == sell_id && order.status() == OrderStatus::Completed {
            closing = Some(order);
        }
    }
    let closing = closing.expect("sell must complete");
    assert!((closing.commission() - 0.1).abs() < EPSILON);
}

#[test]
fn test_starting_cash_clamped_to_exchange_balance() {
    let (broker, _, _) = build(MockGateway::new(500.0), 1000.0, spot_comms());
    assert!((broker.cash() - 500.0).abs() < EPSILON);
}

#[test]
fn test_cash_addition_buys_fund_shares() {
    let (mut broker, _, _) = build(MockGateway::new(1e9), 1000.0, spot_comms());
    let shares_before = broker.portfolio().fund_shares();

    broker.add_cash(100.0).unwrap();
    broker.advance(1_000);

    assert!((broker.cash() - 1100.0).abs() < EPSILON);
    assert!((broker.value() - 1100.0).abs() < EPSILON);
    // shares issued at the unchanged per-share value of 100
    assert!((broker.portfolio().fund_shares() - shares_before - 1.0).abs() < EPSILON);
    assert!((broker.portfolio().fund_value() - 100.0).abs() < EPSILON);
}

#[test]
fn test_set_cash_clamped_to_exchange_balance() {
    let (mut broker, _, _) = build(MockGateway::new(800.0), 500.0, spot_comms());
    broker.set_cash(1000.0).unwrap();
    assert!((broker.cash() - 800.0).abs() < EPSILON);
}

#[test]
fn test_valuation_includes_unrealized() {
    let instrument = spot("BTCUSDT");
    let mut comms = CommissionTable::new(CommissionSchedule::new(
        0.0,
        CommissionBasis::PercentOfNotional,
        1.0,
        true,
    ));
    comms.insert(
        instrument.clone(),
        CommissionSchedule::new(0.0, CommissionBasis::PercentOfNotional, 1.0, true),
    );
    let (mut broker, buffer, _) = build(MockGateway::new(1e9), 1000.0, comms);
    broker.update_price(instrument.clone(), 100.0, 0);

    broker
        .submit(Order::market(instrument.clone(), Side::Buy, 2.0, 0))
        .unwrap();
    buffer.push(fill(ExchangeOrderId::new(1), 2.0, 100.0));
    broker.advance(1_000);
    assert!((broker.value() - 1000.0).abs() < EPSILON);

    broker.update_price(instrument.clone(), 110.0, 1_000);
    broker.advance(2_000);

    assert!((broker.value() - 1020.0).abs() < EPSILON, "value: {}", broker.value());
    assert!((broker.portfolio().unrealized() - 20.0).abs() < EPSILON);
}
