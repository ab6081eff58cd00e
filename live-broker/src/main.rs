mod engine;
mod gateway;
mod io;
mod models;

use anyhow::Result;
use broker::{
    ExchangeGateway, Instrument, Order, PortfolioAccounting, Side, SymbolFilters, SymbolId,
};
use chrono::Utc;
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use engine::buffer::FillBuffer;
use engine::LiveBroker;
use gateway::paper::PaperGateway;
use gateway::stream::parse_execution_report;
use io::args::Args;
use models::{CommissionBasis, CommissionSchedule, CommissionTable, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    let instrument = Instrument::Spot(SymbolId::new(args.symbol.clone(), "PAPER"));

    let market = PaperGateway::new(
        settings.cash_asset.clone(),
        settings.cash,
        settings.commission.rate,
    );
    market.set_filters(
        instrument.clone(),
        SymbolFilters {
            price_step: 0.01,
            size_step: 1e-6,
            min_size: 1e-6,
            min_notional: 0.0,
        },
    );

    // subscribe before the broker takes ownership of its handle
    let mut gateway = market.clone();
    let fills = gateway.subscribe_fills();

    let buffer = Arc::new(FillBuffer::new(settings.buffer_capacity));
    let producer_buffer = Arc::clone(&buffer);
    let producer = tokio::task::spawn_blocking(move || -> Result<(), broker::GatewayError> {
        for payload in fills {
            if let Some(event) = parse_execution_report(&payload)? {
                producer_buffer.push(event);
            }
        }
        Ok(())
    });

    let schedule = CommissionSchedule::new(
        settings.commission.rate,
        CommissionBasis::PercentOfNotional,
        settings.commission.leverage,
        settings.commission.stock_like,
    )
    .with_interest(settings.commission.interest_rate);
    let mut comms = CommissionTable::new(CommissionSchedule::spot_default());
    comms.insert(instrument.clone(), schedule);

    let mut broker = LiveBroker::new(Box::new(gateway), Arc::clone(&buffer), comms, &settings)?;

    let mut price = 100.0;
    market.set_price(&instrument, price);
    broker.update_price(instrument.clone(), price, Utc::now().timestamp_millis());

    if let Some(size) = args.demo_size {
        let order = Order::market(
            instrument.clone(),
            Side::Buy,
            size,
            Utc::now().timestamp_millis(),
        );
        let id = broker.submit(order)?;
        info!("Demo order {} submitted", id);
    }

    let mut interval = tokio::time::interval(Duration::from_millis(settings.tick_ms));
    let mut tick = 0u64;
    loop {
        interval.tick().await;
        let now_ms = Utc::now().timestamp_millis();

        // gentle drift with a periodic dip so resting orders on both
        // sides eventually cross
        price *= if tick % 5 == 4 { 0.9995 } else { 1.0003 };
        market.set_price(&instrument, price);
        broker.update_price(instrument.clone(), price, now_ms);

        broker.advance(now_ms);
        while let Some(order) = broker.pop_notification() {
            info!("Order {} -> {:?}", order.id(), order.status());
        }
        info!(
            "tick {}: price {:.2}, cash {:.4}, value {:.4}",
            tick,
            price,
            broker.cash(),
            broker.value()
        );

        if producer.is_finished() {
            // a malformed stream payload terminates the run loudly
            producer.await??;
            return Ok(());
        }
        tick += 1;
        if args.ticks > 0 && tick >= args.ticks {
            break;
        }
    }

    producer.abort();
    Ok(())
}
