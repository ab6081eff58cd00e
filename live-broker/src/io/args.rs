use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "live-broker", about = "Brokerage accounting over a simulated exchange")]
pub struct Args {
    /// Configuration file (without extension), merged with BROKER_*
    /// environment overrides.
    #[arg(long, default_value = "broker")]
    pub config: String,

    /// Symbol to trade.
    #[arg(long, default_value = "BTCUSDT")]
    pub symbol: String,

    /// Stop after this many ticks (0 runs until interrupted).
    #[arg(long, default_value_t = 0)]
    pub ticks: u64,

    /// Submit a market buy of this size on the first tick.
    #[arg(long)]
    pub demo_size: Option<f64>,
}
