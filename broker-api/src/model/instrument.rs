use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a basic ticker symbol on a specific venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId {
    symbol: String,
    exchange: String, // e.g. "BINANCE", "NASDAQ"
}

impl SymbolId {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.exchange)
    }
}

/// Unified Instrument Definition.
///
/// Settlement style (full notional vs margin) is a property of the
/// commission schedule looked up per instrument, not of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Instrument {
    Spot(SymbolId),
    Perpetual(SymbolId),
}

impl Instrument {
    pub fn symbol_id(&self) -> &SymbolId {
        match self {
            Instrument::Spot(s) => s,
            Instrument::Perpetual(s) => s,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Spot(s) => write!(f, "{}", s),
            Instrument::Perpetual(s) => write!(f, "{}.PERP", s),
        }
    }
}
