use broker::Instrument;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Price {
    last: f64,
    timestamp: i64,
}

impl Price {
    pub fn new(last: f64, timestamp: i64) -> Self {
        Self { last, timestamp }
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Last-known market prices, keyed by instrument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prices {
    market_data: HashMap<Instrument, Price>,
}

impl Prices {
    pub fn insert(&mut self, instrument: Instrument, price: Price) {
        self.market_data.insert(instrument, price);
    }

    pub fn last(&self, instrument: &Instrument) -> Option<f64> {
        self.market_data.get(instrument).map(|p| p.last)
    }
}
