use serde::{Deserialize, Serialize};

/// Per-instrument holding: signed size, average entry price and the
/// adjustment-base price from which the next mark-to-market cash
/// adjustment is computed.
///
/// Mutated only by the execution engine / broker commit path. Created
/// lazily per instrument and never deleted; zero size is a valid
/// steady state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    size: f64,
    price: f64,
    adjbase: f64,
    /// Millis of the last credit-interest accrual against this
    /// position.
    credit_ms: i64,
}

impl Position {
    pub fn new(size: f64, price: f64) -> Self {
        Self {
            size,
            price,
            adjbase: price,
            credit_ms: 0,
        }
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn adjbase(&self) -> f64 {
        self.adjbase
    }

    pub fn set_adjbase(&mut self, price: f64) {
        self.adjbase = price;
    }

    pub fn credit_ms(&self) -> i64 {
        self.credit_ms
    }

    pub fn set_credit_ms(&mut self, ms: i64) {
        self.credit_ms = ms;
    }

    pub fn is_open(&self) -> bool {
        self.size != 0.0
    }

    /// Apply a signed trade of `size` units at `price`.
    ///
    /// Returns `(opened, closed)`: the signed portion that extended
    /// the position in the trade's direction and the signed portion
    /// that reduced or reversed the existing one. The position's size
    /// is always the algebraic sum of all applied signed sizes.
    pub fn update(&mut self, size: f64, price: f64) -> (f64, f64) {
        let old_size = self.size;
        self.size += size;

        let (opened, closed);

        if self.size == 0.0 {
            // closed the position out entirely
            opened = 0.0;
            closed = size;
            self.price = 0.0;
        } else if old_size == 0.0 {
            // opened from flat
            opened = size;
            closed = 0.0;
            self.price = price;
        } else if old_size > 0.0 {
            if size > 0.0 {
                // extended the long
                opened = size;
                closed = 0.0;
                self.price = (self.price * old_size + size * price) / self.size;
            } else if self.size > 0.0 {
                // reduced the long, average entry unchanged
                opened = 0.0;
                closed = size;
            } else {
                // reversed long -> short
                opened = self.size;
                closed = -old_size;
                self.price = price;
            }
        } else {
            // old_size < 0
            if size < 0.0 {
                // extended the short
                opened = size;
                closed = 0.0;
                self.price = (self.price * old_size + size * price) / self.size;
            } else if self.size < 0.0 {
                // reduced the short
                opened = 0.0;
                closed = size;
            } else {
                // reversed short -> long
                opened = self.size;
                closed = -old_size;
                self.price = price;
            }
        }

        (opened, closed)
    }
}
