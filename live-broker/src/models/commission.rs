use broker::Instrument;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::position::Position;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// How the commission rate is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommissionBasis {
    /// rate * |size| * price
    PercentOfNotional,
    /// rate * |size|
    PerUnit,
}

/// Immutable commission/leverage configuration for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionSchedule {
    rate: f64,
    basis: CommissionBasis,
    leverage: f64,
    /// Stock-like instruments settle the full notional through cash;
    /// futures-like instruments settle mark-to-market differences.
    stock_like: bool,
    /// Annualized holding-interest rate charged on open positions.
    interest_rate: f64,
    /// Commission on the opened portion is computed against this
    /// instrument's schedule instead, when set (compensation proxy).
    compensate: Option<Instrument>,
}

impl CommissionSchedule {
    pub fn new(rate: f64, basis: CommissionBasis, leverage: f64, stock_like: bool) -> Self {
        Self {
            rate,
            basis,
            leverage: leverage.max(1.0),
            stock_like,
            interest_rate: 0.0,
            compensate: None,
        }
    }

    /// 0.075% of notional, no leverage: the exchange spot default.
    pub fn spot_default() -> Self {
        Self::new(0.00075, CommissionBasis::PercentOfNotional, 1.0, true)
    }

    pub fn with_interest(mut self, annual_rate: f64) -> Self {
        self.interest_rate = annual_rate;
        self
    }

    pub fn with_compensation(mut self, instrument: Instrument) -> Self {
        self.compensate = Some(instrument);
        self
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    pub fn stock_like(&self) -> bool {
        self.stock_like
    }

    pub fn interest_rate(&self) -> f64 {
        self.interest_rate
    }

    pub fn compensate(&self) -> Option<&Instrument> {
        self.compensate.as_ref()
    }

    /// Commission charged for trading `size` units at `price`.
    pub fn commission(&self, size: f64, price: f64) -> f64 {
        match self.basis {
            CommissionBasis::PercentOfNotional => size.abs() * price * self.rate,
            CommissionBasis::PerUnit => size.abs() * self.rate,
        }
    }

    /// Realized profit for a signed `size` moved from `price` to
    /// `new_price`.
    pub fn profit_and_loss(&self, size: f64, price: f64, new_price: f64) -> f64 {
        size * (new_price - price)
    }

    /// Cash needed to open/close `size` units at `price` under
    /// cost-based bookkeeping.
    pub fn operation_cost(&self, size: f64, price: f64) -> f64 {
        size.abs() * price
    }

    /// Signed position value under value-based bookkeeping.
    pub fn value_size(&self, size: f64, price: f64) -> f64 {
        size * price
    }

    /// Current value of a position at `price`.
    pub fn value(&self, position: &Position, price: f64) -> f64 {
        position.size() * price
    }

    /// Mark-to-market cash settlement for futures-like instruments:
    /// the cash delta for `size` contracts moving from `base` to
    /// `price`. Zero for stock-like instruments.
    pub fn cash_adjust(&self, size: f64, base: f64, price: f64) -> f64 {
        if self.stock_like {
            0.0
        } else {
            size * (price - base)
        }
    }

    /// Holding interest accrued on a position over `elapsed_ms`.
    pub fn credit_interest(&self, position: &Position, price: f64, elapsed_ms: i64) -> f64 {
        if self.interest_rate == 0.0 || !position.is_open() || elapsed_ms <= 0 {
            return 0.0;
        }
        let days = elapsed_ms as f64 / MILLIS_PER_DAY;
        days * (self.interest_rate / 365.0) * position.size().abs() * price
    }
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        Self::spot_default()
    }
}

/// Per-instrument schedule lookup with a fallback default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommissionTable {
    default: CommissionSchedule,
    schedules: HashMap<Instrument, CommissionSchedule>,
}

impl CommissionTable {
    pub fn new(default: CommissionSchedule) -> Self {
        Self {
            default,
            schedules: HashMap::new(),
        }
    }

    pub fn insert(&mut self, instrument: Instrument, schedule: CommissionSchedule) {
        self.schedules.insert(instrument, schedule);
    }

    pub fn get(&self, instrument: &Instrument) -> &CommissionSchedule {
        self.schedules.get(instrument).unwrap_or(&self.default)
    }

    /// Schedule used for commission on the opened portion: the
    /// compensation instrument's schedule when the order's instrument
    /// is flagged as a proxy, otherwise its own.
    pub fn compensation_for(&self, instrument: &Instrument) -> &CommissionSchedule {
        match self.get(instrument).compensate() {
            Some(proxy) => self.schedules.get(proxy).unwrap_or(&self.default),
            None => self.get(instrument),
        }
    }
}
