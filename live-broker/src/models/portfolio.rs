use broker::Instrument;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::commission::CommissionTable;
use super::market::Prices;
use super::position::Position;

/// Aggregate account state: cash, recomputed valuation metrics and
/// fund-share accounting.
///
/// Valuation is recomputed from scratch once per tick, never patched
/// incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    cash: f64,
    /// External cash injections/withdrawals waiting to be converted
    /// into fund shares at the next valuation.
    cash_additions: VecDeque<f64>,
    value: f64,
    value_lever: f64,
    market_value: f64,
    market_value_lever: f64,
    unrealized: f64,
    leverage: f64,
    fund_shares: f64,
    /// Per-share fund value.
    fund_value: f64,
}

impl Portfolio {
    pub fn new(cash: f64, fund_start_value: f64) -> Self {
        let fund_value = if fund_start_value > 0.0 {
            fund_start_value
        } else {
            100.0
        };
        Self {
            cash,
            cash_additions: VecDeque::new(),
            value: cash,
            value_lever: cash,
            market_value: 0.0,
            market_value_lever: 0.0,
            unrealized: 0.0,
            leverage: 1.0,
            fund_shares: cash / fund_value,
            fund_value,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn set_cash(&mut self, cash: f64) {
        self.cash = cash;
    }

    pub fn credit(&mut self, amount: f64) {
        self.cash += amount;
    }

    pub fn debit(&mut self, amount: f64) {
        self.cash -= amount;
    }

    /// Queue an external cash change; fund shares are issued/redeemed
    /// at the current per-share value during the next valuation, so
    /// injections neither dilute nor inflate existing shares.
    pub fn queue_cash_addition(&mut self, amount: f64) {
        self.cash_additions.push_back(amount);
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn value_lever(&self) -> f64 {
        self.value_lever
    }

    pub fn market_value(&self) -> f64 {
        self.market_value
    }

    pub fn unrealized(&self) -> f64 {
        self.unrealized
    }

    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    pub fn fund_shares(&self) -> f64 {
        self.fund_shares
    }

    pub fn fund_value(&self) -> f64 {
        self.fund_value
    }

    /// Recompute mark-to-market value, unrealized PnL and leverage
    /// ratio over all open positions.
    ///
    /// Positions with no quote yet are valued at their entry price.
    pub fn revalue(
        &mut self,
        positions: &HashMap<Instrument, Position>,
        comms: &CommissionTable,
        prices: &Prices,
        value_based: bool,
    ) {
        while let Some(c) = self.cash_additions.pop_front() {
            self.fund_shares += c / self.fund_value;
            self.cash += c;
        }

        let mut pos_value = 0.0;
        let mut pos_value_unlever = 0.0;
        let mut unrealized = 0.0;

        for (instrument, position) in positions {
            let sched = comms.get(instrument);
            let price = prices.last(instrument).unwrap_or_else(|| position.price());

            let mut dvalue = if value_based {
                sched.value_size(position.size(), price)
            } else {
                sched.value(position, price)
            };
            let dunrealized = sched.profit_and_loss(position.size(), position.price(), price);

            if !value_based {
                dvalue = dvalue.abs();
            }

            pos_value += dvalue;
            unrealized += dunrealized;

            if dvalue > 0.0 {
                // committed cash is the leveraged entry cost; the
                // unrealized part is carried at full weight
                dvalue -= dunrealized;
                pos_value_unlever += dvalue / sched.leverage();
                pos_value_unlever += dunrealized;
            } else {
                pos_value_unlever += dvalue;
            }
        }

        self.value = self.cash + pos_value_unlever;
        if self.fund_shares > 0.0 {
            self.fund_value = self.value / self.fund_shares;
        }

        self.market_value = pos_value_unlever;
        self.market_value_lever = pos_value;
        self.value_lever = self.cash + pos_value;
        self.unrealized = unrealized;
        self.leverage = if pos_value_unlever != 0.0 {
            pos_value / pos_value_unlever
        } else {
            1.0
        };
    }
}
