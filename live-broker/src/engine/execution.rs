use crate::models::{CommissionSchedule, Position};

/// The complete effect of applying one fill to a position.
///
/// Computed without touching broker state; the caller commits the
/// resulting `cash` and `position` in one step, so a fill is either
/// fully applied or (for the nullified opening portion of a margin
/// failure) not applied at all — never half-way.
#[derive(Debug, Clone)]
pub struct FillOutcome {
    /// Signed portion that reduced/reversed the existing position.
    pub closed: f64,
    /// Signed portion that extended the position (zero after margin
    /// nullification).
    pub opened: f64,
    pub closed_value: f64,
    pub closed_comm: f64,
    pub opened_value: f64,
    pub opened_comm: f64,
    /// Realized PnL on the closed portion, net of closing commission.
    pub pnl: f64,
    /// Mark-to-market cash settled as part of this execution
    /// (futures-like instruments only).
    pub cash_adjust: f64,
    /// Resulting cash.
    pub cash: f64,
    /// Resulting position.
    pub position: Position,
}

impl FillOutcome {
    pub fn executed_size(&self) -> f64 {
        self.closed + self.opened
    }

    pub fn total_commission(&self) -> f64 {
        self.closed_comm + self.opened_comm
    }
}

/// Insufficient cash to open: the opening portion was nullified (size
/// and cost zeroed). The wrapped outcome still carries the closed
/// portion's effects, which remain valid and must be committed.
#[derive(Debug, Clone)]
pub struct MarginFailure(pub FillOutcome);

/// Apply a signed fill of `size` units at `price` to `position` with
/// `cash` available.
///
/// Closed portion: realized PnL against the average entry price minus
/// closing commission; cash credited with the closing value (divided
/// by leverage for long exposure) plus net PnL for stock-like
/// settlement, plus the mark-to-market gap from the adjustment base
/// for futures-like settlement. Opened portion: cost (capped by
/// available cash, divided by leverage) plus commission from the
/// compensation schedule `comp`; if cash would go negative the opened
/// portion is nullified and a `MarginFailure` returned.
pub fn execute(
    position: Position,
    sched: &CommissionSchedule,
    comp: &CommissionSchedule,
    cash: f64,
    size: f64,
    price: f64,
    value_based: bool,
) -> Result<FillOutcome, MarginFailure> {
    let entry_price = position.price();

    // split on a scratch copy; the real position is updated with the
    // executed size once the opened portion survives the cash check
    let (opened, closed) = {
        let mut scratch = position;
        scratch.update(size, price)
    };

    let mut cash = cash;
    let mut pnl = sched.profit_and_loss(-closed, entry_price, price);
    let mut cash_adjust = 0.0;
    let mut closed_value = 0.0;
    let mut closed_comm = 0.0;

    if closed != 0.0 {
        closed_value = if value_based {
            sched.value_size(-closed, entry_price)
        } else {
            sched.operation_cost(closed, entry_price)
        };

        let mut close_cash = closed_value;
        if closed_value > 0.0 {
            // long exposure released leveraged cash at open
            close_cash /= sched.leverage();
        }

        closed_comm = sched.commission(closed, price);
        pnl -= closed_comm;

        cash += close_cash;
        if sched.stock_like() {
            cash += pnl;
        }

        // settle closed contracts from the adjustment base to the
        // execution price
        let adj = sched.cash_adjust(-closed, position.adjbase(), price);
        cash += adj;
        cash_adjust += adj;
    }

    let mut opened = opened;
    let mut opened_value = 0.0;
    let mut opened_comm = 0.0;
    let mut margin = false;

    if opened != 0.0 {
        let cash_before_open = cash;

        opened_value = if value_based {
            sched.value_size(opened, price)
        } else {
            sched.operation_cost(opened, price)
        };

        let mut open_cash = if opened_value <= cash {
            opened_value
        } else {
            cash
        };
        if opened_value > 0.0 {
            open_cash /= sched.leverage();
        }

        cash -= open_cash;
        opened_comm = comp.commission(opened, price);
        cash -= opened_comm;

        if cash < 0.0 {
            // execution is not possible - nullify the opening portion
            margin = true;
            opened = 0.0;
            opened_value = 0.0;
            opened_comm = 0.0;
            cash = cash_before_open;
        }
    }

    let exec_size = closed + opened;
    let mut new_position = position;
    if exec_size != 0.0 {
        new_position.update(exec_size, price);
    }

    if opened != 0.0 {
        if new_position.size().abs() > opened.abs() {
            // pre-existing contracts move to the execution price as
            // their new common adjustment base
            let adj_size = new_position.size() - opened;
            let adj = sched.cash_adjust(adj_size, position.adjbase(), price);
            cash += adj;
            cash_adjust += adj;
        }
        new_position.set_adjbase(price);
    }

    let outcome = FillOutcome {
        closed,
        opened,
        closed_value,
        closed_comm,
        opened_value,
        opened_comm,
        pnl,
        cash_adjust,
        cash,
        position: new_position,
    };

    if margin {
        Err(MarginFailure(outcome))
    } else {
        Ok(outcome)
    }
}
