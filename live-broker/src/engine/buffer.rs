use broker::{ExchangeOrderId, FillEvent};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Bounded, thread-safe queue of fill events between the gateway's
/// push stream and the single-writer reconciliation loop.
///
/// The producer side only appends; the drain side removes exactly the
/// events matched to an order, leaving unmatched ones queued. Beyond
/// capacity the oldest events are dropped.
#[derive(Debug)]
pub struct FillBuffer {
    events: Mutex<VecDeque<FillEvent>>,
    capacity: usize,
}

impl FillBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, event: FillEvent) {
        let mut events = self.events.lock().expect("fill buffer poisoned");
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Remove and return, in arrival order, every queued event for the
    /// given exchange order id. At-most-once consumption: a returned
    /// event no longer exists in the buffer.
    pub fn take_matching(&self, id: ExchangeOrderId) -> Vec<FillEvent> {
        let mut events = self.events.lock().expect("fill buffer poisoned");
        let mut matched = Vec::new();
        let mut remaining = VecDeque::with_capacity(events.len());

        for event in events.drain(..) {
            if event.exchange_order_id == id {
                matched.push(event);
            } else {
                remaining.push_back(event);
            }
        }

        *events = remaining;
        matched
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("fill buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
