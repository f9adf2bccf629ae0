// =============================================================================
// Order Log — append-only, time-ordered record of emitted orders
// =============================================================================
//
// Filled only by the backtester with orders produced by the signal state
// machine.  Readers (report, chart export) get shared slices; nothing can
// remove or edit an entry once recorded.
// =============================================================================

use serde::Serialize;

use crate::types::{Order, Side};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OrderLog {
    orders: Vec<Order>,
}

impl OrderLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order. Orders arrive in step order, so timestamps never
    /// decrease.
    pub(crate) fn record(&mut self, order: Order) {
        debug_assert!(
            self.orders
                .last()
                .map_or(true, |last| last.timestamp <= order.timestamp),
            "orders must be recorded in time order"
        );
        self.orders.push(order);
    }

    pub fn as_slice(&self) -> &[Order] {
        &self.orders
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Order> {
        self.as_slice().iter()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn last(&self) -> Option<&Order> {
        self.orders.last()
    }

    /// Number of orders on `side`.
    pub fn count(&self, side: Side) -> usize {
        self.orders.iter().filter(|o| o.side == side).count()
    }
}

impl<'a> IntoIterator for &'a OrderLog {
    type Item = &'a Order;
    type IntoIter = std::slice::Iter<'a, Order>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
