// =============================================================================
// Trade Report — fee-aware profit summary over a finished order log
// =============================================================================
//
// Orders alternate BUY, SELL, BUY, ... so pairing is positional: every BUY is
// closed by the SELL that follows it.  A trailing BUY with no SELL is an open
// position and contributes nothing to P&L.
//
//   gross = (sell - buy) * quantity
//   fees  = fee_rate * (buy + sell) * quantity
//   net   = gross - fees
// =============================================================================

use serde::Serialize;
use tracing::info;

use crate::order_log::OrderLog;
use crate::types::{Order, Side};

/// One closed BUY -> SELL pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoundTrip {
    pub entry: Order,
    pub exit: Order,
    pub gross: f64,
    pub fees: f64,
    pub net: f64,
}

impl RoundTrip {
    fn new(entry: Order, exit: Order, fee_rate: f64) -> Self {
        let quantity = entry.quantity;
        let gross = (exit.limit_price - entry.limit_price) * quantity;
        let fees = fee_rate * (entry.limit_price + exit.limit_price) * quantity;
        Self {
            entry,
            exit,
            gross,
            fees,
            net: gross - fees,
        }
    }

    pub fn is_win(&self) -> bool {
        self.net > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeReport {
    pub round_trips: Vec<RoundTrip>,
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub open_position: Option<Order>,
}

impl TradeReport {
    pub fn wins(&self) -> usize {
        self.round_trips.iter().filter(|rt| rt.is_win()).count()
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.round_trips.is_empty() {
            return None;
        }
        Some(self.wins() as f64 / self.round_trips.len() as f64)
    }

    /// Emit the report through tracing.
    pub fn log(&self) {
        for (i, rt) in self.round_trips.iter().enumerate() {
            info!(
                trip = i + 1,
                entry_time = %rt.entry.timestamp,
                entry_price = rt.entry.limit_price,
                exit_time = %rt.exit.timestamp,
                exit_price = rt.exit.limit_price,
                gross = rt.gross,
                fees = rt.fees,
                net = rt.net,
                "round trip"
            );
        }
        if let Some(open) = &self.open_position {
            info!(
                entry_time = %open.timestamp,
                entry_price = open.limit_price,
                quantity = open.quantity,
                "position still open"
            );
        }
        info!(
            round_trips = self.round_trips.len(),
            wins = self.wins(),
            win_rate = ?self.win_rate(),
            gross_pnl = self.gross_pnl,
            fees = self.fees,
            net_pnl = self.net_pnl,
            "trade report"
        );
    }
}

/// Pair the orders of `log` into round trips and total them.
pub fn summarize(log: &OrderLog, fee_rate: f64) -> TradeReport {
    let mut report = TradeReport::default();

    for order in log {
        match (order.side, report.open_position.take()) {
            (Side::Buy, None) => report.open_position = Some(*order),
            (Side::Sell, Some(entry)) => {
                let rt = RoundTrip::new(entry, *order, fee_rate);
                report.gross_pnl += rt.gross;
                report.fees += rt.fees;
                report.net_pnl += rt.net;
                report.round_trips.push(rt);
            }
            // The state machine never emits these; keep the earlier entry.
            (Side::Buy, Some(entry)) => report.open_position = Some(entry),
            (Side::Sell, None) => {}
        }
    }

    report
}
