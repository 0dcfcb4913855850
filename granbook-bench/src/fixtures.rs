//! Synthetic feed fixtures.
//!
//! Everything here is deterministic so runs are comparable.

use granbook_core::{Alias, Side};
use granbook_marketdata::{InstrumentGeneric, MarketDataListener, RawLevel, TradeInfo};
use std::sync::atomic::{AtomicU64, Ordering};

/// Futures contract used by the benches.
#[must_use]
pub fn futures_instrument() -> InstrumentGeneric {
    InstrumentGeneric::contract("futures", "BTC-USD-190628", "OKEX", 0.01)
}

/// `depth` levels on one side, one native tick apart, starting next to `mid`.
#[must_use]
pub fn ladder(mid: f64, tick: f64, depth: usize, side: Side) -> Vec<RawLevel> {
    (1..=depth)
        .map(|i| {
            let offset = i as f64 * tick;
            let price = match side {
                Side::Bid => mid - offset,
                Side::Ask => mid + offset,
            };
            RawLevel::new(price, (i % 17 + 1) as f64)
        })
        .collect()
}

/// Pseudo-random deltas against a ladder. Roughly one in five removes a level.
#[must_use]
pub fn delta_batches(
    mid: f64,
    tick: f64,
    depth: usize,
    side: Side,
    batches: usize,
    batch_len: usize,
) -> Vec<Vec<RawLevel>> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = move || {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    (0..batches)
        .map(|_| {
            (0..batch_len)
                .map(|_| {
                    let level = (next() % depth as u64 + 1) as f64;
                    let quantity = (next() % 5) as f64 * 3.0;
                    let price = match side {
                        Side::Bid => mid - level * tick,
                        Side::Ask => mid + level * tick,
                    };
                    RawLevel::new(price, quantity)
                })
                .collect()
        })
        .collect()
}

/// Listener that only counts callbacks.
#[derive(Debug, Default)]
pub struct CountingListener {
    depth: AtomicU64,
    trades: AtomicU64,
}

impl CountingListener {
    /// Depth callbacks seen.
    #[must_use]
    pub fn depth_events(&self) -> u64 {
        self.depth.load(Ordering::Relaxed)
    }

    /// Trade callbacks seen.
    #[must_use]
    pub fn trade_events(&self) -> u64 {
        self.trades.load(Ordering::Relaxed)
    }
}

impl MarketDataListener for CountingListener {
    fn on_depth(&self, _alias: &Alias, _is_bid: bool, _price: i64, _size: i64) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn on_trade(&self, _alias: &Alias, _price: i64, _size: i64, _info: TradeInfo) {
        self.trades.fetch_add(1, Ordering::Relaxed);
    }
}
