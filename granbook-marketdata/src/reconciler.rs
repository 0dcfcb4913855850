//! Depth reconciliation.
//!
//! Applies incremental deltas and full refreshes to one side of a book and
//! reports every resulting change of aggregate size to a listener.
//!
//! A full refresh is two-phase. Every order the side currently tracks is
//! first zero-sized at its last known price, then every snapshot level is
//! inserted. The feed never says which levels disappeared, so the sweep is
//! the only way to purge them; levels present in both states show up as a
//! zero followed by a re-insert.

use crate::book::{OrderEntry, OrderIndexedBook};
use crate::instruments::InstrumentGeneric;
use crate::listener::MarketDataListener;
use granbook_core::{
    Alias, GranularityMultiplier, InstrumentKind, OrderId, Result, Side, native_order_key,
};

/// Depth message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthAction {
    /// Full refresh of both sides.
    Partial,
    /// Incremental changes.
    Update,
}

impl DepthAction {
    /// Parses the venue's `partial`/`update` action strings.
    #[must_use]
    pub fn from_venue(action: &str) -> Option<Self> {
        match action {
            "partial" => Some(Self::Partial),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

/// One venue depth level in native units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawLevel {
    /// Venue price.
    pub price: f64,
    /// Venue quantity; zero removes the level.
    pub quantity: f64,
}

impl RawLevel {
    /// Creates a level.
    #[must_use]
    pub const fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Orders zero-sized by the invalidation sweep.
    pub invalidated: usize,
    /// Orders inserted.
    pub inserted: usize,
    /// Orders updated in place.
    pub updated: usize,
    /// Orders removed by a zero size.
    pub removed: usize,
    /// Zero sizes for unknown orders.
    pub ignored: usize,
}

/// Applies depth messages for one alias at one granularity.
pub struct SnapshotReconciler<'a> {
    alias: &'a Alias,
    native_tick: f64,
    kind: InstrumentKind,
    granularity: GranularityMultiplier,
    sink: &'a dyn MarketDataListener,
}

impl<'a> SnapshotReconciler<'a> {
    /// Creates a reconciler that reports changes to `sink`.
    #[must_use]
    pub fn new(
        alias: &'a Alias,
        instrument: &InstrumentGeneric,
        granularity: GranularityMultiplier,
        sink: &'a dyn MarketDataListener,
    ) -> Self {
        Self {
            alias,
            native_tick: instrument.tick_size,
            kind: instrument.kind,
            granularity,
            sink,
        }
    }

    /// Converts a raw level to a book entry on `side`.
    #[inline]
    #[must_use]
    pub fn normalize(&self, side: Side, level: RawLevel) -> OrderEntry {
        OrderEntry {
            order_id: OrderId::from_native_key(native_order_key(level.price, self.native_tick)),
            price: self.granularity.display_price(level.price, side),
            size: self.granularity.display_size(level.quantity, self.kind),
        }
    }

    /// Applies a batch of incremental levels in feed order.
    ///
    /// # Errors
    /// Returns the first book contract violation. Levels after it are not
    /// applied and the side must be recovered by a full refresh.
    pub fn apply_delta(
        &self,
        book: &mut OrderIndexedBook,
        levels: &[RawLevel],
    ) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();
        for level in levels {
            let entry = self.normalize(book.side(), *level);
            self.apply_entry(book, entry, &mut stats)?;
        }
        Ok(stats)
    }

    /// Replaces the side's contents with a snapshot.
    ///
    /// # Errors
    /// Returns a book contract violation raised while inserting.
    pub fn apply_full_refresh(
        &self,
        book: &mut OrderIndexedBook,
        levels: &[RawLevel],
    ) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats {
            invalidated: self.invalidate(book),
            ..ReconcileStats::default()
        };
        for level in levels {
            let entry = self.normalize(book.side(), *level);
            self.apply_entry(book, entry, &mut stats)?;
        }
        Ok(stats)
    }

    /// Zero-sizes every tracked order at its last known price and empties the side.
    ///
    /// Returns the number of orders swept.
    pub fn invalidate(&self, book: &mut OrderIndexedBook) -> usize {
        let side = book.side();
        let stale = book.orders_best_first();
        for order in &stale {
            if let Ok(removed) = book.remove_order(order.order_id) {
                self.emit(side, removed.entry.price, removed.remaining);
            }
        }
        book.clear();
        stale.len()
    }

    fn apply_entry(
        &self,
        book: &mut OrderIndexedBook,
        entry: OrderEntry,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        let side = book.side();
        let OrderEntry {
            order_id,
            price,
            size,
        } = entry;

        match (book.has_order(order_id), size > 0) {
            (true, false) => {
                let removed = book.remove_order(order_id)?;
                self.emit(side, removed.entry.price, removed.remaining);
                stats.removed += 1;
            }
            (true, true) => {
                let update = book.update_order(order_id, price, size)?;
                if update.moved(price) {
                    self.emit(side, update.previous.price, update.previous_level);
                }
                self.emit(side, price, update.aggregate);
                stats.updated += 1;
            }
            (false, true) => {
                let aggregate = book.add_order(order_id, price, size)?;
                self.emit(side, price, aggregate);
                stats.inserted += 1;
            }
            (false, false) => {
                stats.ignored += 1;
            }
        }
        Ok(())
    }

    #[inline]
    fn emit(&self, side: Side, price: i64, size: i64) {
        self.sink.on_depth(self.alias, side.is_bid(), price, size);
    }
}
