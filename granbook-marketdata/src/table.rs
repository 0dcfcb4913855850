//! Per-alias book pairs and the subscription table.
//!
//! The table is written only by the subscription worker. Feed callbacks take
//! a snapshot of an alias's [`AliasBooks`] under the read lock and then work
//! on one side at a time under that side's mutex.
//!
//! An entry that has been torn down is marked retired while both side locks
//! are held. A callback that raced the teardown sees the flag once it owns
//! the side lock and drops its update.

use crate::book::OrderIndexedBook;
use crate::instruments::InstrumentGeneric;
use granbook_core::{Alias, GranularityMultiplier, Side};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Bid and ask books of one alias at one granularity.
#[derive(Debug)]
pub struct AliasBooks {
    alias: Alias,
    instrument: Arc<InstrumentGeneric>,
    granularity: GranularityMultiplier,
    bids: Arc<Mutex<OrderIndexedBook>>,
    asks: Arc<Mutex<OrderIndexedBook>>,
    retired: AtomicBool,
}

impl AliasBooks {
    /// Creates empty books.
    #[must_use]
    pub fn new(
        alias: Alias,
        instrument: Arc<InstrumentGeneric>,
        granularity: GranularityMultiplier,
    ) -> Self {
        Self {
            alias,
            instrument,
            granularity,
            bids: Arc::new(Mutex::new(OrderIndexedBook::new(Side::Bid))),
            asks: Arc::new(Mutex::new(OrderIndexedBook::new(Side::Ask))),
            retired: AtomicBool::new(false),
        }
    }

    /// Returns empty books for the same alias under another granularity.
    ///
    /// Resting orders are priced in this entry's display ticks and are not
    /// carried over.
    #[must_use]
    pub fn regranulated(&self, granularity: GranularityMultiplier) -> Self {
        Self::new(self.alias.clone(), Arc::clone(&self.instrument), granularity)
    }

    /// Alias.
    #[must_use]
    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    /// Instrument metadata.
    #[must_use]
    pub fn instrument(&self) -> &InstrumentGeneric {
        &self.instrument
    }

    /// Granularity in effect.
    #[must_use]
    pub fn granularity(&self) -> GranularityMultiplier {
        self.granularity
    }

    /// Book for one side.
    #[must_use]
    pub fn side(&self, side: Side) -> &Mutex<OrderIndexedBook> {
        match side {
            Side::Bid => &*self.bids,
            Side::Ask => &*self.asks,
        }
    }

    /// Returns true once the entry has been torn down.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Tears the entry down. Lock order is bids, then asks.
    pub fn retire(&self) {
        self.retire_with(|_| {});
    }

    /// Tears the entry down after handing each live side to `drain`, bids
    /// first. Both side locks are held throughout, so no callback observes
    /// the drained books before the retired flag.
    pub fn retire_with(&self, mut drain: impl FnMut(&mut OrderIndexedBook)) {
        let mut bids = self.bids.lock();
        let mut asks = self.asks.lock();
        if !self.is_retired() {
            drain(&mut bids);
            drain(&mut asks);
        }
        self.retired.store(true, Ordering::Release);
    }
}

/// Subscription lifecycle state of an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Transport subscription in flight.
    Pending,
    /// Subscribed and announced.
    Active,
}

/// One row of the subscription table.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Lifecycle state.
    pub state: SubscriptionState,
    /// Books fed by callbacks.
    pub books: Arc<AliasBooks>,
}

/// Alias to subscription map.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: RwLock<HashMap<Alias, Subscription>>,
}

impl SubscriptionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an entry, returning the one it replaced.
    pub fn install(&self, books: Arc<AliasBooks>, state: SubscriptionState) -> Option<Subscription> {
        let alias = books.alias().clone();
        self.entries
            .write()
            .insert(alias, Subscription { state, books })
    }

    /// Moves a pending entry to active. Returns false if there is none.
    pub fn activate(&self, alias: &Alias) -> bool {
        match self.entries.write().get_mut(alias) {
            Some(entry) if entry.state == SubscriptionState::Pending => {
                entry.state = SubscriptionState::Active;
                true
            }
            _ => false,
        }
    }

    /// Removes an entry.
    pub fn remove(&self, alias: &Alias) -> Option<Subscription> {
        self.entries.write().remove(alias)
    }

    /// Gets a copy of an entry.
    #[must_use]
    pub fn get(&self, alias: &Alias) -> Option<Subscription> {
        self.entries.read().get(alias).cloned()
    }

    /// Books of an alias, if subscribed or pending.
    #[must_use]
    pub fn books(&self, alias: &Alias) -> Option<Arc<AliasBooks>> {
        self.entries.read().get(alias).map(|e| Arc::clone(&e.books))
    }

    /// Lifecycle state of an alias; `None` means unsubscribed.
    #[must_use]
    pub fn state(&self, alias: &Alias) -> Option<SubscriptionState> {
        self.entries.read().get(alias).map(|e| e.state)
    }

    /// Active aliases with their granularity.
    #[must_use]
    pub fn active(&self) -> Vec<(Alias, GranularityMultiplier)> {
        let mut active: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.state == SubscriptionState::Active)
            .map(|(alias, e)| (alias.clone(), e.books.granularity()))
            .collect();
        active.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        active
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
