//! Feed callback entry point.
//!
//! [`FeedHandler`] is called from the network thread for every depth and
//! trade message. It resolves the alias's books in the subscription table,
//! reconciles one side at a time and forwards the resulting events to the
//! listener. Book faults are contained here: the faulting side is swept and a
//! full refresh is requested.

use crate::book::BookLevel;
use crate::extension::TradingExtension;
use crate::instruments::InstrumentTable;
use crate::listener::MarketDataListener;
use crate::reconciler::{DepthAction, RawLevel, SnapshotReconciler};
use crate::recovery::{RecoveryManager, ResyncSink};
use crate::table::{AliasBooks, SubscriptionState, SubscriptionTable};
use crate::trades::{RawTrade, TradeNormalizer};
use granbook_core::{Alias, BookError, GranularityMultiplier, Side, TradeSide};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Best price on one side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    /// Display ticks.
    pub ticks: i64,
    /// Display ticks converted back to a venue price.
    pub price: f64,
    /// Aggregate size at the price.
    pub size: i64,
}

/// Best bid and ask of an alias.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TopOfBook {
    /// Best bid.
    pub bid: Option<Quote>,
    /// Best ask.
    pub ask: Option<Quote>,
}

impl TopOfBook {
    /// Spread in display ticks when both sides are present.
    #[must_use]
    pub fn spread_ticks(&self) -> Option<i64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask.ticks - bid.ticks),
            _ => None,
        }
    }
}

/// Applies feed messages to subscribed books.
pub struct FeedHandler {
    instruments: Arc<InstrumentTable>,
    subscriptions: Arc<SubscriptionTable>,
    listener: Arc<dyn MarketDataListener>,
    extension: Option<Arc<dyn TradingExtension>>,
    resync: Arc<dyn ResyncSink>,
    recovery: Mutex<RecoveryManager>,
}

impl FeedHandler {
    /// Creates a handler with an empty subscription table.
    #[must_use]
    pub fn new(
        instruments: Arc<InstrumentTable>,
        listener: Arc<dyn MarketDataListener>,
        resync: Arc<dyn ResyncSink>,
        recovery_timeout: Duration,
    ) -> Self {
        Self {
            instruments,
            subscriptions: Arc::new(SubscriptionTable::new()),
            listener,
            extension: None,
            resync,
            recovery: Mutex::new(RecoveryManager::new(recovery_timeout)),
        }
    }

    /// Attaches a trading extension.
    #[must_use]
    pub fn with_extension(mut self, extension: Arc<dyn TradingExtension>) -> Self {
        self.extension = Some(extension);
        self
    }

    /// Instrument metadata.
    #[must_use]
    pub fn instruments(&self) -> &Arc<InstrumentTable> {
        &self.instruments
    }

    /// Subscription table.
    #[must_use]
    pub fn subscriptions(&self) -> &Arc<SubscriptionTable> {
        &self.subscriptions
    }

    /// Downstream listener.
    #[must_use]
    pub fn listener(&self) -> &Arc<dyn MarketDataListener> {
        &self.listener
    }

    /// Trading extension, if any.
    #[must_use]
    pub fn extension(&self) -> Option<&Arc<dyn TradingExtension>> {
        self.extension.as_ref()
    }

    /// Handles a depth message.
    pub fn on_depth(&self, alias: &Alias, action: DepthAction, asks: &[RawLevel], bids: &[RawLevel]) {
        let Some(books) = self.subscriptions.books(alias) else {
            tracing::trace!("depth for unsubscribed {} dropped", alias);
            return;
        };

        match action {
            DepthAction::Partial => {
                for (side, levels) in [(Side::Ask, asks), (Side::Bid, bids)] {
                    if let Err(err) = self.reconcile_side(&books, side, levels, action) {
                        self.book_fault(&books, side, err);
                        return;
                    }
                }
                if self.recovery.lock().complete(alias) {
                    tracing::info!("{} recovered from full refresh", alias);
                }
            }
            DepthAction::Update => {
                if self.recovery.lock().is_recovering(alias) {
                    tracing::trace!("{} recovering, delta dropped", alias);
                    return;
                }
                for (side, levels) in [(Side::Ask, asks), (Side::Bid, bids)] {
                    if levels.is_empty() {
                        continue;
                    }
                    if let Err(err) = self.reconcile_side(&books, side, levels, action) {
                        self.book_fault(&books, side, err);
                        return;
                    }
                }
            }
        }
    }

    /// Handles a trade print.
    pub fn on_trade(&self, alias: &Alias, price: f64, quantity: f64, side: TradeSide) {
        let Some(books) = self.subscriptions.books(alias) else {
            tracing::trace!("trade for unsubscribed {} dropped", alias);
            return;
        };
        if books.is_retired() {
            return;
        }

        if let Some(extension) = &self.extension {
            extension.on_trade_print(alias, side, price);
        }

        let normalizer = TradeNormalizer::new(books.instrument(), books.granularity());
        let raw = RawTrade {
            price,
            quantity,
            side,
        };
        match normalizer.normalize(raw) {
            Some(trade) => self.listener.on_trade(alias, trade.price, trade.size, trade.info),
            None => tracing::trace!("{} trade {:?} below one lot dropped", alias, raw),
        }
    }

    /// Zero-sizes both sides of an alias and requests a full refresh.
    pub fn force_resync(&self, alias: &Alias) {
        let Some(books) = self.subscriptions.books(alias) else {
            return;
        };
        for side in [Side::Ask, Side::Bid] {
            self.invalidate_side(&books, side);
        }
        self.request_resync(alias);
    }

    /// Moves an active alias onto empty books at another granularity.
    ///
    /// Orders resting in `previous` are zero-sized at their old display
    /// prices and the entry is retired before the new books are installed.
    /// Deltas are dropped until the requested full refresh fills them.
    pub fn regranulate(
        &self,
        previous: &AliasBooks,
        granularity: GranularityMultiplier,
    ) -> Arc<AliasBooks> {
        let reconciler = SnapshotReconciler::new(
            previous.alias(),
            previous.instrument(),
            previous.granularity(),
            self.listener.as_ref(),
        );
        previous.retire_with(|book| {
            reconciler.invalidate(book);
        });
        self.request_resync(previous.alias());

        let books = Arc::new(previous.regranulated(granularity));
        self.subscriptions
            .install(Arc::clone(&books), SubscriptionState::Active);
        tracing::info!(
            "{} regranulated from {} to {}",
            previous.alias(),
            previous.granularity().display_tick,
            granularity.display_tick
        );
        books
    }

    /// Returns true if deltas for the alias are being dropped pending a refresh.
    #[must_use]
    pub fn is_recovering(&self, alias: &Alias) -> bool {
        self.recovery.lock().is_recovering(alias)
    }

    /// Re-issues snapshot requests whose refresh never arrived.
    ///
    /// Returns the aliases that were re-requested.
    pub fn retry_expired_resyncs(&self) -> Vec<Alias> {
        let expired = self.recovery.lock().check_timeouts();
        expired
            .into_iter()
            .map(|request| {
                tracing::warn!(
                    "resync of {} timed out, requesting again (attempt {})",
                    request.alias,
                    request.attempts
                );
                self.resync.request_resync(&request.alias);
                request.alias
            })
            .collect()
    }

    /// Drops recovery state of an alias that is no longer subscribed.
    pub fn forget(&self, alias: &Alias) {
        self.recovery.lock().complete(alias);
    }

    /// Best bid and ask of an alias.
    #[must_use]
    pub fn top_of_book(&self, alias: &Alias) -> Option<TopOfBook> {
        let books = self.subscriptions.books(alias)?;
        let granularity = books.granularity();
        let quote = |side: Side| {
            let book = books.side(side).lock();
            book.best_price().map(|ticks| Quote {
                ticks,
                price: granularity.raw_price(ticks),
                size: book.size_at(ticks),
            })
        };
        Some(TopOfBook {
            bid: quote(Side::Bid),
            ask: quote(Side::Ask),
        })
    }

    /// Up to `levels` aggregated levels of one side, best first.
    #[must_use]
    pub fn depth(&self, alias: &Alias, side: Side, levels: usize) -> Option<Vec<BookLevel>> {
        let books = self.subscriptions.books(alias)?;
        let book = books.side(side).lock();
        Some(book.best_n(levels))
    }

    fn reconcile_side(
        &self,
        books: &AliasBooks,
        side: Side,
        levels: &[RawLevel],
        action: DepthAction,
    ) -> Result<(), BookError> {
        let mut book = books.side(side).lock();
        if books.is_retired() {
            tracing::trace!("{} torn down, {:?} depth dropped", books.alias(), side);
            return Ok(());
        }
        let reconciler = SnapshotReconciler::new(
            books.alias(),
            books.instrument(),
            books.granularity(),
            self.listener.as_ref(),
        );
        let stats = match action {
            DepthAction::Partial => reconciler.apply_full_refresh(&mut book, levels)?,
            DepthAction::Update => reconciler.apply_delta(&mut book, levels)?,
        };
        tracing::trace!("{} {:?} {:?}: {:?}", books.alias(), side, action, stats);
        Ok(())
    }

    fn book_fault(&self, books: &AliasBooks, side: Side, err: BookError) {
        tracing::error!(
            "{} {:?} book fault: {}, forcing full refresh",
            books.alias(),
            side,
            err
        );
        self.invalidate_side(books, side);
        self.request_resync(books.alias());
    }

    fn invalidate_side(&self, books: &AliasBooks, side: Side) {
        let mut book = books.side(side).lock();
        if books.is_retired() {
            return;
        }
        let reconciler = SnapshotReconciler::new(
            books.alias(),
            books.instrument(),
            books.granularity(),
            self.listener.as_ref(),
        );
        reconciler.invalidate(&mut book);
    }

    fn request_resync(&self, alias: &Alias) {
        let issued = self.recovery.lock().request(alias);
        if issued {
            self.resync.request_resync(alias);
        } else {
            tracing::debug!("resync of {} already outstanding", alias);
        }
    }
}
