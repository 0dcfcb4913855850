//! # granbook market data
//!
//! Book reconstruction for granulated market data feeds.
//!
//! This crate provides:
//! - Order-indexed books keyed by native price identity
//! - Full refresh and incremental delta reconciliation
//! - Trade print normalization
//! - Forced resync tracking
//! - Listener fan-out and the feed callback entry point

pub mod book;
pub mod extension;
pub mod handler;
pub mod instruments;
pub mod listener;
pub mod reconciler;
pub mod recovery;
pub mod table;
pub mod trades;

pub use book::{BookLevel, OrderEntry, OrderIndexedBook, OrderUpdate, RemovedOrder};
pub use extension::TradingExtension;
pub use handler::{FeedHandler, Quote, TopOfBook};
pub use instruments::{InstrumentGeneric, InstrumentTable, LookupMiss};
pub use listener::{
    ChannelListener, InstrumentInfo, ListenerSet, MarketDataEvent, MarketDataListener, TradeInfo,
};
pub use reconciler::{DepthAction, RawLevel, ReconcileStats, SnapshotReconciler};
pub use recovery::{RecoveryManager, RecoveryRequest, ResyncSink};
pub use table::{AliasBooks, Subscription, SubscriptionState, SubscriptionTable};
pub use trades::{NormalizedTrade, RawTrade, TradeNormalizer};
