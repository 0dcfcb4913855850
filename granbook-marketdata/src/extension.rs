//! Optional trading capability hooks.
//!
//! A trading-enabled host injects an implementation at construction. Market
//! data only providers leave it unset.

use granbook_core::{Alias, TradeSide};

/// Callbacks for account-aware consumers of the feed.
pub trait TradingExtension: Send + Sync {
    /// Every trade print, before display normalization.
    fn on_trade_print(&self, _alias: &Alias, _side: TradeSide, _raw_price: f64) {}

    /// The connection was restored; runs before subscriptions are replayed.
    fn on_reconnect(&self) {}

    /// A subscription was silently restored after reconnect.
    fn on_resubscribed(&self, _alias: &Alias) {}
}
