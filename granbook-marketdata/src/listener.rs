//! Downstream listener interface.
//!
//! Depth and trade callbacks run on the network thread that delivered the
//! feed message; implementations must not block.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use granbook_core::{Alias, GranularityMultiplier};
use parking_lot::RwLock;
use std::sync::Arc;

/// Instrument description announced when a subscription becomes active.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentInfo {
    /// Venue symbol.
    pub symbol: String,
    /// Exchange name.
    pub exchange: String,
    /// Instrument type.
    pub instrument_type: String,
    /// Display tick in effect for this subscription.
    pub display_tick: f64,
    /// Quantity multiplier in effect, if any.
    pub size_multiplier: Option<f64>,
    /// Subscription alias.
    pub alias: Alias,
}

impl InstrumentInfo {
    /// Granularity carried by this announcement.
    #[must_use]
    pub fn granularity(&self) -> GranularityMultiplier {
        GranularityMultiplier {
            display_tick: self.display_tick,
            size_multiplier: self.size_multiplier,
        }
    }
}

/// Trade flags reported alongside a print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeInfo {
    /// Off-exchange print.
    pub is_otc: bool,
    /// The resting bid was hit.
    pub is_bid_aggressor: bool,
}

/// Receiver of normalized market data and subscription notifications.
pub trait MarketDataListener: Send + Sync {
    /// Aggregate size at a display price changed.
    fn on_depth(&self, alias: &Alias, is_bid: bool, price: i64, size: i64);

    /// A trade printed.
    fn on_trade(&self, alias: &Alias, price: i64, size: i64, info: TradeInfo);

    /// A subscription became active.
    fn on_instrument_added(&self, _alias: &Alias, _info: &InstrumentInfo) {}

    /// A subscription was removed.
    fn on_instrument_removed(&self, _alias: &Alias) {}

    /// A subscribe request named an unknown instrument or was rejected.
    fn on_instrument_not_found(&self, _symbol: &str, _exchange: &str, _instrument_type: &str) {}

    /// A subscribe request named an instrument that is already active.
    fn on_instrument_already_subscribed(
        &self,
        _symbol: &str,
        _exchange: &str,
        _instrument_type: &str,
    ) {
    }

    /// The feed connection dropped.
    fn on_connection_lost(&self) {}

    /// The feed connection came back and subscriptions were restored.
    fn on_connection_restored(&self) {}
}

/// Owned copy of every listener callback.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketDataEvent {
    /// See [`MarketDataListener::on_depth`].
    Depth {
        /// Alias.
        alias: Alias,
        /// Bid side.
        is_bid: bool,
        /// Display price.
        price: i64,
        /// New aggregate size.
        size: i64,
    },
    /// See [`MarketDataListener::on_trade`].
    Trade {
        /// Alias.
        alias: Alias,
        /// Display price.
        price: i64,
        /// Display size.
        size: i64,
        /// Flags.
        info: TradeInfo,
    },
    /// See [`MarketDataListener::on_instrument_added`].
    InstrumentAdded(InstrumentInfo),
    /// See [`MarketDataListener::on_instrument_removed`].
    InstrumentRemoved(Alias),
    /// See [`MarketDataListener::on_instrument_not_found`].
    InstrumentNotFound {
        /// Symbol.
        symbol: String,
        /// Exchange.
        exchange: String,
        /// Type.
        instrument_type: String,
    },
    /// See [`MarketDataListener::on_instrument_already_subscribed`].
    InstrumentAlreadySubscribed {
        /// Symbol.
        symbol: String,
        /// Exchange.
        exchange: String,
        /// Type.
        instrument_type: String,
    },
    /// See [`MarketDataListener::on_connection_lost`].
    ConnectionLost,
    /// See [`MarketDataListener::on_connection_restored`].
    ConnectionRestored,
}

/// Listener that forwards every callback into a crossbeam channel.
///
/// Sends never block: when a bounded channel is full the event is dropped
/// and a warning is logged.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: Sender<MarketDataEvent>,
}

impl ChannelListener {
    /// Creates a listener backed by an unbounded channel.
    #[must_use]
    pub fn unbounded() -> (Self, Receiver<MarketDataEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Creates a listener backed by a bounded channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<MarketDataEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }

    fn forward(&self, event: MarketDataEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!("listener channel full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("listener channel disconnected");
            }
        }
    }
}

impl MarketDataListener for ChannelListener {
    fn on_depth(&self, alias: &Alias, is_bid: bool, price: i64, size: i64) {
        self.forward(MarketDataEvent::Depth {
            alias: alias.clone(),
            is_bid,
            price,
            size,
        });
    }

    fn on_trade(&self, alias: &Alias, price: i64, size: i64, info: TradeInfo) {
        self.forward(MarketDataEvent::Trade {
            alias: alias.clone(),
            price,
            size,
            info,
        });
    }

    fn on_instrument_added(&self, _alias: &Alias, info: &InstrumentInfo) {
        self.forward(MarketDataEvent::InstrumentAdded(info.clone()));
    }

    fn on_instrument_removed(&self, alias: &Alias) {
        self.forward(MarketDataEvent::InstrumentRemoved(alias.clone()));
    }

    fn on_instrument_not_found(&self, symbol: &str, exchange: &str, instrument_type: &str) {
        self.forward(MarketDataEvent::InstrumentNotFound {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            instrument_type: instrument_type.to_string(),
        });
    }

    fn on_instrument_already_subscribed(
        &self,
        symbol: &str,
        exchange: &str,
        instrument_type: &str,
    ) {
        self.forward(MarketDataEvent::InstrumentAlreadySubscribed {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            instrument_type: instrument_type.to_string(),
        });
    }

    fn on_connection_lost(&self) {
        self.forward(MarketDataEvent::ConnectionLost);
    }

    fn on_connection_restored(&self) {
        self.forward(MarketDataEvent::ConnectionRestored);
    }
}

/// Fan-out over registered listeners.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn MarketDataListener>>>,
}

impl ListenerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add(&self, listener: Arc<dyn MarketDataListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns true if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn each(&self, f: impl Fn(&dyn MarketDataListener)) {
        for listener in self.listeners.read().iter() {
            f(listener.as_ref());
        }
    }
}

impl MarketDataListener for ListenerSet {
    fn on_depth(&self, alias: &Alias, is_bid: bool, price: i64, size: i64) {
        self.each(|l| l.on_depth(alias, is_bid, price, size));
    }

    fn on_trade(&self, alias: &Alias, price: i64, size: i64, info: TradeInfo) {
        self.each(|l| l.on_trade(alias, price, size, info));
    }

    fn on_instrument_added(&self, alias: &Alias, info: &InstrumentInfo) {
        self.each(|l| l.on_instrument_added(alias, info));
    }

    fn on_instrument_removed(&self, alias: &Alias) {
        self.each(|l| l.on_instrument_removed(alias));
    }

    fn on_instrument_not_found(&self, symbol: &str, exchange: &str, instrument_type: &str) {
        self.each(|l| l.on_instrument_not_found(symbol, exchange, instrument_type));
    }

    fn on_instrument_already_subscribed(
        &self,
        symbol: &str,
        exchange: &str,
        instrument_type: &str,
    ) {
        self.each(|l| l.on_instrument_already_subscribed(symbol, exchange, instrument_type));
    }

    fn on_connection_lost(&self) {
        self.each(|l| l.on_connection_lost());
    }

    fn on_connection_restored(&self) {
        self.each(|l| l.on_connection_restored());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards_depth() {
        let (listener, rx) = ChannelListener::unbounded();
        let alias = Alias::new("spot", "BTC-USDT");

        listener.on_depth(&alias, true, 100, 5);

        assert_eq!(
            rx.try_recv().unwrap(),
            MarketDataEvent::Depth {
                alias,
                is_bid: true,
                price: 100,
                size: 5
            }
        );
    }

    #[test]
    fn test_bounded_listener_drops_when_full() {
        let (listener, rx) = ChannelListener::bounded(1);
        listener.on_connection_lost();
        listener.on_connection_restored();

        assert_eq!(rx.try_recv().unwrap(), MarketDataEvent::ConnectionLost);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_listener_set_fans_out() {
        let set = ListenerSet::new();
        let (first, first_rx) = ChannelListener::unbounded();
        let (second, second_rx) = ChannelListener::unbounded();
        set.add(Arc::new(first));
        set.add(Arc::new(second));
        assert_eq!(set.len(), 2);

        let alias = Alias::new("spot", "ETH-USDT");
        set.on_instrument_removed(&alias);

        assert_eq!(
            first_rx.try_recv().unwrap(),
            MarketDataEvent::InstrumentRemoved(alias.clone())
        );
        assert_eq!(
            second_rx.try_recv().unwrap(),
            MarketDataEvent::InstrumentRemoved(alias)
        );
    }

    #[test]
    fn test_instrument_info_granularity() {
        let info = InstrumentInfo {
            symbol: "BTC-USDT".to_string(),
            exchange: "OKEX".to_string(),
            instrument_type: "spot".to_string(),
            display_tick: 5.0,
            size_multiplier: Some(2.0),
            alias: Alias::new("spot", "BTC-USDT"),
        };
        let granularity = info.granularity();
        assert_eq!(granularity.display_tick, 5.0);
        assert_eq!(granularity.size_multiplier, Some(2.0));
    }
}
