//! Prelude module for convenient imports.
//!
//! ```ignore
//! use granbook::prelude::*;
//! ```

// Core types
pub use granbook_core::{
    Alias, BookError, GranularityMultiplier, InstrumentKind, OrderId, Side, TickOptions,
    TradeSide, display_price, display_size, display_tick_options, native_order_key,
};

// Market data types
pub use granbook_marketdata::{
    BookLevel, ChannelListener, DepthAction, FeedHandler, InstrumentGeneric, InstrumentInfo,
    InstrumentTable, ListenerSet, MarketDataEvent, MarketDataListener, OrderIndexedBook, RawLevel,
    SnapshotReconciler, SubscriptionState, TopOfBook, TradeInfo, TradingExtension,
};

// Client types
pub use granbook_client::{
    CoordinatorBuilder, CoordinatorHandle, FeedTransport, ReconnectConfig, SubscribeRequest,
    SubscriptionCoordinator, SubscriptionError, TransportError,
};
