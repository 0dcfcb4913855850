//! # granbook
//!
//! Order book reconstruction at a display granularity chosen independently of
//! the venue's native tick.
//!
//! A venue feed delivers incremental depth deltas, periodic full refreshes
//! and trade prints in native units. granbook keeps one order-indexed book
//! per subscribed instrument and side, reconciles every message into it and
//! reports net depth changes in integer display ticks and lots. Subscription
//! changes run on a single serialized worker that survives disconnects.
//!
//! ## Quick Start
//!
//! ```ignore
//! use granbook::prelude::*;
//!
//! let (coordinator, handle, feed) = CoordinatorBuilder::new(transport, instruments)
//!     .listener(Arc::new(my_listener))
//!     .build();
//! tokio::spawn(coordinator.run());
//!
//! handle
//!     .subscribe(SubscribeRequest::new("futures", "BTC-USD-190628", "OKEX"))
//!     .await?;
//!
//! // on the network thread
//! feed.on_depth(&alias, DepthAction::Update, &asks, &bids);
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`] - Sides, order identity, aliases, errors and granularity math
//! - [`marketdata`] - Books, reconciliation, trades, recovery and listeners
//! - [`client`] - Subscription coordinator, transport seam and builder

pub mod prelude;

/// Core types and granularity math.
pub mod core {
    pub use granbook_core::*;
}

/// Book reconstruction and feed handling.
pub mod marketdata {
    pub use granbook_marketdata::*;
}

/// Subscription lifecycle.
pub mod client {
    pub use granbook_client::*;
}

pub use granbook_client::{CoordinatorBuilder, CoordinatorHandle, SubscribeRequest};
pub use granbook_core::{Alias, GranularityMultiplier, Side};
pub use granbook_marketdata::{FeedHandler, MarketDataListener};
