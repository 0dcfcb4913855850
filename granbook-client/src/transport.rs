//! Venue transport seam.
//!
//! The coordinator never touches sockets. It drives a [`FeedTransport`],
//! which owns the session and delivers feed messages to the
//! [`FeedHandler`](granbook_marketdata::FeedHandler) on its own thread.

use crate::error::TransportError;
use granbook_core::Alias;
use std::future::Future;

/// Channel subscription control for one venue session.
///
/// Each call resolves once the venue has accepted or rejected the request.
pub trait FeedTransport: Send + Sync + 'static {
    /// Subscribes to the depth channel of `alias`.
    fn subscribe_depth(&self, alias: &Alias)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribes to the trade channel of `alias`.
    fn subscribe_trades(&self, alias: &Alias)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Unsubscribes from the depth channel of `alias`.
    fn unsubscribe_depth(&self, alias: &Alias)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Unsubscribes from the trade channel of `alias`.
    fn unsubscribe_trades(&self, alias: &Alias)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Asks the venue to send a full depth refresh for `alias`.
    fn request_snapshot(&self, alias: &Alias)
    -> impl Future<Output = Result<(), TransportError>> + Send;
}
