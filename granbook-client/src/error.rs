//! Error types for subscription operations.

use granbook_core::Alias;
use thiserror::Error;

/// Error reported by a feed transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The venue declined the request.
    #[error("rejected by venue: {0}")]
    Rejected(String),

    /// No session is available.
    #[error("not connected")]
    Disconnected,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Error type for subscription operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The instrument type or symbol is not listed.
    #[error("instrument not found: {alias}")]
    InstrumentNotFound {
        /// Requested alias.
        alias: Alias,
    },

    /// The alias is active and replacement was not allowed.
    #[error("already subscribed: {alias}")]
    AlreadySubscribed {
        /// Requested alias.
        alias: Alias,
    },

    /// No usable tick size for the requested granularity.
    #[error("granularity unavailable for {alias}")]
    GranularityUnavailable {
        /// Requested alias.
        alias: Alias,
    },

    /// The transport declined the subscription.
    #[error("subscription to {alias} rejected: {source}")]
    Rejected {
        /// Requested alias.
        alias: Alias,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// The transport or the worker did not answer in time.
    #[error("subscription request for {alias} timed out")]
    Timeout {
        /// Requested alias.
        alias: Alias,
    },

    /// The alias is not subscribed.
    #[error("not subscribed: {alias}")]
    NotSubscribed {
        /// Requested alias.
        alias: Alias,
    },

    /// The coordinator worker has stopped.
    #[error("coordinator stopped")]
    WorkerStopped,
}
