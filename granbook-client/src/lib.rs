//! # granbook client
//!
//! Subscription lifecycle for granbook feeds.
//!
//! This crate provides:
//! - A builder wiring the coordinator, its handle and the feed handler
//! - The serialized subscription worker
//! - The transport seam the worker drives
//! - Backoff for resubscribing after a reconnect

pub mod builder;
pub mod coordinator;
pub mod error;
pub mod reconnect;
pub mod transport;

pub use builder::{CoordinatorBuilder, CoordinatorHandle, SubscribeRequest};
pub use coordinator::SubscriptionCoordinator;
pub use error::{SubscriptionError, TransportError};
pub use reconnect::{ReconnectConfig, ResubscribeBackoff};
pub use transport::FeedTransport;
