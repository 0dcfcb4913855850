//! # granbook Core
//!
//! Core types for reconstructing venue order books at a display granularity.
//!
//! This crate provides:
//! - Side, order identity and alias types shared by every other crate
//! - Instrument size conventions (spot lots vs. contracts)
//! - Tick granularity math converting native prices and quantities to display units
//! - The book error taxonomy

pub mod error;
pub mod granularity;
pub mod types;

pub use error::{BookError, Result};
pub use granularity::{
    GranularityMultiplier, TickOptions, display_price, display_size, display_tick_options,
    native_order_key,
};
pub use types::{Alias, InstrumentKind, OrderId, Side, TradeSide};
