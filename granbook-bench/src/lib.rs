//! # granbook bench
//!
//! Benchmarking utilities for granbook: synthetic feed fixtures and latency
//! collection.

pub mod fixtures;
pub mod latency;
