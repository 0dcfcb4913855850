//! Instrument metadata.
//!
//! The table is populated once, before any subscription is accepted, and is
//! shared read-only afterwards.

use granbook_core::{Alias, GranularityMultiplier, InstrumentKind, TickOptions, display_tick_options};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Venue metadata for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentGeneric {
    /// Venue symbol.
    pub symbol: String,
    /// Exchange name reported to listeners.
    pub exchange: String,
    /// Instrument type (`spot`, `futures`, `swap`, ...), lower case.
    pub instrument_type: String,
    /// Native price increment.
    pub tick_size: f64,
    /// Quantity convention.
    pub kind: InstrumentKind,
}

impl InstrumentGeneric {
    /// Creates a spot instrument traded in lots of `min_size`.
    #[must_use]
    pub fn spot(symbol: &str, exchange: &str, tick_size: f64, min_size: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            instrument_type: "spot".to_string(),
            tick_size,
            kind: InstrumentKind::Spot { min_size },
        }
    }

    /// Creates a contract-denominated instrument of the given type.
    #[must_use]
    pub fn contract(instrument_type: &str, symbol: &str, exchange: &str, tick_size: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            instrument_type: instrument_type.to_lowercase(),
            tick_size,
            kind: InstrumentKind::Contract,
        }
    }

    /// Subscription alias of this instrument.
    #[must_use]
    pub fn alias(&self) -> Alias {
        Alias::new(&self.instrument_type, &self.symbol)
    }

    /// Returns true if the native tick can be divided by.
    #[must_use]
    pub fn has_usable_tick(&self) -> bool {
        self.tick_size.is_finite() && self.tick_size > 0.0
    }

    /// Returns true if quantities can be converted to lots.
    ///
    /// Contract instruments always can; spot instruments need a positive,
    /// finite lot size.
    #[must_use]
    pub fn has_usable_lot(&self) -> bool {
        self.kind
            .min_size()
            .is_none_or(|min_size| min_size.is_finite() && min_size > 0.0)
    }

    /// Granularity used when a subscriber does not ask for one.
    #[must_use]
    pub fn default_granularity(&self) -> GranularityMultiplier {
        GranularityMultiplier::new(self.tick_size)
    }

    /// Display tick choices offered for this instrument.
    #[must_use]
    pub fn tick_options(&self) -> TickOptions {
        display_tick_options(self.tick_size)
    }
}

/// Why an alias could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMiss {
    /// No instrument of this type is known.
    UnknownType,
    /// The type is known but the symbol is not listed under it.
    UnknownSymbol,
}

/// Read-only instrument lookup keyed by alias.
#[derive(Debug, Default)]
pub struct InstrumentTable {
    instruments: HashMap<Alias, Arc<InstrumentGeneric>>,
    types: HashSet<String>,
}

impl InstrumentTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instrument, replacing any previous entry for the same alias.
    pub fn insert(&mut self, instrument: InstrumentGeneric) {
        self.types.insert(instrument.instrument_type.clone());
        self.instruments.insert(instrument.alias(), Arc::new(instrument));
    }

    /// Gets an instrument by alias.
    #[must_use]
    pub fn get(&self, alias: &Alias) -> Option<&Arc<InstrumentGeneric>> {
        self.instruments.get(alias)
    }

    /// Resolves an alias, distinguishing an unknown type from an unknown symbol.
    ///
    /// # Errors
    /// Returns the reason the alias is not listed.
    pub fn resolve(&self, alias: &Alias) -> Result<&Arc<InstrumentGeneric>, LookupMiss> {
        if !self.types.contains(alias.instrument_type()) {
            return Err(LookupMiss::UnknownType);
        }
        self.instruments.get(alias).ok_or(LookupMiss::UnknownSymbol)
    }

    /// Returns true if any instrument of this type is listed.
    #[must_use]
    pub fn has_type(&self, instrument_type: &str) -> bool {
        self.types.contains(instrument_type)
    }

    /// Returns the number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Returns true if there are no instruments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Iterates over all instruments.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<InstrumentGeneric>> {
        self.instruments.values()
    }
}

impl FromIterator<InstrumentGeneric> for InstrumentTable {
    fn from_iter<I: IntoIterator<Item = InstrumentGeneric>>(iter: I) -> Self {
        let mut table = Self::new();
        for instrument in iter {
            table.insert(instrument);
        }
        table
    }
}
