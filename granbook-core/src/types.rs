//! Shared identifiers and enumerations.

use std::fmt;

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Bid (buy) side.
    Bid,
    /// Ask (sell) side.
    Ask,
}

impl Side {
    /// Returns true for the bid side.
    #[inline]
    #[must_use]
    pub const fn is_bid(self) -> bool {
        matches!(self, Self::Bid)
    }

    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }
}

/// Side reported by the venue on a trade print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeSide {
    /// Taker bought, lifting a resting ask.
    Buy,
    /// Taker sold, hitting a resting bid.
    Sell,
}

impl TradeSide {
    /// Parses the venue's `buy`/`sell` strings, case-insensitively.
    #[must_use]
    pub fn from_venue(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("buy") {
            Some(Self::Buy)
        } else if value.eq_ignore_ascii_case("sell") {
            Some(Self::Sell)
        } else {
            None
        }
    }

    /// The resting side that was executed against.
    #[must_use]
    pub const fn resting_side(self) -> Side {
        match self {
            Self::Buy => Side::Ask,
            Self::Sell => Side::Bid,
        }
    }
}

/// Native order identity.
///
/// Derived from the venue price in native ticks, so it stays stable for a
/// resting level even when the display granularity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

impl OrderId {
    /// Builds an id from a native price key.
    ///
    /// The cast is a bit-for-bit reinterpretation, so negative keys stay unique.
    #[inline]
    #[must_use]
    pub const fn from_native_key(key: i64) -> Self {
        Self(key as u64)
    }

    /// Recovers the native price key.
    #[inline]
    #[must_use]
    pub const fn native_key(self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How raw venue quantities map to display units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstrumentKind {
    /// Base-asset quantity traded in lots of `min_size`.
    Spot {
        /// Minimum tradable quantity, used as the lot divisor.
        min_size: f64,
    },
    /// Quantity is already an integral number of contracts.
    Contract,
}

impl InstrumentKind {
    /// Returns the lot divisor for spot instruments.
    #[must_use]
    pub const fn min_size(&self) -> Option<f64> {
        match self {
            Self::Spot { min_size } => Some(*min_size),
            Self::Contract => None,
        }
    }
}

/// Key identifying one instrument subscription, formatted `type@symbol`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Alias(String);

impl Alias {
    /// Builds an alias from an instrument type and venue symbol.
    ///
    /// The type is lower-cased; the symbol is kept verbatim.
    #[must_use]
    pub fn new(instrument_type: &str, symbol: &str) -> Self {
        Self(format!("{}@{}", instrument_type.to_lowercase(), symbol))
    }

    /// Parses an existing alias string.
    ///
    /// Returns `None` unless the string has a non-empty type and symbol
    /// separated by `@`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (instrument_type, symbol) = value.split_once('@')?;
        if instrument_type.is_empty() || symbol.is_empty() {
            return None;
        }
        Some(Self::new(instrument_type, symbol))
    }

    /// The instrument type part.
    #[must_use]
    pub fn instrument_type(&self) -> &str {
        self.0.split_once('@').map_or("", |(t, _)| t)
    }

    /// The venue symbol part.
    #[must_use]
    pub fn symbol(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(_, s)| s)
    }

    /// Returns the alias as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Alias {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
