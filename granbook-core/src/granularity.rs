//! Tick granularity math.
//!
//! Venue prices and quantities arrive as floating point numbers in native
//! units. Books are kept in integer units: order identity in native ticks,
//! display prices in display ticks and sizes in display lots. Every function
//! here is pure.
//!
//! Display prices always round toward the passive side: asks up, bids down.
//! A synthesized level therefore never appears to cross the true market.

use crate::types::{InstrumentKind, Side};

/// Relative tolerance used to absorb binary floating point noise in
/// `price / tick` ratios (`100.3 / 0.1 == 1002.9999999999999`).
const RATIO_EPSILON: f64 = 1e-9;

/// Native tick multiples offered as display tick choices.
const TICK_MULTIPLES: [f64; 9] = [
    1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1_000.0, 5_000.0, 10_000.0,
];

/// Maximum number of decimals inferred from a display tick.
const MAX_PRICE_DECIMALS: usize = 12;

#[inline]
fn snap_ratio(ratio: f64) -> f64 {
    let nearest = ratio.round();
    if (ratio - nearest).abs() <= RATIO_EPSILON * nearest.abs().max(1.0) {
        nearest
    } else {
        ratio
    }
}

/// Stable order identity for a resting level: `round(raw_price / native_tick)`.
#[inline]
#[must_use]
pub fn native_order_key(raw_price: f64, native_tick: f64) -> i64 {
    (raw_price / native_tick).round() as i64
}

/// Display price in display ticks.
///
/// Asks use `ceil(raw_price / display_tick)`, bids use `floor`.
#[inline]
#[must_use]
pub fn display_price(raw_price: f64, display_tick: f64, side: Side) -> i64 {
    let ratio = snap_ratio(raw_price / display_tick);
    match side {
        Side::Ask => ratio.ceil() as i64,
        Side::Bid => ratio.floor() as i64,
    }
}

/// Display size in lots.
///
/// Spot quantities are divided by the lot size and floored. A quantity above
/// one lot never reports zero. Without a positive lot size every quantity
/// reports zero. Contract quantities are integral and pass through.
#[must_use]
pub fn display_size(raw_quantity: f64, kind: InstrumentKind) -> i64 {
    if raw_quantity.is_nan() || raw_quantity <= 0.0 {
        return 0;
    }
    match kind {
        InstrumentKind::Spot { min_size } => {
            if !min_size.is_finite() || min_size <= 0.0 {
                return 0;
            }
            let size = snap_ratio(raw_quantity / min_size).floor() as i64;
            if size == 0 && raw_quantity > min_size {
                1
            } else {
                size
            }
        }
        InstrumentKind::Contract => raw_quantity.trunc() as i64,
    }
}

/// Display granularity requested by a subscriber for one alias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GranularityMultiplier {
    /// Price increment the downstream consumer sees.
    pub display_tick: f64,
    /// Optional quantity rescaling applied before lot conversion.
    pub size_multiplier: Option<f64>,
}

impl GranularityMultiplier {
    /// Creates a multiplier with no quantity rescaling.
    #[must_use]
    pub const fn new(display_tick: f64) -> Self {
        Self {
            display_tick,
            size_multiplier: None,
        }
    }

    /// Sets the quantity multiplier. NaN and non-positive values mean "none".
    #[must_use]
    pub fn with_size_multiplier(mut self, multiplier: f64) -> Self {
        self.size_multiplier = (multiplier.is_finite() && multiplier > 0.0).then_some(multiplier);
        self
    }

    /// Returns true if the display tick can be divided by.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.display_tick.is_finite() && self.display_tick > 0.0
    }

    /// Display price of a raw venue price on the given side.
    #[inline]
    #[must_use]
    pub fn display_price(&self, raw_price: f64, side: Side) -> i64 {
        display_price(raw_price, self.display_tick, side)
    }

    /// Display size of a raw venue quantity.
    #[inline]
    #[must_use]
    pub fn display_size(&self, raw_quantity: f64, kind: InstrumentKind) -> i64 {
        let scaled = match self.size_multiplier {
            Some(multiplier) => raw_quantity * multiplier,
            None => raw_quantity,
        };
        display_size(scaled, kind)
    }

    /// Converts display ticks back to a raw price.
    #[must_use]
    pub fn raw_price(&self, display_ticks: i64) -> f64 {
        display_ticks as f64 * self.display_tick
    }

    /// Renders display ticks as a decimal price with the display tick's precision.
    #[must_use]
    pub fn format_price(&self, display_ticks: i64) -> String {
        let decimals = price_decimals(self.display_tick);
        format!("{:.*}", decimals, self.raw_price(display_ticks))
    }
}

fn price_decimals(tick: f64) -> usize {
    let mut scaled = tick;
    for decimals in 0..MAX_PRICE_DECIMALS {
        if (scaled - scaled.round()).abs() <= RATIO_EPSILON * scaled.abs().max(1.0) {
            return decimals;
        }
        scaled *= 10.0;
    }
    MAX_PRICE_DECIMALS
}

/// Display tick choices for an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOptions {
    /// Preselected display tick (the native tick).
    pub default: f64,
    /// All offered display ticks, finest first.
    pub options: Vec<f64>,
}

/// Offers native tick multiples from 1x up to 10 000x.
#[must_use]
pub fn display_tick_options(native_tick: f64) -> TickOptions {
    TickOptions {
        default: native_tick,
        options: TICK_MULTIPLES.iter().map(|m| m * native_tick).collect(),
    }
}
