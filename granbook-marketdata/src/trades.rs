//! Trade print normalization.

use crate::instruments::InstrumentGeneric;
use crate::listener::TradeInfo;
use granbook_core::{GranularityMultiplier, InstrumentKind, TradeSide};

/// Trade print as delivered by the venue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTrade {
    /// Venue price.
    pub price: f64,
    /// Venue quantity.
    pub quantity: f64,
    /// Taker side.
    pub side: TradeSide,
}

/// Trade in display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedTrade {
    /// Display price.
    pub price: i64,
    /// Display size.
    pub size: i64,
    /// Flags.
    pub info: TradeInfo,
}

/// Converts trade prints for one alias.
///
/// The display price rounds toward the resting side that was hit: down when
/// a seller hit the bid, up when a buyer lifted the ask.
#[derive(Debug, Clone, Copy)]
pub struct TradeNormalizer {
    kind: InstrumentKind,
    granularity: GranularityMultiplier,
}

impl TradeNormalizer {
    /// Creates a normalizer.
    #[must_use]
    pub fn new(instrument: &InstrumentGeneric, granularity: GranularityMultiplier) -> Self {
        Self {
            kind: instrument.kind,
            granularity,
        }
    }

    /// Normalizes a print. Returns `None` when the size rounds to zero.
    #[must_use]
    pub fn normalize(&self, trade: RawTrade) -> Option<NormalizedTrade> {
        let resting = trade.side.resting_side();
        let size = self.granularity.display_size(trade.quantity, self.kind);
        if size <= 0 {
            return None;
        }
        Some(NormalizedTrade {
            price: self.granularity.display_price(trade.price, resting),
            size,
            info: TradeInfo {
                is_otc: false,
                is_bid_aggressor: resting.is_bid(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(display_tick: f64) -> TradeNormalizer {
        let instrument = InstrumentGeneric::spot("BTC-USDT", "OKEX", 0.1, 0.01);
        TradeNormalizer::new(&instrument, GranularityMultiplier::new(display_tick))
    }

    #[test]
    fn test_sell_hits_bid_and_floors() {
        let trade = normalizer(1.0)
            .normalize(RawTrade {
                price: 100.7,
                quantity: 0.05,
                side: TradeSide::Sell,
            })
            .unwrap();
        assert_eq!(trade.price, 100);
        assert_eq!(trade.size, 5);
        assert!(trade.info.is_bid_aggressor);
        assert!(!trade.info.is_otc);
    }

    #[test]
    fn test_buy_lifts_ask_and_ceils() {
        let trade = normalizer(1.0)
            .normalize(RawTrade {
                price: 100.2,
                quantity: 0.015,
                side: TradeSide::Buy,
            })
            .unwrap();
        assert_eq!(trade.price, 101);
        assert_eq!(trade.size, 1);
        assert!(!trade.info.is_bid_aggressor);
    }

    #[test]
    fn test_sub_lot_trade_is_dropped() {
        let trade = normalizer(0.1).normalize(RawTrade {
            price: 100.0,
            quantity: 0.004,
            side: TradeSide::Buy,
        });
        assert!(trade.is_none());
    }
}
