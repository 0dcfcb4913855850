//! Order-indexed book management.
//!
//! Each side of an instrument keeps a map from native order identity to the
//! order's current display price and size. Price level aggregates are derived
//! from the map on demand.

use granbook_core::{BookError, OrderId, Result, Side};
use std::collections::{BTreeMap, HashMap};

/// A resting order at display granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderEntry {
    /// Native order identity.
    pub order_id: OrderId,
    /// Price in display ticks.
    pub price: i64,
    /// Size in display units, always positive.
    pub size: i64,
}

/// Aggregated view of one display price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLevel {
    /// Price in display ticks.
    pub price: i64,
    /// Total size resting at this price.
    pub size: i64,
    /// Number of orders at this price.
    pub order_count: u32,
}

/// Outcome of an in-place order update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderUpdate {
    /// The order before the update.
    pub previous: OrderEntry,
    /// Aggregate size at the order's new price.
    pub aggregate: i64,
    /// Aggregate left at the previous price once the order moved away.
    /// Equal to `aggregate` when the price did not change.
    pub previous_level: i64,
}

impl OrderUpdate {
    /// Returns true if the order changed display price.
    #[must_use]
    pub fn moved(&self, price: i64) -> bool {
        self.previous.price != price
    }
}

/// Outcome of an order removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedOrder {
    /// The removed order.
    pub entry: OrderEntry,
    /// Aggregate at the order's price before removal.
    pub previous_aggregate: i64,
    /// Aggregate left at the order's price, zero when the level emptied.
    pub remaining: i64,
}

/// One side of an instrument's book keyed by order identity.
#[derive(Debug)]
pub struct OrderIndexedBook {
    side: Side,
    orders: HashMap<OrderId, OrderEntry>,
}

impl OrderIndexedBook {
    /// Creates an empty book side.
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            orders: HashMap::new(),
        }
    }

    /// The side this book holds.
    #[inline]
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Returns true if `id` is resting.
    #[inline]
    #[must_use]
    pub fn has_order(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    /// Returns the resting order for `id`.
    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<&OrderEntry> {
        self.orders.get(&id)
    }

    /// Inserts a new order and returns the aggregate size at its price.
    ///
    /// # Errors
    /// Returns [`BookError::DuplicateOrder`] if `id` is already resting.
    pub fn add_order(&mut self, id: OrderId, price: i64, size: i64) -> Result<i64> {
        debug_assert!(size > 0, "resting orders must have positive size");
        if self.orders.contains_key(&id) {
            return Err(BookError::DuplicateOrder { id });
        }
        self.orders.insert(
            id,
            OrderEntry {
                order_id: id,
                price,
                size,
            },
        );
        Ok(self.size_at(price))
    }

    /// Replaces price and size of a resting order.
    ///
    /// # Errors
    /// Returns [`BookError::UnknownOrder`] if `id` is not resting.
    pub fn update_order(&mut self, id: OrderId, price: i64, size: i64) -> Result<OrderUpdate> {
        debug_assert!(size > 0, "resting orders must have positive size");
        let entry = self
            .orders
            .get_mut(&id)
            .ok_or(BookError::UnknownOrder { id })?;
        let previous = *entry;
        entry.price = price;
        entry.size = size;

        let aggregate = self.size_at(price);
        let previous_level = if previous.price == price {
            aggregate
        } else {
            self.size_at(previous.price)
        };

        Ok(OrderUpdate {
            previous,
            aggregate,
            previous_level,
        })
    }

    /// Removes a resting order.
    ///
    /// # Errors
    /// Returns [`BookError::UnknownOrder`] if `id` is not resting.
    pub fn remove_order(&mut self, id: OrderId) -> Result<RemovedOrder> {
        let entry = self
            .orders
            .remove(&id)
            .ok_or(BookError::UnknownOrder { id })?;
        let remaining = self.size_at(entry.price);
        Ok(RemovedOrder {
            entry,
            previous_aggregate: remaining + entry.size,
            remaining,
        })
    }

    /// Total size resting at a display price.
    #[must_use]
    pub fn size_at(&self, price: i64) -> i64 {
        self.orders
            .values()
            .filter(|o| o.price == price)
            .map(|o| o.size)
            .sum()
    }

    /// Best price: highest bid or lowest ask.
    #[must_use]
    pub fn best_price(&self) -> Option<i64> {
        let prices = self.orders.values().map(|o| o.price);
        match self.side {
            Side::Bid => prices.max(),
            Side::Ask => prices.min(),
        }
    }

    /// Worst price: lowest bid or highest ask.
    #[must_use]
    pub fn worst_price(&self) -> Option<i64> {
        let prices = self.orders.values().map(|o| o.price);
        match self.side {
            Side::Bid => prices.min(),
            Side::Ask => prices.max(),
        }
    }

    /// Aggregated levels, best price first.
    #[must_use]
    pub fn levels(&self) -> Vec<BookLevel> {
        let mut by_price: BTreeMap<i64, BookLevel> = BTreeMap::new();
        for order in self.orders.values() {
            let level = by_price.entry(order.price).or_insert(BookLevel {
                price: order.price,
                size: 0,
                order_count: 0,
            });
            level.size += order.size;
            level.order_count += 1;
        }
        match self.side {
            Side::Bid => by_price.into_values().rev().collect(),
            Side::Ask => by_price.into_values().collect(),
        }
    }

    /// Returns the N best levels.
    #[must_use]
    pub fn best_n(&self, n: usize) -> Vec<BookLevel> {
        let mut levels = self.levels();
        levels.truncate(n);
        levels
    }

    /// Resting orders ordered best price first, then by id.
    #[must_use]
    pub fn orders_best_first(&self) -> Vec<OrderEntry> {
        let mut orders: Vec<OrderEntry> = self.orders.values().copied().collect();
        match self.side {
            Side::Bid => orders.sort_by(|a, b| b.price.cmp(&a.price).then(a.order_id.cmp(&b.order_id))),
            Side::Ask => orders.sort_by(|a, b| a.price.cmp(&b.price).then(a.order_id.cmp(&b.order_id))),
        }
        orders
    }

    /// Clears all orders.
    pub fn clear(&mut self) {
        self.orders.clear();
    }

    /// Returns the number of resting orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Returns true if there are no resting orders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Iterates over resting orders in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &OrderEntry> {
        self.orders.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> OrderId {
        OrderId(n)
    }

    #[test]
    fn test_add_order_returns_aggregate() {
        let mut book = OrderIndexedBook::new(Side::Bid);

        assert_eq!(book.add_order(id(1), 100, 5).unwrap(), 5);
        assert_eq!(book.add_order(id(2), 100, 7).unwrap(), 12);
        assert_eq!(book.add_order(id(3), 99, 1).unwrap(), 1);
        assert!(book.has_order(id(2)));
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn test_add_duplicate_fails() {
        let mut book = OrderIndexedBook::new(Side::Ask);
        book.add_order(id(1), 100, 5).unwrap();

        let err = book.add_order(id(1), 101, 3).unwrap_err();
        assert_eq!(err, BookError::DuplicateOrder { id: id(1) });
        assert_eq!(book.get(id(1)).unwrap().price, 100);
    }

    #[test]
    fn test_update_unknown_fails() {
        let mut book = OrderIndexedBook::new(Side::Ask);
        let err = book.update_order(id(9), 100, 5).unwrap_err();
        assert_eq!(err, BookError::UnknownOrder { id: id(9) });
    }

    #[test]
    fn test_update_in_place() {
        let mut book = OrderIndexedBook::new(Side::Bid);
        book.add_order(id(1), 100, 5).unwrap();
        book.add_order(id(2), 100, 3).unwrap();

        let update = book.update_order(id(1), 100, 9).unwrap();
        assert_eq!(update.previous.size, 5);
        assert_eq!(update.aggregate, 12);
        assert_eq!(update.previous_level, 12);
        assert!(!update.moved(100));
    }

    #[test]
    fn test_update_moves_price() {
        let mut book = OrderIndexedBook::new(Side::Bid);
        book.add_order(id(1), 100, 5).unwrap();
        book.add_order(id(2), 100, 3).unwrap();

        let update = book.update_order(id(1), 101, 4).unwrap();
        assert!(update.moved(101));
        assert_eq!(update.aggregate, 4);
        assert_eq!(update.previous_level, 3);
    }

    #[test]
    fn test_remove_order() {
        let mut book = OrderIndexedBook::new(Side::Ask);
        book.add_order(id(1), 100, 5).unwrap();
        book.add_order(id(2), 100, 3).unwrap();

        let removed = book.remove_order(id(1)).unwrap();
        assert_eq!(removed.entry.size, 5);
        assert_eq!(removed.previous_aggregate, 8);
        assert_eq!(removed.remaining, 3);

        let removed = book.remove_order(id(2)).unwrap();
        assert_eq!(removed.remaining, 0);
        assert!(book.is_empty());

        assert_eq!(
            book.remove_order(id(2)).unwrap_err(),
            BookError::UnknownOrder { id: id(2) }
        );
    }

    #[test]
    fn test_best_and_worst_bid() {
        let mut book = OrderIndexedBook::new(Side::Bid);
        assert!(book.best_price().is_none());
        assert!(book.worst_price().is_none());

        book.add_order(id(1), 100, 1).unwrap();
        book.add_order(id(2), 102, 1).unwrap();
        book.add_order(id(3), 98, 1).unwrap();

        assert_eq!(book.best_price(), Some(102));
        assert_eq!(book.worst_price(), Some(98));

        book.remove_order(id(2)).unwrap();
        assert_eq!(book.best_price(), Some(100));
    }

    #[test]
    fn test_best_and_worst_ask() {
        let mut book = OrderIndexedBook::new(Side::Ask);
        book.add_order(id(1), 100, 1).unwrap();
        book.add_order(id(2), 102, 1).unwrap();

        assert_eq!(book.best_price(), Some(100));
        assert_eq!(book.worst_price(), Some(102));
    }

    #[test]
    fn test_levels_are_best_first() {
        let mut book = OrderIndexedBook::new(Side::Bid);
        book.add_order(id(1), 100, 5).unwrap();
        book.add_order(id(2), 101, 2).unwrap();
        book.add_order(id(3), 100, 1).unwrap();

        let levels = book.levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].price, 101);
        assert_eq!(levels[1].price, 100);
        assert_eq!(levels[1].size, 6);
        assert_eq!(levels[1].order_count, 2);

        let best = book.best_n(1);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].price, 101);
    }

    #[test]
    fn test_orders_best_first_ask() {
        let mut book = OrderIndexedBook::new(Side::Ask);
        book.add_order(id(7), 103, 1).unwrap();
        book.add_order(id(5), 101, 1).unwrap();
        book.add_order(id(6), 101, 1).unwrap();

        let ids: Vec<u64> = book.orders_best_first().iter().map(|o| o.order_id.0).collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn test_clear() {
        let mut book = OrderIndexedBook::new(Side::Ask);
        book.add_order(id(1), 100, 1).unwrap();
        book.clear();
        assert!(book.is_empty());
        assert!(book.best_price().is_none());
        assert_eq!(book.side(), Side::Ask);
    }
}
