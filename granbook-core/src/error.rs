//! Error types for order book operations.

use crate::types::OrderId;
use thiserror::Error;

/// Contract violations raised by an order-indexed book.
///
/// These never cross the listener boundary: the reconciler treats either
/// variant as fatal for the affected book and forces a full refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BookError {
    /// An add was issued for an order id that is already resting.
    #[error("duplicate order: {id} is already in the book")]
    DuplicateOrder {
        /// Offending order id.
        id: OrderId,
    },

    /// An update or removal was issued for an order id that is not resting.
    #[error("unknown order: {id} is not in the book")]
    UnknownOrder {
        /// Offending order id.
        id: OrderId,
    },
}

/// Result type alias for book operations.
pub type Result<T> = std::result::Result<T, BookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_order_display() {
        let err = BookError::DuplicateOrder { id: OrderId(42) };
        let msg = err.to_string();
        assert!(msg.contains("duplicate order"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_unknown_order_display() {
        let err = BookError::UnknownOrder { id: OrderId(7) };
        assert_eq!(err.to_string(), "unknown order: 7 is not in the book");
    }
}
