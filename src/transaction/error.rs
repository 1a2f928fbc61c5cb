//! Transaction-specific error types.
//!
//! This module provides structured error handling for the transaction
//! subsystem using `thiserror` for ergonomic error definitions.
//!
//! # Error Categories
//!
//! - **Locking errors**: invalid promotions, missing locks
//! - **State errors**: operating on an already-terminal transaction
//! - **Lookup errors**: unknown transactions

use thiserror::Error;

use crate::common::TransactionId;

use super::types::LockMode;

/// Result type alias for transaction operations.
pub type TransactionResult<T> = std::result::Result<T, TransactionError>;

/// Comprehensive error type for transaction operations.
///
/// Each variant captures specific context to aid in debugging
/// and enables appropriate error handling strategies.
#[derive(Debug, Error)]
pub enum TransactionError {
    // =========================================================================
    // Lock-related errors
    // =========================================================================
    /// Requested promotion is not on the promotion lattice.
    #[error("invalid promotion: transaction {txn_id} cannot promote from {from} to {to}")]
    InvalidPromotion {
        txn_id: TransactionId,
        from: LockMode,
        to: LockMode,
    },

    /// Promotion requested for a node the transaction holds no lock on.
    #[error("transaction {txn_id} holds no lock to promote at the requested node")]
    NoSuchLock { txn_id: TransactionId },

    /// An operation kind tag could not be mapped to a known `OperationKind`.
    #[error("invalid operation kind tag: {0}")]
    InvalidOperationKind(u8),

    // =========================================================================
    // Transaction state errors
    // =========================================================================
    /// Transaction not found.
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    /// Transaction already committed.
    #[error("transaction {0} has already been committed")]
    AlreadyCommitted(TransactionId),

    /// Transaction already aborted.
    #[error("transaction {0} has already been aborted")]
    AlreadyAborted(TransactionId),
}

impl TransactionError {
    /// Creates an invalid-promotion error.
    pub fn invalid_promotion(txn_id: TransactionId, from: LockMode, to: LockMode) -> Self {
        TransactionError::InvalidPromotion { txn_id, from, to }
    }

    /// Creates a no-such-lock error.
    pub fn no_such_lock(txn_id: TransactionId) -> Self {
        TransactionError::NoSuchLock { txn_id }
    }

    /// Creates a transaction-not-found error.
    pub fn not_found(txn_id: TransactionId) -> Self {
        TransactionError::TransactionNotFound(txn_id)
    }

    /// Returns true if this is a lock-related error.
    pub fn is_lock_error(&self) -> bool {
        matches!(
            self,
            TransactionError::InvalidPromotion { .. } | TransactionError::NoSuchLock { .. }
        )
    }

    /// Returns true if this error was raised because the transaction had
    /// already reached a terminal state.
    pub fn is_terminal_state_error(&self) -> bool {
        matches!(
            self,
            TransactionError::AlreadyCommitted(_) | TransactionError::AlreadyAborted(_)
        )
    }

    /// Returns the transaction ID if this error is associated with one.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            TransactionError::InvalidPromotion { txn_id, .. } => Some(*txn_id),
            TransactionError::NoSuchLock { txn_id } => Some(*txn_id),
            TransactionError::TransactionNotFound(id) => Some(*id),
            TransactionError::AlreadyCommitted(id) => Some(*id),
            TransactionError::AlreadyAborted(id) => Some(*id),
            TransactionError::InvalidOperationKind(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_promotion_error() {
        let err = TransactionError::invalid_promotion(1, LockMode::WL, LockMode::RL);
        assert!(err.is_lock_error());
        assert_eq!(err.transaction_id(), Some(1));
    }

    #[test]
    fn test_error_display() {
        let err = TransactionError::not_found(42);
        assert_eq!(err.to_string(), "transaction 42 not found");
    }

    #[test]
    fn test_terminal_state_error() {
        let err = TransactionError::AlreadyCommitted(1);
        assert!(err.is_terminal_state_error());
        assert!(!err.is_lock_error());
    }
}
