//! Shared primitive types used across the transaction manager.

/// Opaque identifier for a transaction, assigned in strictly increasing order.
///
/// Doubles as the transaction's logical timestamp: the total order over
/// `TransactionId` values is also the creation order, which is exactly what
/// the deadlock resolver's wound-wait rule needs (see
/// [`crate::transaction::wait_for`]).
pub type TransactionId = u64;
