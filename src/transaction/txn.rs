//! The `Transaction` handle: a thin, `Clone`-free reference to a
//! transaction's state inside a [`LockManager`].
//!
//! All actual mutable state (lock holdings, pending-operation queue, wait
//! status) lives in the manager's registry; `Transaction` is just `(id,
//! Arc<LockManager>)`, which sidesteps the cyclic
//! transaction-holds-a-reference-to-the-manager-that-holds-the-transaction
//! ownership pattern the original design implies (see DESIGN.md).

use std::sync::Arc;

use crate::common::TransactionId;

use super::error::TransactionResult;
use super::lock_manager::LockManager;
use super::tree::NodeId;
use super::types::{LockMode, Operation, OperationKind};

/// A lightweight handle for submitting operations against a shared
/// [`LockManager`] under one transaction identity.
#[derive(Clone)]
pub struct Transaction {
    id: TransactionId,
    lock_manager: Arc<LockManager>,
}

impl Transaction {
    /// Registers a new transaction with `lock_manager` and returns its
    /// handle. The assigned id doubles as the transaction's timestamp.
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        let id = lock_manager.next_transaction_id();
        lock_manager.register(id);
        Self { id, lock_manager }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Enqueues `Operation(kind, node)` and drives the transaction's
    /// pending queue through the lock manager.
    pub fn create_operation(&self, node: NodeId, kind: OperationKind) -> TransactionResult<()> {
        let op = Operation::new(kind, node);
        self.lock_manager.submit_operation(self.id, op)
    }

    /// Commits the transaction directly, without going through the pending
    /// queue (equivalent to enqueuing a `Commit` operation and driving it).
    pub fn commit(&self) -> TransactionResult<()> {
        self.lock_manager.commit(self.id)
    }

    /// Aborts the transaction directly.
    pub fn abort(&self) -> TransactionResult<()> {
        self.lock_manager.abort(self.id)
    }

    pub fn is_active(&self) -> bool {
        self.lock_manager.is_active(self.id)
    }

    pub fn is_blocked(&self) -> bool {
        self.lock_manager.is_blocked(self.id)
    }

    pub fn is_committed(&self) -> bool {
        self.lock_manager.is_committed(self.id)
    }

    pub fn is_aborted(&self) -> bool {
        self.lock_manager.is_aborted(self.id)
    }

    /// The effective lock mode held at `node`, if any.
    pub fn lock_at(&self, node: NodeId) -> Option<LockMode> {
        self.lock_manager.held_lock(self.id, node)
    }

    /// The node this transaction is currently blocked on, if any.
    pub fn waiting_for(&self) -> Option<NodeId> {
        self.lock_manager.waiting_for(self.id)
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tree::GranularityTree;

    fn lock_manager() -> Arc<LockManager> {
        Arc::new(LockManager::new(GranularityTree::new("Database")))
    }

    #[test]
    fn create_operation_grants_when_uncontended() {
        let lm = lock_manager();
        let root = lm.root();
        let t1 = Transaction::new(lm.clone());
        t1.create_operation(root, OperationKind::Read).unwrap();
        assert_eq!(t1.lock_at(root), Some(LockMode::RL));
        assert!(t1.is_active());
    }

    #[test]
    fn conflicting_operation_blocks_transaction() {
        let lm = lock_manager();
        let root = lm.root();
        let t1 = Transaction::new(lm.clone());
        let t2 = Transaction::new(lm.clone());
        t1.create_operation(root, OperationKind::Write).unwrap();
        t2.create_operation(root, OperationKind::Write).unwrap();
        assert!(t2.is_blocked());
        assert_eq!(t2.waiting_for(), Some(root));
    }

    #[test]
    fn commit_wakes_blocked_transaction() {
        let lm = lock_manager();
        let root = lm.root();
        let t1 = Transaction::new(lm.clone());
        let t2 = Transaction::new(lm.clone());
        t1.create_operation(root, OperationKind::Write).unwrap();
        t2.create_operation(root, OperationKind::Write).unwrap();
        assert!(t2.is_blocked());

        t1.commit().unwrap();
        assert!(t1.is_committed());
        assert!(t2.is_active());
        assert_eq!(t2.lock_at(root), Some(LockMode::WL));
    }

    #[test]
    fn double_commit_is_rejected() {
        let lm = lock_manager();
        let t1 = Transaction::new(lm.clone());
        t1.commit().unwrap();
        let err = t1.commit().unwrap_err();
        assert!(err.is_terminal_state_error());
    }
}
