//! Multi-granularity two-phase locking transaction manager.
//!
//! ```text
//!                    +----------------------+
//!                    |   GranularityTree    |
//!                    | (resource hierarchy) |
//!                    +----------+-----------+
//!                               |
//!                 +-------------+--------------+
//!                 |         LockManager         |
//!                 |  grant / block / promote /  |
//!                 |  release, one critical      |
//!                 |  region guarding:            |
//!                 |   - tree lock sets           |
//!                 |   - WaitForGraph             |
//!                 |   - ScheduleRecorder         |
//!                 +-------------+--------------+
//!                               |
//!                        +------+------+
//!                        | Transaction |
//!                        |  (id + Arc) |
//!                        +-------------+
//! ```
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`types`] | Lock mode algebra: `LockMode`, `OperationKind`, `Operation`, promotion lattice. |
//! | [`tree`] | `GranularityTree`, the arena-backed resource hierarchy. |
//! | [`wait_for`] | `WaitForGraph`, cycle detection over blocked transactions. |
//! | [`schedule`] | `ScheduleRecorder`, the append-only serialization log. |
//! | [`lock_manager`] | `LockManager`, the grant/block/promote/release engine. |
//! | [`txn`] | `Transaction`, the per-caller handle that drives the manager. |
//! | [`error`] | `TransactionError` and friends. |

pub mod error;
pub mod lock_manager;
pub mod schedule;
pub mod tree;
pub mod txn;
pub mod types;
pub mod wait_for;

pub use error::{TransactionError, TransactionResult};
pub use lock_manager::{LockManager, LockManagerConfig};
pub use schedule::{ScheduleEntry, ScheduleRecorder, TerminalLabel};
pub use tree::{GranularityTree, NodeId};
pub use txn::Transaction;
pub use types::{LockMode, Operation, OperationKind};
pub use wait_for::WaitForGraph;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn end_to_end_scenario_read_then_blocked_write() {
        let mut tree = GranularityTree::new("Database");
        let root = tree.root();
        let area = tree.add_child(root, "Area1");
        let table = tree.add_child(area, "Table1");

        let lm = Arc::new(LockManager::new(tree));
        let t1 = Transaction::new(lm.clone());
        let t2 = Transaction::new(lm.clone());

        t1.create_operation(table, OperationKind::Read).unwrap();
        assert_eq!(t1.lock_at(table), Some(LockMode::RL));

        t2.create_operation(table, OperationKind::Write).unwrap();
        assert!(t2.is_blocked());
        assert_eq!(t2.waiting_for(), Some(table));
    }

    #[test]
    fn end_to_end_scenario_promotion() {
        let mut tree = GranularityTree::new("Database");
        let root = tree.root();
        let area = tree.add_child(root, "Area1");
        let table = tree.add_child(area, "Table1");
        let page1 = tree.add_child(table, "Page1");
        let tuple1 = tree.add_child(page1, "Tuple1");
        let page2 = tree.add_child(table, "Page2");
        let tuple2 = tree.add_child(page2, "Tuple2");

        let lm = Arc::new(LockManager::new(tree));
        let t1 = Transaction::new(lm.clone());
        let t2 = Transaction::new(lm.clone());

        t1.create_operation(table, OperationKind::Read).unwrap();
        t2.create_operation(table, OperationKind::Write).unwrap();
        assert!(t2.is_blocked());

        t1.create_operation(table, OperationKind::Write).unwrap();
        assert_eq!(t1.lock_at(table), Some(LockMode::WL));
        assert_eq!(lm.held_lock(t1.id(), tuple1), Some(LockMode::WL));
        assert_eq!(lm.held_lock(t1.id(), tuple2), Some(LockMode::WL));
        assert!(t2.is_blocked());
    }

    #[test]
    fn end_to_end_scenario_deadlock_aborts_younger() {
        let mut tree = GranularityTree::new("Database");
        let root = tree.root();
        let tuple1 = tree.add_child(root, "Tuple1");
        let tuple2 = tree.add_child(root, "Tuple2");

        let lm = Arc::new(LockManager::new(tree));
        let t1 = Transaction::new(lm.clone());
        let t2 = Transaction::new(lm.clone());

        t1.create_operation(tuple1, OperationKind::Write).unwrap();
        t2.create_operation(tuple2, OperationKind::Write).unwrap();
        t1.create_operation(tuple2, OperationKind::Write).unwrap();
        t2.create_operation(tuple1, OperationKind::Write).unwrap();

        assert!(t2.is_aborted());
        assert_eq!(t1.lock_at(tuple2), Some(LockMode::WL));
    }

    #[test]
    fn end_to_end_scenario_certify_exclusivity_on_commit() {
        let mut tree = GranularityTree::new("Database");
        let root = tree.root();
        let area = tree.add_child(root, "Area1");
        let table = tree.add_child(area, "Table1");
        let page1 = tree.add_child(table, "Page1");
        let tuple1 = tree.add_child(page1, "Tuple1");

        let lm = Arc::new(LockManager::new(tree));
        let t1 = Transaction::new(lm.clone());
        let t2 = Transaction::new(lm.clone());

        t1.create_operation(page1, OperationKind::Read).unwrap();
        t2.create_operation(page1, OperationKind::Write).unwrap();
        assert!(t2.is_blocked());

        t1.commit().unwrap();
        let entries = lm.schedule();
        assert!(matches!(
            entries.last(),
            Some(ScheduleEntry::Terminal(_, TerminalLabel::Committed))
        ));
        assert_eq!(t2.lock_at(page1), Some(LockMode::WL));
        assert_eq!(lm.held_lock(t2.id(), tuple1), Some(LockMode::WL));
    }

    #[test]
    fn end_to_end_scenario_intention_back_propagation() {
        let mut tree = GranularityTree::new("Database");
        let root = tree.root();
        let area = tree.add_child(root, "Area1");
        let table = tree.add_child(area, "Table1");
        let page1 = tree.add_child(table, "Page1");
        let tuple1 = tree.add_child(page1, "Tuple1");

        let lm = Arc::new(LockManager::new(tree));
        let t1 = Transaction::new(lm.clone());

        t1.create_operation(tuple1, OperationKind::Write).unwrap();
        for ancestor in [page1, table, area, root] {
            assert!(lm.holders_at(ancestor, LockMode::IWL).contains(&t1.id()));
        }

        t1.commit().unwrap();
        // Releasing the only descendant grant must drop the intention
        // locks all the way up to the root.
        for ancestor in [page1, table, area, root] {
            assert!(lm.holders_at(ancestor, LockMode::IWL).is_empty());
        }
    }

    #[test]
    fn end_to_end_scenario_illegal_promotion_rejected() {
        let mut tree = GranularityTree::new("Database");
        let root = tree.root();
        let area = tree.add_child(root, "Area1");
        let table = tree.add_child(area, "Table1");
        let page1 = tree.add_child(table, "Page1");

        let lm = Arc::new(LockManager::new(tree));
        let t1 = Transaction::new(lm.clone());

        t1.create_operation(page1, OperationKind::Write).unwrap();
        let err = lm.promote_lock(t1.id(), page1, LockMode::RL).unwrap_err();
        assert!(err.is_lock_error());
        assert_eq!(t1.lock_at(page1), Some(LockMode::WL));
    }
}
