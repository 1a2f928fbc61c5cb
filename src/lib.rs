// RustyDB - Multi-granularity two-phase locking transaction manager
// Core library module

pub mod common;
pub mod transaction;

pub use transaction::error::{TransactionError, TransactionResult};
pub use transaction::lock_manager::{LockManager, LockManagerConfig};
pub use transaction::schedule::{ScheduleEntry, TerminalLabel};
pub use transaction::tree::{GranularityTree, NodeId};
pub use transaction::txn::Transaction;
pub use transaction::types::{LockMode, Operation, OperationKind};
pub use transaction::wait_for::WaitForGraph;
