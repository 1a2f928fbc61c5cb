// Lock manager: grants, blocks, promotes, and releases locks across the
// granularity tree, maintaining the wait-for graph and the schedule.
//
// All mutation of node lock sets, the wait-for graph, and the schedule goes
// through the single `parking_lot::Mutex`-guarded core below; the grant,
// block, cascade, and deadlock-resolution logic all run inside one critical
// region per call, including the wake-up cascade triggered by commit/abort.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::TransactionId;

use super::error::{TransactionError, TransactionResult};
use super::schedule::{ScheduleEntry, ScheduleRecorder, TerminalLabel};
use super::tree::{GranularityTree, NodeId};
use super::types::{LockMode, Operation, OperationKind};
use super::wait_for::WaitForGraph;

/// Tunable knobs for the lock manager. There is deliberately very little to
/// configure: no timeouts and no I/O paths belong to this layer.
#[derive(Debug, Clone)]
pub struct LockManagerConfig {
    /// Initial capacity hint for the live-transaction registry.
    pub expected_transactions: usize,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            expected_transactions: 16,
        }
    }
}

/// Deterministic order in which existing holders are scanned to pick a
/// blocking transaction. `WL, UL, RL, IWL, IUL, IRL` is specified directly;
/// `ICL, CL` are appended since either can legitimately be the sole
/// conflicting holder and the matrix elsewhere treats omissions as bugs,
/// not intent (see SPEC_FULL.md Section 4.1A).
const BLOCKING_SCAN_ORDER: [LockMode; 8] = [
    LockMode::WL,
    LockMode::UL,
    LockMode::RL,
    LockMode::IWL,
    LockMode::IUL,
    LockMode::IRL,
    LockMode::ICL,
    LockMode::CL,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Active,
    Blocked,
    Committed,
    Aborted,
}

impl TxnState {
    fn is_terminal(self) -> bool {
        matches!(self, TxnState::Committed | TxnState::Aborted)
    }
}

/// Internal per-transaction bookkeeping owned by the lock manager.
///
/// `pending` physically holds the transaction's queue of not-yet-executed
/// operations. Conceptually that queue belongs to the `Transaction` handle,
/// but since `Transaction` is a thin `(id, Arc<LockManager>)` handle with no
/// owned mutable state of its own, it is stored here alongside the rest of
/// the per-transaction state the manager already centralizes under its one
/// critical region (see DESIGN.md).
#[derive(Debug)]
struct TxnRecord {
    state: TxnState,
    /// Effective mode held at each node this transaction has a direct
    /// (non-propagated) grant on, keyed by the node the request targeted.
    held: HashMap<NodeId, LockMode>,
    waiting_for: Option<NodeId>,
    pending: VecDeque<Operation>,
}

impl TxnRecord {
    fn new() -> Self {
        Self {
            state: TxnState::Active,
            held: HashMap::new(),
            waiting_for: None,
            pending: VecDeque::new(),
        }
    }
}

/// All mutable state guarded by the manager's single critical region.
struct LockManagerCore {
    tree: GranularityTree,
    wait_for: WaitForGraph,
    schedule: ScheduleRecorder,
    txns: HashMap<TransactionId, TxnRecord>,
}

/// Grants/denies/promotes/releases locks, propagating along the
/// granularity tree and resolving deadlocks by wound-wait.
///
/// `Send + Sync`: every entry point serializes through one
/// `parking_lot::Mutex`, so a single manager may be shared (via `Arc`)
/// across threads even though the protocol itself is cooperative and
/// single-threaded in spirit (see SPEC_FULL.md Section 5).
pub struct LockManager {
    core: Mutex<LockManagerCore>,
    next_txn_id: AtomicU64,
    config: LockManagerConfig,
}

impl LockManager {
    pub fn new(tree: GranularityTree) -> Self {
        Self::with_config(tree, LockManagerConfig::default())
    }

    pub fn with_config(tree: GranularityTree, config: LockManagerConfig) -> Self {
        Self {
            core: Mutex::new(LockManagerCore {
                tree,
                wait_for: WaitForGraph::new(),
                schedule: ScheduleRecorder::new(),
                txns: HashMap::with_capacity(config.expected_transactions),
            }),
            next_txn_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.config
    }

    pub fn root(&self) -> NodeId {
        self.core.lock().tree.root()
    }

    /// Allocates the next transaction id. Ids double as timestamps: the
    /// sequence is strictly increasing, which is what the wound-wait
    /// deadlock resolver needs (see [`crate::common::TransactionId`]).
    pub(super) fn next_transaction_id(&self) -> TransactionId {
        self.next_txn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn register(&self, txn: TransactionId) {
        let mut core = self.core.lock();
        core.txns.insert(txn, TxnRecord::new());
        core.wait_for.add_vertex(txn);
    }

    /// Snapshot of the schedule recorded so far.
    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        self.core.lock().schedule.entries().to_vec()
    }

    fn state_of(core: &LockManagerCore, txn: TransactionId) -> TxnState {
        core.txns.get(&txn).map(|r| r.state).unwrap_or(TxnState::Aborted)
    }

    pub fn is_active(&self, txn: TransactionId) -> bool {
        Self::state_of(&self.core.lock(), txn) == TxnState::Active
    }

    pub fn is_blocked(&self, txn: TransactionId) -> bool {
        Self::state_of(&self.core.lock(), txn) == TxnState::Blocked
    }

    pub fn is_committed(&self, txn: TransactionId) -> bool {
        Self::state_of(&self.core.lock(), txn) == TxnState::Committed
    }

    pub fn is_aborted(&self, txn: TransactionId) -> bool {
        Self::state_of(&self.core.lock(), txn) == TxnState::Aborted
    }

    pub fn held_lock(&self, txn: TransactionId, node: NodeId) -> Option<LockMode> {
        self.core.lock().txns.get(&txn).and_then(|r| r.held.get(&node).copied())
    }

    pub fn waiting_for(&self, txn: TransactionId) -> Option<NodeId> {
        self.core.lock().txns.get(&txn).and_then(|r| r.waiting_for)
    }

    /// Transactions currently holding `mode` at `node`, for inspection by
    /// tests and diagnostic tooling.
    pub fn holders_at(&self, node: NodeId, mode: LockMode) -> Vec<TransactionId> {
        self.core.lock().tree.node(node).holders(mode).to_vec()
    }

    /// Enqueues `op` on `txn`'s pending queue and drives it (and any
    /// transactions it wakes as a side effect) to completion or blockage.
    /// This is the path used by [`super::txn::Transaction::create_operation`].
    pub(super) fn submit_operation(&self, txn: TransactionId, op: Operation) -> TransactionResult<()> {
        let mut core = self.core.lock();
        if Self::state_of(&core, txn).is_terminal() {
            return Err(Self::terminal_error(&core, txn));
        }
        core.txns.get_mut(&txn).expect("registered transaction").pending.push_back(op);

        let mut queue = VecDeque::new();
        queue.push_back(txn);
        Self::drain_queue(&mut core, queue);
        Ok(())
    }

    /// Drains the shared wake-up queue, driving each transaction's pending
    /// queue in turn. Iterative by construction: a cascading chain of
    /// commits/aborts waking further transactions never recurses (see
    /// SPEC_FULL.md Section 9).
    fn drain_queue(core: &mut LockManagerCore, mut queue: VecDeque<TransactionId>) {
        while let Some(txn) = queue.pop_front() {
            Self::drive_locked(core, txn, &mut queue);
        }
    }

    /// Drains `txn`'s own pending queue for as long as its operations keep
    /// granting, stopping at the first block, error, or terminal operation.
    fn drive_locked(core: &mut LockManagerCore, txn: TransactionId, queue: &mut VecDeque<TransactionId>) {
        loop {
            if Self::state_of(core, txn) != TxnState::Active {
                return;
            }
            let op = match core.txns.get(&txn).and_then(|r| r.pending.front().copied()) {
                Some(op) => op,
                None => return,
            };

            if op.kind == OperationKind::Commit {
                core.txns.get_mut(&txn).expect("registered transaction").pending.pop_front();
                let _ = Self::commit_locked(core, txn, queue);
                return;
            }

            let node = op.node.expect("non-commit operations target a node");
            let target_mode = op.kind.requested_mode();
            let already_held = core.txns.get(&txn).and_then(|r| r.held.get(&node).copied());

            let result = match already_held {
                Some(current) if current != target_mode => Self::promote_lock_locked(core, txn, node, target_mode, queue),
                _ => Self::request_lock_locked(core, txn, op, queue),
            };

            match result {
                Ok(true) => {
                    core.txns.get_mut(&txn).expect("registered transaction").pending.pop_front();
                }
                Ok(false) | Err(_) => return,
            }
        }
    }

    /// Requests a lock for `op` on behalf of `txn` directly, bypassing the
    /// pending-queue/drive machinery. Returns `Ok(true)` if granted,
    /// `Ok(false)` if the transaction is now blocked. Intended for direct,
    /// synchronous use (e.g. unit tests exercising the grant matrix); a
    /// transaction blocked this way is not automatically retried by a later
    /// wake-up unless it also has pending operations queued via
    /// [`Self::submit_operation`].
    pub fn request_lock(&self, txn: TransactionId, op: Operation) -> TransactionResult<bool> {
        let mut core = self.core.lock();
        if Self::state_of(&core, txn).is_terminal() {
            return Err(Self::terminal_error(&core, txn));
        }
        let mut queue = VecDeque::new();
        let granted = Self::request_lock_locked(&mut core, txn, op, &mut queue)?;
        Self::drain_queue(&mut core, queue);
        Ok(granted)
    }

    fn request_lock_locked(
        core: &mut LockManagerCore,
        txn: TransactionId,
        op: Operation,
        queue: &mut VecDeque<TransactionId>,
    ) -> TransactionResult<bool> {
        if Self::state_of(core, txn) == TxnState::Blocked {
            return Ok(false);
        }

        let node = op.node.expect("request_lock requires a node-targeted operation");
        let mode = op.kind.requested_mode();

        if core.txns[&txn].held.get(&node) == Some(&mode) {
            return Ok(true);
        }

        match Self::find_blocking_holder(core, txn, node, mode) {
            None => {
                Self::grant(core, txn, node, mode);
                core.schedule.record_operation(txn, op);
                tracing::info!(transaction = txn, mode = %mode, "lock granted");
                Ok(true)
            }
            Some(blocker) => {
                let inserted = core.wait_for.add_edge(txn, blocker, node);
                if !inserted {
                    return Ok(false);
                }
                let rec = core.txns.get_mut(&txn).expect("registered transaction");
                rec.state = TxnState::Blocked;
                rec.waiting_for = Some(node);
                tracing::info!(transaction = txn, blocker, mode = %mode, "transaction blocked");
                Self::resolve_deadlock_if_any(core, txn, blocker, queue);
                Ok(false)
            }
        }
    }

    /// Scans existing holders at `node` (excluding `txn`) for the first one
    /// that conflicts with `mode`, per the compatibility matrix.
    fn find_blocking_holder(
        core: &LockManagerCore,
        txn: TransactionId,
        node: NodeId,
        mode: LockMode,
    ) -> Option<TransactionId> {
        let data = core.tree.node(node);

        // A certify holder blocks every other request outright.
        if let Some(&holder) = data.holders(LockMode::CL).iter().find(|&&t| t != txn) {
            return Some(holder);
        }

        let conflicts: &[LockMode] = match mode {
            LockMode::RL => &[LockMode::WL, LockMode::UL, LockMode::IUL, LockMode::IWL, LockMode::ICL],
            LockMode::WL | LockMode::UL => &[
                LockMode::WL,
                LockMode::UL,
                LockMode::RL,
                LockMode::IWL,
                LockMode::IUL,
                LockMode::IRL,
                LockMode::ICL,
            ],
            LockMode::IRL => &[LockMode::UL],
            LockMode::IWL | LockMode::IUL => &[LockMode::WL, LockMode::UL],
            LockMode::ICL => &[LockMode::WL, LockMode::RL, LockMode::UL],
            LockMode::CL => &[
                LockMode::IRL,
                LockMode::IWL,
                LockMode::IUL,
                LockMode::ICL,
                LockMode::RL,
                LockMode::WL,
                LockMode::UL,
            ],
        };

        let conflicting = conflicts
            .iter()
            .any(|&c| data.holders(c).iter().any(|&t| t != txn));
        if !conflicting {
            return None;
        }

        for &scan_mode in &BLOCKING_SCAN_ORDER {
            if let Some(&holder) = data.holders(scan_mode).iter().find(|&&t| t != txn) {
                return Some(holder);
            }
        }
        None
    }

    /// Grants `mode` to `txn` on `node`: records the effective lock, then
    /// back-propagates intention locks to ancestors and front-propagates
    /// the effective mode to descendants.
    fn grant(core: &mut LockManagerCore, txn: TransactionId, node: NodeId, mode: LockMode) {
        core.tree.node_mut(node).add_holder(mode, txn);
        core.txns.get_mut(&txn).expect("registered transaction").held.insert(node, mode);

        if let Some(intention) = mode.intention() {
            for ancestor in core.tree.ancestors(node) {
                let data = core.tree.node_mut(ancestor);
                data.add_holder(intention, txn);
                data.bump_intention_ref(txn, intention);
            }
        }

        for descendant in core.tree.descendants(node) {
            core.tree.node_mut(descendant).add_holder(mode, txn);
        }
    }

    /// Releases `mode` (or every mode the transaction holds at `node`, if
    /// `mode` is `None`) and reverses propagation.
    pub fn release_lock(&self, txn: TransactionId, node: NodeId, mode: Option<LockMode>) {
        let mut core = self.core.lock();
        Self::release_lock_locked(&mut core, txn, node, mode);
    }

    fn release_lock_locked(core: &mut LockManagerCore, txn: TransactionId, node: NodeId, mode: Option<LockMode>) {
        let actual = match mode.or_else(|| core.txns.get(&txn).and_then(|r| r.held.get(&node).copied())) {
            Some(m) => m,
            None => return,
        };

        core.tree.node_mut(node).remove_holder(actual, txn);
        if let Some(rec) = core.txns.get_mut(&txn) {
            rec.held.remove(&node);
        }

        if let Some(intention) = actual.intention() {
            for ancestor in core.tree.ancestors(node) {
                let data = core.tree.node_mut(ancestor);
                if data.drop_intention_ref(txn, intention) == 0 {
                    data.remove_holder(intention, txn);
                }
            }
        }

        for descendant in core.tree.descendants(node) {
            core.tree.node_mut(descendant).remove_holder(actual, txn);
        }
    }

    /// Releases every lock `txn` holds.
    pub fn release_all(&self, txn: TransactionId) {
        let mut core = self.core.lock();
        Self::release_all_locked(&mut core, txn);
    }

    fn release_all_locked(core: &mut LockManagerCore, txn: TransactionId) {
        let nodes: Vec<NodeId> = core.txns.get(&txn).map(|r| r.held.keys().copied().collect()).unwrap_or_default();
        for node in nodes {
            Self::release_lock_locked(core, txn, node, None);
        }
    }

    /// Promotes `txn`'s lock on `node` to `target`, per the promotion
    /// lattice. Atomic: if the promoted request does not grant immediately,
    /// the original lock is restored before returning.
    pub fn promote_lock(&self, txn: TransactionId, node: NodeId, target: LockMode) -> TransactionResult<bool> {
        let mut core = self.core.lock();
        if Self::state_of(&core, txn).is_terminal() {
            return Err(Self::terminal_error(&core, txn));
        }
        let mut queue = VecDeque::new();
        // Drain unconditionally, even on error: a denied promotion that
        // itself closed a wait-for cycle may have already queued other
        // transactions for wake-up via the nested deadlock resolution.
        let result = Self::promote_lock_locked(&mut core, txn, node, target, &mut queue);
        Self::drain_queue(&mut core, queue);
        result
    }

    fn promote_lock_locked(
        core: &mut LockManagerCore,
        txn: TransactionId,
        node: NodeId,
        target: LockMode,
        queue: &mut VecDeque<TransactionId>,
    ) -> TransactionResult<bool> {
        let current = core
            .txns
            .get(&txn)
            .and_then(|r| r.held.get(&node).copied())
            .ok_or_else(|| TransactionError::no_such_lock(txn))?;

        if current == target {
            return Ok(true);
        }
        if !current.can_promote_to(target) {
            return Err(TransactionError::invalid_promotion(txn, current, target));
        }

        Self::release_lock_locked(core, txn, node, Some(current));

        let kind = OperationKind::kind_for_mode(target).expect("promotion targets are always effective modes");
        let op = Operation::new(kind, node);
        let granted = Self::request_lock_locked(core, txn, op, queue)?;

        if !granted {
            // The nested request may have closed a wait-for cycle and
            // aborted `txn` itself as the deadlock victim. A terminal
            // transaction must not end up holding a lock again, so the
            // restore only applies if `txn` is still live.
            if Self::state_of(core, txn).is_terminal() {
                return Err(Self::terminal_error(core, txn));
            }
            // Restore the original lock; under the single critical region
            // this re-grant cannot itself be denied.
            Self::grant(core, txn, node, current);
        }

        Ok(granted)
    }

    fn resolve_deadlock_if_any(
        core: &mut LockManagerCore,
        waiter: TransactionId,
        holder: TransactionId,
        queue: &mut VecDeque<TransactionId>,
    ) {
        if !core.wait_for.has_cycle() {
            return;
        }
        let victim = waiter.max(holder);
        tracing::warn!(waiter, holder, victim, "deadlock detected, aborting victim");
        Self::abort_locked(core, victim, queue);
    }

    fn terminal_error(core: &LockManagerCore, txn: TransactionId) -> TransactionError {
        match core.txns.get(&txn).map(|r| r.state) {
            Some(TxnState::Committed) => TransactionError::AlreadyCommitted(txn),
            Some(TxnState::Aborted) => TransactionError::AlreadyAborted(txn),
            _ => TransactionError::not_found(txn),
        }
    }

    /// Commits `txn`: releases all locks, records the terminal schedule
    /// entry, and drives any waiters it unblocks.
    pub fn commit(&self, txn: TransactionId) -> TransactionResult<()> {
        let mut core = self.core.lock();
        if Self::state_of(&core, txn).is_terminal() {
            return Err(Self::terminal_error(&core, txn));
        }
        let mut queue = VecDeque::new();
        Self::commit_locked(&mut core, txn, &mut queue)?;
        Self::drain_queue(&mut core, queue);
        Ok(())
    }

    fn commit_locked(core: &mut LockManagerCore, txn: TransactionId, queue: &mut VecDeque<TransactionId>) -> TransactionResult<()> {
        if Self::state_of(core, txn).is_terminal() {
            return Err(Self::terminal_error(core, txn));
        }
        Self::terminate_locked(core, txn, TxnState::Committed, TerminalLabel::Committed, queue);
        Ok(())
    }

    /// Aborts `txn`: releases all locks, records the terminal schedule
    /// entry, and drives any waiters it unblocks.
    pub fn abort(&self, txn: TransactionId) -> TransactionResult<()> {
        let mut core = self.core.lock();
        if Self::state_of(&core, txn).is_terminal() {
            return Err(Self::terminal_error(&core, txn));
        }
        let mut queue = VecDeque::new();
        Self::abort_locked(&mut core, txn, &mut queue);
        Self::drain_queue(&mut core, queue);
        Ok(())
    }

    fn abort_locked(core: &mut LockManagerCore, txn: TransactionId, queue: &mut VecDeque<TransactionId>) {
        if Self::state_of(core, txn).is_terminal() {
            return;
        }
        Self::terminate_locked(core, txn, TxnState::Aborted, TerminalLabel::Aborted, queue);
    }

    fn terminate_locked(
        core: &mut LockManagerCore,
        txn: TransactionId,
        state: TxnState,
        label: TerminalLabel,
        queue: &mut VecDeque<TransactionId>,
    ) {
        Self::release_all_locked(core, txn);
        if let Some(rec) = core.txns.get_mut(&txn) {
            rec.state = state;
            rec.waiting_for = None;
            rec.pending.clear();
        }
        core.schedule.record_terminal(txn, label);
        tracing::info!(transaction = txn, outcome = %label, "transaction terminated");

        for (waiter, _pending_node) in core.wait_for.waiters_of(txn) {
            core.wait_for.remove_edge(waiter, txn);
            if let Some(rec) = core.txns.get_mut(&waiter) {
                if rec.state == TxnState::Blocked {
                    rec.state = TxnState::Active;
                    rec.waiting_for = None;
                    queue.push_back(waiter);
                }
            }
        }
        core.wait_for.remove_vertex(txn);
    }
}
