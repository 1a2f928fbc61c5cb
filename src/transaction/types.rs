// Lock mode algebra: the closed set of lock modes, the operation-to-mode
// mapping, the compatibility matrix, and the promotion lattice.
//
// This module defines the fundamental vocabulary the rest of the
// transaction subsystem is built on. Each type is:
// - Strongly typed (no stringly-typed lock modes)
// - Serializable, so a schedule can be persisted or shipped to a test harness
// - `Copy`, since lock modes and operation kinds are small closed enums
//
// # Example
//
// ```rust
// use rusty_db::transaction::types::{LockMode, OperationKind};
//
// let mode = OperationKind::Write.requested_mode();
// assert_eq!(mode, LockMode::WL);
// assert!(LockMode::RL.can_promote_to(LockMode::WL));
// ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tree::NodeId;

/// The eight lock modes of the multi-granularity locking protocol.
///
/// `IRL`, `IWL`, `IUL`, `ICL` are *intention* modes, held on ancestors of a
/// node to advertise that some descendant holds the corresponding
/// *effective* mode (`RL`, `WL`, `UL`, `CL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Intention read: a descendant holds `RL`.
    IRL,
    /// Intention write: a descendant holds `WL`.
    IWL,
    /// Intention update: a descendant holds `UL`.
    IUL,
    /// Intention certify: a descendant holds `CL`.
    ICL,
    /// Read (shared) lock.
    RL,
    /// Write (exclusive) lock.
    WL,
    /// Update lock: shared-for-read, upgradeable without releasing first.
    UL,
    /// Certify lock: exclusive gate used for commit-time validation.
    CL,
}

impl LockMode {
    /// All eight modes, in the fixed declaration order used for iteration
    /// (node lock-set initialization, display, etc).
    pub const ALL: [LockMode; 8] = [
        LockMode::IRL,
        LockMode::IWL,
        LockMode::IUL,
        LockMode::ICL,
        LockMode::RL,
        LockMode::WL,
        LockMode::UL,
        LockMode::CL,
    ];

    /// True for the four intention modes.
    pub fn is_intention(self) -> bool {
        matches!(self, LockMode::IRL | LockMode::IWL | LockMode::IUL | LockMode::ICL)
    }

    /// The intention mode an ancestor must hold when a descendant holds
    /// `self` as its effective mode. Defined only for effective modes.
    pub fn intention(self) -> Option<LockMode> {
        match self {
            LockMode::RL => Some(LockMode::IRL),
            LockMode::WL => Some(LockMode::IWL),
            LockMode::UL => Some(LockMode::IUL),
            LockMode::CL => Some(LockMode::ICL),
            _ => None,
        }
    }

    /// Returns true if `self` may be promoted in place to `target`,
    /// per the fixed promotion lattice:
    ///
    /// `RL -> {UL, WL}`, `UL -> {WL, CL}`, `WL -> {CL}`,
    /// `IRL -> {RL}`, `IWL -> {WL}`, `IUL -> {UL}`.
    pub fn can_promote_to(self, target: LockMode) -> bool {
        matches!(
            (self, target),
            (LockMode::RL, LockMode::UL)
                | (LockMode::RL, LockMode::WL)
                | (LockMode::UL, LockMode::WL)
                | (LockMode::UL, LockMode::CL)
                | (LockMode::WL, LockMode::CL)
                | (LockMode::IRL, LockMode::RL)
                | (LockMode::IWL, LockMode::WL)
                | (LockMode::IUL, LockMode::UL)
        )
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockMode::IRL => "IRL",
            LockMode::IWL => "IWL",
            LockMode::IUL => "IUL",
            LockMode::ICL => "ICL",
            LockMode::RL => "RL",
            LockMode::WL => "WL",
            LockMode::UL => "UL",
            LockMode::CL => "CL",
        };
        write!(f, "{s}")
    }
}

/// The four operation kinds a transaction can submit against a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Read,
    Update,
    Write,
    Commit,
}

impl OperationKind {
    /// The effective lock mode required by this operation kind.
    ///
    /// `Commit` requests no node lock; callers must not invoke this on a
    /// `Commit` operation (the driver handles `Commit` separately, see
    /// [`crate::transaction::txn`]).
    pub fn requested_mode(self) -> LockMode {
        match self {
            OperationKind::Read => LockMode::RL,
            OperationKind::Update => LockMode::UL,
            OperationKind::Write => LockMode::WL,
            OperationKind::Commit => {
                unreachable!("Commit operations do not request a node lock")
            }
        }
    }

    /// The operation kind whose requested mode is `mode`, used to record a
    /// promotion as a regular schedule entry (see
    /// [`super::schedule::ScheduleEntry`]).
    pub fn kind_for_mode(mode: LockMode) -> Option<OperationKind> {
        match mode {
            LockMode::RL => Some(OperationKind::Read),
            LockMode::UL => Some(OperationKind::Update),
            LockMode::WL => Some(OperationKind::Write),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Read => "READ",
            OperationKind::Update => "UPDATE",
            OperationKind::Write => "WRITE",
            OperationKind::Commit => "COMMIT",
        };
        write!(f, "{s}")
    }
}

/// A single requested unit of work: an operation kind targeting a node.
///
/// `Commit` operations carry no node (there is nothing to lock).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub node: Option<NodeId>,
}

impl Operation {
    pub fn new(kind: OperationKind, node: NodeId) -> Self {
        debug_assert!(kind != OperationKind::Commit, "use Operation::commit() for COMMIT");
        Self {
            kind,
            node: Some(node),
        }
    }

    pub fn commit() -> Self {
        Self {
            kind: OperationKind::Commit,
            node: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_lattice_allows_only_specified_pairs() {
        assert!(LockMode::RL.can_promote_to(LockMode::WL));
        assert!(LockMode::RL.can_promote_to(LockMode::UL));
        assert!(LockMode::UL.can_promote_to(LockMode::WL));
        assert!(LockMode::UL.can_promote_to(LockMode::CL));
        assert!(LockMode::WL.can_promote_to(LockMode::CL));
        assert!(!LockMode::WL.can_promote_to(LockMode::RL));
        assert!(!LockMode::RL.can_promote_to(LockMode::CL));
    }

    #[test]
    fn operation_kind_maps_to_requested_mode() {
        assert_eq!(OperationKind::Read.requested_mode(), LockMode::RL);
        assert_eq!(OperationKind::Update.requested_mode(), LockMode::UL);
        assert_eq!(OperationKind::Write.requested_mode(), LockMode::WL);
    }

    #[test]
    fn kind_for_mode_is_inverse_of_requested_mode_on_effective_modes() {
        for kind in [OperationKind::Read, OperationKind::Update, OperationKind::Write] {
            assert_eq!(OperationKind::kind_for_mode(kind.requested_mode()), Some(kind));
        }
        assert_eq!(OperationKind::kind_for_mode(LockMode::IRL), None);
    }

    #[test]
    fn intention_mapping_covers_effective_modes() {
        assert_eq!(LockMode::RL.intention(), Some(LockMode::IRL));
        assert_eq!(LockMode::WL.intention(), Some(LockMode::IWL));
        assert_eq!(LockMode::UL.intention(), Some(LockMode::IUL));
        assert_eq!(LockMode::CL.intention(), Some(LockMode::ICL));
        assert_eq!(LockMode::IRL.intention(), None);
    }
}
