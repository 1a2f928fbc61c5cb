//! Schedule recorder: the append-only log of granted operations and
//! terminal events, the only serialization artifact the lock manager
//! exposes for inspection.

use crate::common::TransactionId;

use super::types::Operation;

/// A transaction's terminal outcome, as recorded in the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalLabel {
    Committed,
    Aborted,
}

impl std::fmt::Display for TerminalLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalLabel::Committed => write!(f, "Committed"),
            TerminalLabel::Aborted => write!(f, "Aborted"),
        }
    }
}

/// One entry in the schedule: either a granted operation or a terminal
/// event for a transaction.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleEntry {
    Operation(TransactionId, Operation),
    Terminal(TransactionId, TerminalLabel),
}

/// Append-only recorder of schedule entries.
#[derive(Debug, Default)]
pub struct ScheduleRecorder {
    entries: Vec<ScheduleEntry>,
}

impl ScheduleRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&mut self, txn: TransactionId, op: Operation) {
        tracing::debug!(transaction = txn, kind = %op.kind, "schedule: operation granted");
        self.entries.push(ScheduleEntry::Operation(txn, op));
    }

    pub fn record_terminal(&mut self, txn: TransactionId, label: TerminalLabel) {
        tracing::debug!(transaction = txn, outcome = %label, "schedule: terminal event");
        self.entries.push(ScheduleEntry::Terminal(txn, label));
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }
}
