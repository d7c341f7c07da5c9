//! The centralized status-transition engine. Each entity family declares
//! its statuses and an explicit transition table; one executor applies a
//! named transition under the shared authorization guard.

pub mod executor;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// The workflow-bearing entity families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Deviation,
    Overtime,
    Inventory,
    Failure,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deviation => "deviation",
            Self::Overtime => "overtime",
            Self::Inventory => "inventory",
            Self::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deviation" => Some(Self::Deviation),
            "overtime" => Some(Self::Overtime),
            "inventory" => Some(Self::Inventory),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }

    /// The cache tag the read layer listens on for this family.
    pub fn cache_tag(self) -> &'static str {
        match self {
            Self::Deviation => "deviations",
            Self::Overtime => "overtime-orders",
            Self::Inventory => "it-inventory",
            Self::Failure => "failure-reports",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every named transition across all entity families. `Delete` never
/// appears in a transition table; it is guarded like a transition but
/// executed as a repository removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    Submit,
    Approve,
    Reject,
    StartWork,
    Close,
    Reactivate,
    Activate,
    Cancel,
    Complete,
    MarkAccounted,
    Assign,
    Return,
    SendRepair,
    Dispose,
    Acknowledge,
    Resolve,
    Reopen,
    Delete,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::StartWork => "start-work",
            Self::Close => "close",
            Self::Reactivate => "reactivate",
            Self::Activate => "activate",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::MarkAccounted => "mark-accounted",
            Self::Assign => "assign",
            Self::Return => "return",
            Self::SendRepair => "send-repair",
            Self::Dispose => "dispose",
            Self::Acknowledge => "acknowledge",
            Self::Resolve => "resolve",
            Self::Reopen => "reopen",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of an entity family's transition table.
#[derive(Clone, Copy, Debug)]
pub struct TransitionSpec<S: 'static> {
    pub transition: TransitionKind,
    pub from: &'static [S],
    pub to: S,
}

/// A status enumeration backed by an explicit transition table.
pub trait StatusMachine: Copy + Eq + std::fmt::Debug + 'static {
    const KIND: EntityKind;

    fn transitions() -> &'static [TransitionSpec<Self>];
    fn is_terminal(self) -> bool;
    fn as_str(self) -> &'static str;
}

/// Resolves the target status for `transition` from `current`, or the
/// invalid-transition error when the table forbids it.
pub fn resolve_target<S: StatusMachine>(
    current: S,
    transition: TransitionKind,
) -> Result<S, DomainError> {
    let spec = S::transitions().iter().find(|spec| spec.transition == transition).ok_or(
        DomainError::InvalidTransition {
            kind: S::KIND,
            from: current.as_str(),
            transition,
        },
    )?;

    if !spec.from.contains(&current) {
        return Err(DomainError::InvalidTransition {
            kind: S::KIND,
            from: current.as_str(),
            transition,
        });
    }

    Ok(spec.to)
}

/// Per-batch accounting for bulk transitions: eligible items are
/// modified, ineligible items are skipped, unexpected faults are
/// counted as errors. Never all-or-nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub modified: u32,
    pub skipped: u32,
    pub errors: u32,
}

impl BulkOutcome {
    pub fn record_modified(&mut self) {
        self.modified += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn total(&self) -> u32 {
        self.modified + self.skipped + self.errors
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::overtime::OvertimeStatus;
    use crate::errors::DomainError;

    use super::{resolve_target, EntityKind, StatusMachine, TransitionKind};

    #[test]
    fn entity_kinds_round_trip_and_carry_cache_tags() {
        for kind in
            [EntityKind::Deviation, EntityKind::Overtime, EntityKind::Inventory, EntityKind::Failure]
        {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
            assert!(!kind.cache_tag().is_empty());
        }
        assert_eq!(EntityKind::Overtime.cache_tag(), "overtime-orders");
    }

    #[test]
    fn resolve_target_follows_the_table() {
        let target = resolve_target(OvertimeStatus::Pending, TransitionKind::Approve)
            .expect("pending -> approved");
        assert_eq!(target, OvertimeStatus::Approved);
    }

    #[test]
    fn resolve_target_rejects_illegal_source_status() {
        let error = resolve_target(OvertimeStatus::Completed, TransitionKind::Cancel)
            .expect_err("completed orders cannot be canceled");
        assert!(matches!(
            error,
            DomainError::InvalidTransition {
                kind: EntityKind::Overtime,
                from: "completed",
                transition: TransitionKind::Cancel,
            }
        ));
    }

    #[test]
    fn resolve_target_rejects_transitions_missing_from_the_table() {
        let error = resolve_target(OvertimeStatus::Pending, TransitionKind::Assign)
            .expect_err("assign is not an overtime transition");
        assert!(matches!(error, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn every_table_row_targets_a_declared_status() {
        for spec in OvertimeStatus::transitions() {
            assert!(!spec.from.is_empty(), "{:?} must have source statuses", spec.transition);
            assert!(
                !spec.from.contains(&spec.to),
                "{:?} must not be a self-loop",
                spec.transition
            );
        }
    }
}
