use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Stamp, StampMap};
use crate::workflow::executor::WorkflowEntity;
use crate::workflow::{EntityKind, StatusMachine, TransitionKind, TransitionSpec};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureReportId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStatus {
    Open,
    InProgress,
    Resolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureSeverity {
    Low,
    Medium,
    High,
}

const FAILURE_TRANSITIONS: &[TransitionSpec<FailureStatus>] = &[
    TransitionSpec {
        transition: TransitionKind::Acknowledge,
        from: &[FailureStatus::Open],
        to: FailureStatus::InProgress,
    },
    TransitionSpec {
        transition: TransitionKind::Resolve,
        from: &[FailureStatus::Open, FailureStatus::InProgress],
        to: FailureStatus::Resolved,
    },
    TransitionSpec {
        transition: TransitionKind::Reopen,
        from: &[FailureStatus::Resolved],
        to: FailureStatus::Open,
    },
];

impl StatusMachine for FailureStatus {
    const KIND: EntityKind = EntityKind::Failure;

    fn transitions() -> &'static [TransitionSpec<Self>] {
        FAILURE_TRANSITIONS
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::Resolved => "resolved",
        }
    }
}

impl FailureStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in-progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// A line-level failure log entry: short-lived, high-volume, no nested
/// approvals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub id: FailureReportId,
    pub internal_id: String,
    pub machine: String,
    pub description: String,
    pub severity: FailureSeverity,
    pub status: FailureStatus,
    pub reported_by: String,
    #[serde(default)]
    pub resolution_comment: Option<String>,
    #[serde(default)]
    pub stamps: StampMap,
    #[serde(default)]
    pub edited: Option<Stamp>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl FailureReport {
    pub fn new(
        id: FailureReportId,
        internal_id: String,
        machine: impl Into<String>,
        description: impl Into<String>,
        severity: FailureSeverity,
        reported_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            internal_id,
            machine: machine.into(),
            description: description.into(),
            severity,
            status: FailureStatus::Open,
            reported_by: reported_by.into(),
            resolution_comment: None,
            stamps: StampMap::new(),
            edited: None,
            version: 1,
            created_at,
        }
    }
}

impl WorkflowEntity for FailureReport {
    type Status = FailureStatus;

    fn entity_id(&self) -> &str {
        &self.id.0
    }

    fn status(&self) -> FailureStatus {
        self.status
    }

    fn set_status(&mut self, status: FailureStatus) {
        self.status = status;
    }

    fn owner(&self) -> &str {
        &self.reported_by
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    fn record_stamp(&mut self, status: FailureStatus, stamp: Stamp) {
        self.stamps.insert(status.as_str().to_owned(), stamp);
    }

    fn record_edited(&mut self, stamp: Stamp) {
        self.edited = Some(stamp);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::errors::DomainError;
    use crate::identity::Actor;
    use crate::roles::Role;
    use crate::workflow::executor::execute;
    use crate::workflow::TransitionKind;

    use super::{FailureReport, FailureReportId, FailureSeverity, FailureStatus};

    fn report() -> FailureReport {
        FailureReport::new(
            FailureReportId("fl-1".to_owned()),
            "55/26".to_owned(),
            "palletizer L2",
            "gripper jams on layer change",
            FailureSeverity::High,
            "jan.kowalski@plant.example",
            Utc::now(),
        )
    }

    #[test]
    fn reporter_may_resolve_their_own_entry() {
        let mut report = report();
        let reporter = Actor::new("jan.kowalski@plant.example", [Role::Employee]);

        execute(&mut report, TransitionKind::Acknowledge, &reporter, Utc::now())
            .expect("open -> in-progress");
        execute(&mut report, TransitionKind::Resolve, &reporter, Utc::now())
            .expect("in-progress -> resolved");

        assert_eq!(report.status, FailureStatus::Resolved);
        assert!(report.stamps.contains_key("resolved"));
    }

    #[test]
    fn resolved_entries_can_only_be_reopened_by_admin() {
        let mut report = report();
        report.status = FailureStatus::Resolved;

        let leader = Actor::new("tomasz.gajda@plant.example", [Role::GroupLeader]);
        let error = execute(&mut report, TransitionKind::Reopen, &leader, Utc::now())
            .expect_err("resolved is terminal for non-admins");
        assert!(matches!(error, DomainError::Unauthorized(_)));

        let admin = Actor::new("root@plant.example", [Role::Admin]);
        execute(&mut report, TransitionKind::Reopen, &admin, Utc::now())
            .expect("admin reopens");
        assert_eq!(report.status, FailureStatus::Open);
    }

    #[test]
    fn open_entries_cannot_be_reopened() {
        let mut report = report();
        let admin = Actor::new("root@plant.example", [Role::Admin]);

        let error = execute(&mut report, TransitionKind::Reopen, &admin, Utc::now())
            .expect_err("only resolved entries reopen");
        assert!(matches!(error, DomainError::InvalidTransition { from: "open", .. }));
    }
}
