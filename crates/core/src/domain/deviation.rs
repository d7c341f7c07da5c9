use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AttachmentRef, Note, Stamp, StampMap};
use crate::errors::DomainError;
use crate::identity::Actor;
use crate::policy::DenyReason;
use crate::roles::Role;
use crate::workflow::executor::WorkflowEntity;
use crate::workflow::{EntityKind, StatusMachine, TransitionKind, TransitionSpec};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrectiveActionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviationStatus {
    Draft,
    InApproval,
    Approved,
    Rejected,
    InProgress,
    Closed,
}

const DEVIATION_TRANSITIONS: &[TransitionSpec<DeviationStatus>] = &[
    TransitionSpec {
        transition: TransitionKind::Submit,
        from: &[DeviationStatus::Draft],
        to: DeviationStatus::InApproval,
    },
    TransitionSpec {
        transition: TransitionKind::Approve,
        from: &[DeviationStatus::InApproval],
        to: DeviationStatus::Approved,
    },
    TransitionSpec {
        transition: TransitionKind::Reject,
        from: &[DeviationStatus::InApproval],
        to: DeviationStatus::Rejected,
    },
    TransitionSpec {
        transition: TransitionKind::StartWork,
        from: &[DeviationStatus::Approved],
        to: DeviationStatus::InProgress,
    },
    TransitionSpec {
        transition: TransitionKind::Close,
        from: &[DeviationStatus::InProgress],
        to: DeviationStatus::Closed,
    },
    TransitionSpec {
        transition: TransitionKind::Reactivate,
        from: &[DeviationStatus::Rejected],
        to: DeviationStatus::Draft,
    },
];

impl StatusMachine for DeviationStatus {
    const KIND: EntityKind = EntityKind::Deviation;

    fn transitions() -> &'static [TransitionSpec<Self>] {
        DEVIATION_TRANSITIONS
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InApproval => "in-approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InProgress => "in-progress",
            Self::Closed => "closed",
        }
    }
}

impl DeviationStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "in-approval" => Some(Self::InApproval),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "in-progress" => Some(Self::InProgress),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionVerdict {
    Approved,
    Rejected,
}

/// One role's decision on a deviation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDecision {
    pub verdict: DecisionVerdict,
    #[serde(default)]
    pub comment: Option<String>,
    pub decided: Stamp,
}

/// A role holds at most one active decision; every superseded decision
/// is archived to `history`, oldest first, before the overwrite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleApproval {
    pub current: RoleDecision,
    #[serde(default)]
    pub history: Vec<RoleDecision>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    Open,
    InProgress,
    Closed,
    Rejected,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in-progress" => Some(Self::InProgress),
            "closed" => Some(Self::Closed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Rejected)
    }

    pub fn can_change_to(self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::InProgress)
                | (Self::Open, Self::Closed)
                | (Self::Open, Self::Rejected)
                | (Self::InProgress, Self::Closed)
                | (Self::InProgress, Self::Rejected)
        )
    }
}

/// One entry of a corrective action's own history log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionChange {
    pub value: ActionStatus,
    #[serde(default)]
    pub comment: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub changed: Stamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectiveAction {
    pub id: CorrectiveActionId,
    pub title: String,
    pub responsible: String,
    pub due_date: NaiveDate,
    /// Denormalized from the last history entry for fast reads.
    pub status: ActionStatus,
    #[serde(default)]
    pub history: Vec<ActionChange>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl CorrectiveAction {
    pub fn new(
        id: CorrectiveActionId,
        title: impl Into<String>,
        responsible: impl Into<String>,
        due_date: NaiveDate,
        created_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            responsible: responsible.into(),
            due_date,
            status: ActionStatus::Open,
            history: Vec::new(),
            created_by: created_by.into(),
            created_at,
        }
    }

    /// `overdue` is derived, never stored: an action past its due date
    /// displays as overdue until it reaches a terminal status.
    pub fn display_status(&self, today: NaiveDate) -> &'static str {
        if !self.status.is_terminal() && self.due_date < today {
            return "overdue";
        }
        self.status.as_str()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.due_date < today
    }
}

/// A non-conformance record: the status workflow, role-scoped
/// approvals, corrective actions, notes and attachments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deviation {
    pub id: DeviationId,
    pub internal_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub status: DeviationStatus,
    pub reported_by: String,
    #[serde(default)]
    pub approvals: BTreeMap<Role, RoleApproval>,
    #[serde(default)]
    pub actions: Vec<CorrectiveAction>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    #[serde(default)]
    pub stamps: StampMap,
    #[serde(default)]
    pub edited: Option<Stamp>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Elevated roles admitted to corrective-action changes besides the
/// creator, the deviation owner and the assigned responsible.
const ACTION_ELEVATED: &[Role] =
    &[Role::Admin, Role::PlantManager, Role::Quality, Role::ProductionManager];

impl Deviation {
    pub fn new(
        id: DeviationId,
        internal_id: String,
        title: impl Into<String>,
        description: impl Into<String>,
        reported_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            internal_id,
            title: title.into(),
            description: description.into(),
            area: None,
            category: None,
            status: DeviationStatus::Draft,
            reported_by: reported_by.into(),
            approvals: BTreeMap::new(),
            actions: Vec::new(),
            notes: Vec::new(),
            attachments: Vec::new(),
            stamps: StampMap::new(),
            edited: None,
            version: 1,
            created_at,
        }
    }

    pub fn add_note(&mut self, text: impl Into<String>, actor: &Actor, now: DateTime<Utc>) {
        self.notes.push(Note { text: text.into(), added: Stamp::new(actor.user_id.clone(), now) });
        self.touch(actor, now);
    }

    pub fn add_action(&mut self, action: CorrectiveAction, actor: &Actor, now: DateTime<Utc>) {
        self.actions.push(action);
        self.touch(actor, now);
    }

    /// Records one role's approve/reject decision. A prior decision of
    /// the same role is archived to that role's history (oldest first)
    /// before the new decision lands.
    pub fn record_decision(
        &mut self,
        role: Role,
        verdict: DecisionVerdict,
        comment: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !actor.is_admin() {
            if self.status.is_terminal() {
                return Err(DomainError::Unauthorized(DenyReason::TerminalLocked {
                    status: self.status.as_str(),
                }));
            }
            if !actor.has_role(role) {
                return Err(DomainError::Unauthorized(DenyReason::MissingDecisionRole { role }));
            }
        }

        let decision = RoleDecision {
            verdict,
            comment,
            decided: Stamp::new(actor.user_id.clone(), now),
        };

        match self.approvals.get_mut(&role) {
            Some(existing) => {
                let superseded = std::mem::replace(&mut existing.current, decision);
                existing.history.push(superseded);
            }
            None => {
                self.approvals.insert(role, RoleApproval { current: decision, history: Vec::new() });
            }
        }

        self.touch(actor, now);
        Ok(())
    }

    /// Changes one corrective action's status, appending to the
    /// action's own history and denormalizing the new value.
    pub fn set_action_status(
        &mut self,
        action_id: &CorrectiveActionId,
        next: ActionStatus,
        comment: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let owner = self.reported_by.clone();
        let action = self.actions.iter_mut().find(|action| &action.id == action_id).ok_or_else(
            || DomainError::NotFound { kind: EntityKind::Deviation, id: action_id.0.clone() },
        )?;

        let admitted = actor.is_admin()
            || actor.has_any_role(ACTION_ELEVATED)
            || actor.is_same_user(&owner)
            || actor.is_same_user(&action.created_by)
            || actor.is_same_user(&action.responsible);
        if !admitted {
            return Err(DomainError::Unauthorized(DenyReason::NotActionParticipant {
                required: ACTION_ELEVATED.to_vec(),
            }));
        }

        if action.status.is_terminal() && !actor.is_admin() {
            return Err(DomainError::Unauthorized(DenyReason::TerminalLocked {
                status: action.status.as_str(),
            }));
        }

        if !action.status.can_change_to(next) {
            return Err(DomainError::InvalidActionStatusChange {
                from: action.status.as_str(),
                to: next.as_str(),
            });
        }

        action.history.push(ActionChange {
            value: next,
            comment,
            executed_at: now,
            changed: Stamp::new(actor.user_id.clone(), now),
        });
        action.status = next;

        self.touch(actor, now);
        Ok(())
    }

    pub fn open_action_count(&self) -> usize {
        self.actions.iter().filter(|action| !action.status.is_terminal()).count()
    }

    pub fn overdue_action_count(&self, today: NaiveDate) -> usize {
        self.actions.iter().filter(|action| action.is_overdue(today)).count()
    }

    fn touch(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.edited = Some(Stamp::new(actor.user_id.clone(), now));
        self.version += 1;
    }
}

impl WorkflowEntity for Deviation {
    type Status = DeviationStatus;

    fn entity_id(&self) -> &str {
        &self.id.0
    }

    fn status(&self) -> DeviationStatus {
        self.status
    }

    fn set_status(&mut self, status: DeviationStatus) {
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

    fn record_stamp(&mut self, status: DeviationStatus, stamp: Stamp) {
        self.stamps.insert(status.as_str().to_owned(), stamp);
    }

    fn record_edited(&mut self, stamp: Stamp) {
        self.edited = Some(stamp);
    }
}
