pub mod audit;
pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod outbox;
pub mod policy;
pub mod roles;
pub mod sequence;
pub mod views;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use cache::{CacheInvalidator, NoopCacheInvalidator, RecordingCacheInvalidator};
pub use domain::deviation::{
    ActionStatus, CorrectiveAction, CorrectiveActionId, DecisionVerdict, Deviation, DeviationId,
    DeviationStatus, RoleApproval, RoleDecision,
};
pub use domain::failure::{FailureReport, FailureReportId, FailureSeverity, FailureStatus};
pub use domain::inventory::{Asset, AssetId, AssetStatus};
pub use domain::overtime::{OvertimeOrder, OvertimeOrderId, OvertimeStatus};
pub use domain::{AttachmentRef, Note, Stamp, StampMap};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use identity::{display_name_from_email, Actor};
pub use outbox::{
    DeliveryState, InMemoryOutboxStore, NotificationIntent, OutboxEvent, OutboxEventId,
    OutboxStore, OutboxStoreError,
};
pub use policy::{authorize, policy_for, DenyReason, GuardDecision, OwnershipRule, TransitionPolicy};
pub use roles::Role;
pub use views::{
    AssetSummary, DeviationSummary, FailureSummary, ListFilter, OvertimeSummary, StatusCounts,
    LIST_CAP,
};
pub use workflow::executor::{execute, execute_with_audit, AppliedTransition, WorkflowEntity};
pub use workflow::{
    resolve_target, BulkOutcome, EntityKind, StatusMachine, TransitionKind, TransitionSpec,
};
