use chrono::{DateTime, Utc};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::Stamp;
use crate::errors::DomainError;
use crate::identity::Actor;
use crate::outbox::NotificationIntent;
use crate::policy::{authorize, GuardDecision};

use super::{resolve_target, StatusMachine, TransitionKind};

/// What an entity family exposes to the shared executor. Implemented by
/// each workflow-bearing entity; the executor owns the guard order and
/// the stamping discipline so no action re-encodes them.
pub trait WorkflowEntity {
    type Status: StatusMachine;

    fn entity_id(&self) -> &str;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
    /// The creator identity; immutable after creation.
    fn owner(&self) -> &str;
    fn version(&self) -> i64;
    fn bump_version(&mut self);
    fn record_stamp(&mut self, status: Self::Status, stamp: Stamp);
    fn record_edited(&mut self, stamp: Stamp);

    /// Entity-specific preconditions beyond the transition table, e.g.
    /// the vacancy check gating overtime approval.
    fn check_preconditions(&self, _transition: TransitionKind) -> Result<(), DomainError> {
        Ok(())
    }

    /// Notifications to enqueue once the transition has been applied.
    /// Called after the status mutation, so intents see the new state.
    fn notifications(&self, _transition: TransitionKind) -> Vec<NotificationIntent> {
        Vec::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedTransition<S> {
    pub from: S,
    pub to: S,
    pub transition: TransitionKind,
    /// Read-layer tag to invalidate after the write commits.
    pub cache_tag: &'static str,
    pub notifications: Vec<NotificationIntent>,
}

/// Applies one named transition to one entity.
///
/// Order of checks: authorization guard, entity preconditions, legal
/// source-status set. On success the entity carries the new status, the
/// `<status> at/by` stamp pair, a fresh edited stamp and a bumped
/// version; nothing is touched on any failure path.
pub fn execute<E: WorkflowEntity>(
    entity: &mut E,
    transition: TransitionKind,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<AppliedTransition<E::Status>, DomainError> {
    let current = entity.status();

    let decision = authorize(
        E::Status::KIND,
        transition,
        actor,
        entity.owner(),
        current.as_str(),
        current.is_terminal(),
    );
    if let GuardDecision::Deny(reason) = decision {
        return Err(DomainError::Unauthorized(reason));
    }

    entity.check_preconditions(transition)?;

    let target = resolve_target(current, transition)?;

    entity.set_status(target);
    entity.record_stamp(target, Stamp::new(actor.user_id.clone(), now));
    entity.record_edited(Stamp::new(actor.user_id.clone(), now));
    entity.bump_version();

    Ok(AppliedTransition {
        from: current,
        to: target,
        transition,
        cache_tag: E::Status::KIND.cache_tag(),
        notifications: entity.notifications(transition),
    })
}

/// [`execute`] plus an audit event for either outcome.
pub fn execute_with_audit<E, S>(
    entity: &mut E,
    transition: TransitionKind,
    actor: &Actor,
    now: DateTime<Utc>,
    sink: &S,
    audit: &AuditContext,
) -> Result<AppliedTransition<E::Status>, DomainError>
where
    E: WorkflowEntity,
    S: AuditSink,
{
    let result = execute(entity, transition, actor, now);
    match &result {
        Ok(applied) => {
            sink.emit(
                AuditEvent::new(
                    Some(E::Status::KIND),
                    Some(entity.entity_id().to_owned()),
                    audit.correlation_id.clone(),
                    "workflow.transition_applied",
                    AuditCategory::Workflow,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("from", applied.from.as_str())
                .with_metadata("to", applied.to.as_str())
                .with_metadata("transition", applied.transition.as_str()),
            );
        }
        Err(error) => {
            sink.emit(
                AuditEvent::new(
                    Some(E::Status::KIND),
                    Some(entity.entity_id().to_owned()),
                    audit.correlation_id.clone(),
                    "workflow.transition_rejected",
                    AuditCategory::Workflow,
                    audit.actor.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("transition", transition.as_str())
                .with_metadata("error", error.to_string()),
            );
        }
    }
    result
}
