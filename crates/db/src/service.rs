//! The application surface for workflow actions: load entity, run the
//! shared executor, persist with a version check, then fire the
//! best-effort side effects (audit row, outbox events, cache tags).
//! Business failures come back as typed values; only unexpected faults
//! become persistence errors.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use plantdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use plantdesk_core::cache::CacheInvalidator;
use plantdesk_core::domain::deviation::{
    ActionStatus, CorrectiveAction, CorrectiveActionId, DecisionVerdict, Deviation, DeviationId,
};
use plantdesk_core::domain::failure::{FailureReport, FailureReportId, FailureSeverity};
use plantdesk_core::domain::inventory::{Asset, AssetId};
use plantdesk_core::domain::overtime::{OvertimeOrder, OvertimeOrderId};
use plantdesk_core::domain::Stamp;
use plantdesk_core::errors::{ApplicationError, DomainError};
use plantdesk_core::identity::Actor;
use plantdesk_core::outbox::{NotificationIntent, OutboxEvent, OutboxStore};
use plantdesk_core::policy::DenyReason;
use plantdesk_core::roles::Role;
use plantdesk_core::views::{
    AssetSummary, DeviationSummary, FailureSummary, ListFilter, OvertimeSummary, StatusCounts,
};
use plantdesk_core::workflow::executor::{execute, AppliedTransition};
use plantdesk_core::workflow::{BulkOutcome, EntityKind, StatusMachine, TransitionKind};

use crate::repositories::{
    AssetRepository, AuditEventRepository, DeviationRepository, FailureRepository,
    OvertimeRepository, RepositoryError, SequenceRepository, SqlAssetRepository,
    SqlAuditEventRepository, SqlDeviationRepository, SqlFailureRepository, SqlOutboxRepository,
    SqlOvertimeRepository, SqlSequenceRepository,
};
use crate::DbPool;

/// The `{success: <verb>}` result callers render directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionSuccess {
    pub success: String,
    pub entity_id: String,
    pub internal_id: String,
    pub status: String,
    pub version: i64,
}

#[derive(Clone, Debug)]
pub struct NewDeviation {
    pub title: String,
    pub description: String,
    pub area: Option<String>,
    pub category: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewOvertimeOrder {
    pub work_date: NaiveDate,
    pub hours: Decimal,
    pub headcount: u32,
    pub reason: String,
    pub department: Option<String>,
    pub requires_vacancy_check: bool,
}

#[derive(Clone, Debug)]
pub struct NewAsset {
    pub name: String,
    pub serial_number: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewCorrectiveAction {
    pub title: String,
    pub responsible: String,
    pub due_date: NaiveDate,
}

#[derive(Clone, Debug)]
pub struct NewFailureReport {
    pub machine: String,
    pub description: String,
    pub severity: FailureSeverity,
}

pub struct WorkflowService {
    deviations: Arc<dyn DeviationRepository>,
    overtime: Arc<dyn OvertimeRepository>,
    assets: Arc<dyn AssetRepository>,
    failures: Arc<dyn FailureRepository>,
    sequences: Arc<dyn SequenceRepository>,
    audit: Arc<dyn AuditEventRepository>,
    outbox: Arc<dyn OutboxStore>,
    invalidator: Arc<dyn CacheInvalidator>,
    forecast_window_days: i64,
}

impl WorkflowService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deviations: Arc<dyn DeviationRepository>,
        overtime: Arc<dyn OvertimeRepository>,
        assets: Arc<dyn AssetRepository>,
        failures: Arc<dyn FailureRepository>,
        sequences: Arc<dyn SequenceRepository>,
        audit: Arc<dyn AuditEventRepository>,
        outbox: Arc<dyn OutboxStore>,
        invalidator: Arc<dyn CacheInvalidator>,
        forecast_window_days: i64,
    ) -> Self {
        Self {
            deviations,
            overtime,
            assets,
            failures,
            sequences,
            audit,
            outbox,
            invalidator,
            forecast_window_days,
        }
    }

    /// Wires every repository onto one pool.
    pub fn from_pool(
        pool: DbPool,
        invalidator: Arc<dyn CacheInvalidator>,
        forecast_window_days: i64,
    ) -> Self {
        Self::new(
            Arc::new(SqlDeviationRepository::new(pool.clone())),
            Arc::new(SqlOvertimeRepository::new(pool.clone())),
            Arc::new(SqlAssetRepository::new(pool.clone())),
            Arc::new(SqlFailureRepository::new(pool.clone())),
            Arc::new(SqlSequenceRepository::new(pool.clone())),
            Arc::new(SqlAuditEventRepository::new(pool.clone())),
            Arc::new(SqlOutboxRepository::new(pool)),
            invalidator,
            forecast_window_days,
        )
    }

    // ---- overtime orders ----

    pub async fn create_overtime(
        &self,
        new: NewOvertimeOrder,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OvertimeOrder, ApplicationError> {
        let internal_id = self
            .sequences
            .next_internal_id(EntityKind::Overtime, now.year())
            .await
            .map_err(persistence)?;

        let mut order = OvertimeOrder::new(
            OvertimeOrderId(Uuid::new_v4().to_string()),
            internal_id,
            actor.user_id.clone(),
            new.work_date,
            new.hours,
            new.headcount,
            new.reason,
            now,
            self.forecast_window_days,
        );
        order.department = new.department;
        order.requires_vacancy_check = new.requires_vacancy_check;

        self.overtime.insert(&order).await.map_err(persistence)?;
        self.record_created(EntityKind::Overtime, &order.id.0, &order.internal_id, actor);
        Ok(order)
    }

    pub async fn transition_overtime(
        &self,
        id: &OvertimeOrderId,
        transition: TransitionKind,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut order = self.load_overtime(id).await?;
        let applied = execute(&mut order, transition, actor, now).map_err(ApplicationError::from)?;
        self.overtime
            .update(&order)
            .await
            .map_err(|error| write_error(EntityKind::Overtime, &order.id.0, error))?;
        self.record_applied(EntityKind::Overtime, &order.id.0, &applied, actor, now).await;
        Ok(success(&applied, &order.id.0, &order.internal_id, order.version))
    }

    /// Cancel with an optional reason stored alongside the stamp pair.
    pub async fn cancel_overtime(
        &self,
        id: &OvertimeOrderId,
        reason: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut order = self.load_overtime(id).await?;
        let applied =
            execute(&mut order, TransitionKind::Cancel, actor, now).map_err(ApplicationError::from)?;
        order.cancel_reason = reason;
        self.overtime
            .update(&order)
            .await
            .map_err(|error| write_error(EntityKind::Overtime, &order.id.0, error))?;
        self.record_applied(EntityKind::Overtime, &order.id.0, &applied, actor, now).await;
        Ok(success(&applied, &order.id.0, &order.internal_id, order.version))
    }

    /// HR or plant management confirms staffing cover, unblocking
    /// approval of orders flagged with the vacancy check.
    pub async fn confirm_vacancy(
        &self,
        id: &OvertimeOrderId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        if !actor.has_any_role(&[Role::Admin, Role::PlantManager, Role::Hr]) {
            return Err(DomainError::Unauthorized(DenyReason::NotPermitted {
                transition: TransitionKind::Approve,
                required: vec![Role::Admin, Role::PlantManager, Role::Hr],
            })
            .into());
        }

        let mut order = self.load_overtime(id).await?;
        order.vacancy_confirmed = true;
        order.edited = Some(Stamp::new(actor.user_id.clone(), now));
        order.version += 1;
        self.overtime
            .update(&order)
            .await
            .map_err(|error| write_error(EntityKind::Overtime, &order.id.0, error))?;
        self.invalidator.invalidate(EntityKind::Overtime.cache_tag());

        Ok(ActionSuccess {
            success: "confirm-vacancy".to_owned(),
            entity_id: order.id.0.clone(),
            internal_id: order.internal_id.clone(),
            status: order.status.as_str().to_owned(),
            version: order.version,
        })
    }

    /// Marks a batch of completed orders as accounted. Applies per
    /// item; ineligible or missing items are counted, never mutated.
    pub async fn bulk_mark_accounted(
        &self,
        ids: &[OvertimeOrderId],
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        for id in ids {
            match self.transition_overtime(id, TransitionKind::MarkAccounted, actor, now).await {
                Ok(_) => outcome.record_modified(),
                Err(ApplicationError::Domain(DomainError::VersionConflict { .. })) => {
                    outcome.record_error()
                }
                Err(ApplicationError::Domain(_)) => outcome.record_skipped(),
                Err(error) => {
                    tracing::error!(
                        entity_id = %id.0,
                        error = %error,
                        "bulk mark-accounted item failed"
                    );
                    outcome.record_error();
                }
            }
        }

        outcome
    }

    /// Admin-only bulk removal.
    pub async fn bulk_delete_overtime(
        &self,
        ids: &[OvertimeOrderId],
        actor: &Actor,
    ) -> Result<BulkOutcome, ApplicationError> {
        if !actor.is_admin() {
            return Err(DomainError::Unauthorized(DenyReason::NotPermitted {
                transition: TransitionKind::Delete,
                required: vec![Role::Admin],
            })
            .into());
        }

        let mut outcome = BulkOutcome::default();
        for id in ids {
            match self.overtime.delete(id).await {
                Ok(true) => outcome.record_modified(),
                Ok(false) => outcome.record_skipped(),
                Err(error) => {
                    tracing::error!(entity_id = %id.0, error = %error, "bulk delete item failed");
                    outcome.record_error();
                }
            }
        }
        if outcome.modified > 0 {
            self.invalidator.invalidate(EntityKind::Overtime.cache_tag());
        }
        Ok(outcome)
    }

    pub async fn overtime_summaries(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<OvertimeSummary>, ApplicationError> {
        let orders = self.overtime.list(filter).await.map_err(persistence)?;
        Ok(orders.iter().map(OvertimeSummary::project).collect())
    }

    pub async fn overtime_status_counts(&self) -> Result<StatusCounts, ApplicationError> {
        let orders = self.overtime.list(&ListFilter::default()).await.map_err(persistence)?;
        Ok(StatusCounts::tally(orders.iter().map(|order| order.status.as_str())))
    }

    async fn load_overtime(&self, id: &OvertimeOrderId) -> Result<OvertimeOrder, ApplicationError> {
        self.overtime.find_by_id(id).await.map_err(persistence)?.ok_or_else(|| {
            DomainError::NotFound { kind: EntityKind::Overtime, id: id.0.clone() }.into()
        })
    }

    // ---- deviations ----

    pub async fn create_deviation(
        &self,
        new: NewDeviation,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Deviation, ApplicationError> {
        let internal_id = self
            .sequences
            .next_internal_id(EntityKind::Deviation, now.year())
            .await
            .map_err(persistence)?;

        let mut deviation = Deviation::new(
            DeviationId(Uuid::new_v4().to_string()),
            internal_id,
            new.title,
            new.description,
            actor.user_id.clone(),
            now,
        );
        deviation.area = new.area;
        deviation.category = new.category;

        self.deviations.insert(&deviation).await.map_err(persistence)?;
        self.record_created(EntityKind::Deviation, &deviation.id.0, &deviation.internal_id, actor);
        Ok(deviation)
    }

    pub async fn transition_deviation(
        &self,
        id: &DeviationId,
        transition: TransitionKind,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut deviation = self.load_deviation(id).await?;
        let applied =
            execute(&mut deviation, transition, actor, now).map_err(ApplicationError::from)?;
        self.deviations
            .update(&deviation)
            .await
            .map_err(|error| write_error(EntityKind::Deviation, &deviation.id.0, error))?;
        self.record_applied(EntityKind::Deviation, &deviation.id.0, &applied, actor, now).await;
        Ok(success(&applied, &deviation.id.0, &deviation.internal_id, deviation.version))
    }

    /// Records one role's approve/reject decision, archiving any prior
    /// decision of that role first.
    pub async fn record_deviation_decision(
        &self,
        id: &DeviationId,
        role: Role,
        verdict: DecisionVerdict,
        comment: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut deviation = self.load_deviation(id).await?;
        deviation
            .record_decision(role, verdict, comment, actor, now)
            .map_err(ApplicationError::from)?;
        self.deviations
            .update(&deviation)
            .await
            .map_err(|error| write_error(EntityKind::Deviation, &deviation.id.0, error))?;

        let event = AuditEvent::new(
            Some(EntityKind::Deviation),
            Some(deviation.id.0.clone()),
            Uuid::new_v4().to_string(),
            "deviation.decision_recorded",
            AuditCategory::Decision,
            actor.user_id.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("role", role.as_str())
        .with_metadata(
            "verdict",
            match verdict {
                DecisionVerdict::Approved => "approved",
                DecisionVerdict::Rejected => "rejected",
            },
        );
        self.append_audit(event).await;
        self.invalidator.invalidate(EntityKind::Deviation.cache_tag());

        Ok(ActionSuccess {
            success: "record-decision".to_owned(),
            entity_id: deviation.id.0.clone(),
            internal_id: deviation.internal_id.clone(),
            status: deviation.status.as_str().to_owned(),
            version: deviation.version,
        })
    }

    pub async fn add_deviation_note(
        &self,
        id: &DeviationId,
        text: impl Into<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut deviation = self.load_deviation(id).await?;
        deviation.add_note(text, actor, now);
        self.deviations
            .update(&deviation)
            .await
            .map_err(|error| write_error(EntityKind::Deviation, &deviation.id.0, error))?;
        self.invalidator.invalidate(EntityKind::Deviation.cache_tag());

        Ok(ActionSuccess {
            success: "add-note".to_owned(),
            entity_id: deviation.id.0.clone(),
            internal_id: deviation.internal_id.clone(),
            status: deviation.status.as_str().to_owned(),
            version: deviation.version,
        })
    }

    pub async fn add_corrective_action(
        &self,
        id: &DeviationId,
        new: NewCorrectiveAction,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<CorrectiveActionId, ApplicationError> {
        let mut deviation = self.load_deviation(id).await?;
        let action_id = CorrectiveActionId(Uuid::new_v4().to_string());
        deviation.add_action(
            CorrectiveAction::new(
                action_id.clone(),
                new.title,
                new.responsible,
                new.due_date,
                actor.user_id.clone(),
                now,
            ),
            actor,
            now,
        );
        self.deviations
            .update(&deviation)
            .await
            .map_err(|error| write_error(EntityKind::Deviation, &deviation.id.0, error))?;
        self.invalidator.invalidate(EntityKind::Deviation.cache_tag());
        Ok(action_id)
    }

    pub async fn set_corrective_action_status(
        &self,
        id: &DeviationId,
        action_id: &CorrectiveActionId,
        next: ActionStatus,
        comment: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut deviation = self.load_deviation(id).await?;
        deviation
            .set_action_status(action_id, next, comment, actor, now)
            .map_err(ApplicationError::from)?;
        self.deviations
            .update(&deviation)
            .await
            .map_err(|error| write_error(EntityKind::Deviation, &deviation.id.0, error))?;
        self.invalidator.invalidate(EntityKind::Deviation.cache_tag());

        Ok(ActionSuccess {
            success: "set-action-status".to_owned(),
            entity_id: deviation.id.0.clone(),
            internal_id: deviation.internal_id.clone(),
            status: deviation.status.as_str().to_owned(),
            version: deviation.version,
        })
    }

    pub async fn deviation_summaries(
        &self,
        filter: &ListFilter,
        today: NaiveDate,
    ) -> Result<Vec<DeviationSummary>, ApplicationError> {
        let deviations = self.deviations.list(filter).await.map_err(persistence)?;
        Ok(deviations.iter().map(|deviation| DeviationSummary::project(deviation, today)).collect())
    }

    async fn load_deviation(&self, id: &DeviationId) -> Result<Deviation, ApplicationError> {
        self.deviations.find_by_id(id).await.map_err(persistence)?.ok_or_else(|| {
            DomainError::NotFound { kind: EntityKind::Deviation, id: id.0.clone() }.into()
        })
    }

    // ---- IT inventory ----

    pub async fn create_asset(
        &self,
        new: NewAsset,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Asset, ApplicationError> {
        let internal_id = self
            .sequences
            .next_internal_id(EntityKind::Inventory, now.year())
            .await
            .map_err(persistence)?;

        let mut asset = Asset::new(
            AssetId(Uuid::new_v4().to_string()),
            internal_id,
            new.name,
            actor.user_id.clone(),
            now,
        );
        asset.serial_number = new.serial_number;
        asset.location = new.location;

        self.assets.insert(&asset).await.map_err(persistence)?;
        self.record_created(EntityKind::Inventory, &asset.id.0, &asset.internal_id, actor);
        Ok(asset)
    }

    pub async fn assign_asset(
        &self,
        id: &AssetId,
        assignee: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut asset = self.load_asset(id).await?;
        let applied =
            execute(&mut asset, TransitionKind::Assign, actor, now).map_err(ApplicationError::from)?;
        asset.assigned_to = Some(assignee.to_owned());
        self.assets
            .update(&asset)
            .await
            .map_err(|error| write_error(EntityKind::Inventory, &asset.id.0, error))?;
        self.record_applied(EntityKind::Inventory, &asset.id.0, &applied, actor, now).await;
        Ok(success(&applied, &asset.id.0, &asset.internal_id, asset.version))
    }

    pub async fn transition_asset(
        &self,
        id: &AssetId,
        transition: TransitionKind,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut asset = self.load_asset(id).await?;
        let applied = execute(&mut asset, transition, actor, now).map_err(ApplicationError::from)?;
        self.assets
            .update(&asset)
            .await
            .map_err(|error| write_error(EntityKind::Inventory, &asset.id.0, error))?;
        self.record_applied(EntityKind::Inventory, &asset.id.0, &applied, actor, now).await;
        Ok(success(&applied, &asset.id.0, &asset.internal_id, asset.version))
    }

    pub async fn asset_summaries(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<AssetSummary>, ApplicationError> {
        let assets = self.assets.list(filter).await.map_err(persistence)?;
        Ok(assets.iter().map(AssetSummary::project).collect())
    }

    async fn load_asset(&self, id: &AssetId) -> Result<Asset, ApplicationError> {
        self.assets.find_by_id(id).await.map_err(persistence)?.ok_or_else(|| {
            DomainError::NotFound { kind: EntityKind::Inventory, id: id.0.clone() }.into()
        })
    }

    // ---- failure reports ----

    pub async fn create_failure_report(
        &self,
        new: NewFailureReport,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<FailureReport, ApplicationError> {
        let internal_id = self
            .sequences
            .next_internal_id(EntityKind::Failure, now.year())
            .await
            .map_err(persistence)?;

        let report = FailureReport::new(
            FailureReportId(Uuid::new_v4().to_string()),
            internal_id,
            new.machine,
            new.description,
            new.severity,
            actor.user_id.clone(),
            now,
        );

        self.failures.insert(&report).await.map_err(persistence)?;
        self.record_created(EntityKind::Failure, &report.id.0, &report.internal_id, actor);
        Ok(report)
    }

    pub async fn transition_failure(
        &self,
        id: &FailureReportId,
        transition: TransitionKind,
        comment: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ActionSuccess, ApplicationError> {
        let mut report = self
            .failures
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| DomainError::NotFound {
                kind: EntityKind::Failure,
                id: id.0.clone(),
            })?;

        let applied = execute(&mut report, transition, actor, now).map_err(ApplicationError::from)?;
        if transition == TransitionKind::Resolve {
            report.resolution_comment = comment;
        }
        self.failures
            .update(&report)
            .await
            .map_err(|error| write_error(EntityKind::Failure, &report.id.0, error))?;
        self.record_applied(EntityKind::Failure, &report.id.0, &applied, actor, now).await;
        Ok(success(&applied, &report.id.0, &report.internal_id, report.version))
    }

    pub async fn failure_summaries(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<FailureSummary>, ApplicationError> {
        let reports = self.failures.list(filter).await.map_err(persistence)?;
        Ok(reports.iter().map(FailureSummary::project).collect())
    }

    // ---- side effects ----

    /// Audit row, outbox events, cache tag. All best-effort: a failure
    /// here is logged and never unwinds the committed transition.
    async fn record_applied<S: StatusMachine>(
        &self,
        kind: EntityKind,
        entity_id: &str,
        applied: &AppliedTransition<S>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) {
        let event = AuditEvent::new(
            Some(kind),
            Some(entity_id.to_owned()),
            Uuid::new_v4().to_string(),
            "workflow.transition_applied",
            AuditCategory::Workflow,
            actor.user_id.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("from", applied.from.as_str())
        .with_metadata("to", applied.to.as_str())
        .with_metadata("transition", applied.transition.as_str());
        self.append_audit(event).await;

        for intent in applied.notifications.clone() {
            self.enqueue_notification(kind, entity_id, intent, now).await;
        }

        self.invalidator.invalidate(applied.cache_tag);
    }

    fn record_created(&self, kind: EntityKind, entity_id: &str, internal_id: &str, actor: &Actor) {
        tracing::info!(
            entity_kind = kind.as_str(),
            entity_id,
            internal_id,
            actor = %actor.user_id,
            "entity created"
        );
        self.invalidator.invalidate(kind.cache_tag());
    }

    async fn append_audit(&self, event: AuditEvent) {
        if let Err(error) = self.audit.append(&event).await {
            tracing::warn!(
                event_type = %event.event_type,
                error = %error,
                "audit append failed; transition result unaffected"
            );
        }
    }

    async fn enqueue_notification(
        &self,
        kind: EntityKind,
        entity_id: &str,
        intent: NotificationIntent,
        now: DateTime<Utc>,
    ) {
        let event = OutboxEvent::from_intent(kind, entity_id, intent, now);
        if let Err(error) = self.outbox.append(event).await {
            tracing::warn!(
                entity_id,
                error = %error,
                "outbox append failed; transition result unaffected"
            );
        }
    }
}

fn success<S: StatusMachine>(
    applied: &AppliedTransition<S>,
    entity_id: &str,
    internal_id: &str,
    version: i64,
) -> ActionSuccess {
    ActionSuccess {
        success: applied.transition.as_str().to_owned(),
        entity_id: entity_id.to_owned(),
        internal_id: internal_id.to_owned(),
        status: applied.to.as_str().to_owned(),
        version,
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn write_error(kind: EntityKind, id: &str, error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::Conflict { .. } => {
            DomainError::VersionConflict { kind, id: id.to_owned() }.into()
        }
        RepositoryError::NotFound { .. } => {
            DomainError::NotFound { kind, id: id.to_owned() }.into()
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use plantdesk_core::cache::RecordingCacheInvalidator;
    use plantdesk_core::domain::deviation::DecisionVerdict;
    use plantdesk_core::domain::overtime::{OvertimeOrderId, OvertimeStatus};
    use plantdesk_core::errors::{ApplicationError, DomainError};
    use plantdesk_core::identity::Actor;
    use plantdesk_core::outbox::{DeliveryState, OutboxStore};
    use plantdesk_core::roles::Role;
    use plantdesk_core::workflow::{EntityKind, TransitionKind};

    use crate::repositories::{
        AuditEventRepository, OvertimeRepository, SqlAuditEventRepository, SqlOutboxRepository,
        SqlOvertimeRepository,
    };
    use crate::{connect_with_settings, migrations};

    use super::{NewOvertimeOrder, WorkflowService};

    const CREATED: &str = "2026-03-02T08:00:00Z";

    struct Harness {
        service: WorkflowService,
        outbox: SqlOutboxRepository,
        audit: SqlAuditEventRepository,
        overtime: SqlOvertimeRepository,
        invalidator: Arc<RecordingCacheInvalidator>,
        pool: sqlx::SqlitePool,
    }

    async fn harness() -> Harness {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let invalidator = Arc::new(RecordingCacheInvalidator::default());
        Harness {
            service: WorkflowService::from_pool(pool.clone(), invalidator.clone(), 7),
            outbox: SqlOutboxRepository::new(pool.clone()),
            audit: SqlAuditEventRepository::new(pool.clone()),
            overtime: SqlOvertimeRepository::new(pool.clone()),
            invalidator,
            pool,
        }
    }

    fn requester() -> Actor {
        Actor::new("jan.kowalski@plant.example", [Role::Employee])
    }

    fn plant_manager() -> Actor {
        Actor::new("maria.zajac@plant.example", [Role::PlantManager])
    }

    fn new_order(work_date: NaiveDate) -> NewOvertimeOrder {
        NewOvertimeOrder {
            work_date,
            hours: Decimal::new(40, 1),
            headcount: 3,
            reason: "line 2 changeover backlog".to_owned(),
            department: Some("packaging".to_owned()),
            requires_vacancy_check: false,
        }
    }

    #[tokio::test]
    async fn approving_a_pending_order_persists_stamps_and_enqueues_one_notification() {
        let harness = harness().await;
        let now = CREATED.parse().unwrap();
        let order = harness
            .service
            .create_overtime(
                new_order(NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()),
                &requester(),
                now,
            )
            .await
            .expect("create");
        assert_eq!(order.status, OvertimeStatus::Pending);

        let result = harness
            .service
            .transition_overtime(&order.id, TransitionKind::Approve, &plant_manager(), now)
            .await
            .expect("approve");
        assert_eq!(result.success, "approve");
        assert_eq!(result.status, "approved");

        let stored =
            harness.overtime.find_by_id(&order.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, OvertimeStatus::Approved);
        assert_eq!(
            stored.stamps.get("approved").map(|stamp| stamp.by.as_str()),
            Some("maria.zajac@plant.example")
        );

        let pending = harness.outbox.list_pending(10).await.expect("outbox");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recipient, "jan.kowalski@plant.example");
        assert_eq!(pending[0].event_type, "overtime.approved");
        assert_eq!(pending[0].state, DeliveryState::Pending);

        let audit =
            harness.audit.list_for_entity(EntityKind::Overtime, &order.id.0).await.expect("audit");
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].event_type, "workflow.transition_applied");

        assert!(harness
            .invalidator
            .tags()
            .iter()
            .any(|tag| tag == "overtime-orders"));
    }

    #[tokio::test]
    async fn canceling_a_completed_order_is_rejected_and_changes_nothing() {
        let harness = harness().await;
        let now = CREATED.parse().unwrap();
        let order = harness
            .service
            .create_overtime(
                new_order(NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()),
                &requester(),
                now,
            )
            .await
            .expect("create");
        let manager = plant_manager();
        harness
            .service
            .transition_overtime(&order.id, TransitionKind::Approve, &manager, now)
            .await
            .expect("approve");
        harness
            .service
            .transition_overtime(&order.id, TransitionKind::Complete, &manager, now)
            .await
            .expect("complete");

        let before =
            harness.overtime.find_by_id(&order.id).await.expect("find").expect("exists");
        let error = harness
            .service
            .cancel_overtime(&order.id, Some("not needed".to_owned()), &manager, now)
            .await
            .expect_err("cannot cancel completed order");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::InvalidTransition {
                from: "completed",
                transition: TransitionKind::Cancel,
                ..
            })
        ));

        let after = harness.overtime.find_by_id(&order.id).await.expect("find").expect("exists");
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn far_future_orders_start_as_forecast_without_pending_stamp() {
        let harness = harness().await;
        let now = CREATED.parse().unwrap();
        let order = harness
            .service
            .create_overtime(
                new_order(NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()),
                &requester(),
                now,
            )
            .await
            .expect("create");

        assert_eq!(order.status, OvertimeStatus::Forecast);
        assert!(order.stamps.get("pending").is_none());
        assert_eq!(order.internal_id, "1/26");
    }

    #[tokio::test]
    async fn vacancy_gate_blocks_then_confirmation_unblocks_approval() {
        let harness = harness().await;
        let now = CREATED.parse().unwrap();
        let mut new = new_order(NaiveDate::from_ymd_opt(2026, 3, 6).unwrap());
        new.requires_vacancy_check = true;
        let order = harness.service.create_overtime(new, &requester(), now).await.expect("create");

        let hr = Actor::new("anna.lis@plant.example", [Role::Hr]);
        let error = harness
            .service
            .transition_overtime(&order.id, TransitionKind::Approve, &hr, now)
            .await
            .expect_err("vacancy gate holds");
        assert!(matches!(error, ApplicationError::Domain(DomainError::VacancyRequired)));

        harness.service.confirm_vacancy(&order.id, &hr, now).await.expect("confirm");
        harness
            .service
            .transition_overtime(&order.id, TransitionKind::Approve, &hr, now)
            .await
            .expect("approve after confirmation");
    }

    #[tokio::test]
    async fn bulk_mark_accounted_touches_only_eligible_items() {
        let harness = harness().await;
        let now = CREATED.parse().unwrap();
        let manager = plant_manager();
        let hr = Actor::new("anna.lis@plant.example", [Role::Hr]);

        let completed = harness
            .service
            .create_overtime(
                new_order(NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()),
                &requester(),
                now,
            )
            .await
            .expect("create completed");
        harness
            .service
            .transition_overtime(&completed.id, TransitionKind::Approve, &manager, now)
            .await
            .expect("approve");
        harness
            .service
            .transition_overtime(&completed.id, TransitionKind::Complete, &manager, now)
            .await
            .expect("complete");

        let still_pending = harness
            .service
            .create_overtime(
                new_order(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()),
                &requester(),
                now,
            )
            .await
            .expect("create pending");

        let missing = OvertimeOrderId("no-such-order".to_owned());
        let outcome = harness
            .service
            .bulk_mark_accounted(&[completed.id.clone(), still_pending.id.clone(), missing], &hr, now)
            .await;

        assert_eq!(outcome.modified, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.errors, 0);

        let accounted =
            harness.overtime.find_by_id(&completed.id).await.expect("find").expect("exists");
        assert_eq!(accounted.status, OvertimeStatus::Accounted);
        let untouched =
            harness.overtime.find_by_id(&still_pending.id).await.expect("find").expect("exists");
        assert_eq!(untouched.status, OvertimeStatus::Pending);
    }

    #[tokio::test]
    async fn bulk_delete_requires_admin() {
        let harness = harness().await;
        let now = CREATED.parse().unwrap();
        let order = harness
            .service
            .create_overtime(
                new_order(NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()),
                &requester(),
                now,
            )
            .await
            .expect("create");

        let error = harness
            .service
            .bulk_delete_overtime(&[order.id.clone()], &plant_manager())
            .await
            .expect_err("plant managers cannot bulk delete");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Unauthorized(_))));

        let admin = Actor::new("root@plant.example", [Role::Admin]);
        let outcome = harness
            .service
            .bulk_delete_overtime(&[order.id.clone()], &admin)
            .await
            .expect("admin bulk delete");
        assert_eq!(outcome.modified, 1);
        assert!(harness.overtime.find_by_id(&order.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn deviation_decisions_persist_their_supersede_history() {
        let harness = harness().await;
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 6, 45, 0).unwrap();
        let quality = Actor::new("iza.krol@plant.example", [Role::Quality]);

        let deviation = harness
            .service
            .create_deviation(
                super::NewDeviation {
                    title: "label printer mixes batch codes".to_owned(),
                    description: "wrong batch code on pallet labels".to_owned(),
                    area: Some("packaging".to_owned()),
                    category: None,
                },
                &requester(),
                now,
            )
            .await
            .expect("create");

        harness
            .service
            .record_deviation_decision(
                &deviation.id,
                Role::Quality,
                DecisionVerdict::Approved,
                None,
                &quality,
                now,
            )
            .await
            .expect("first decision");
        harness
            .service
            .record_deviation_decision(
                &deviation.id,
                Role::Quality,
                DecisionVerdict::Rejected,
                Some("scrap count was wrong".to_owned()),
                &quality,
                now,
            )
            .await
            .expect("second decision");

        let stored = crate::repositories::SqlDeviationRepository::new(harness.pool.clone());
        let stored = crate::repositories::DeviationRepository::find_by_id(&stored, &deviation.id)
            .await
            .expect("find")
            .expect("exists");
        let approval = stored.approvals.get(&Role::Quality).expect("quality approval");
        assert_eq!(approval.current.verdict, DecisionVerdict::Rejected);
        assert_eq!(approval.history.len(), 1);
        assert_eq!(approval.history[0].verdict, DecisionVerdict::Approved);

        let summaries = harness
            .service
            .deviation_summaries(
                &Default::default(),
                NaiveDate::from_ymd_opt(2026, 2, 11).unwrap(),
            )
            .await
            .expect("summaries");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].reported_by_name, "Jan Kowalski");
    }
}
