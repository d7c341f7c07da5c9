use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;

use plantdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use plantdesk_core::workflow::EntityKind;

use super::{AuditEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode(message: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(message.to_string())
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let event_id: String = row.try_get("event_id").map_err(decode)?;
    let entity_kind: Option<String> = row.try_get("entity_kind").map_err(decode)?;
    let entity_id: Option<String> = row.try_get("entity_id").map_err(decode)?;
    let correlation_id: String = row.try_get("correlation_id").map_err(decode)?;
    let event_type: String = row.try_get("event_type").map_err(decode)?;
    let category: String = row.try_get("category").map_err(decode)?;
    let actor: String = row.try_get("actor").map_err(decode)?;
    let outcome: String = row.try_get("outcome").map_err(decode)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(decode)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode)?;

    let entity_kind = entity_kind
        .as_deref()
        .map(|raw| EntityKind::parse(raw).ok_or_else(|| decode(format!("unknown kind `{raw}`"))))
        .transpose()?;
    let category = AuditCategory::parse(&category)
        .ok_or_else(|| decode(format!("unknown category `{category}`")))?;
    let outcome = AuditOutcome::parse(&outcome)
        .ok_or_else(|| decode(format!("unknown outcome `{outcome}`")))?;
    let metadata: BTreeMap<String, String> =
        serde_json::from_str(&metadata_json).map_err(decode)?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(decode)?;

    Ok(AuditEvent {
        event_id,
        entity_kind,
        entity_id,
        correlation_id,
        event_type,
        category,
        actor,
        outcome,
        metadata,
        occurred_at,
    })
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata).map_err(decode)?;

        sqlx::query(
            "INSERT INTO audit_event (event_id, entity_kind, entity_id, correlation_id,
                                      event_type, category, actor, outcome, metadata_json,
                                      occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.entity_kind.map(|kind| kind.as_str()))
        .bind(&event.entity_id)
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(metadata_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_entity(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_id, entity_kind, entity_id, correlation_id, event_type, category,
                    actor, outcome, metadata_json, occurred_at
             FROM audit_event
             WHERE entity_kind = ? AND entity_id = ?
             ORDER BY occurred_at ASC",
        )
        .bind(kind.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use plantdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
    use plantdesk_core::workflow::EntityKind;

    use super::SqlAuditEventRepository;
    use crate::repositories::AuditEventRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn appended_events_come_back_in_occurrence_order() {
        let pool = setup().await;
        let repo = SqlAuditEventRepository::new(pool);

        let first = AuditEvent::new(
            Some(EntityKind::Overtime),
            Some("ot-1".to_owned()),
            "req-1",
            "workflow.transition_applied",
            AuditCategory::Workflow,
            "anna.lis@plant.example",
            AuditOutcome::Success,
        )
        .with_metadata("to", "approved");
        let second = AuditEvent::new(
            Some(EntityKind::Overtime),
            Some("ot-1".to_owned()),
            "req-2",
            "workflow.transition_rejected",
            AuditCategory::Workflow,
            "ewa.nowak@plant.example",
            AuditOutcome::Rejected,
        );

        repo.append(&first).await.expect("append first");
        repo.append(&second).await.expect("append second");

        let events =
            repo.list_for_entity(EntityKind::Overtime, "ot-1").await.expect("list events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], first);
        assert_eq!(events[1], second);

        let none = repo.list_for_entity(EntityKind::Deviation, "ot-1").await.expect("other kind");
        assert!(none.is_empty());
    }
}
