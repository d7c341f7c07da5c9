use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;

use plantdesk_core::outbox::{
    DeliveryState, OutboxEvent, OutboxEventId, OutboxStore, OutboxStoreError,
};
use plantdesk_core::workflow::EntityKind;

use crate::DbPool;

/// SQL-backed implementation of the core outbox seam. Errors are
/// flattened to strings at this boundary; the dispatcher only needs to
/// know that the store misbehaved, not how.
pub struct SqlOutboxRepository {
    pool: DbPool,
}

impl SqlOutboxRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn store_error(error: impl std::fmt::Display) -> OutboxStoreError {
    OutboxStoreError::Store(error.to_string())
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<OutboxEvent, OutboxStoreError> {
    let id: String = row.try_get("id").map_err(store_error)?;
    let entity_kind: String = row.try_get("entity_kind").map_err(store_error)?;
    let entity_id: String = row.try_get("entity_id").map_err(store_error)?;
    let event_type: String = row.try_get("event_type").map_err(store_error)?;
    let recipient: String = row.try_get("recipient").map_err(store_error)?;
    let subject: String = row.try_get("subject").map_err(store_error)?;
    let template: String = row.try_get("template").map_err(store_error)?;
    let fields_json: String = row.try_get("fields_json").map_err(store_error)?;
    let state: String = row.try_get("state").map_err(store_error)?;
    let attempts: i64 = row.try_get("attempts").map_err(store_error)?;
    let last_error: Option<String> = row.try_get("last_error").map_err(store_error)?;
    let created_at: String = row.try_get("created_at").map_err(store_error)?;
    let delivered_at: Option<String> = row.try_get("delivered_at").map_err(store_error)?;

    let entity_kind = EntityKind::parse(&entity_kind)
        .ok_or_else(|| OutboxStoreError::Store(format!("unknown entity kind `{entity_kind}`")))?;
    let state = DeliveryState::parse(&state)
        .ok_or_else(|| OutboxStoreError::Store(format!("unknown delivery state `{state}`")))?;
    let fields: BTreeMap<String, String> =
        serde_json::from_str(&fields_json).map_err(store_error)?;
    let created_at = parse_timestamp(&created_at)?;
    let delivered_at = delivered_at.as_deref().map(parse_timestamp).transpose()?;

    Ok(OutboxEvent {
        id: OutboxEventId(id),
        entity_kind,
        entity_id,
        event_type,
        recipient,
        subject,
        template,
        fields,
        state,
        attempts: attempts.max(0) as u32,
        last_error,
        created_at,
        delivered_at,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, OutboxStoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| OutboxStoreError::Store(format!("bad timestamp `{raw}`: {error}")))
}

#[async_trait::async_trait]
impl OutboxStore for SqlOutboxRepository {
    async fn append(&self, event: OutboxEvent) -> Result<(), OutboxStoreError> {
        let fields_json = serde_json::to_string(&event.fields).map_err(store_error)?;

        sqlx::query(
            "INSERT INTO outbox_event (id, entity_kind, entity_id, event_type, recipient,
                                       subject, template, fields_json, state, attempts,
                                       last_error, created_at, delivered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(event.entity_kind.as_str())
        .bind(&event.entity_id)
        .bind(&event.event_type)
        .bind(&event.recipient)
        .bind(&event.subject)
        .bind(&event.template)
        .bind(fields_json)
        .bind(event.state.as_str())
        .bind(i64::from(event.attempts))
        .bind(&event.last_error)
        .bind(event.created_at.to_rfc3339())
        .bind(event.delivered_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
        let rows = sqlx::query(
            "SELECT id, entity_kind, entity_id, event_type, recipient, subject, template,
                    fields_json, state, attempts, last_error, created_at, delivered_at
             FROM outbox_event
             WHERE state = 'pending'
             ORDER BY created_at ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(row_to_event).collect()
    }

    async fn update(&self, event: OutboxEvent) -> Result<(), OutboxStoreError> {
        let fields_json = serde_json::to_string(&event.fields).map_err(store_error)?;

        let result = sqlx::query(
            "UPDATE outbox_event
             SET state = ?, attempts = ?, last_error = ?, delivered_at = ?, fields_json = ?
             WHERE id = ?",
        )
        .bind(event.state.as_str())
        .bind(i64::from(event.attempts))
        .bind(&event.last_error)
        .bind(event.delivered_at.map(|at| at.to_rfc3339()))
        .bind(fields_json)
        .bind(&event.id.0)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(OutboxStoreError::Store(format!("unknown outbox event {}", event.id.0)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use plantdesk_core::outbox::{DeliveryState, NotificationIntent, OutboxEvent, OutboxStore};
    use plantdesk_core::workflow::EntityKind;

    use super::SqlOutboxRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_event(entity_id: &str) -> OutboxEvent {
        OutboxEvent::from_intent(
            EntityKind::Overtime,
            entity_id,
            NotificationIntent {
                event_type: "overtime.approved".to_owned(),
                recipient: "jan.kowalski@plant.example".to_owned(),
                subject: "Overtime order 7/26 approved".to_owned(),
                template: "overtime-approved".to_owned(),
                fields: BTreeMap::from([("internal_id".to_owned(), "7/26".to_owned())]),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn append_list_and_update_round_trip() {
        let pool = setup().await;
        let repo = SqlOutboxRepository::new(pool);
        let mut event = sample_event("ot-1");

        repo.append(event.clone()).await.expect("append");

        let pending = repo.list_pending(10).await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], event);

        event.mark_delivered(Utc::now());
        repo.update(event.clone()).await.expect("update");

        assert!(repo.list_pending(10).await.expect("relist").is_empty());
    }

    #[tokio::test]
    async fn failed_attempts_keep_the_event_pending_until_parked() {
        let pool = setup().await;
        let repo = SqlOutboxRepository::new(pool);
        let mut event = sample_event("ot-1");
        repo.append(event.clone()).await.expect("append");

        event.mark_attempt_failed("relay 502", 2);
        repo.update(event.clone()).await.expect("first failure");
        assert_eq!(repo.list_pending(10).await.expect("list").len(), 1);

        event.mark_attempt_failed("relay 502", 2);
        repo.update(event.clone()).await.expect("second failure");
        assert!(repo.list_pending(10).await.expect("relist").is_empty());
        assert_eq!(event.state, DeliveryState::Failed);
    }
}
