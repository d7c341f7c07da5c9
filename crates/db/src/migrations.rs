use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "deviation",
        "overtime_order",
        "it_asset",
        "failure_report",
        "sequence_counter",
        "outbox_event",
        "audit_event",
        "idx_deviation_status",
        "idx_deviation_created_at",
        "idx_deviation_reported_by",
        "idx_overtime_order_status",
        "idx_overtime_order_work_date",
        "idx_overtime_order_requested_by",
        "idx_it_asset_status",
        "idx_failure_report_status",
        "idx_failure_report_created_at",
        "idx_outbox_event_state",
        "idx_outbox_event_entity",
        "idx_audit_event_entity",
        "idx_audit_event_occurred_at",
    ];

    #[tokio::test]
    async fn migrations_create_every_managed_object() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for name in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE name = ? AND type IN ('table', 'index')",
            )
            .bind(name)
            .fetch_one(&pool)
            .await
            .expect("query sqlite_master")
            .get::<i64, _>("count");

            assert_eq!(count, 1, "expected schema object `{name}` to exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
    }
}
