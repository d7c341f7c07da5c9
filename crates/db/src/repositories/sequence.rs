use sqlx::Row;

use plantdesk_core::sequence::format_internal_id;
use plantdesk_core::workflow::EntityKind;

use super::{RepositoryError, SequenceRepository};
use crate::DbPool;

pub struct SqlSequenceRepository {
    pool: DbPool,
}

impl SqlSequenceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SequenceRepository for SqlSequenceRepository {
    async fn next_internal_id(
        &self,
        family: EntityKind,
        year: i32,
    ) -> Result<String, RepositoryError> {
        // The upsert runs as one statement, so concurrent issuers never
        // observe the same counter value.
        let row = sqlx::query(
            "INSERT INTO sequence_counter (family, year, value) VALUES (?, ?, 1)
             ON CONFLICT(family, year) DO UPDATE SET value = value + 1
             RETURNING value",
        )
        .bind(family.as_str())
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        let value: i64 = row.try_get("value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let number = u32::try_from(value)
            .map_err(|_| RepositoryError::Decode(format!("counter overflow: {value}")))?;
        Ok(format_internal_id(number, year))
    }
}

#[cfg(test)]
mod tests {
    use plantdesk_core::workflow::EntityKind;

    use super::SqlSequenceRepository;
    use crate::repositories::SequenceRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn counters_are_per_family_and_per_year() {
        let pool = setup().await;
        let repo = SqlSequenceRepository::new(pool);

        assert_eq!(
            repo.next_internal_id(EntityKind::Deviation, 2026).await.expect("first"),
            "1/26"
        );
        assert_eq!(
            repo.next_internal_id(EntityKind::Deviation, 2026).await.expect("second"),
            "2/26"
        );
        assert_eq!(
            repo.next_internal_id(EntityKind::Overtime, 2026).await.expect("other family"),
            "1/26"
        );
        assert_eq!(
            repo.next_internal_id(EntityKind::Deviation, 2027).await.expect("other year"),
            "1/27"
        );
    }
}
