use sqlx::{QueryBuilder, Row};

use plantdesk_core::domain::overtime::{OvertimeOrder, OvertimeOrderId};
use plantdesk_core::views::ListFilter;
use plantdesk_core::workflow::StatusMachine;

use super::{OvertimeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOvertimeRepository {
    pool: DbPool,
}

impl SqlOvertimeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_doc(doc: &str) -> Result<OvertimeOrder, RepositoryError> {
    serde_json::from_str(doc).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn encode_doc(order: &OvertimeOrder) -> Result<String, RepositoryError> {
    serde_json::to_string(order).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn updated_at(order: &OvertimeOrder) -> String {
    order.edited.as_ref().map(|stamp| stamp.at).unwrap_or(order.created_at).to_rfc3339()
}

#[async_trait::async_trait]
impl OvertimeRepository for SqlOvertimeRepository {
    async fn find_by_id(
        &self,
        id: &OvertimeOrderId,
    ) -> Result<Option<OvertimeOrder>, RepositoryError> {
        let row = sqlx::query("SELECT doc FROM overtime_order WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let doc: String =
                    row.try_get("doc").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(decode_doc(&doc)?))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, order: &OvertimeOrder) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO overtime_order (id, internal_id, status, requested_by, work_date,
                                         version, created_at, updated_at, doc)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.internal_id)
        .bind(order.status.as_str())
        .bind(&order.requested_by)
        .bind(order.work_date.to_string())
        .bind(order.version)
        .bind(order.created_at.to_rfc3339())
        .bind(updated_at(order))
        .bind(encode_doc(order)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, order: &OvertimeOrder) -> Result<(), RepositoryError> {
        let expected_version = order.version - 1;
        let result = sqlx::query(
            "UPDATE overtime_order
             SET internal_id = ?, status = ?, requested_by = ?, work_date = ?,
                 version = ?, updated_at = ?, doc = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&order.internal_id)
        .bind(order.status.as_str())
        .bind(&order.requested_by)
        .bind(order.work_date.to_string())
        .bind(order.version)
        .bind(updated_at(order))
        .bind(encode_doc(order)?)
        .bind(&order.id.0)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM overtime_order WHERE id = ?")
                .bind(&order.id.0)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Err(if exists {
                RepositoryError::Conflict { id: order.id.0.clone() }
            } else {
                RepositoryError::NotFound { id: order.id.0.clone() }
            });
        }

        Ok(())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<OvertimeOrder>, RepositoryError> {
        let mut query = QueryBuilder::new("SELECT doc FROM overtime_order WHERE 1 = 1");

        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut statuses = query.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(status.clone());
            }
            statuses.push_unseparated(")");
        }
        if let Some(owner) = &filter.owner {
            query.push(" AND requested_by = ");
            query.push_bind(owner.clone());
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            query.push(" AND (internal_id LIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR doc LIKE ");
            query.push_bind(pattern);
            query.push(")");
        }
        if let Some(from) = filter.created_from {
            query.push(" AND created_at >= ");
            query.push_bind(from.to_rfc3339());
        }
        if let Some(to) = filter.created_to {
            query.push(" AND created_at <= ");
            query.push_bind(to.to_rfc3339());
        }
        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(i64::from(filter.effective_limit()));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let doc: String =
                    row.try_get("doc").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                decode_doc(&doc)
            })
            .collect()
    }

    async fn delete(&self, id: &OvertimeOrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM overtime_order WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use plantdesk_core::domain::overtime::{OvertimeOrder, OvertimeOrderId, OvertimeStatus};
    use plantdesk_core::views::ListFilter;

    use super::SqlOvertimeRepository;
    use crate::repositories::{OvertimeRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_order(id: &str, internal_id: &str) -> OvertimeOrder {
        OvertimeOrder::new(
            OvertimeOrderId(id.to_owned()),
            internal_id.to_owned(),
            "jan.kowalski@plant.example",
            NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
            Decimal::new(40, 1),
            3,
            "line 2 changeover backlog",
            Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
            7,
        )
    }

    #[tokio::test]
    async fn insert_and_find_round_trips_the_document() {
        let pool = setup().await;
        let repo = SqlOvertimeRepository::new(pool);
        let order = sample_order("ot-1", "1/26");

        repo.insert(&order).await.expect("insert");
        let found = repo
            .find_by_id(&OvertimeOrderId("ot-1".to_owned()))
            .await
            .expect("find")
            .expect("exists");

        assert_eq!(found, order);
        assert_eq!(found.stamps.get("pending").map(|s| s.by.as_str()),
            Some("jan.kowalski@plant.example"));
    }

    #[tokio::test]
    async fn update_applies_only_with_matching_version() {
        let pool = setup().await;
        let repo = SqlOvertimeRepository::new(pool);
        let mut order = sample_order("ot-1", "1/26");
        repo.insert(&order).await.expect("insert");

        order.status = OvertimeStatus::Approved;
        order.version = 2;
        repo.update(&order).await.expect("versioned update");

        // A second writer holding the stale snapshot loses.
        let mut stale = sample_order("ot-1", "1/26");
        stale.status = OvertimeStatus::Canceled;
        stale.version = 2;
        let result = repo.update(&stale).await;
        assert!(matches!(result, Err(RepositoryError::Conflict { .. })));

        let found = repo
            .find_by_id(&OvertimeOrderId("ot-1".to_owned()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.status, OvertimeStatus::Approved);
    }

    #[tokio::test]
    async fn update_of_missing_row_reports_not_found() {
        let pool = setup().await;
        let repo = SqlOvertimeRepository::new(pool);
        let mut order = sample_order("ghost", "9/26");
        order.version = 2;

        let result = repo.update(&order).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_search() {
        let pool = setup().await;
        let repo = SqlOvertimeRepository::new(pool);

        repo.insert(&sample_order("ot-1", "1/26")).await.expect("insert 1");
        let mut approved = sample_order("ot-2", "2/26");
        approved.status = OvertimeStatus::Approved;
        repo.insert(&approved).await.expect("insert 2");
        let mut other = sample_order("ot-3", "3/26");
        other.requested_by = "ewa.nowak@plant.example".to_owned();
        repo.insert(&other).await.expect("insert 3");

        let pending_only = repo
            .list(&ListFilter { statuses: vec!["pending".to_owned()], ..Default::default() })
            .await
            .expect("list pending");
        assert_eq!(pending_only.len(), 2);

        let by_search = repo
            .list(&ListFilter { search: Some("ewa.nowak".to_owned()), ..Default::default() })
            .await
            .expect("list search");
        assert_eq!(by_search.len(), 1);
        assert_eq!(by_search[0].id.0, "ot-3");

        let by_internal_id = repo
            .list(&ListFilter { search: Some("2/26".to_owned()), ..Default::default() })
            .await
            .expect("list internal id");
        assert!(by_internal_id.iter().any(|order| order.id.0 == "ot-2"));

        let own_only = repo
            .list(&ListFilter::default().scoped_to_owner("ewa.nowak@plant.example"))
            .await
            .expect("list owner scoped");
        assert_eq!(own_only.len(), 1);
        assert_eq!(own_only[0].id.0, "ot-3");
    }

    #[tokio::test]
    async fn list_honors_the_row_cap() {
        let pool = setup().await;
        let repo = SqlOvertimeRepository::new(pool);
        for index in 0..5 {
            repo.insert(&sample_order(&format!("ot-{index}"), &format!("{}/26", index + 1)))
                .await
                .expect("insert");
        }

        let capped = repo
            .list(&ListFilter { limit: Some(2), ..Default::default() })
            .await
            .expect("list capped");
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_went_away() {
        let pool = setup().await;
        let repo = SqlOvertimeRepository::new(pool);
        repo.insert(&sample_order("ot-1", "1/26")).await.expect("insert");

        assert!(repo.delete(&OvertimeOrderId("ot-1".to_owned())).await.expect("delete"));
        assert!(!repo.delete(&OvertimeOrderId("ot-1".to_owned())).await.expect("redelete"));
    }
}
