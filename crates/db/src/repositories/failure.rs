use sqlx::{QueryBuilder, Row};

use plantdesk_core::domain::failure::{FailureReport, FailureReportId};
use plantdesk_core::views::ListFilter;
use plantdesk_core::workflow::StatusMachine;

use super::{FailureRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFailureRepository {
    pool: DbPool,
}

impl SqlFailureRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_doc(doc: &str) -> Result<FailureReport, RepositoryError> {
    serde_json::from_str(doc).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn encode_doc(report: &FailureReport) -> Result<String, RepositoryError> {
    serde_json::to_string(report).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn updated_at(report: &FailureReport) -> String {
    report.edited.as_ref().map(|stamp| stamp.at).unwrap_or(report.created_at).to_rfc3339()
}

#[async_trait::async_trait]
impl FailureRepository for SqlFailureRepository {
    async fn find_by_id(
        &self,
        id: &FailureReportId,
    ) -> Result<Option<FailureReport>, RepositoryError> {
        let row = sqlx::query("SELECT doc FROM failure_report WHERE id = ?")
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

    async fn insert(&self, report: &FailureReport) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO failure_report (id, internal_id, status, reported_by, version,
                                         created_at, updated_at, doc)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.id.0)
        .bind(&report.internal_id)
        .bind(report.status.as_str())
        .bind(&report.reported_by)
        .bind(report.version)
        .bind(report.created_at.to_rfc3339())
        .bind(updated_at(report))
        .bind(encode_doc(report)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, report: &FailureReport) -> Result<(), RepositoryError> {
        let expected_version = report.version - 1;
        let result = sqlx::query(
            "UPDATE failure_report
             SET internal_id = ?, status = ?, reported_by = ?, version = ?, updated_at = ?, doc = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&report.internal_id)
        .bind(report.status.as_str())
        .bind(&report.reported_by)
        .bind(report.version)
        .bind(updated_at(report))
        .bind(encode_doc(report)?)
        .bind(&report.id.0)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM failure_report WHERE id = ?")
                .bind(&report.id.0)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Err(if exists {
                RepositoryError::Conflict { id: report.id.0.clone() }
            } else {
                RepositoryError::NotFound { id: report.id.0.clone() }
            });
        }

        Ok(())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<FailureReport>, RepositoryError> {
        let mut query = QueryBuilder::new("SELECT doc FROM failure_report WHERE 1 = 1");

        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut statuses = query.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(status.clone());
            }
            statuses.push_unseparated(")");
        }
        if let Some(owner) = &filter.owner {
            query.push(" AND reported_by = ");
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

    async fn delete(&self, id: &FailureReportId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM failure_report WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use plantdesk_core::domain::failure::{
        FailureReport, FailureReportId, FailureSeverity, FailureStatus,
    };
    use plantdesk_core::views::ListFilter;

    use super::SqlFailureRepository;
    use crate::repositories::FailureRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_report(id: &str, internal_id: &str) -> FailureReport {
        FailureReport::new(
            FailureReportId(id.to_owned()),
            internal_id.to_owned(),
            "palletizer L2",
            "gripper jams on layer change",
            FailureSeverity::High,
            "jan.kowalski@plant.example",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_and_find_round_trips_the_document() {
        let pool = setup().await;
        let repo = SqlFailureRepository::new(pool);
        let report = sample_report("fl-1", "55/26");

        repo.insert(&report).await.expect("insert");
        let found = repo
            .find_by_id(&FailureReportId("fl-1".to_owned()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found, report);
    }

    #[tokio::test]
    async fn open_reports_can_be_listed_separately() {
        let pool = setup().await;
        let repo = SqlFailureRepository::new(pool);

        repo.insert(&sample_report("fl-1", "55/26")).await.expect("insert 1");
        let mut resolved = sample_report("fl-2", "56/26");
        resolved.status = FailureStatus::Resolved;
        repo.insert(&resolved).await.expect("insert 2");

        let open = repo
            .list(&ListFilter { statuses: vec!["open".to_owned()], ..Default::default() })
            .await
            .expect("list");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id.0, "fl-1");
    }
}
