use sqlx::{QueryBuilder, Row};

use plantdesk_core::domain::deviation::{Deviation, DeviationId};
use plantdesk_core::views::ListFilter;
use plantdesk_core::workflow::StatusMachine;

use super::{DeviationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDeviationRepository {
    pool: DbPool,
}

impl SqlDeviationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_doc(doc: &str) -> Result<Deviation, RepositoryError> {
    serde_json::from_str(doc).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn encode_doc(deviation: &Deviation) -> Result<String, RepositoryError> {
    serde_json::to_string(deviation).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn updated_at(deviation: &Deviation) -> String {
    deviation.edited.as_ref().map(|stamp| stamp.at).unwrap_or(deviation.created_at).to_rfc3339()
}

#[async_trait::async_trait]
impl DeviationRepository for SqlDeviationRepository {
    async fn find_by_id(&self, id: &DeviationId) -> Result<Option<Deviation>, RepositoryError> {
        let row = sqlx::query("SELECT doc FROM deviation WHERE id = ?")
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

    async fn insert(&self, deviation: &Deviation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO deviation (id, internal_id, status, reported_by, version,
                                    created_at, updated_at, doc)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&deviation.id.0)
        .bind(&deviation.internal_id)
        .bind(deviation.status.as_str())
        .bind(&deviation.reported_by)
        .bind(deviation.version)
        .bind(deviation.created_at.to_rfc3339())
        .bind(updated_at(deviation))
        .bind(encode_doc(deviation)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, deviation: &Deviation) -> Result<(), RepositoryError> {
        let expected_version = deviation.version - 1;
        let result = sqlx::query(
            "UPDATE deviation
             SET internal_id = ?, status = ?, reported_by = ?, version = ?, updated_at = ?, doc = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&deviation.internal_id)
        .bind(deviation.status.as_str())
        .bind(&deviation.reported_by)
        .bind(deviation.version)
        .bind(updated_at(deviation))
        .bind(encode_doc(deviation)?)
        .bind(&deviation.id.0)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM deviation WHERE id = ?")
                .bind(&deviation.id.0)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Err(if exists {
                RepositoryError::Conflict { id: deviation.id.0.clone() }
            } else {
                RepositoryError::NotFound { id: deviation.id.0.clone() }
            });
        }

        Ok(())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Deviation>, RepositoryError> {
        let mut query = QueryBuilder::new("SELECT doc FROM deviation WHERE 1 = 1");

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

    async fn delete(&self, id: &DeviationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM deviation WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
