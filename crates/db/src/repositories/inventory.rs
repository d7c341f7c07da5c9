use sqlx::{QueryBuilder, Row};

use plantdesk_core::domain::inventory::{Asset, AssetId};
use plantdesk_core::views::ListFilter;
use plantdesk_core::workflow::StatusMachine;

use super::{AssetRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAssetRepository {
    pool: DbPool,
}

impl SqlAssetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_doc(doc: &str) -> Result<Asset, RepositoryError> {
    serde_json::from_str(doc).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn encode_doc(asset: &Asset) -> Result<String, RepositoryError> {
    serde_json::to_string(asset).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn updated_at(asset: &Asset) -> String {
    asset.edited.as_ref().map(|stamp| stamp.at).unwrap_or(asset.created_at).to_rfc3339()
}

#[async_trait::async_trait]
impl AssetRepository for SqlAssetRepository {
    async fn find_by_id(&self, id: &AssetId) -> Result<Option<Asset>, RepositoryError> {
        let row = sqlx::query("SELECT doc FROM it_asset WHERE id = ?")
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

    async fn insert(&self, asset: &Asset) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO it_asset (id, internal_id, status, registered_by, version,
                                   created_at, updated_at, doc)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&asset.id.0)
        .bind(&asset.internal_id)
        .bind(asset.status.as_str())
        .bind(&asset.registered_by)
        .bind(asset.version)
        .bind(asset.created_at.to_rfc3339())
        .bind(updated_at(asset))
        .bind(encode_doc(asset)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, asset: &Asset) -> Result<(), RepositoryError> {
        let expected_version = asset.version - 1;
        let result = sqlx::query(
            "UPDATE it_asset
             SET internal_id = ?, status = ?, registered_by = ?, version = ?, updated_at = ?, doc = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&asset.internal_id)
        .bind(asset.status.as_str())
        .bind(&asset.registered_by)
        .bind(asset.version)
        .bind(updated_at(asset))
        .bind(encode_doc(asset)?)
        .bind(&asset.id.0)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM it_asset WHERE id = ?")
                .bind(&asset.id.0)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Err(if exists {
                RepositoryError::Conflict { id: asset.id.0.clone() }
            } else {
                RepositoryError::NotFound { id: asset.id.0.clone() }
            });
        }

        Ok(())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Asset>, RepositoryError> {
        let mut query = QueryBuilder::new("SELECT doc FROM it_asset WHERE 1 = 1");

        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut statuses = query.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(status.clone());
            }
            statuses.push_unseparated(")");
        }
        if let Some(owner) = &filter.owner {
            query.push(" AND registered_by = ");
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

    async fn delete(&self, id: &AssetId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM it_asset WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use plantdesk_core::domain::inventory::{Asset, AssetId, AssetStatus};
    use plantdesk_core::views::ListFilter;

    use super::SqlAssetRepository;
    use crate::repositories::AssetRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_asset(id: &str, internal_id: &str) -> Asset {
        Asset::new(
            AssetId(id.to_owned()),
            internal_id.to_owned(),
            "Zebra ZT411 label printer",
            "it.desk@plant.example",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_find_and_update_round_trip() {
        let pool = setup().await;
        let repo = SqlAssetRepository::new(pool);
        let mut asset = sample_asset("as-1", "21/26");
        repo.insert(&asset).await.expect("insert");

        asset.status = AssetStatus::Assigned;
        asset.assigned_to = Some("jan.kowalski@plant.example".to_owned());
        asset.version = 2;
        repo.update(&asset).await.expect("update");

        let found =
            repo.find_by_id(&AssetId("as-1".to_owned())).await.expect("find").expect("exists");
        assert_eq!(found.status, AssetStatus::Assigned);
        assert_eq!(found.assigned_to.as_deref(), Some("jan.kowalski@plant.example"));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let pool = setup().await;
        let repo = SqlAssetRepository::new(pool);

        repo.insert(&sample_asset("as-1", "21/26")).await.expect("insert 1");
        let mut disposed = sample_asset("as-2", "22/26");
        disposed.status = AssetStatus::Disposed;
        repo.insert(&disposed).await.expect("insert 2");

        let in_stock = repo
            .list(&ListFilter { statuses: vec!["in-stock".to_owned()], ..Default::default() })
            .await
            .expect("list");
        assert_eq!(in_stock.len(), 1);
        assert_eq!(in_stock[0].id.0, "as-1");
    }
}
