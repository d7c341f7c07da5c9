use async_trait::async_trait;
use thiserror::Error;

use plantdesk_core::audit::AuditEvent;
use plantdesk_core::domain::deviation::{Deviation, DeviationId};
use plantdesk_core::domain::failure::{FailureReport, FailureReportId};
use plantdesk_core::domain::inventory::{Asset, AssetId};
use plantdesk_core::domain::overtime::{OvertimeOrder, OvertimeOrderId};
use plantdesk_core::views::ListFilter;
use plantdesk_core::workflow::EntityKind;

pub mod audit;
pub mod deviation;
pub mod failure;
pub mod inventory;
pub mod memory;
pub mod outbox;
pub mod overtime;
pub mod sequence;

pub use audit::SqlAuditEventRepository;
pub use deviation::SqlDeviationRepository;
pub use failure::SqlFailureRepository;
pub use inventory::SqlAssetRepository;
pub use memory::{
    InMemoryDeviationRepository, InMemoryOvertimeRepository, InMemorySequenceRepository,
};
pub use outbox::SqlOutboxRepository;
pub use overtime::SqlOvertimeRepository;
pub use sequence::SqlSequenceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no row for id `{id}`")]
    NotFound { id: String },
    #[error("stale version for id `{id}`")]
    Conflict { id: String },
}

#[async_trait]
pub trait DeviationRepository: Send + Sync {
    async fn find_by_id(&self, id: &DeviationId) -> Result<Option<Deviation>, RepositoryError>;
    async fn insert(&self, deviation: &Deviation) -> Result<(), RepositoryError>;
    /// Compare-and-swap on `version - 1`; a stale snapshot surfaces as
    /// [`RepositoryError::Conflict`].
    async fn update(&self, deviation: &Deviation) -> Result<(), RepositoryError>;
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Deviation>, RepositoryError>;
    async fn delete(&self, id: &DeviationId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait OvertimeRepository: Send + Sync {
    async fn find_by_id(&self, id: &OvertimeOrderId)
        -> Result<Option<OvertimeOrder>, RepositoryError>;
    async fn insert(&self, order: &OvertimeOrder) -> Result<(), RepositoryError>;
    async fn update(&self, order: &OvertimeOrder) -> Result<(), RepositoryError>;
    async fn list(&self, filter: &ListFilter) -> Result<Vec<OvertimeOrder>, RepositoryError>;
    async fn delete(&self, id: &OvertimeOrderId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn find_by_id(&self, id: &AssetId) -> Result<Option<Asset>, RepositoryError>;
    async fn insert(&self, asset: &Asset) -> Result<(), RepositoryError>;
    async fn update(&self, asset: &Asset) -> Result<(), RepositoryError>;
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Asset>, RepositoryError>;
    async fn delete(&self, id: &AssetId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait FailureRepository: Send + Sync {
    async fn find_by_id(&self, id: &FailureReportId)
        -> Result<Option<FailureReport>, RepositoryError>;
    async fn insert(&self, report: &FailureReport) -> Result<(), RepositoryError>;
    async fn update(&self, report: &FailureReport) -> Result<(), RepositoryError>;
    async fn list(&self, filter: &ListFilter) -> Result<Vec<FailureReport>, RepositoryError>;
    async fn delete(&self, id: &FailureReportId) -> Result<bool, RepositoryError>;
}

/// Issues the next `N/YY` internal id for a family and year.
#[async_trait]
pub trait SequenceRepository: Send + Sync {
    async fn next_internal_id(
        &self,
        family: EntityKind,
        year: i32,
    ) -> Result<String, RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_entity(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}
