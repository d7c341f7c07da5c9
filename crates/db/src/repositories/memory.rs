use std::collections::HashMap;

use tokio::sync::RwLock;

use plantdesk_core::domain::deviation::{Deviation, DeviationId};
use plantdesk_core::domain::overtime::{OvertimeOrder, OvertimeOrderId};
use plantdesk_core::sequence::format_internal_id;
use plantdesk_core::views::ListFilter;
use plantdesk_core::workflow::{EntityKind, StatusMachine};

use super::{DeviationRepository, OvertimeRepository, RepositoryError, SequenceRepository};

/// In-memory fakes with the same compare-and-swap contract as the SQL
/// repositories, for tests that do not want a database.
#[derive(Default)]
pub struct InMemoryOvertimeRepository {
    orders: RwLock<HashMap<String, OvertimeOrder>>,
}

#[async_trait::async_trait]
impl OvertimeRepository for InMemoryOvertimeRepository {
    async fn find_by_id(
        &self,
        id: &OvertimeOrderId,
    ) -> Result<Option<OvertimeOrder>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn insert(&self, order: &OvertimeOrder) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.0.clone(), order.clone());
        Ok(())
    }

    async fn update(&self, order: &OvertimeOrder) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        match orders.get(&order.id.0) {
            None => Err(RepositoryError::NotFound { id: order.id.0.clone() }),
            Some(stored) if stored.version != order.version - 1 => {
                Err(RepositoryError::Conflict { id: order.id.0.clone() })
            }
            Some(_) => {
                orders.insert(order.id.0.clone(), order.clone());
                Ok(())
            }
        }
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<OvertimeOrder>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut matched: Vec<OvertimeOrder> = orders
            .values()
            .filter(|order| {
                filter.statuses.is_empty()
                    || filter.statuses.iter().any(|status| status == order.status.as_str())
            })
            .filter(|order| {
                filter.owner.as_deref().map_or(true, |owner| owner == order.requested_by)
            })
            .cloned()
            .collect();
        matched.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        matched.truncate(filter.effective_limit() as usize);
        Ok(matched)
    }

    async fn delete(&self, id: &OvertimeOrderId) -> Result<bool, RepositoryError> {
        let mut orders = self.orders.write().await;
        Ok(orders.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryDeviationRepository {
    deviations: RwLock<HashMap<String, Deviation>>,
}

#[async_trait::async_trait]
impl DeviationRepository for InMemoryDeviationRepository {
    async fn find_by_id(&self, id: &DeviationId) -> Result<Option<Deviation>, RepositoryError> {
        let deviations = self.deviations.read().await;
        Ok(deviations.get(&id.0).cloned())
    }

    async fn insert(&self, deviation: &Deviation) -> Result<(), RepositoryError> {
        let mut deviations = self.deviations.write().await;
        deviations.insert(deviation.id.0.clone(), deviation.clone());
        Ok(())
    }

    async fn update(&self, deviation: &Deviation) -> Result<(), RepositoryError> {
        let mut deviations = self.deviations.write().await;
        match deviations.get(&deviation.id.0) {
            None => Err(RepositoryError::NotFound { id: deviation.id.0.clone() }),
            Some(stored) if stored.version != deviation.version - 1 => {
                Err(RepositoryError::Conflict { id: deviation.id.0.clone() })
            }
            Some(_) => {
                deviations.insert(deviation.id.0.clone(), deviation.clone());
                Ok(())
            }
        }
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Deviation>, RepositoryError> {
        let deviations = self.deviations.read().await;
        let mut matched: Vec<Deviation> = deviations
            .values()
            .filter(|deviation| {
                filter.statuses.is_empty()
                    || filter.statuses.iter().any(|status| status == deviation.status.as_str())
            })
            .filter(|deviation| {
                filter.owner.as_deref().map_or(true, |owner| owner == deviation.reported_by)
            })
            .cloned()
            .collect();
        matched.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        matched.truncate(filter.effective_limit() as usize);
        Ok(matched)
    }

    async fn delete(&self, id: &DeviationId) -> Result<bool, RepositoryError> {
        let mut deviations = self.deviations.write().await;
        Ok(deviations.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemorySequenceRepository {
    counters: RwLock<HashMap<(String, i32), u32>>,
}

#[async_trait::async_trait]
impl SequenceRepository for InMemorySequenceRepository {
    async fn next_internal_id(
        &self,
        family: EntityKind,
        year: i32,
    ) -> Result<String, RepositoryError> {
        let mut counters = self.counters.write().await;
        let counter = counters.entry((family.as_str().to_owned(), year)).or_insert(0);
        *counter += 1;
        Ok(format_internal_id(*counter, year))
    }
}
