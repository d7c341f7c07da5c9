//! Notification outbox. Transitions never call the mailer inline: they
//! record intents, the executor turns intents into outbox events, and a
//! dispatcher (the notify crate) delivers them under its own retry
//! policy. A delivery failure can therefore never fail a transition.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::workflow::EntityKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutboxEventId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// What an entity wants sent after a transition. Template fields are
/// flat strings so the rendering side stays decoupled from domain types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub event_type: String,
    pub recipient: String,
    pub subject: String,
    pub template: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: OutboxEventId,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub event_type: String,
    pub recipient: String,
    pub subject: String,
    pub template: String,
    pub fields: BTreeMap<String, String>,
    pub state: DeliveryState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn from_intent(
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        intent: NotificationIntent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OutboxEventId(Uuid::new_v4().to_string()),
            entity_kind,
            entity_id: entity_id.into(),
            event_type: intent.event_type,
            recipient: intent.recipient,
            subject: intent.subject,
            template: intent.template,
            fields: intent.fields,
            state: DeliveryState::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            delivered_at: None,
        }
    }

    pub fn mark_delivered(&mut self, now: DateTime<Utc>) {
        self.state = DeliveryState::Delivered;
        self.attempts += 1;
        self.last_error = None;
        self.delivered_at = Some(now);
    }

    /// Records a failed attempt. The event stays pending until
    /// `max_attempts` is exhausted, then parks as failed.
    pub fn mark_attempt_failed(&mut self, error: impl Into<String>, max_attempts: u32) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.state =
            if self.attempts >= max_attempts { DeliveryState::Failed } else { DeliveryState::Pending };
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OutboxStoreError {
    #[error("outbox store failure: {0}")]
    Store(String),
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn append(&self, event: OutboxEvent) -> Result<(), OutboxStoreError>;
    async fn list_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>, OutboxStoreError>;
    async fn update(&self, event: OutboxEvent) -> Result<(), OutboxStoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    events: Arc<Mutex<Vec<OutboxEvent>>>,
}

impl InMemoryOutboxStore {
    pub fn events(&self) -> Vec<OutboxEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_events<T>(&self, f: impl FnOnce(&mut Vec<OutboxEvent>) -> T) -> T {
        match self.events.lock() {
            Ok(mut events) => f(&mut events),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, event: OutboxEvent) -> Result<(), OutboxStoreError> {
        self.with_events(|events| events.push(event));
        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
        Ok(self.with_events(|events| {
            events
                .iter()
                .filter(|event| event.state == DeliveryState::Pending)
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn update(&self, event: OutboxEvent) -> Result<(), OutboxStoreError> {
        self.with_events(|events| {
            match events.iter_mut().find(|candidate| candidate.id == event.id) {
                Some(slot) => {
                    *slot = event;
                    Ok(())
                }
                None => Err(OutboxStoreError::Store(format!("unknown outbox event {}", event.id.0))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use crate::workflow::EntityKind;

    use super::{
        DeliveryState, InMemoryOutboxStore, NotificationIntent, OutboxEvent, OutboxStore,
    };

    fn intent() -> NotificationIntent {
        NotificationIntent {
            event_type: "overtime.approved".to_owned(),
            recipient: "jan.kowalski@plant.example".to_owned(),
            subject: "Overtime order 7/26 approved".to_owned(),
            template: "overtime-approved".to_owned(),
            fields: BTreeMap::from([("internal_id".to_owned(), "7/26".to_owned())]),
        }
    }

    #[tokio::test]
    async fn append_and_drain_pending_in_order() {
        let store = InMemoryOutboxStore::default();
        let event = OutboxEvent::from_intent(EntityKind::Overtime, "ot-1", intent(), Utc::now());
        store.append(event.clone()).await.expect("append");

        let pending = store.list_pending(10).await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, event.id);
        assert_eq!(pending[0].state, DeliveryState::Pending);
        assert_eq!(pending[0].attempts, 0);
    }

    #[tokio::test]
    async fn delivered_events_leave_the_pending_queue() {
        let store = InMemoryOutboxStore::default();
        let mut event = OutboxEvent::from_intent(EntityKind::Overtime, "ot-1", intent(), Utc::now());
        store.append(event.clone()).await.expect("append");

        event.mark_delivered(Utc::now());
        store.update(event).await.expect("update");

        assert!(store.list_pending(10).await.expect("list").is_empty());
    }

    #[test]
    fn failed_attempts_park_after_max_attempts() {
        let mut event = OutboxEvent::from_intent(EntityKind::Overtime, "ot-1", intent(), Utc::now());

        event.mark_attempt_failed("relay 502", 3);
        assert_eq!(event.state, DeliveryState::Pending);
        event.mark_attempt_failed("relay 502", 3);
        assert_eq!(event.state, DeliveryState::Pending);
        event.mark_attempt_failed("relay 502", 3);
        assert_eq!(event.state, DeliveryState::Failed);
        assert_eq!(event.attempts, 3);
        assert_eq!(event.last_error.as_deref(), Some("relay 502"));
    }
}
