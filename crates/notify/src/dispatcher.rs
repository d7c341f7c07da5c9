use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use plantdesk_core::outbox::{DeliveryState, OutboxStore, OutboxStoreError};

use crate::email::{EmailMessage, EmailSender};
use crate::render::render_html;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: u32,
    pub retried: u32,
    pub failed: u32,
}

/// Drains pending outbox events and hands them to the mail sender.
/// Runs on its own cadence, independent of the transitions that queued
/// the events; a delivery failure is the dispatcher's problem alone.
pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    sender: Arc<dyn EmailSender>,
    max_attempts: u32,
    batch_size: u32,
}

impl OutboxDispatcher {
    pub fn new(store: Arc<dyn OutboxStore>, sender: Arc<dyn EmailSender>, max_attempts: u32) -> Self {
        Self { store, sender, max_attempts: max_attempts.max(1), batch_size: 50 }
    }

    /// One delivery pass over the pending queue, oldest first.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<DispatchReport, OutboxStoreError> {
        let pending = self.store.list_pending(self.batch_size).await?;
        let mut report = DispatchReport::default();

        for mut event in pending {
            let outcome = match render_html(&event.template, &event.fields) {
                Ok(html) => {
                    self.sender
                        .send(&EmailMessage {
                            to: event.recipient.clone(),
                            subject: event.subject.clone(),
                            html,
                        })
                        .await
                        .map_err(|error| error.to_string())
                }
                Err(error) => Err(error.to_string()),
            };

            match outcome {
                Ok(()) => {
                    event.mark_delivered(now);
                    report.delivered += 1;
                    tracing::info!(
                        event_id = %event.id.0,
                        recipient = %event.recipient,
                        event_type = %event.event_type,
                        "notification delivered"
                    );
                }
                Err(error) => {
                    event.mark_attempt_failed(error.as_str(), self.max_attempts);
                    if event.state == DeliveryState::Failed {
                        report.failed += 1;
                        tracing::warn!(
                            event_id = %event.id.0,
                            attempts = event.attempts,
                            error = %error,
                            "notification parked after exhausting attempts"
                        );
                    } else {
                        report.retried += 1;
                        tracing::debug!(
                            event_id = %event.id.0,
                            attempts = event.attempts,
                            error = %error,
                            "notification delivery failed; will retry"
                        );
                    }
                }
            }

            self.store.update(event).await?;
        }

        Ok(report)
    }
}
