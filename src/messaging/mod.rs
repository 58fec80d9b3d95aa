//! Outbound messaging: domain events and customer notifications.
//!
//! With a NATS connection both go to subjects on the bus; a mail relay
//! subscribed to the notification subject does the actual delivery. Without
//! one, both are written to the log.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::events::DomainEvent;

pub mod templates;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to publish to {subject}: {reason}")]
    Publish { subject: String, reason: String },
}

/// A rendered email waiting for delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), MessagingError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MessagingError>;
}

#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    event_prefix: String,
    notification_subject: String,
}

impl NatsBus {
    pub fn new(client: async_nats::Client, event_prefix: impl Into<String>, notification_subject: impl Into<String>) -> Self {
        Self { client, event_prefix: event_prefix.into(), notification_subject: notification_subject.into() }
    }

    pub fn event_subject(&self, event: &DomainEvent) -> String { format!("{}.{}", self.event_prefix, event.name()) }

    async fn send_json<T: Serialize + Sync>(&self, subject: String, payload: &T) -> Result<(), MessagingError> {
        let body = serde_json::to_vec(payload)?;
        self.client
            .publish(subject.clone(), body.into())
            .await
            .map_err(|e| MessagingError::Publish { subject, reason: e.to_string() })
    }
}

#[async_trait]
impl EventPublisher for NatsBus {
    async fn publish(&self, event: &DomainEvent) -> Result<(), MessagingError> {
        self.send_json(self.event_subject(event), event).await
    }
}

#[async_trait]
impl Notifier for NatsBus {
    async fn send(&self, email: &Email) -> Result<(), MessagingError> {
        self.send_json(self.notification_subject.clone(), email).await
    }
}

/// Writes events and notifications to the log instead of a broker.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogBus;

#[async_trait]
impl EventPublisher for LogBus {
    async fn publish(&self, event: &DomainEvent) -> Result<(), MessagingError> {
        let payload = serde_json::to_string(event)?;
        info!(event = event.name(), %payload, "domain event");
        Ok(())
    }
}

#[async_trait]
impl Notifier for LogBus {
    async fn send(&self, email: &Email) -> Result<(), MessagingError> {
        info!(to = %email.to, subject = %email.subject, "notification queued (no relay configured)");
        Ok(())
    }
}

/// Publishes an event, logging rather than failing when the broker is down.
/// The state change it describes has already been committed.
pub async fn emit(publisher: &dyn EventPublisher, event: DomainEvent) {
    if let Err(err) = publisher.publish(&event).await {
        warn!(event = event.name(), error = %err, "event publish failed");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records everything sent through it.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub events: Mutex<Vec<DomainEvent>>,
        pub emails: Mutex<Vec<Email>>,
        pub fail_emails: bool,
    }

    #[async_trait]
    impl EventPublisher for Recorder {
        async fn publish(&self, event: &DomainEvent) -> Result<(), MessagingError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, email: &Email) -> Result<(), MessagingError> {
            if self.fail_emails {
                return Err(MessagingError::Publish { subject: "mail".into(), reason: "relay down".into() });
            }
            self.emails.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_bus_accepts_everything() {
        use crate::domain::events::CartEvent;
        let bus = LogBus;
        bus.publish(&DomainEvent::Cart(CartEvent::Expired { purged: 3 })).await.unwrap();
        bus.send(&Email { to: "a@b.c".into(), subject: "hi".into(), html: String::new() }).await.unwrap();
    }
}
