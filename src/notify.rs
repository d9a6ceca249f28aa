//! Admin notification sinks

use async_trait::async_trait;

use crate::domain::events::DomainEvent;
use crate::ports::{Notifier, NotifyError, StatusChangeNotice};

/// Publishes notices as JSON on one NATS subject and domain events under
/// `<events_prefix>.<event name>`.
#[derive(Clone)]
pub struct NatsNotifier {
    client: async_nats::Client,
    subject: String,
    events_prefix: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, subject: impl Into<String>, events_prefix: impl Into<String>) -> Self {
        Self { client, subject: subject.into(), events_prefix: events_prefix.into() }
    }

    pub async fn connect(url: &str, subject: impl Into<String>, events_prefix: impl Into<String>) -> Result<Self, NotifyError> {
        let client = async_nats::connect(url).await.map_err(|e| NotifyError::Publish(e.to_string()))?;
        Ok(Self::new(client, subject, events_prefix))
    }
}

pub fn event_subject(prefix: &str, event: &DomainEvent) -> String {
    format!("{}.{}", prefix.trim_end_matches('.'), event.name())
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify_status_change(&self, notice: &StatusChangeNotice) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(notice)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;
        tracing::debug!(subject = %self.subject, orders = notice.order_ids.len(), "notice published");
        Ok(())
    }

    async fn publish_events(&self, events: &[DomainEvent]) -> Result<(), NotifyError> {
        for event in events {
            let payload = serde_json::to_vec(event)?;
            self.client
                .publish(event_subject(&self.events_prefix, event), payload.into())
                .await
                .map_err(|e| NotifyError::Publish(e.to_string()))?;
        }
        tracing::debug!(prefix = %self.events_prefix, events = events.len(), "domain events published");
        Ok(())
    }
}

/// Fallback when no broker is configured: the notice only reaches the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_status_change(&self, notice: &StatusChangeNotice) -> Result<(), NotifyError> {
        tracing::info!(
            organization_id = %notice.organization_id,
            status = %notice.new_status,
            orders = notice.order_ids.len(),
            title = %notice.title,
            "{}", notice.message
        );
        Ok(())
    }

    async fn publish_events(&self, events: &[DomainEvent]) -> Result<(), NotifyError> {
        for event in events {
            tracing::debug!(event = event.name(), ?event, "domain event");
        }
        Ok(())
    }
}
