//! Relational audit sink: delegates to the `AuditRepository` for the
//! compliance-replay table.

use super::EventSink;
use crate::domain::event::Event;
use crate::domain::repositories::AuditRepository;
use async_trait::async_trait;
use std::sync::Arc;

pub struct AuditSink {
    repository: Arc<dyn AuditRepository>,
}

impl AuditSink {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl EventSink for AuditSink {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn publish(&self, event: &Event) -> anyhow::Result<()> {
        self.repository.record(event).await
    }
}
