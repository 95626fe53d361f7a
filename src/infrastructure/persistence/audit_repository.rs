//! Relational audit sink: one row per published event, grounded on the
//! original compliance-replay table used by the rest of the cold store.

use crate::domain::event::Event;
use crate::domain::repositories::AuditRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn record(&self, event: &Event) -> Result<()> {
        let tags_json = serde_json::to_string(&event.tags).context("failed to serialize event tags")?;
        let fields_json =
            serde_json::to_string(&event.fields).context("failed to serialize event fields")?;

        sqlx::query(
            r#"
            INSERT INTO audit_events (event_type, instrument, timestamp, tags_json, fields_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(event.event_type.as_str())
        .bind(event.instrument.as_deref())
        .bind(event.timestamp)
        .bind(tags_json)
        .bind(fields_json)
        .execute(&self.pool)
        .await
        .context("failed to record audit event")?;

        Ok(())
    }
}
