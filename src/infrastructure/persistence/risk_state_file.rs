//! Atomic JSON persistence for the Risk Gate's `RiskState` (C3), with a
//! queryable SQLite mirror for operator inspection.

use crate::domain::risk::state::RiskState;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct RiskStateStore {
    path: PathBuf,
    mirror_pool: SqlitePool,
}

impl RiskStateStore {
    pub fn new(path: impl Into<PathBuf>, mirror_pool: SqlitePool) -> Self {
        Self {
            path: path.into(),
            mirror_pool,
        }
    }

    pub async fn load(&self) -> Result<Option<RiskState>> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                let state: RiskState =
                    serde_json::from_slice(&bytes).context("risk state file is not valid JSON")?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("failed to read risk state file"),
        }
    }

    /// Write-temp, fsync, rename: survives a crash mid-write without ever
    /// leaving the canonical path holding a partial document.
    pub async fn save(&self, state: &RiskState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state).context("failed to serialize risk state")?;

        let tmp_path = tmp_path_for(&self.path);
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .context("failed to create risk state directory")?;
        }

        let mut file = fs::File::create(&tmp_path)
            .await
            .context("failed to create risk state temp file")?;
        file.write_all(&bytes)
            .await
            .context("failed to write risk state temp file")?;
        file.sync_all().await.context("failed to fsync risk state temp file")?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .await
            .context("failed to rename risk state temp file into place")?;

        self.update_mirror(state).await?;
        Ok(())
    }

    async fn update_mirror(&self, state: &RiskState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_state_mirror (id, trading_date, daily_pnl_realized, blocked, block_reason)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                trading_date = excluded.trading_date,
                daily_pnl_realized = excluded.daily_pnl_realized,
                blocked = excluded.blocked,
                block_reason = excluded.block_reason,
                updated_at = strftime('%s', 'now')
            "#,
        )
        .bind(state.trading_date.to_string())
        .bind(state.daily_pnl_realized.to_string())
        .bind(state.blocked)
        .bind(state.block_reason.as_deref())
        .execute(&self.mirror_pool)
        .await
        .context("failed to update risk_state_mirror")?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
