//! Background maintenance: pruning of expired token material.

use crate::AppResources;
use crate::entity::{authorization_code, reset_token, session};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::{Duration, interval};

/// Spawn the periodic sweep task.
pub fn spawn_sweep_task(resources: Arc<AppResources>) {
    let period = Duration::from_secs(resources.config.maintenance.sweep_interval_secs);
    tokio::spawn(async move {
        let mut interval = interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = sweep_expired(&resources).await {
                tracing::warn!("Maintenance sweep failed: {}", e);
            }
        }
    });
}

/// Delete expired authorization codes, sessions and reset tokens.
#[tracing::instrument(skip(resources))]
pub async fn sweep_expired(resources: &AppResources) -> Result<(), sea_orm::DbErr> {
    let db = resources.db.as_ref();
    let now = OffsetDateTime::now_utc();

    let codes = authorization_code::Entity::delete_many()
        .filter(authorization_code::Column::ExpiresAt.lt(now))
        .exec(db)
        .await?
        .rows_affected;

    let sessions = session::Entity::delete_many()
        .filter(session::Column::ExpiresAt.lt(now))
        .exec(db)
        .await?
        .rows_affected;

    let reset_tokens = reset_token::Entity::delete_many()
        .filter(reset_token::Column::ExpiresAt.lt(now))
        .exec(db)
        .await?
        .rows_affected;

    if codes + sessions + reset_tokens > 0 {
        tracing::debug!(
            authorization_codes = codes,
            sessions,
            reset_tokens,
            "Pruned expired token material"
        );
    }

    Ok(())
}
