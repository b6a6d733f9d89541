//! Refresh-token session management.
//!
//! Refresh tokens are opaque random strings handed to the client once; the
//! database only ever sees their SHA-256 digest. Rotation is strict: a
//! successful refresh replaces the stored digest, so a rotated-out token can
//! never be replayed.

use crate::auth::password::{generate_opaque_token, hash_opaque_token};
use crate::entity::session;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use time::OffsetDateTime;

/// Context recorded alongside a new session.
#[derive(Debug, Default, Clone)]
pub struct SessionContext {
    pub client_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Create a new refresh session for a user and return the plaintext token.
#[tracing::instrument(skip(db, ctx))]
pub async fn issue_session(
    db: &DatabaseConnection,
    user_id: &str,
    lifetime_secs: i64,
    ctx: SessionContext,
) -> Result<String, sea_orm::DbErr> {
    let refresh_token = generate_opaque_token();
    let now = OffsetDateTime::now_utc();

    let model = session::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_string()),
        client_id: Set(ctx.client_id),
        refresh_token_hash: Set(hash_opaque_token(&refresh_token)),
        ip_address: Set(ctx.ip_address),
        user_agent: Set(ctx.user_agent),
        issued_at: Set(now),
        expires_at: Set(now + time::Duration::seconds(lifetime_secs)),
        last_rotated_at: Set(None),
        rotation_count: Set(0),
        revoked_at: Set(None),
    };
    model.insert(db).await?;

    Ok(refresh_token)
}

/// Look up a session by the plaintext refresh token presented by the client.
pub async fn find_by_token(
    db: &DatabaseConnection,
    refresh_token: &str,
) -> Result<Option<session::Model>, sea_orm::DbErr> {
    session::Entity::find()
        .filter(session::Column::RefreshTokenHash.eq(hash_opaque_token(refresh_token)))
        .one(db)
        .await
}

/// Rotate a session: replace the stored digest with a fresh token's digest.
///
/// The session keeps its expiry; only the token material changes.
#[tracing::instrument(skip(db, existing))]
pub async fn rotate_session(
    db: &DatabaseConnection,
    existing: session::Model,
) -> Result<String, sea_orm::DbErr> {
    let new_token = generate_opaque_token();
    let now = OffsetDateTime::now_utc();

    let rotation_count = existing.rotation_count + 1;
    let mut active: session::ActiveModel = existing.into();
    active.refresh_token_hash = Set(hash_opaque_token(&new_token));
    active.last_rotated_at = Set(Some(now));
    active.rotation_count = Set(rotation_count);
    active.update(db).await?;

    Ok(new_token)
}

/// Revoke a single session.
pub async fn revoke_session(
    db: &DatabaseConnection,
    existing: session::Model,
) -> Result<(), sea_orm::DbErr> {
    if existing.revoked_at.is_some() {
        return Ok(());
    }
    let mut active: session::ActiveModel = existing.into();
    active.revoked_at = Set(Some(OffsetDateTime::now_utc()));
    active.update(db).await?;
    Ok(())
}

/// Revoke every live session belonging to a user.
///
/// Used on password reset, account deactivation and account deletion.
#[tracing::instrument(skip(db))]
pub async fn revoke_user_sessions(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<u64, sea_orm::DbErr> {
    use sea_orm::QuerySelect;

    let live: Vec<session::Model> = session::Entity::find()
        .filter(session::Column::UserId.eq(user_id))
        .filter(session::Column::RevokedAt.is_null())
        .limit(1000)
        .all(db)
        .await?;

    let now = OffsetDateTime::now_utc();
    let mut revoked = 0u64;
    for s in live {
        let mut active: session::ActiveModel = s.into();
        active.revoked_at = Set(Some(now));
        active.update(db).await?;
        revoked += 1;
    }

    Ok(revoked)
}
