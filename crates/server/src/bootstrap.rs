//! Startup seeding.
//!
//! Idempotently creates the permission catalogue, the `admin`/`user` system
//! roles, the initial admin account from config, and the console's own
//! public PKCE client. Safe to run on every boot.

use crate::AppResources;
use crate::auth::password::hash_password;
use crate::entity::{client, permission, role, role_permission, user, user_role};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use time::OffsetDateTime;

/// Canonical permission catalogue: (name, description).
const PERMISSIONS: &[(&str, &str)] = &[
    ("users:read", "List and inspect user accounts"),
    ("users:write", "Create, modify and delete user accounts"),
    ("clients:read", "List and inspect OAuth2 clients"),
    ("clients:write", "Create, modify and delete OAuth2 clients"),
    ("roles:read", "List roles and permissions"),
    ("roles:write", "Modify RBAC configuration"),
    ("audit:read", "Read audit logs"),
];

/// Client id of the console's own registration.
pub const CONSOLE_CLIENT_ID: &str = "admin-console";

/// Run all seeding steps.
#[tracing::instrument(skip(resources))]
pub async fn run(resources: &AppResources) -> Result<(), sea_orm::DbErr> {
    let db = resources.db.as_ref();

    let permission_ids = seed_permissions(db).await?;
    let admin_role_id = seed_role(db, "admin", "Full administrative access", &permission_ids).await?;
    seed_role(db, "user", "Standard end-user account", &[]).await?;
    seed_admin_account(resources, &admin_role_id).await?;
    seed_console_client(resources).await?;

    Ok(())
}

async fn seed_permissions(db: &DatabaseConnection) -> Result<Vec<String>, sea_orm::DbErr> {
    let mut ids = Vec::with_capacity(PERMISSIONS.len());
    let now = OffsetDateTime::now_utc();

    for (name, description) in PERMISSIONS {
        if let Some(existing) = permission::Entity::find()
            .filter(permission::Column::Name.eq(*name))
            .one(db)
            .await?
        {
            ids.push(existing.id);
            continue;
        }

        let (resource, action) = name.split_once(':').unwrap_or((*name, ""));
        let model = permission::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            description: Set(Some(description.to_string())),
            resource: Set(resource.to_string()),
            action: Set(action.to_string()),
            created_at: Set(now),
        };
        let inserted = model.insert(db).await?;
        tracing::info!(permission = name, "Seeded permission");
        ids.push(inserted.id);
    }

    Ok(ids)
}

async fn seed_role(
    db: &DatabaseConnection,
    name: &str,
    description: &str,
    permission_ids: &[String],
) -> Result<String, sea_orm::DbErr> {
    if let Some(existing) = role::Entity::find()
        .filter(role::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok(existing.id);
    }

    let now = OffsetDateTime::now_utc();
    let model = role::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        name: Set(name.to_string()),
        description: Set(Some(description.to_string())),
        is_system: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let inserted = model.insert(db).await?;

    for permission_id in permission_ids {
        let link = role_permission::ActiveModel {
            role_id: Set(inserted.id.clone()),
            permission_id: Set(permission_id.clone()),
        };
        role_permission::Entity::insert(link).exec(db).await?;
    }

    tracing::info!(role = name, "Seeded system role");
    Ok(inserted.id)
}

/// Create the initial admin account when no user holds the admin role yet.
async fn seed_admin_account(
    resources: &AppResources,
    admin_role_id: &str,
) -> Result<(), sea_orm::DbErr> {
    let db = resources.db.as_ref();

    let has_admin = user_role::Entity::find()
        .filter(user_role::Column::RoleId.eq(admin_role_id))
        .one(db)
        .await?
        .is_some();
    if has_admin {
        return Ok(());
    }

    let email = resources.config.bootstrap.admin_email.trim().to_lowercase();
    let password_hash = hash_password(&resources.config.bootstrap.admin_password)
        .map_err(|e| sea_orm::DbErr::Custom(format!("Failed to hash bootstrap password: {e}")))?;

    // The configured address may already exist as a plain user; promote it
    // instead of creating a duplicate.
    let user_id = match user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(db)
        .await?
    {
        Some(existing) => existing.id,
        None => {
            let now = OffsetDateTime::now_utc();
            let model = user::ActiveModel {
                id: Set(uuid::Uuid::new_v4().to_string()),
                email: Set(email.clone()),
                username: Set(Some("admin".to_string())),
                password_hash: Set(password_hash),
                first_name: Set(None),
                last_name: Set(None),
                is_active: Set(true),
                email_verified: Set(true),
                failed_login_attempts: Set(0),
                locked_until: Set(None),
                password_changed_at: Set(None),
                last_login_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            };
            model.insert(db).await?.id
        }
    };

    let link = user_role::ActiveModel {
        user_id: Set(user_id),
        role_id: Set(admin_role_id.to_string()),
    };
    user_role::Entity::insert(link).exec(db).await?;

    tracing::info!(email = %email, "Seeded initial admin account");
    Ok(())
}

/// Register the console itself as a public PKCE client.
async fn seed_console_client(resources: &AppResources) -> Result<(), sea_orm::DbErr> {
    let db = resources.db.as_ref();

    let exists = client::Entity::find()
        .filter(client::Column::ClientId.eq(CONSOLE_CLIENT_ID))
        .one(db)
        .await?
        .is_some();
    if exists {
        tracing::debug!("Console client already registered, skipping");
        return Ok(());
    }

    let frontend = resources.config.frontend_url.trim_end_matches('/');
    let redirect_uris =
        serde_json::to_string(&[format!("{frontend}/auth/callback")]).unwrap_or_default();

    let now = OffsetDateTime::now_utc();
    let model = client::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        client_id: Set(CONSOLE_CLIENT_ID.to_string()),
        secret_hash: Set(None),
        name: Set("CloseAuth Admin Console".to_string()),
        description: Set(Some("Built-in administration console".to_string())),
        redirect_uris: Set(redirect_uris),
        grant_types: Set("authorization_code refresh_token".to_string()),
        scopes: Set("openid profile email".to_string()),
        access_token_ttl: Set(resources.config.security.access_token_lifetime),
        refresh_token_ttl: Set(resources.config.security.refresh_token_lifetime),
        is_public: Set(true),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };
    model.insert(db).await?;

    tracing::info!(client_id = CONSOLE_CLIENT_ID, "Seeded console client");
    Ok(())
}
