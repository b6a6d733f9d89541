//! Role and permission resolution.
//!
//! Roles aggregate permissions; users hold roles. Resolution walks the join
//! tables and returns flat name lists suitable for embedding in access
//! tokens and API payloads.

use crate::entity::{permission, role, role_permission, user_role};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

/// A user's resolved role and permission names.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAccess {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl ResolvedAccess {
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p == name)
    }
}

/// Resolve the role and permission names held by a user.
#[tracing::instrument(skip(db))]
pub async fn resolve_user_access(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<ResolvedAccess, sea_orm::DbErr> {
    let role_ids: Vec<String> = user_role::Entity::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|ur| ur.role_id)
        .collect();

    if role_ids.is_empty() {
        return Ok(ResolvedAccess::default());
    }

    let roles: Vec<role::Model> = role::Entity::find()
        .filter(role::Column::Id.is_in(role_ids.clone()))
        .all(db)
        .await?;

    let permission_ids: Vec<String> = role_permission::Entity::find()
        .filter(role_permission::Column::RoleId.is_in(role_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|rp| rp.permission_id)
        .collect();

    let mut permissions: Vec<String> = if permission_ids.is_empty() {
        Vec::new()
    } else {
        permission::Entity::find()
            .filter(permission::Column::Id.is_in(permission_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect()
    };
    permissions.sort();
    permissions.dedup();

    let mut role_names: Vec<String> = roles.into_iter().map(|r| r.name).collect();
    role_names.sort();

    Ok(ResolvedAccess {
        roles: role_names,
        permissions,
    })
}

/// Fetch the full permission models attached to a role.
pub async fn role_permissions(
    db: &DatabaseConnection,
    role_id: &str,
) -> Result<Vec<permission::Model>, sea_orm::DbErr> {
    let permission_ids: Vec<String> = role_permission::Entity::find()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .all(db)
        .await?
        .into_iter()
        .map(|rp| rp.permission_id)
        .collect();

    if permission_ids.is_empty() {
        return Ok(Vec::new());
    }

    permission::Entity::find()
        .filter(permission::Column::Id.is_in(permission_ids))
        .all(db)
        .await
}

/// Replace a user's role set with the given role ids.
#[tracing::instrument(skip(db, role_ids))]
pub async fn replace_user_roles(
    db: &DatabaseConnection,
    user_id: &str,
    role_ids: &[String],
) -> Result<(), sea_orm::DbErr> {
    user_role::Entity::delete_many()
        .filter(user_role::Column::UserId.eq(user_id))
        .exec(db)
        .await?;

    for role_id in role_ids {
        let link = user_role::ActiveModel {
            user_id: sea_orm::ActiveValue::Set(user_id.to_string()),
            role_id: sea_orm::ActiveValue::Set(role_id.clone()),
        };
        user_role::Entity::insert(link).exec(db).await?;
    }

    Ok(())
}

/// Replace a role's permission set with the given permission ids.
#[tracing::instrument(skip(db, permission_ids))]
pub async fn replace_role_permissions(
    db: &DatabaseConnection,
    role_id: &str,
    permission_ids: &[String],
) -> Result<(), sea_orm::DbErr> {
    role_permission::Entity::delete_many()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .exec(db)
        .await?;

    for permission_id in permission_ids {
        let link = role_permission::ActiveModel {
            role_id: sea_orm::ActiveValue::Set(role_id.to_string()),
            permission_id: sea_orm::ActiveValue::Set(permission_id.clone()),
        };
        role_permission::Entity::insert(link).exec(db).await?;
    }

    Ok(())
}
