//! Audit log entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: Option<String>,
    /// Dotted action name, e.g. `auth.login`, `client.secret_rotate`
    pub action: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// JSON object with action-specific context
    pub metadata: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
