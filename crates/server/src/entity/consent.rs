//! Consent entity - a user's recorded approval of a client's scope set.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_consents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    /// Space-separated union of all scopes the user has granted this client
    pub scopes: String,
    pub granted_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse granted scopes from space-separated string
    pub fn scopes_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(String::from).collect()
    }

    /// Check if every scope in the requested set is already granted
    pub fn covers(&self, requested: &str) -> bool {
        let granted = self.scopes_list();
        requested
            .split_whitespace()
            .all(|s| granted.iter().any(|g| g == s))
    }
}
