//! OAuth2 client entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Public client identifier presented in authorization requests
    #[sea_orm(unique)]
    pub client_id: String,
    /// SHA-256 hex digest of the client secret (None for public clients)
    pub secret_hash: Option<String>,
    /// Human-readable client name
    pub name: String,
    pub description: Option<String>,
    /// JSON array of allowed redirect URIs
    pub redirect_uris: String,
    /// Space-separated list of allowed grant types
    pub grant_types: String,
    /// Space-separated list of allowed scopes
    pub scopes: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: i64,
    /// Whether this is a public client (no secret, PKCE required)
    pub is_public: bool,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::client_branding::Entity")]
    Branding,
}

impl Related<super::client_branding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Branding.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse redirect URIs from JSON string
    pub fn redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }

    /// Parse grant types from space-separated string
    pub fn grant_types_list(&self) -> Vec<String> {
        self.grant_types
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// Parse scopes from space-separated string
    pub fn scopes_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(String::from).collect()
    }

    /// Check if a redirect URI is allowed for this client
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris_list()
            .iter()
            .any(|allowed| allowed == uri)
    }

    /// Check if a grant type is allowed for this client
    pub fn is_grant_type_allowed(&self, grant_type: &str) -> bool {
        self.grant_types_list().iter().any(|g| g == grant_type)
    }

    /// Check if every requested scope is allowed for this client
    pub fn are_scopes_allowed(&self, requested: &str) -> bool {
        let allowed = self.scopes_list();
        requested
            .split_whitespace()
            .all(|s| allowed.iter().any(|a| a == s))
    }

    /// Verify a presented secret against the stored digest
    pub fn verify_secret(&self, secret: &str) -> bool {
        match &self.secret_hash {
            Some(stored) => {
                use sha2::{Digest, Sha256};
                let mut hasher = Sha256::new();
                hasher.update(secret.as_bytes());
                let computed = format!("{:x}", hasher.finalize());
                &computed == stored
            }
            None => false,
        }
    }
}
