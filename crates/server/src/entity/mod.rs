//! SeaORM entities for the CloseAuth data model.

pub mod audit_log;
pub mod authorization_code;
pub mod client;
pub mod client_branding;
pub mod consent;
pub mod permission;
pub mod reset_token;
pub mod role;
pub mod role_permission;
pub mod session;
pub mod user;
pub mod user_role;
