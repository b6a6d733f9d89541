//! Authentication and authorization domain logic.
//!
//! This module holds the pieces the HTTP handlers build on:
//!
//! - Password hashing and opaque token material (`password`)
//! - Access-token JWTs (`tokens`)
//! - Refresh-token sessions with strict rotation (`sessions`)
//! - Role/permission resolution (`rbac`)

pub mod password;
pub mod rbac;
pub mod sessions;
pub mod tokens;

pub use password::{generate_opaque_token, hash_opaque_token, hash_password, verify_password};
pub use tokens::{AccessClaims, issue_access_token, verify_access_token};
