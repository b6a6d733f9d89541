//! Access-token JWTs.
//!
//! Access tokens are short-lived HS256 JWTs. The console decodes the `exp`
//! claim client-side to decide when to refresh, so the token must stay a
//! standard three-part JWT rather than an opaque string.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub iss: String,
    pub iat: usize,
    pub exp: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Mint an access token for a user.
#[tracing::instrument(skip(secret, roles, permissions))]
pub fn issue_access_token(
    secret: &str,
    issuer: &str,
    lifetime_secs: i64,
    user_id: &str,
    email: &str,
    roles: Vec<String>,
    permissions: Vec<String>,
    scope: Option<String>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = OffsetDateTime::now_utc();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        roles,
        permissions,
        iss: issuer.to_string(),
        iat: now.unix_timestamp() as usize,
        exp: (now + time::Duration::seconds(lifetime_secs)).unix_timestamp() as usize,
        scope,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify an access token and return its claims.
///
/// Checks the signature, expiry and issuer.
pub fn verify_access_token(
    secret: &str,
    issuer: &str,
    token: &str,
) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.set_issuer(&[issuer]);
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const ISSUER: &str = "http://localhost:8080";

    fn issue(lifetime: i64) -> String {
        issue_access_token(
            SECRET,
            ISSUER,
            lifetime,
            "user-123",
            "test@example.org",
            vec!["admin".to_string()],
            vec!["users:read".to_string(), "users:write".to_string()],
            None,
        )
        .expect("issue token")
    }

    #[test]
    fn test_round_trip() {
        let token = issue(3600);
        let claims = verify_access_token(SECRET, ISSUER, &token).expect("verify token");
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.email, "test@example.org");
        assert_eq!(claims.roles, vec!["admin"]);
        assert!(claims.permissions.contains(&"users:write".to_string()));
        assert_eq!(claims.iss, ISSUER);
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let token = issue(3600);
        assert!(verify_access_token("another-secret-another-secret-xx", ISSUER, &token).is_err());
    }

    #[test]
    fn test_rejects_wrong_issuer() {
        let token = issue(3600);
        assert!(verify_access_token(SECRET, "http://evil.example.org", &token).is_err());
    }

    #[test]
    fn test_rejects_expired_token() {
        // jsonwebtoken's default leeway is 60s, so go well past it
        let token = issue(-120);
        assert!(verify_access_token(SECRET, ISSUER, &token).is_err());
    }

    #[test]
    fn test_token_is_three_part_jwt() {
        // The console splits on '.' and base64-decodes the payload
        let token = issue(3600);
        assert_eq!(token.split('.').count(), 3);
    }
}
