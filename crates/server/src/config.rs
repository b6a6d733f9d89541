use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SecurityConfig {
    /// Secret used to sign access-token JWTs. Must be at least 32 characters.
    pub jwt_secret: String,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    /// Refresh-token lifetime when the user ticks "remember me" at login.
    #[serde(default = "default_remember_me_refresh_lifetime")]
    pub remember_me_refresh_lifetime: i64,
    #[serde(default = "default_max_failed_logins")]
    pub max_failed_logins: i32,
    #[serde(default = "default_lockout_duration_secs")]
    pub lockout_duration_secs: i64,
    #[serde(default = "default_reset_token_lifetime")]
    pub reset_token_lifetime: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Issuer identifier placed in access tokens and discovery metadata.
    pub issuer_url: String,
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BootstrapConfig {
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub smtp: SmtpConfig,
    /// Base URL of the console SPA, used in emails and CORS-facing redirects.
    pub frontend_url: String,
    pub security: SecurityConfig,
    pub oauth2: OAuth2Config,
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 7
}

fn default_remember_me_refresh_lifetime() -> i64 {
    86400 * 30
}

fn default_max_failed_logins() -> i32 {
    5
}

fn default_lockout_duration_secs() -> i64 {
    900
}

fn default_reset_token_lifetime() -> i64 {
    3600
}

fn default_authorization_code_lifetime() -> i64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variable override convention: any var matching the key path
/// separated by double underscores (e.g. `SECURITY__JWT_SECRET`, `SMTP__PORT`)
/// overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.security.jwt_secret.len() < 32 {
        return Err(ConfigError::Validation(
            "security.jwt_secret must be at least 32 characters".into(),
        ));
    }
    if app.smtp.port == 0 {
        return Err(ConfigError::Validation("smtp.port must be > 0".into()));
    }
    if app.security.access_token_lifetime <= 0
        || app.security.refresh_token_lifetime <= 0
        || app.security.remember_me_refresh_lifetime <= 0
        || app.security.reset_token_lifetime <= 0
        || app.oauth2.authorization_code_lifetime <= 0
    {
        return Err(ConfigError::Validation(
            "token lifetimes must be positive".into(),
        ));
    }
    if app.security.max_failed_logins <= 0 {
        return Err(ConfigError::Validation(
            "security.max_failed_logins must be > 0".into(),
        ));
    }
    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: default_listen_addr(),
            smtp: SmtpConfig {
                server: "localhost".into(),
                port: 25,
                username: "test".into(),
                password: "test".into(),
                from: "noreply@test.example.org".into(),
            },
            frontend_url: "http://localhost:4200".into(),
            security: SecurityConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".into(),
                access_token_lifetime: default_access_token_lifetime(),
                refresh_token_lifetime: default_refresh_token_lifetime(),
                remember_me_refresh_lifetime: default_remember_me_refresh_lifetime(),
                max_failed_logins: default_max_failed_logins(),
                lockout_duration_secs: default_lockout_duration_secs(),
                reset_token_lifetime: default_reset_token_lifetime(),
            },
            oauth2: OAuth2Config {
                issuer_url: "http://localhost:8080".into(),
                authorization_code_lifetime: default_authorization_code_lifetime(),
            },
            bootstrap: BootstrapConfig {
                admin_email: "admin@example.org".into(),
                admin_password: "change-me-please".into(),
            },
            maintenance: MaintenanceConfig::default(),
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn rejects_short_jwt_secret() {
        let mut cfg = base_config();
        cfg.security.jwt_secret = "too-short".into();
        assert!(matches!(
            validate(&cfg),
            Err(ConfigError::Validation(msg)) if msg.contains("jwt_secret")
        ));
    }

    #[test]
    fn rejects_zero_smtp_port() {
        let mut cfg = base_config();
        cfg.smtp.port = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_non_positive_lifetimes() {
        let mut cfg = base_config();
        cfg.security.access_token_lifetime = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = base_config();
        cfg.oauth2.authorization_code_lifetime = -1;
        assert!(validate(&cfg).is_err());
    }
}
