use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Everything the process reads from its environment. Built once at startup
/// and injected through `AppState`; nothing else touches `std::env`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub port: u16,
    pub client_origin: String,
    pub database_url: String,
    pub redis_url: String,
    pub redis_password: String,
    pub email_api_key: String,
    pub frontend_url: String,
    pub jwt: JwtConfig,
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("{key} is not set"))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            access_ttl_minutes: std::env::var("ACCESS_TOKEN_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(15),
            refresh_ttl_minutes: std::env::var("REFRESH_TOKEN_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 30),
        };
        anyhow::ensure!(
            jwt.access_ttl_minutes > 0 && jwt.refresh_ttl_minutes > 0,
            "token TTL minutes must be positive"
        );
        Ok(Self {
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "abeghelp".into()),
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            client_origin: required("CLIENT_ORIGIN")?,
            database_url: required("DATABASE_URL")?,
            // Carried for the external queue system; nothing in this crate
            // dials Redis itself.
            redis_url: required("REDIS_URL")?,
            redis_password: std::env::var("REDIS_PASSWORD").unwrap_or_default(),
            email_api_key: required("EMAIL_API_KEY")?,
            frontend_url: required("FRONTEND_URL")?,
            jwt,
        })
    }
}
