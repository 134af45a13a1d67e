use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::UserError;
use crate::users::repo::UserStore;

/// Claims carried by both token kinds. The two kinds are told apart by their
/// signing secrets, not by a claim.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
}

/// Per-call overrides merged over the configured signing defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignOptions {
    pub expires_in: Option<Duration>,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn new(secret: &str, ttl_minutes: i64) -> Self {
        // A non-positive configured ttl yields an already-expired token, not
        // a wrapped-around multi-century one.
        let ttl_secs = u64::try_from(ttl_minutes).unwrap_or(0) * 60;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }
}

/// Independent access and refresh signing material built from config.
pub struct JwtKeys {
    access: KeyPair,
    refresh: KeyPair,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access: KeyPair::new(&config.access_secret, config.access_ttl_minutes),
            refresh: KeyPair::new(&config.refresh_secret, config.refresh_ttl_minutes),
        }
    }

    fn sign_with(&self, pair: &KeyPair, user_id: Uuid, opts: SignOptions) -> Result<String, UserError> {
        let now = OffsetDateTime::now_utc();
        let ttl = opts.expires_in.unwrap_or(pair.ttl);
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &pair.encoding)?;
        debug!(user_id = %user_id, ttl_secs = ttl.as_secs(), "jwt signed");
        Ok(token)
    }

    /// Signs an access token for `user_id`. No side effects.
    pub fn sign_access(&self, user_id: Uuid, opts: SignOptions) -> Result<String, UserError> {
        self.sign_with(&self.access, user_id, opts)
    }

    /// Signs a refresh token and persists it onto the stored record before
    /// returning it. A failed write propagates; the caller never receives a
    /// token that the store does not also hold.
    pub async fn sign_refresh(
        &self,
        user_id: Uuid,
        store: &dyn UserStore,
        opts: SignOptions,
    ) -> Result<String, UserError> {
        let token = self.sign_with(&self.refresh, user_id, opts)?;
        store.set_refresh_token(user_id, &token).await?;
        Ok(token)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, UserError> {
        let data = decode::<Claims>(token, &self.access.decoding, &Validation::default())?;
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, UserError> {
        let data = decode::<Claims>(token, &self.refresh.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}
