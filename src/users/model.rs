use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::UserError;
use crate::users::password;

/// Source of "now" for record timestamps. Stores take this at construction so
/// tests can pin time; production passes `OffsetDateTime::now_utc`.
pub type Clock = fn() -> OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "gender", rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "verification_method", rename_all = "snake_case")]
pub enum VerificationMethod {
    Email,
    Mobile,
    Biometric,
}

/// An account record. Fields marked `skip_serializing` never leave the
/// process in serialized form; administrative reads go through
/// `RecordScope::All` instead of a serialization escape hatch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub photo: Option<String>,
    pub role: Role,

    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_reset_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing, default)]
    pub password_reset_retries: i32,
    pub password_changed_at: Option<OffsetDateTime>,
    pub login_retries: i32,
    pub last_login: Option<OffsetDateTime>,
    #[serde(skip_serializing, default)]
    pub ip_address: Option<String>,

    pub is_id_verified: bool,
    pub is_email_verified: bool,
    pub is_mobile_verified: bool,
    pub is_profile_complete: bool,
    pub verification_method: Option<VerificationMethod>,
    #[serde(skip_serializing, default)]
    pub verification_token: Option<String>,

    pub is_suspended: bool,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,

    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields a new account starts from. Everything else defaults.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub password_hash: Option<String>,
    pub ip_address: Option<String>,
}

/// The default public projection returned by `to_json(None)`.
pub const PUBLIC_FIELDS: [&str; 5] = ["id", "firstName", "lastName", "email", "photo"];

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Canonical form stored and compared for uniqueness.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_name(field: &str, value: &str) -> Result<(), UserError> {
    let len = value.chars().count();
    if !(2..=50).contains(&len) {
        return Err(UserError::validation(format!(
            "{field} must be between 2 and 50 characters"
        )));
    }
    Ok(())
}

impl NewUser {
    pub fn validate(&self) -> Result<(), UserError> {
        validate_name("firstName", &self.first_name)?;
        validate_name("lastName", &self.last_name)?;
        if !is_valid_email(&normalize_email(&self.email)) {
            return Err(UserError::validation("email is not a valid address"));
        }
        if self.phone_number.trim().is_empty() {
            return Err(UserError::validation("phoneNumber is required"));
        }
        Ok(())
    }
}

impl User {
    /// Builds the stored record for a validated `NewUser`. Timestamps come
    /// from the caller's clock; nothing here reads the wall clock.
    pub fn from_new(new: NewUser, id: Uuid, now: OffsetDateTime) -> Self {
        let mut user = Self {
            id,
            email: normalize_email(&new.email),
            phone_number: new.phone_number,
            first_name: new.first_name,
            last_name: new.last_name,
            gender: new.gender,
            photo: None,
            role: Role::User,
            password_hash: new.password_hash,
            refresh_token: None,
            password_reset_token: None,
            password_reset_expires: None,
            password_reset_retries: 0,
            password_changed_at: None,
            login_retries: 0,
            last_login: None,
            ip_address: new.ip_address,
            is_id_verified: false,
            is_email_verified: false,
            is_mobile_verified: false,
            is_profile_complete: false,
            verification_method: None,
            verification_token: None,
            is_suspended: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        user.refresh_profile_complete();
        user
    }

    pub fn validate(&self) -> Result<(), UserError> {
        validate_name("firstName", &self.first_name)?;
        validate_name("lastName", &self.last_name)?;
        if !is_valid_email(&self.email) {
            return Err(UserError::validation("email is not a valid address"));
        }
        if self.phone_number.trim().is_empty() {
            return Err(UserError::validation("phoneNumber is required"));
        }
        Ok(())
    }

    /// True when every completeness-determining field is populated: both
    /// names, email, phone number, photo, gender, and the three verification
    /// flags. Gender is non-optional on this record so it cannot fail the
    /// rule.
    pub fn profile_is_complete(&self) -> bool {
        !self.first_name.trim().is_empty()
            && !self.last_name.trim().is_empty()
            && !self.email.is_empty()
            && !self.phone_number.trim().is_empty()
            && self.photo.as_deref().is_some_and(|p| !p.is_empty())
            && self.is_id_verified
            && self.is_email_verified
            && self.is_mobile_verified
    }

    /// Pre-save hook: recompute completeness while it is still false. Once a
    /// profile has been complete it stays marked complete.
    pub fn refresh_profile_complete(&mut self) {
        if !self.is_profile_complete {
            self.is_profile_complete = self.profile_is_complete();
        }
    }

    /// False when no password hash is stored, otherwise whether `candidate`
    /// matches it. Never errors; a mismatch is just `false`.
    pub fn verify_password(&self, candidate: &str) -> bool {
        match self.password_hash.as_deref() {
            None => false,
            Some(hash) => password::verify_password(candidate, hash),
        }
    }

    /// Serialization policy, in three modes:
    /// - `None` — the minimal public projection `{id, firstName, lastName,
    ///   email, photo}`;
    /// - `Some(&[])` — the full (non-hidden) object unchanged;
    /// - `Some(fields)` — the full object minus exactly the named keys.
    pub fn to_json(&self, omit: Option<&[&str]>) -> Value {
        // Plain struct with string keys; this serialization cannot fail.
        let mut value = serde_json::to_value(self).expect("user serializes to json");
        if let Value::Object(map) = &mut value {
            match omit {
                None => map.retain(|key, _| PUBLIC_FIELDS.contains(&key.as_str())),
                Some(fields) => {
                    for field in fields {
                        map.remove(*field);
                    }
                }
            }
        }
        value
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn sample_new_user() -> NewUser {
        NewUser {
            email: "Ada.Obi@Example.com ".into(),
            phone_number: "+2348012345678".into(),
            first_name: "Ada".into(),
            last_name: "Obi".into(),
            gender: Gender::Female,
            password_hash: None,
            ip_address: Some("203.0.113.7".into()),
        }
    }

    pub fn sample_user() -> User {
        let now = time::macros::datetime!(2025-01-15 10:00 UTC);
        User::from_new(sample_new_user(), Uuid::new_v4(), now)
    }
}
