use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::UserError;
use crate::users::model::{normalize_email, Clock, NewUser, User};

/// Read filter applied by every query method. `Active` is the default
/// request-path view; `All` is the administrative bypass that also sees
/// soft-deleted and suspended records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    Active,
    All,
}

impl RecordScope {
    fn include_hidden(self) -> bool {
        matches!(self, Self::All)
    }

    fn permits(self, user: &User) -> bool {
        match self {
            Self::All => true,
            Self::Active => !user.is_deleted && !user.is_suspended,
        }
    }
}

/// Persistence boundary for user records. The external document store sits
/// behind this trait; every implementation applies the same pre-save hooks
/// (validation, completeness recompute, updated_at bump).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid, scope: RecordScope) -> Result<Option<User>, UserError>;
    async fn find_by_email(
        &self,
        email: &str,
        scope: RecordScope,
    ) -> Result<Option<User>, UserError>;
    async fn find_by_phone(
        &self,
        phone: &str,
        scope: RecordScope,
    ) -> Result<Option<User>, UserError>;
    async fn create(&self, new: NewUser) -> Result<User, UserError>;
    /// Persists the record, mutating it in place with the hook results.
    async fn save(&self, user: &mut User) -> Result<(), UserError>;
    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<(), UserError>;
}

pub struct PgUserStore {
    db: PgPool,
    clock: Clock,
}

impl PgUserStore {
    pub fn new(db: PgPool, clock: Clock) -> Self {
        Self { db, clock }
    }
}

fn map_unique_violation(err: sqlx::Error) -> UserError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or_default();
            if constraint.contains("email") {
                return UserError::Conflict { field: "email" };
            }
            if constraint.contains("phone") {
                return UserError::Conflict { field: "phoneNumber" };
            }
        }
    }
    UserError::Database(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid, scope: RecordScope) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE id = $1 AND (NOT is_deleted AND NOT is_suspended OR $2)
            "#,
        )
        .bind(id)
        .bind(scope.include_hidden())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(
        &self,
        email: &str,
        scope: RecordScope,
    ) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE email = $1 AND (NOT is_deleted AND NOT is_suspended OR $2)
            "#,
        )
        .bind(normalize_email(email))
        .bind(scope.include_hidden())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_phone(
        &self,
        phone: &str,
        scope: RecordScope,
    ) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE phone_number = $1 AND (NOT is_deleted AND NOT is_suspended OR $2)
            "#,
        )
        .bind(phone)
        .bind(scope.include_hidden())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User, UserError> {
        new.validate()?;
        let record = User::from_new(new, Uuid::new_v4(), (self.clock)());
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, email, phone_number, first_name, last_name, gender, photo, role,
                password_hash, refresh_token, password_reset_token, password_reset_expires,
                password_reset_retries, password_changed_at, login_retries, last_login,
                ip_address, is_id_verified, is_email_verified, is_mobile_verified,
                is_profile_complete, verification_method, verification_token,
                is_suspended, is_deleted, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
            )
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(&record.email)
        .bind(&record.phone_number)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(record.gender)
        .bind(&record.photo)
        .bind(record.role)
        .bind(&record.password_hash)
        .bind(&record.refresh_token)
        .bind(&record.password_reset_token)
        .bind(record.password_reset_expires)
        .bind(record.password_reset_retries)
        .bind(record.password_changed_at)
        .bind(record.login_retries)
        .bind(record.last_login)
        .bind(&record.ip_address)
        .bind(record.is_id_verified)
        .bind(record.is_email_verified)
        .bind(record.is_mobile_verified)
        .bind(record.is_profile_complete)
        .bind(record.verification_method)
        .bind(&record.verification_token)
        .bind(record.is_suspended)
        .bind(record.is_deleted)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    async fn save(&self, user: &mut User) -> Result<(), UserError> {
        user.email = normalize_email(&user.email);
        user.validate()?;
        user.refresh_profile_complete();
        user.updated_at = (self.clock)();
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = $2, phone_number = $3, first_name = $4, last_name = $5,
                gender = $6, photo = $7, role = $8, password_hash = $9,
                refresh_token = $10, password_reset_token = $11,
                password_reset_expires = $12, password_reset_retries = $13,
                password_changed_at = $14, login_retries = $15, last_login = $16,
                ip_address = $17, is_id_verified = $18, is_email_verified = $19,
                is_mobile_verified = $20, is_profile_complete = $21,
                verification_method = $22, verification_token = $23,
                is_suspended = $24, is_deleted = $25, updated_at = $26
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.gender)
        .bind(&user.photo)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(&user.refresh_token)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(user.password_reset_retries)
        .bind(user.password_changed_at)
        .bind(user.login_retries)
        .bind(user.last_login)
        .bind(&user.ip_address)
        .bind(user.is_id_verified)
        .bind(user.is_email_verified)
        .bind(user.is_mobile_verified)
        .bind(user.is_profile_complete)
        .bind(user.verification_method)
        .bind(&user.verification_token)
        .bind(user.is_suspended)
        .bind(user.is_deleted)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(map_unique_violation)?;
        if result.rows_affected() == 0 {
            return Err(UserError::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<(), UserError> {
        let now = (self.clock)();
        let result = sqlx::query(
            r#"
            UPDATE users SET refresh_token = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(now)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(UserError::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }
}

/// In-memory store. Backs `AppState::fake()` and the repository-layer tests;
/// applies the same hooks and uniqueness rules as the Postgres store.
pub struct MemoryUserStore {
    records: Mutex<HashMap<Uuid, User>>,
    clock: Clock,
    fail_writes: AtomicBool,
}

impl MemoryUserStore {
    pub fn new(clock: Clock) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail with a database error.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), UserError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(UserError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    fn check_unique(&self, records: &HashMap<Uuid, User>, user: &User) -> Result<(), UserError> {
        for other in records.values() {
            if other.id == user.id || other.is_deleted {
                continue;
            }
            if other.email == user.email {
                return Err(UserError::Conflict { field: "email" });
            }
            if other.phone_number == user.phone_number {
                return Err(UserError::Conflict { field: "phoneNumber" });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid, scope: RecordScope) -> Result<Option<User>, UserError> {
        let records = self.records.lock().expect("user store lock");
        Ok(records.get(&id).filter(|u| scope.permits(u)).cloned())
    }

    async fn find_by_email(
        &self,
        email: &str,
        scope: RecordScope,
    ) -> Result<Option<User>, UserError> {
        let email = normalize_email(email);
        let records = self.records.lock().expect("user store lock");
        Ok(records
            .values()
            .find(|u| u.email == email && scope.permits(u))
            .cloned())
    }

    async fn find_by_phone(
        &self,
        phone: &str,
        scope: RecordScope,
    ) -> Result<Option<User>, UserError> {
        let records = self.records.lock().expect("user store lock");
        Ok(records
            .values()
            .find(|u| u.phone_number == phone && scope.permits(u))
            .cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, UserError> {
        self.check_writable()?;
        new.validate()?;
        let user = User::from_new(new, Uuid::new_v4(), (self.clock)());
        let mut records = self.records.lock().expect("user store lock");
        self.check_unique(&records, &user)?;
        records.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &mut User) -> Result<(), UserError> {
        self.check_writable()?;
        user.email = normalize_email(&user.email);
        user.validate()?;
        user.refresh_profile_complete();
        user.updated_at = (self.clock)();
        let mut records = self.records.lock().expect("user store lock");
        if !records.contains_key(&user.id) {
            return Err(UserError::Database(sqlx::Error::RowNotFound));
        }
        self.check_unique(&records, user)?;
        records.insert(user.id, user.clone());
        Ok(())
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<(), UserError> {
        self.check_writable()?;
        let mut records = self.records.lock().expect("user store lock");
        let user = records
            .get_mut(&id)
            .ok_or(UserError::Database(sqlx::Error::RowNotFound))?;
        user.refresh_token = Some(token.to_string());
        user.updated_at = (self.clock)();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::test_support::sample_new_user;
    use time::OffsetDateTime;

    fn fixed_clock() -> OffsetDateTime {
        time::macros::datetime!(2025-03-01 12:00 UTC)
    }

    fn store() -> MemoryUserStore {
        MemoryUserStore::new(fixed_clock)
    }

    #[tokio::test]
    async fn active_scope_hides_deleted_and_suspended_records() {
        let store = store();
        let mut user = store.create(sample_new_user()).await.expect("create");

        user.is_suspended = true;
        store.save(&mut user).await.expect("save");
        assert!(store
            .find_by_id(user.id, RecordScope::Active)
            .await
            .expect("find")
            .is_none());
        assert!(store
            .find_by_email(&user.email, RecordScope::Active)
            .await
            .expect("find")
            .is_none());

        user.is_suspended = false;
        user.is_deleted = true;
        store.save(&mut user).await.expect("save");
        assert!(store
            .find_by_id(user.id, RecordScope::Active)
            .await
            .expect("find")
            .is_none());

        // Administrative bypass still sees the record.
        let found = store
            .find_by_id(user.id, RecordScope::All)
            .await
            .expect("find")
            .expect("record visible to All scope");
        assert!(found.is_deleted);
    }

    #[tokio::test]
    async fn duplicate_email_and_phone_are_conflicts() {
        let store = store();
        store.create(sample_new_user()).await.expect("create");

        let same_email = sample_new_user();
        let err = store.create(same_email).await.unwrap_err();
        assert!(matches!(err, UserError::Conflict { field: "email" }));

        let mut same_phone = sample_new_user();
        same_phone.email = "other@example.com".into();
        let err = store.create(same_phone).await.unwrap_err();
        assert!(matches!(err, UserError::Conflict { field: "phoneNumber" }));
    }

    #[tokio::test]
    async fn deleted_records_do_not_block_reuse_of_email() {
        let store = store();
        let mut user = store.create(sample_new_user()).await.expect("create");
        user.is_deleted = true;
        store.save(&mut user).await.expect("save");

        store
            .create(sample_new_user())
            .await
            .expect("email of a deleted record is reusable");
    }

    #[tokio::test]
    async fn save_recomputes_completeness_until_true() {
        let store = store();
        let mut user = store.create(sample_new_user()).await.expect("create");
        assert!(!user.is_profile_complete);

        user.photo = Some("photo.png".into());
        user.is_id_verified = true;
        user.is_email_verified = true;
        user.is_mobile_verified = true;
        store.save(&mut user).await.expect("save");
        assert!(user.is_profile_complete);
        assert_eq!(user.updated_at, fixed_clock());

        // Dropping a field later must not revert the flag.
        user.photo = None;
        store.save(&mut user).await.expect("save");
        assert!(user.is_profile_complete);
        let stored = store
            .find_by_id(user.id, RecordScope::Active)
            .await
            .expect("find")
            .expect("present");
        assert!(stored.is_profile_complete);
    }

    #[tokio::test]
    async fn save_normalizes_email_and_keeps_case_variants_unique() {
        let store = store();
        let mut first = store.create(sample_new_user()).await.expect("create");

        let mut other_new = sample_new_user();
        other_new.email = "someone.else@example.com".into();
        other_new.phone_number = "+2348099999999".into();
        let mut second = store.create(other_new).await.expect("create");

        // A case/whitespace variant of an existing email is still a duplicate.
        second.email = " ADA.OBI@Example.com".into();
        let err = store.save(&mut second).await.unwrap_err();
        assert!(matches!(err, UserError::Conflict { field: "email" }));

        // A case variant of the record's own email saves, canonicalized.
        first.email = "Ada.Obi@EXAMPLE.COM".into();
        store.save(&mut first).await.expect("save own email variant");
        assert_eq!(first.email, "ada.obi@example.com");
        let stored = store
            .find_by_id(first.id, RecordScope::Active)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.email, "ada.obi@example.com");
    }

    #[tokio::test]
    async fn save_requires_an_existing_record() {
        let store = store();
        let mut user = User::from_new(sample_new_user(), Uuid::new_v4(), fixed_clock());
        let err = store.save(&mut user).await.unwrap_err();
        assert!(matches!(
            err,
            UserError::Database(sqlx::Error::RowNotFound)
        ));
    }

    #[tokio::test]
    async fn find_by_email_normalizes_the_lookup_key() {
        let store = store();
        let user = store.create(sample_new_user()).await.expect("create");
        let found = store
            .find_by_email(" ADA.OBI@Example.com ", RecordScope::Active)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn save_rejects_invalid_mutations() {
        let store = store();
        let mut user = store.create(sample_new_user()).await.expect("create");
        user.first_name = "X".into();
        let err = store.save(&mut user).await.unwrap_err();
        assert!(matches!(err, UserError::Validation(_)));
    }
}
