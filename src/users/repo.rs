use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RepoError;
use crate::users::repo_types::{Employee, Role, UserRecord, WirelessProvider};

const EMAIL_UNIQUE_INDEX: &str = "index_users_on_lower_email";
const PROVIDER_FKEY: &str = "users_wireless_provider_id_fkey";

const USER_COLUMNS: &str = r#"
    id, type, name, email, password_digest, confirmed, confirmation_code,
    password_reset_required, reset_code, admin, remember_token, phone,
    alternate_phone, bio, image, wireless_provider_id, created_at, updated_at
"#;

/// Persistence for the shared `users` table and its associations.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>>;
    /// Case-insensitive.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>>;
    async fn find_by_remember_token(&self, token: &str) -> anyhow::Result<Option<UserRecord>>;
    async fn list_by_role(&self, role: Role) -> anyhow::Result<Vec<UserRecord>>;
    async fn count_by_role(&self, role: Role) -> anyhow::Result<i64>;
    /// Whether a user other than `except` already holds `email`, ignoring case.
    async fn email_taken(&self, email: &str, except: Uuid) -> anyhow::Result<bool>;
    /// Fails with `RepoError::UnknownProvider` when `wireless_provider_id`
    /// names no stored provider.
    async fn insert(&self, user: &UserRecord) -> Result<(), RepoError>;
    /// Writes every column except `id`, `created_at` and `confirmation_code`.
    async fn update(&self, user: &UserRecord) -> Result<(), RepoError>;
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    async fn find_provider(&self, id: Uuid) -> anyhow::Result<Option<WirelessProvider>>;
    async fn list_providers(&self) -> anyhow::Result<Vec<WirelessProvider>>;
    async fn insert_provider(&self, provider: &WirelessProvider) -> anyhow::Result<()>;

    async fn employees_of(&self, user_id: Uuid) -> anyhow::Result<Vec<Employee>>;
    async fn insert_employee(&self, employee: &Employee) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_err(e: sqlx::Error, what: &'static str) -> RepoError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() && db_err.constraint() == Some(EMAIL_UNIQUE_INDEX) {
            return RepoError::DuplicateEmail;
        }
        if db_err.is_foreign_key_violation() && db_err.constraint() == Some(PROVIDER_FKEY) {
            return RepoError::UnknownProvider;
        }
    }
    RepoError::Other(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_remember_token(&self, token: &str) -> anyhow::Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE remember_token = $1",
            USER_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .context("find user by remember token")?;
        Ok(user)
    }

    async fn list_by_role(&self, role: Role) -> anyhow::Result<Vec<UserRecord>> {
        let users = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE type = $1 ORDER BY created_at ASC",
            USER_COLUMNS
        ))
        .bind(role.as_str())
        .fetch_all(&self.db)
        .await
        .context("list users by type")?;
        Ok(users)
    }

    async fn count_by_role(&self, role: Role) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE type = $1")
            .bind(role.as_str())
            .fetch_one(&self.db)
            .await
            .context("count users by type")?;
        Ok(count)
    }

    async fn email_taken(&self, email: &str, except: Uuid) -> anyhow::Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users WHERE lower(email) = lower($1) AND id <> $2
            )
            "#,
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.db)
        .await
        .context("check email uniqueness")?;
        Ok(taken)
    }

    async fn insert(&self, user: &UserRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, type, name, email, password_digest, confirmed, confirmation_code,
                password_reset_required, reset_code, admin, remember_token, phone,
                alternate_phone, bio, image, wireless_provider_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(user.id)
        .bind(user.role.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_digest)
        .bind(user.confirmed)
        .bind(&user.confirmation_code)
        .bind(user.password_reset_required)
        .bind(&user.reset_code)
        .bind(user.admin)
        .bind(&user.remember_token)
        .bind(&user.phone)
        .bind(&user.alternate_phone)
        .bind(&user.bio)
        .bind(&user.image)
        .bind(user.wireless_provider_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_err(e, "insert user"))?;
        Ok(())
    }

    async fn update(&self, user: &UserRecord) -> Result<(), RepoError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET type = $2, name = $3, email = $4, password_digest = $5, confirmed = $6,
                   password_reset_required = $7, reset_code = $8, admin = $9,
                   remember_token = $10, phone = $11, alternate_phone = $12, bio = $13,
                   image = $14, wireless_provider_id = $15, updated_at = $16
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(user.role.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_digest)
        .bind(user.confirmed)
        .bind(user.password_reset_required)
        .bind(&user.reset_code)
        .bind(user.admin)
        .bind(&user.remember_token)
        .bind(&user.phone)
        .bind(&user.alternate_phone)
        .bind(&user.bio)
        .bind(&user.image)
        .bind(user.wireless_provider_id)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_err(e, "update user"))?;

        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn find_provider(&self, id: Uuid) -> anyhow::Result<Option<WirelessProvider>> {
        let provider = sqlx::query_as::<_, WirelessProvider>(
            "SELECT id, name, domain, created_at FROM wireless_providers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find wireless provider")?;
        Ok(provider)
    }

    async fn list_providers(&self) -> anyhow::Result<Vec<WirelessProvider>> {
        let providers = sqlx::query_as::<_, WirelessProvider>(
            "SELECT id, name, domain, created_at FROM wireless_providers ORDER BY name ASC",
        )
        .fetch_all(&self.db)
        .await
        .context("list wireless providers")?;
        Ok(providers)
    }

    async fn insert_provider(&self, provider: &WirelessProvider) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wireless_providers (id, name, domain, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(provider.id)
        .bind(&provider.name)
        .bind(&provider.domain)
        .bind(provider.created_at)
        .execute(&self.db)
        .await
        .with_context(|| format!("insert wireless provider {}", provider.domain))?;
        Ok(())
    }

    async fn employees_of(&self, user_id: Uuid) -> anyhow::Result<Vec<Employee>> {
        let employees = sqlx::query_as::<_, Employee>(
            r#"
            SELECT id, user_id, name, created_at
              FROM employees
             WHERE user_id = $1
             ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list employees by user")?;
        Ok(employees)
    }

    async fn insert_employee(&self, employee: &Employee) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO employees (id, user_id, name, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(employee.id)
        .bind(employee.user_id)
        .bind(&employee.name)
        .bind(employee.created_at)
        .execute(&self.db)
        .await
        .context("insert employee")?;
        Ok(())
    }
}
