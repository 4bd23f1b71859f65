//! Administrator accounts.

use common::errors::{AppError, AppResult};
use common::models::admin::{hash_password, Admin};

use super::{unique_violation, PgStore};

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: i64,
    username: String,
    password_hash: String,
}

impl From<AdminRow> for Admin {
    fn from(row: AdminRow) -> Self {
        Admin {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
        }
    }
}

/// Hashes on the blocking pool.
async fn hash_blocking(password: &str) -> AppResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
}

impl PgStore {
    pub async fn admin_count(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn admin_by_username(&self, username: &str) -> AppResult<Option<Admin>> {
        let row: Option<AdminRow> =
            sqlx::query_as("SELECT id, username, password_hash FROM admins WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Admin::from))
    }

    pub async fn create_admin(&self, username: &str, password: &str) -> AppResult<Admin> {
        let password_hash = hash_blocking(password).await?;
        let row: AdminRow = sqlx::query_as(
            "INSERT INTO admins (username, password_hash) VALUES ($1, $2)
             RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "an admin with this username"))?;

        tracing::info!(username = %row.username, "管理员账号已创建");
        Ok(row.into())
    }

    /// Creates an admin only while the table is empty.
    ///
    /// An advisory lock serialises concurrent callers, so at most one of them
    /// gets `Some`.
    pub async fn create_first_admin(
        &self,
        username: &str,
        password: &str,
    ) -> AppResult<Option<Admin>> {
        let password_hash = hash_blocking(password).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('admins'))")
            .execute(&mut *tx)
            .await?;
        let row: Option<AdminRow> = sqlx::query_as(
            "INSERT INTO admins (username, password_hash)
             SELECT $1, $2 WHERE NOT EXISTS (SELECT 1 FROM admins)
             RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(&password_hash)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Some(row) = &row {
            tracing::info!(username = %row.username, "首个管理员账号已创建");
        }
        Ok(row.map(Admin::from))
    }

    /// Checks credentials. While no admin exists, the first sign-in creates one.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<Option<Admin>> {
        if self.admin_count().await? == 0 {
            if let Some(admin) = self.create_first_admin(username, password).await? {
                return Ok(Some(admin));
            }
        }

        let Some(admin) = self.admin_by_username(username).await? else {
            return Ok(None);
        };
        let candidate = password.to_string();
        let checked = admin.clone();
        let valid = tokio::task::spawn_blocking(move || checked.check_password(&candidate))
            .await
            .map_err(|e| AppError::Internal(format!("password check task failed: {e}")))?;
        Ok(valid.then_some(admin))
    }

    /// Creates the configured admin when the table is empty.
    pub async fn seed_default_admin(&self, username: &str, password: &str) -> AppResult<()> {
        if self.admin_count().await? > 0 {
            return Ok(());
        }
        if self.create_first_admin(username, password).await?.is_some() {
            tracing::warn!(username = %username, "已创建默认管理员账号，请尽快修改密码");
        }
        Ok(())
    }
}
