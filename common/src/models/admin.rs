//! Registry administrators.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::{AppError, AppResult};

/// bcrypt work factor for new password hashes.
pub const PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
}

impl Admin {
    pub fn check_password(&self, password: &str) -> bool {
        verify_password(password, &self.password_hash)
    }
}

/// Hashes a password with bcrypt. The result starts with `$2b$`.
pub fn hash_password(password: &str) -> AppResult<String> {
    hash_password_with_cost(password, PASSWORD_COST)
}

pub fn hash_password_with_cost(password: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(password, cost)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Checks a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Request body for `POST /admin/sign_in`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignInRequest {
    #[validate(length(min = 1, max = 255))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignInResponse {
    pub token: String,
    pub username: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}
