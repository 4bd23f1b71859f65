//! Admin authentication.
//!
//! Signing in issues an opaque bearer token held in memory until it expires.
//! [`require_admin`] guards the `/admin` routes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;

/// Admin identity attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAdmin(pub String);

/// Bearer token of the session that authenticated the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(pub String);

#[derive(Debug, Clone)]
struct Session {
    username: String,
    expires_at: DateTime<Utc>,
}

/// In-memory table of admin sessions.
#[derive(Clone)]
pub struct AdminSessions {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl AdminSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Starts a session and returns its token and expiry.
    pub async fn issue(&self, username: &str) -> (String, DateTime<Utc>) {
        let token = Uuid::new_v4().to_string();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(8));
        let expires_at = Utc::now() + ttl;

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > Utc::now());
        sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at,
            },
        );
        tracing::info!(username = %username, "admin session started");
        (token, expires_at)
    }

    /// Username for a live session token.
    pub async fn validate(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| s.username.clone())
    }

    /// Ends a session. Returns whether the token was known.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

/// Rejects requests without a live admin bearer token.
///
/// # Arguments
/// * `sessions` - Live admin sessions
/// * `req` - The incoming HTTP request
/// * `next` - The next middleware or handler in the chain
///
/// # Returns
/// The downstream response, with [`AuthenticatedAdmin`] and [`SessionToken`]
/// available to handlers, or `401` when the token is missing or expired.
pub async fn require_admin(
    State(sessions): State<AdminSessions>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?
        .to_string();
    let username = sessions
        .validate(&token)
        .await
        .ok_or_else(|| AppError::Unauthorized("invalid or expired token".to_string()))?;

    req.extensions_mut().insert(AuthenticatedAdmin(username));
    req.extensions_mut().insert(SessionToken(token));
    Ok(next.run(req).await)
}

/// Extract bearer token from Authorization header.
pub fn extract_bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
