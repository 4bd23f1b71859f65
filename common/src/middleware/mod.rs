//! Middleware components for the registry service.

pub mod auth;
pub mod request_id;

// Re-export commonly used types
pub use auth::{require_admin, AdminSessions, AuthenticatedAdmin, SessionToken};
pub use request_id::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
