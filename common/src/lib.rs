//! Shared library for the library registry.
//!
//! Holds the domain models, the search engine, the place loader and the
//! ambient pieces (configuration, errors, response envelope, middleware)
//! used by the registry binaries.

pub mod config;
pub mod errors;
pub mod geometry_loader;
pub mod middleware;
pub mod models;
pub mod response;
pub mod search;
pub mod utils;

pub use errors::{AppError, AppResult};
