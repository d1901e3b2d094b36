//! HTTP boundary layer.
//!
//! Thin axum handlers over the resolution engine and cache store. Route
//! construction lives with each handler module; `crate::build_router`
//! merges them.

pub mod cache_admin;
pub mod health;
pub mod resolve;

pub use cache_admin::cache_routes;
pub use health::health_routes;
pub use resolve::resolve_routes;
