//! Outbound collaborators: admission control and the upstream provider.

pub mod rate_limiter;
pub mod upstream;

pub use rate_limiter::TokenBucket;
pub use upstream::{UpstreamClient, UpstreamError};
