//! Resolution services.

pub mod hierarchy;
pub mod resolver;

pub use resolver::{Resolver, MATCH_PAGE_SIZE};
