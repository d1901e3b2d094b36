//! Data model: identifier codec and consumer-facing shapes.

pub mod identifier;
pub mod provider;

pub use identifier::{DecodeError, Identifier};
pub use provider::{Candidate, ChildrenPage, EntityKind, ResolveRequest};
