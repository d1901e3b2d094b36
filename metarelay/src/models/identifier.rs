//! Opaque identifier codec.
//!
//! Every entity handed to the consumer carries a `mrel-*` identifier that
//! encodes exactly the fields needed to re-fetch it later. Identifiers are
//! derived on the way out and decoded on the way in; they are never stored.
//!
//! Grammar: `mrel-<kind>-<fields...>` with kind one of `collection`,
//! `bucket`, `item`, `media`, `person`. Decoding is total: anything that
//! does not match a known variant is a [`DecodeError`], never a guess.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Namespace prefix for all identifiers issued by this service.
pub const IDENTIFIER_NAMESPACE: &str = "mrel";

/// Typed reference to an upstream entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// A studio/collection, addressed by slug.
    Collection { slug: String },
    /// A synthetic year grouping under a collection.
    Bucket { slug: String, year: i32 },
    /// A single item, addressed by upstream id.
    Item { id: String },
    /// A standalone media entry, addressed by upstream id.
    Media { id: String },
    /// A person, addressed by upstream id.
    Person { id: String },
}

/// Reasons an identifier string failed to decode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("identifier is not in the '{IDENTIFIER_NAMESPACE}-' namespace: {0}")]
    WrongNamespace(String),

    #[error("unknown identifier kind: {0}")]
    UnknownKind(String),

    #[error("identifier is missing its {0} field")]
    MissingField(&'static str),

    #[error("bucket year is not numeric: {0}")]
    InvalidYear(String),
}

impl Identifier {
    /// Render the external string form.
    pub fn encode(&self) -> String {
        match self {
            Identifier::Collection { slug } => {
                format!("{IDENTIFIER_NAMESPACE}-collection-{slug}")
            }
            Identifier::Bucket { slug, year } => {
                format!("{IDENTIFIER_NAMESPACE}-bucket-{slug}-{year}")
            }
            Identifier::Item { id } => format!("{IDENTIFIER_NAMESPACE}-item-{id}"),
            Identifier::Media { id } => format!("{IDENTIFIER_NAMESPACE}-media-{id}"),
            Identifier::Person { id } => format!("{IDENTIFIER_NAMESPACE}-person-{id}"),
        }
    }

    /// Parse an external identifier string.
    pub fn decode(s: &str) -> Result<Self, DecodeError> {
        let rest = s
            .strip_prefix(IDENTIFIER_NAMESPACE)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(|| DecodeError::WrongNamespace(s.to_string()))?;

        let (kind, fields) = match rest.split_once('-') {
            Some((kind, fields)) => (kind, fields),
            None => (rest, ""),
        };

        match kind {
            "collection" => {
                if fields.is_empty() {
                    return Err(DecodeError::MissingField("slug"));
                }
                Ok(Identifier::Collection {
                    slug: fields.to_string(),
                })
            }
            "bucket" => {
                // Slugs may themselves contain '-'; the year is always the
                // trailing segment.
                let (slug, year_str) = fields
                    .rsplit_once('-')
                    .ok_or(DecodeError::MissingField("year"))?;
                if slug.is_empty() {
                    return Err(DecodeError::MissingField("slug"));
                }
                let year = year_str
                    .parse::<i32>()
                    .map_err(|_| DecodeError::InvalidYear(year_str.to_string()))?;
                Ok(Identifier::Bucket {
                    slug: slug.to_string(),
                    year,
                })
            }
            "item" | "media" | "person" => {
                if fields.is_empty() {
                    return Err(DecodeError::MissingField("id"));
                }
                let id = fields.to_string();
                Ok(match kind {
                    "item" => Identifier::Item { id },
                    "media" => Identifier::Media { id },
                    _ => Identifier::Person { id },
                })
            }
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Identifier {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::decode(s)
    }
}
