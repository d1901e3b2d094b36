//! Consumer-facing request and response shapes.
//!
//! The consumer organizes content as collection -> year bucket -> item.
//! Candidates carry just enough to display a pick list plus the opaque
//! identifier needed to re-fetch the entity; full display-schema
//! transcoding is out of scope for this service.

use serde::{Deserialize, Serialize};

use crate::clients::upstream::{CollectionRecord, ItemRecord, MediaRecord, PersonRecord};
use crate::models::identifier::Identifier;

/// Kind of entity a resolution request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Collection,
    Bucket,
    Item,
    Media,
    Person,
}

/// A loosely-specified lookup request.
///
/// Constructed per call; at least one of `identifier` or `title` should be
/// present for the lookup to return anything.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    /// What kind of entity to resolve.
    pub kind: EntityKind,
    /// Free-text title to search for.
    #[serde(default)]
    pub title: Option<String>,
    /// Previously issued `mrel-*` identifier, if the consumer has one.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Parent scope hint (e.g. collection name for an item lookup).
    #[serde(default)]
    pub parent_title: Option<String>,
    /// Date hint, `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    /// Year hint.
    #[serde(default)]
    pub year: Option<i32>,
    /// Numeric index hint (bucket lookups use this as the year).
    #[serde(default)]
    pub index: Option<i32>,
}

/// One entry in an ordered candidate list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Opaque identifier the consumer hands back on later lookups.
    pub identifier: String,
    pub kind: EntityKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    /// Title of the containing collection, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
}

/// One page of a children listing, with the full count reported separately
/// from the page size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildrenPage {
    pub items: Vec<Candidate>,
    pub total_count: i64,
    pub offset: i64,
}

impl Candidate {
    pub fn from_collection(rec: &CollectionRecord) -> Self {
        let slug = rec.slug.clone().unwrap_or_else(|| rec.id.clone());
        Self {
            identifier: Identifier::Collection { slug }.encode(),
            kind: EntityKind::Collection,
            title: rec.name.clone(),
            date: None,
            year: None,
            summary: rec.description.clone(),
            thumb: rec.logo.clone().or_else(|| rec.poster.clone()),
            parent_title: rec.network.clone(),
        }
    }

    /// Synthesize a year bucket under a collection. Buckets have no
    /// upstream record of their own.
    pub fn bucket(slug: &str, collection_name: &str, year: i32, thumb: Option<String>) -> Self {
        Self {
            identifier: Identifier::Bucket {
                slug: slug.to_string(),
                year,
            }
            .encode(),
            kind: EntityKind::Bucket,
            title: year.to_string(),
            date: None,
            year: Some(year),
            summary: None,
            thumb,
            parent_title: Some(collection_name.to_string()),
        }
    }

    pub fn from_item(rec: &ItemRecord) -> Self {
        Self {
            identifier: Identifier::Item { id: rec.id.clone() }.encode(),
            kind: EntityKind::Item,
            title: rec.title.clone(),
            date: rec.date.clone(),
            year: rec.date.as_deref().and_then(year_from_date),
            summary: rec.description.clone(),
            thumb: rec.image.clone(),
            parent_title: rec.collection.as_ref().and_then(|c| c.name.clone()),
        }
    }

    pub fn from_media(rec: &MediaRecord) -> Self {
        Self {
            identifier: Identifier::Media { id: rec.id.clone() }.encode(),
            kind: EntityKind::Media,
            title: rec.title.clone(),
            date: rec.date.clone(),
            year: rec
                .year
                .or_else(|| rec.date.as_deref().and_then(year_from_date)),
            summary: rec.description.clone(),
            thumb: rec.image.clone(),
            parent_title: None,
        }
    }

    pub fn from_person(rec: &PersonRecord) -> Self {
        Self {
            identifier: Identifier::Person { id: rec.id.clone() }.encode(),
            kind: EntityKind::Person,
            title: rec.name.clone(),
            date: None,
            year: None,
            summary: rec.bio.clone(),
            thumb: rec.image.clone(),
            parent_title: None,
        }
    }
}

/// Extract the year from a `YYYY-MM-DD` (or bare `YYYY`) date string.
pub fn year_from_date(date: &str) -> Option<i32> {
    date.get(..4)?.parse::<i32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_from_date_parses_prefix() {
        assert_eq!(year_from_date("2024-03-15"), Some(2024));
        assert_eq!(year_from_date("1999"), Some(1999));
        assert_eq!(year_from_date("n/a"), None);
        assert_eq!(year_from_date(""), None);
    }

    #[test]
    fn collection_candidate_prefers_slug_over_id() {
        let rec = CollectionRecord {
            id: "123".to_string(),
            slug: Some("acme-studio".to_string()),
            name: "Acme Studio".to_string(),
            description: None,
            logo: None,
            poster: Some("poster.jpg".to_string()),
            network: None,
        };
        let c = Candidate::from_collection(&rec);
        assert_eq!(c.identifier, "mrel-collection-acme-studio");
        assert_eq!(c.thumb.as_deref(), Some("poster.jpg"));
    }
}
