//! Parent/child hierarchy assembly.
//!
//! The consumer models a collection as a show whose "seasons" are year
//! buckets derived from item release dates. Buckets are synthetic: the
//! year set comes from sampling a bounded window of the collection's
//! items. A collection with items older than the sampled window will be
//! missing those buckets; that is a known, accepted limitation of the
//! sampling approach, not corrected here.

use std::collections::BTreeSet;

use chrono::{Datelike, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::clients::upstream::UpstreamError;
use crate::error::ResolveError;
use crate::models::identifier::Identifier;
use crate::models::provider::{year_from_date, Candidate, ChildrenPage};
use crate::services::resolver::Resolver;

impl Resolver {
    /// List the children of an identifier: buckets for a collection,
    /// items for a bucket, nothing for leaf kinds.
    ///
    /// Returns `None` when the parent itself no longer exists upstream.
    pub async fn fetch_children(
        &self,
        raw: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Option<ChildrenPage>, ResolveError> {
        let identifier = Identifier::decode(raw)?;
        let offset = offset.max(0);
        let limit = limit.max(1);
        tracing::debug!(identifier = %identifier, offset, limit, "fetching children");

        match identifier {
            Identifier::Collection { slug } => {
                let Some(col) = self.collection_detail(&slug).await? else {
                    return Ok(None);
                };
                let slug = col.slug.clone().unwrap_or(slug);
                let years = self.collection_years(&slug).await?;

                let page: Vec<Candidate> = years
                    .iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .map(|&year| Candidate::bucket(&slug, &col.name, year, col.logo.clone()))
                    .collect();

                Ok(Some(ChildrenPage {
                    items: page,
                    total_count: years.len() as i64,
                    offset,
                }))
            }
            Identifier::Bucket { slug, year } => {
                let Some(col) = self.collection_detail(&slug).await? else {
                    return Ok(None);
                };
                let slug = col.slug.clone().unwrap_or(slug);

                // Offset/limit translate to upstream pagination.
                let page_number = (offset / limit) as u32 + 1;
                let listing = self
                    .upstream
                    .collection_items(&slug, page_number, limit as u32, Some(year))
                    .await?;

                let total_count = listing.meta.total.unwrap_or(listing.data.len() as i64);
                let items = listing
                    .data
                    .iter()
                    .map(|rec| {
                        let mut candidate = Candidate::from_item(rec);
                        candidate.parent_title.get_or_insert_with(|| col.name.clone());
                        candidate
                    })
                    .collect();

                Ok(Some(ChildrenPage {
                    items,
                    total_count,
                    offset,
                }))
            }
            // Leaf kinds have no children.
            Identifier::Item { .. } | Identifier::Media { .. } | Identifier::Person { .. } => {
                Ok(Some(ChildrenPage {
                    items: Vec::new(),
                    total_count: 0,
                    offset,
                }))
            }
        }
    }

    /// Distinct item years for a collection, newest first, derived by
    /// sampling up to `sampling.year_sample_pages` pages of items.
    pub(crate) async fn collection_years(&self, slug: &str) -> Result<Vec<i32>, UpstreamError> {
        let params = json!({ "slug": slug });
        let upstream = Arc::clone(&self.upstream);
        let sampling = self.sampling.clone();
        let slug_owned = slug.to_string();

        self.cache
            .get_or_fetch("collection-years", &params, None, move || async move {
                let mut years: BTreeSet<i32> = BTreeSet::new();
                let mut page = 1u32;

                loop {
                    let listing = upstream
                        .collection_items(&slug_owned, page, sampling.year_sample_per_page, None)
                        .await?;
                    if listing.data.is_empty() {
                        break;
                    }

                    for item in &listing.data {
                        if let Some(year) = item.date.as_deref().and_then(year_from_date) {
                            years.insert(year);
                        }
                    }

                    let current = listing.meta.current_page.unwrap_or(page);
                    if let Some(last) = listing.meta.last_page {
                        if current >= last {
                            break;
                        }
                    }
                    if page >= sampling.year_sample_pages {
                        tracing::debug!(
                            slug = %slug_owned,
                            pages = sampling.year_sample_pages,
                            years_found = years.len(),
                            "reached year sampling window"
                        );
                        break;
                    }
                    page += 1;
                }

                // Newest first. An empty sample still yields one bucket so
                // the consumer has somewhere to hang unmatched items.
                let mut list: Vec<i32> = years.into_iter().rev().collect();
                if list.is_empty() {
                    list.push(Utc::now().year());
                }

                tracing::info!(slug = %slug_owned, years = list.len(), "collection years sampled");
                Ok(list)
            })
            .await
    }
}
