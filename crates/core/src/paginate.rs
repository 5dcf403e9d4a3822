//! Cursor pagination with a hard call bound, plus first-seen de-duplication.

use crate::error::Result;
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use tracing::{debug, warn};

/// Upper bound on fetch calls for a single fetch-all operation.
pub const DEFAULT_MAX_PAGE_CALLS: usize = 5;

/// One page of upstream records.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Everything accumulated by [`collect_pages`].
#[derive(Debug, Clone)]
pub struct Collected<T> {
    pub items: Vec<T>,
    /// Number of fetch calls issued.
    pub calls: usize,
    /// `true` if the call bound stopped the loop while the upstream still had a cursor.
    pub truncated: bool,
}

/// Follow cursors until the upstream stops returning one or `max_calls` fetches were made.
///
/// Reaching the bound is not an error: the records gathered so far are returned with
/// `truncated = true`. A failed fetch aborts the whole operation and drops the partial results.
///
/// # Errors
///
/// Returns the first error produced by `fetch`.
pub async fn collect_pages<T, F, Fut>(max_calls: usize, mut fetch: F) -> Result<Collected<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let max_calls = max_calls.max(1);
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut calls = 0;

    loop {
        let page = fetch(cursor.take()).await?;
        calls += 1;
        debug!(call = calls, records = page.items.len(), "fetched page");
        items.extend(page.items);

        match page.next_cursor.filter(|c| !c.is_empty()) {
            None => {
                return Ok(Collected {
                    items,
                    calls,
                    truncated: false,
                });
            }
            Some(_) if calls >= max_calls => {
                warn!(
                    calls,
                    max_calls,
                    records = items.len(),
                    "pagination call bound reached; returning partial results"
                );
                return Ok(Collected {
                    items,
                    calls,
                    truncated: true,
                });
            }
            Some(next) => cursor = Some(next),
        }
    }
}

/// Keep the first occurrence of each key, preserving first-seen order.
pub fn dedup_by_key<T, K, F>(items: Vec<T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen: HashSet<K> = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}
