//! Bounded-parallelism fetcher for offset-paginated collections.
//!
//! Page 0 is fetched synchronously to learn the total count, the rest fan
//! out with at most `parallelism` fetches in flight. Results are
//! reassembled strictly in page-index order, so the output is identical
//! regardless of the real-time completion order of the workers. The first
//! worker error cancels the remaining fetches and propagates.

use std::future::Future;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::error::{Error, Result, ResultExt};

/// One unit of work handed to the fetch callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub offset: usize,
    pub limit: usize,
}

/// What a fetch callback returns: the page's items plus the collection's
/// total size as reported upstream.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Reusable pagination config. `page_size` should be within the provider's
/// limits (1..=50 for most Spotify listings).
#[derive(Debug, Clone)]
pub struct Paginator {
    page_size: usize,
    parallelism: usize,
    known_total: Option<usize>,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            page_size: 50,
            parallelism: 5,
            known_total: None,
        }
    }
}

impl Paginator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn parallelism(mut self, limit: usize) -> Self {
        self.parallelism = limit.max(1);
        self
    }

    /// Skip the priming fetch when the total is already known, e.g. when
    /// paginating over an in-memory list or batching writes.
    pub fn with_total(mut self, total: usize) -> Self {
        self.known_total = Some(total);
        self
    }

    /// Fetch every page and concatenate the items in page-index order.
    pub async fn fetch_all<T, F, Fut>(&self, fetch: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(Page) -> Fut + Sync,
        Fut: Future<Output = Result<PageResult<T>>> + Send,
    {
        let fetch = &fetch;

        let (mut pages, total) = match self.known_total {
            Some(total) => (Vec::new(), total),
            None => {
                let first = fetch(Page {
                    index: 0,
                    offset: 0,
                    limit: self.page_size,
                })
                .await
                .with_context("fetching first page")?;
                let total = first.total;
                (vec![(0, first.items)], total)
            }
        };

        let first_remaining = pages.len();
        let remaining: Vec<Page> = (first_remaining * self.page_size..total)
            .step_by(self.page_size)
            .enumerate()
            .map(|(i, offset)| Page {
                index: first_remaining + i,
                offset,
                limit: self.page_size.min(total - offset),
            })
            .collect();

        let mut fetched: Vec<(usize, Vec<T>)> = stream::iter(remaining)
            .map(|page| async move {
                let index = page.index;
                let result = fetch(page).await?;
                Ok::<_, Error>((index, result.items))
            })
            .buffer_unordered(self.parallelism)
            .try_collect()
            .await?;

        pages.append(&mut fetched);
        pages.sort_by_key(|(index, _)| *index);

        Ok(pages.into_iter().flat_map(|(_, items)| items).collect())
    }
}
