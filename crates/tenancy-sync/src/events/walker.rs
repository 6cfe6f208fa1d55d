//! Page walker over one events query.
//!
//! The first page tells how many pages and results the query has. Every later
//! page must report the same result total; a change means the upstream data
//! moved under the walk and nothing accumulated so far can be trusted.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PagingConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventApiClient, EventKind, EventsPage, QueryParams};

/// Walks all pages of one query, feeding each page to a callback.
pub struct PageWalker<'a> {
    client: &'a dyn EventApiClient,
    paging: &'a PagingConfig,
    page_num_field: &'a str,
}

impl<'a> PageWalker<'a> {
    /// Create a walker that advances the `page_num_field` query parameter.
    pub fn new(
        client: &'a dyn EventApiClient,
        paging: &'a PagingConfig,
        page_num_field: &'a str,
    ) -> Self {
        Self {
            client,
            paging,
            page_num_field,
        }
    }

    /// Walk every page of the query, starting at the page number in `params`.
    ///
    /// Returns the number of pages seen. An empty first page completes the
    /// walk with zero pages.
    pub async fn walk<F>(
        &self,
        kind: EventKind,
        mut params: QueryParams,
        cancel: &CancellationToken,
        mut on_page: F,
    ) -> SyncResult<usize>
    where
        F: FnMut(&EventsPage),
    {
        let page_start = self.page_start(&params)?;

        let Some(first) = self.client.fetch_page(kind, &params).await? else {
            debug!(event_kind = %kind, "No events returned for query");
            return Ok(0);
        };
        on_page(&first);

        let initial_count = first.get_i64(&self.paging.total_results_field);
        let total_pages = first.get_i64(&self.paging.total_pages_field);
        debug!(
            event_kind = %kind,
            total_results = initial_count,
            total_pages,
            "Fetched first events page"
        );

        let mut pages = 1;
        for page_num in (page_start + 1)..=total_pages {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            params.insert(self.page_num_field.to_string(), page_num.to_string());
            let page = self
                .client
                .fetch_page(kind, &params)
                .await?
                .ok_or(SyncError::MissingPage { page: page_num })?;

            let count = page.get_i64(&self.paging.total_results_field);
            if count != initial_count {
                return Err(SyncError::TotalChanged {
                    expected: initial_count,
                    actual: count,
                });
            }

            on_page(&page);
            pages += 1;
        }

        Ok(pages)
    }

    fn page_start(&self, params: &QueryParams) -> SyncResult<i64> {
        let Some(raw) = params.get(self.page_num_field) else {
            return Err(SyncError::configuration(format!(
                "Query parameters are missing the page field '{}'",
                self.page_num_field
            )));
        };
        raw.parse().map_err(|_| {
            SyncError::configuration(format!("Page number '{raw}' is not a number"))
        })
    }
}
