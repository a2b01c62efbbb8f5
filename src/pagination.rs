use futures::{stream, Stream, TryStreamExt};

use crate::{
    wire::{CountResponse, PageResponse},
    FeatureCollection, FeaturePage, GisClient, GisError, LayerQuery, PageRequest, Pagination,
    Result,
};

/// Pages needed to cover `total` records: `ceil(total / page_size)`.
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Offsets planned for one fetch, fixed after count discovery.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct PagePlan {
    total: u64,
    pages: u64,
    page_size: u64,
    capped: bool,
    next: u64,
    fetched: u64,
}

impl PagePlan {
    fn new(server_total: u64, pagination: &Pagination) -> Self {
        let total = match pagination.max_total_records {
            Some(cap) => server_total.min(cap),
            None => server_total,
        };
        Self {
            total,
            pages: page_count(total, pagination.page_size),
            page_size: pagination.page_size,
            capped: total < server_total,
            next: 0,
            fetched: 0,
        }
    }

    fn next_offset(&self) -> Option<u64> {
        (self.next < self.pages).then(|| self.next * self.page_size)
    }

    /// `resultRecordCount` for the page at `offset`. Under a record cap the
    /// last page only asks for what is left of it.
    fn record_count(&self, offset: u64) -> u64 {
        if self.capped {
            self.page_size.min(self.total.saturating_sub(offset))
        } else {
            self.page_size
        }
    }
}

enum Cursor {
    Start,
    Paging(PagePlan),
}

impl GisClient {
    /// Number of records matching the query's predicate.
    pub async fn fetch_record_count(&self, query: &LayerQuery) -> Result<u64> {
        let url = query.query_url();
        let response: CountResponse = self.get_json(&url, &query.count_params()).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            "layer {} has {} records matching query",
            query.layer_url(),
            response.count
        );

        Ok(response.count)
    }

    /// Fetches the single page described by `request`.
    pub async fn fetch_page(&self, request: &PageRequest) -> Result<FeaturePage> {
        let url = request.query_url();
        let response: PageResponse = self.get_json(&url, &request.params()).await?;
        let exceeded_transfer_limit = response.exceeded_transfer_limit();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "fetched page at offset {}: {} features",
            request.offset(),
            response.features.len()
        );

        Ok(FeaturePage {
            offset: request.offset(),
            features: response.features,
            exceeded_transfer_limit,
        })
    }

    /// Lazily pages through every record matching `query`.
    ///
    /// The count query runs on first poll. Pages are requested one at a
    /// time in increasing offset order, each only after the previous one
    /// was yielded; dropping the stream stops further requests. The first
    /// error ends the stream, pages already yielded stay valid.
    ///
    /// Short pages flagged `exceededTransferLimit` are not re-requested;
    /// count features rather than assuming `page_size` per page.
    pub fn fetch_pages<'a>(
        &'a self,
        query: &'a LayerQuery,
    ) -> impl Stream<Item = Result<FeaturePage>> + 'a {
        stream::try_unfold(Cursor::Start, move |cursor| self.advance(query, cursor))
    }

    async fn advance(
        &self,
        query: &LayerQuery,
        cursor: Cursor,
    ) -> Result<Option<(FeaturePage, Cursor)>> {
        let mut plan = match cursor {
            Cursor::Start => match self.plan_pages(query).await? {
                Some(plan) => plan,
                None => return Ok(None),
            },
            Cursor::Paging(plan) => plan,
        };
        let Some(offset) = plan.next_offset() else {
            return Ok(None);
        };

        let page = self
            .fetch_page(&query.page_request(offset, plan.record_count(offset)))
            .await?;
        plan.next += 1;
        plan.fetched += page.len() as u64;

        #[cfg(feature = "tracing")]
        {
            tracing::info!(
                "progress: {}/{} records ({:.1}%)",
                plan.fetched,
                plan.total,
                100.0 * plan.fetched as f64 / plan.total as f64
            );
            if page.exceeded_transfer_limit {
                tracing::warn!("transfer limit exceeded at offset {}, continuing", offset);
            }
        }

        Ok(Some((page, Cursor::Paging(plan))))
    }

    /// Collects every page of `query` into one GeoJSON collection.
    ///
    /// Under a record cap, from the query or from the configuration,
    /// paging stops and the collection is truncated once that many
    /// features are held.
    pub async fn fetch_layer(&self, query: &LayerQuery) -> Result<FeatureCollection> {
        let limit = self.effective_pagination(query)?.max_total_records;
        let mut features = Vec::new();

        let pages = self.fetch_pages(query);
        futures::pin_mut!(pages);
        while let Some(page) = pages.try_next().await? {
            features.extend(page.features);
            if let Some(limit) = limit {
                let limit = usize::try_from(limit).unwrap_or(usize::MAX);
                if features.len() >= limit {
                    features.truncate(limit);
                    break;
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "fetched {} total features from layer {}",
            features.len(),
            query.layer_url()
        );

        Ok(FeatureCollection::new(features))
    }

    /// Effective pagination for one fetch; the shared config is not mutated.
    fn effective_pagination(&self, query: &LayerQuery) -> Result<Pagination> {
        let pagination = self
            .config()
            .pagination()
            .with_max_total_records(query.max_records());
        if pagination.max_total_records == Some(0) {
            return Err(GisError::InvalidConfig(
                "max_records must be greater than zero".to_owned(),
            ));
        }
        Ok(pagination)
    }

    async fn plan_pages(&self, query: &LayerQuery) -> Result<Option<PagePlan>> {
        let pagination = self.effective_pagination(query)?;
        let server_total = self.fetch_record_count(query).await?;
        if server_total == 0 {
            #[cfg(feature = "tracing")]
            tracing::info!("no records found for layer {}", query.layer_url());
            return Ok(None);
        }

        let plan = PagePlan::new(server_total, &pagination);

        #[cfg(feature = "tracing")]
        tracing::info!(
            "fetching {} records in {} pages (page size: {})",
            plan.total,
            plan.pages,
            plan.page_size
        );

        Ok(Some(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::{page_count, PagePlan};
    use crate::Pagination;

    fn offsets(mut plan: PagePlan) -> Vec<u64> {
        let mut offsets = Vec::new();
        while let Some(offset) = plan.next_offset() {
            offsets.push(offset);
            plan.next += 1;
        }
        offsets
    }

    #[test]
    fn page_count_is_ceiling_division() {
        assert_eq!(page_count(1, 1_000), 1);
        assert_eq!(page_count(1_000, 1_000), 1);
        assert_eq!(page_count(1_001, 1_000), 2);
        assert_eq!(page_count(2_500, 1_000), 3);
        assert_eq!(page_count(0, 1_000), 0);
        for total in 1..300u64 {
            for size in 1..20u64 {
                let pages = page_count(total, size);
                assert!(pages * size >= total && (pages - 1) * size < total);
            }
        }
    }

    #[test]
    fn uncapped_plan_covers_total() {
        let plan = PagePlan::new(
            2_500,
            &Pagination {
                page_size: 1_000,
                max_total_records: None,
            },
        );
        assert_eq!(plan.pages, 3);
        assert_eq!(offsets(plan), vec![0, 1_000, 2_000]);
    }

    #[test]
    fn record_cap_clamps_total() {
        let plan = PagePlan::new(
            2_500,
            &Pagination {
                page_size: 1_000,
                max_total_records: Some(1_500),
            },
        );
        assert_eq!(plan.total, 1_500);
        assert_eq!(plan.pages, 2);
        assert_eq!(offsets(plan), vec![0, 1_000]);
    }

    #[test]
    fn capped_last_page_requests_only_the_remainder() {
        let plan = PagePlan::new(
            2_500,
            &Pagination {
                page_size: 1_000,
                max_total_records: Some(1_500),
            },
        );
        assert_eq!(plan.record_count(0), 1_000);
        assert_eq!(plan.record_count(1_000), 500);
    }

    #[test]
    fn uncapped_pages_request_full_page_size() {
        let plan = PagePlan::new(
            2_500,
            &Pagination {
                page_size: 1_000,
                max_total_records: None,
            },
        );
        assert_eq!(plan.record_count(2_000), 1_000);
    }

    #[test]
    fn cap_above_total_is_ignored() {
        let plan = PagePlan::new(
            120,
            &Pagination {
                page_size: 50,
                max_total_records: Some(10_000),
            },
        );
        assert_eq!(plan.total, 120);
        assert_eq!(offsets(plan), vec![0, 50, 100]);
    }
}
