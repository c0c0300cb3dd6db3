//! Multi-page batch loading with in-flight request deduplication.
//!
//! The invariant this module exists for: at most one outstanding network
//! request per distinct (pages, filters, items_per_page) combination.
//! Concurrent identical calls all await the same shared future; the
//! in-flight slot is released when that future settles, on success and
//! failure alike.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::AuthClient;
use crate::error::{ClientError, LoadError};
use crate::models::{BatchPagination, BatchRequest, BatchResponse, Entity, FilterSet};
use crate::retry::RetryPolicy;

/// Transport seam: anything that can answer a batch request. Injected so
/// the loader and orchestrator are testable without a network.
pub trait PageFetcher<T>: Send + Sync + 'static {
    fn fetch_batch(
        &self,
        request: BatchRequest,
    ) -> impl Future<Output = Result<BatchResponse<T>, ClientError>> + Send;
}

/// Production fetcher: posts to the proxy's batch endpoint for one
/// entity through the authenticated client.
pub struct HttpFetcher {
    auth: Arc<AuthClient>,
    entity: Entity,
}

impl HttpFetcher {
    pub fn new(auth: Arc<AuthClient>, entity: Entity) -> Self {
        Self { auth, entity }
    }
}

impl<T> PageFetcher<T> for HttpFetcher
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn fetch_batch(&self, request: BatchRequest) -> Result<BatchResponse<T>, ClientError> {
        self.auth
            .post_json(self.entity.batch_path(), &request)
            .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// When false, the call bypasses the in-flight map and always issues
    /// a fresh network request (used for explicit refreshes).
    pub use_cache: bool,
    /// Upper bound on concurrently issued chunk requests; the page set
    /// is divided evenly into at most this many chunks.
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_concurrent: 3,
            retry: RetryPolicy::default(),
        }
    }
}

type InflightFuture<T> = Shared<BoxFuture<'static, Result<BatchResponse<T>, LoadError>>>;

pub struct BatchLoader<T, F> {
    fetcher: Arc<F>,
    items_per_page: u32,
    inflight: Mutex<HashMap<String, (u64, InflightFuture<T>)>>,
    next_id: AtomicU64,
}

impl<T, F> BatchLoader<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: PageFetcher<T>,
{
    pub fn new(fetcher: F, items_per_page: u32) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            items_per_page,
            inflight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn items_per_page(&self) -> u32 {
        self.items_per_page
    }

    /// Number of requests currently in flight (diagnostics only).
    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }

    /// Fetch the given pages, collapsing onto an identical in-flight
    /// request when one exists. The merged result is atomic: nothing is
    /// returned until every chunk has settled.
    pub async fn load_pages(
        &self,
        pages: &[u32],
        filters: &FilterSet,
        options: LoadOptions,
    ) -> Result<BatchResponse<T>, LoadError> {
        let mut pages: Vec<u32> = pages.to_vec();
        pages.sort_unstable();
        pages.dedup();
        if pages.is_empty() {
            return Err(LoadError::new("no pages requested", Vec::new()));
        }

        if !options.use_cache {
            return fetch_merged(
                Arc::clone(&self.fetcher),
                pages,
                filters.clone(),
                self.items_per_page,
                options,
            )
            .await;
        }

        let key = dedup_key(&pages, filters, self.items_per_page);
        let (id, fut) = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&key) {
                Some((id, existing)) => {
                    debug!(key = %key, "joining in-flight batch request");
                    (*id, existing.clone())
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let fut = fetch_merged(
                        Arc::clone(&self.fetcher),
                        pages,
                        filters.clone(),
                        self.items_per_page,
                        options,
                    )
                    .boxed()
                    .shared();
                    inflight.insert(key.clone(), (id, fut.clone()));
                    (id, fut)
                }
            }
        };

        let result = fut.await;

        // Release the slot, but never a successor's: a later identical
        // request may have claimed the key while we were waking up.
        let mut inflight = self.inflight.lock().unwrap();
        if inflight.get(&key).is_some_and(|(slot_id, _)| *slot_id == id) {
            inflight.remove(&key);
        }

        result
    }
}

/// Deduplication key: sorted page list, filter set, and page size. The
/// filter map is ordered, so serialization is stable.
fn dedup_key(pages: &[u32], filters: &FilterSet, items_per_page: u32) -> String {
    serde_json::to_string(&serde_json::json!({
        "pages": pages,
        "filters": filters,
        "items_per_page": items_per_page,
    }))
    .expect("dedup key serialization cannot fail")
}

/// Divide `pages` evenly into at most `max_concurrent` chunks, issue all
/// chunk requests concurrently with per-chunk retry, and merge once all
/// of them settle. Any chunk exhausting its retries fails the whole call
/// and discards the other chunks' results.
async fn fetch_merged<T, F>(
    fetcher: Arc<F>,
    pages: Vec<u32>,
    filters: FilterSet,
    items_per_page: u32,
    options: LoadOptions,
) -> Result<BatchResponse<T>, LoadError>
where
    T: Clone + Send + Sync + 'static,
    F: PageFetcher<T>,
{
    let chunks = chunk_pages(&pages, options.max_concurrent);

    let requests = chunks.iter().map(|chunk| {
        let fetcher = Arc::clone(&fetcher);
        let filters = filters.clone();
        let chunk = chunk.clone();
        async move {
            options
                .retry
                .run(|| {
                    fetcher.fetch_batch(BatchRequest {
                        pages: chunk.clone(),
                        items_per_page,
                        filters: filters.clone(),
                    })
                })
                .await
                .map_err(|e| {
                    warn!(pages = ?chunk, error = %e, "batch chunk failed");
                    LoadError::new(e.to_string(), chunk.clone())
                })
        }
    });

    let settled = join_all(requests).await;

    let mut data: BTreeMap<u32, Vec<T>> = BTreeMap::new();
    let mut loaded_pages: Vec<u32> = Vec::new();
    let mut totals: Option<(u64, u32)> = None;

    for result in settled {
        let response = result?;
        totals = Some((
            response.pagination.total_items,
            response.pagination.total_pages,
        ));
        loaded_pages.extend(response.pagination.loaded_pages);
        data.extend(response.data);
    }

    let (total_items, total_pages) = totals.expect("at least one chunk");
    loaded_pages.sort_unstable();
    loaded_pages.dedup();

    Ok(BatchResponse {
        data,
        pagination: BatchPagination {
            total_items,
            total_pages,
            items_per_page,
            loaded_pages,
        },
    })
}

fn chunk_pages(pages: &[u32], max_concurrent: usize) -> Vec<Vec<u32>> {
    let max_concurrent = max_concurrent.max(1);
    let chunk_size = pages.len().div_ceil(max_concurrent);
    pages.chunks(chunk_size).map(|c| c.to_vec()).collect()
}
