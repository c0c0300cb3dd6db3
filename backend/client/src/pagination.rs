//! Pagination orchestrator.
//!
//! Owns the pagination state for one entity view: current page, server
//! totals, the page cache, and which pages were loaded or speculatively
//! preloaded. Navigation recomputes synchronously when the target page
//! is cached and goes through the batch loader when it is not. After a
//! foreground load settles, adjacent pages are preloaded in the
//! background so the next click lands on warm data.
//!
//! Cache commits are last-writer-wins: a slow response resolving after a
//! newer one still writes its pages. Acceptable for a UI cache; nothing
//! here stamps versions.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::batch::{BatchLoader, LoadOptions, PageFetcher};
use crate::cache::PageCache;
use crate::error::LoadError;
use crate::models::{BatchResponse, FilterSet};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy)]
pub struct PaginationConfig {
    pub items_per_page: u32,
    /// How many adjacent pages to fetch speculatively.
    pub preload_pages: u32,
    pub cache_size: usize,
    pub enable_background_preload: bool,
    /// Quiet period before a preload sequence starts.
    pub preload_delay: Duration,
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            items_per_page: 10,
            preload_pages: 2,
            cache_size: 10,
            enable_background_preload: true,
            preload_delay: Duration::from_millis(500),
            max_concurrent: 3,
            retry: RetryPolicy::default(),
        }
    }
}

struct PageState<T> {
    current_page: u32,
    total_pages: u32,
    total_items: u64,
    filters: FilterSet,
    cache: PageCache<T>,
    loaded_pages: BTreeSet<u32>,
    preloaded_pages: BTreeSet<u32>,
    is_loading: bool,
    is_preloading: bool,
    is_initial_load: bool,
    error: Option<String>,
    retry_count: u32,
}

/// Immutable snapshot handed to the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView<T> {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub items_per_page: u32,
    pub current_items: Vec<T>,
    pub start_index: u64,
    pub end_index: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub is_loading: bool,
    pub is_preloading: bool,
    pub is_initial_load: bool,
    pub error: Option<String>,
    pub retry_count: u32,
}

struct PreloadTask {
    handle: Option<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
}

struct Inner<T, F> {
    config: PaginationConfig,
    loader: BatchLoader<T, F>,
    state: Mutex<PageState<T>>,
    preload: Mutex<PreloadTask>,
}

pub struct Paginator<T, F> {
    inner: Arc<Inner<T, F>>,
}

impl<T, F> Clone for Paginator<T, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, F> Paginator<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: PageFetcher<T>,
{
    pub fn new(fetcher: F, config: PaginationConfig) -> Self {
        let inner = Inner {
            loader: BatchLoader::new(fetcher, config.items_per_page),
            state: Mutex::new(PageState {
                current_page: 1,
                total_pages: 0,
                total_items: 0,
                filters: FilterSet::new(),
                cache: PageCache::new(config.cache_size),
                loaded_pages: BTreeSet::new(),
                preloaded_pages: BTreeSet::new(),
                is_loading: false,
                is_preloading: false,
                is_initial_load: true,
                error: None,
                retry_count: 0,
            }),
            preload: Mutex::new(PreloadTask {
                handle: None,
                cancel: Arc::new(AtomicBool::new(false)),
            }),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// First load: page 1, then background preload of its neighbors.
    pub async fn initial_load(&self) -> Result<(), LoadError> {
        let result = self.inner.load_page(1, false).await;
        if result.is_ok() {
            self.preload_next();
        }
        result
    }

    /// Navigate to `page`. Out-of-range targets (including anything
    /// before the first successful load established the totals) are
    /// silent no-ops.
    pub async fn go_to_page(&self, page: u32) {
        let cached = {
            let mut state = self.inner.state.lock().unwrap();
            if page < 1 || page > state.total_pages {
                return;
            }
            state.current_page = page;
            state.cache.get(page).is_some()
        };

        if !cached {
            if let Err(e) = self.inner.load_page(page, false).await {
                warn!(page, error = %e, "page load failed");
            }
        }
        self.preload_next();
    }

    pub async fn next_page(&self) {
        let target = {
            let state = self.inner.state.lock().unwrap();
            if state.current_page >= state.total_pages {
                return;
            }
            state.current_page + 1
        };
        self.go_to_page(target).await;
    }

    pub async fn prev_page(&self) {
        let target = {
            let state = self.inner.state.lock().unwrap();
            if state.current_page <= 1 {
                return;
            }
            state.current_page - 1
        };
        self.go_to_page(target).await;
    }

    pub async fn first_page(&self) {
        self.go_to_page(1).await;
    }

    pub async fn last_page(&self) {
        let target = self.inner.state.lock().unwrap().total_pages;
        self.go_to_page(target).await;
    }

    /// Re-run the load for the current page after an error.
    pub async fn retry(&self) -> Result<(), LoadError> {
        let page = self.inner.state.lock().unwrap().current_page;
        let result = self.inner.load_page(page, false).await;
        if result.is_ok() {
            self.preload_next();
        }
        result
    }

    /// Invalidate and reload a single page; every other cached page is
    /// left untouched.
    pub async fn refresh_page(&self, page: Option<u32>) -> Result<(), LoadError> {
        let page = {
            let mut state = self.inner.state.lock().unwrap();
            let page = page.unwrap_or(state.current_page);
            state.cache.delete(page);
            state.loaded_pages.remove(&page);
            state.preloaded_pages.remove(&page);
            page
        };
        self.inner.load_page_fresh(page).await
    }

    /// Drop everything and reload from page 1.
    pub async fn refresh_all(&self) -> Result<(), LoadError> {
        self.inner.cancel_preload();
        self.inner.reset_pages();
        self.inner.load_page(1, false).await
    }

    /// Swap the filter context. The whole cache belongs to the old
    /// context, so this is a full reset back to page 1.
    pub async fn set_filters(&self, filters: FilterSet) -> Result<(), LoadError> {
        self.inner.cancel_preload();
        self.inner.reset_pages();
        self.inner.state.lock().unwrap().filters = filters;
        self.inner.load_page(1, false).await
    }

    /// Speculatively warm a single page.
    pub async fn preload_page(&self, page: u32) {
        let wanted = {
            let state = self.inner.state.lock().unwrap();
            page >= 1 && page <= state.total_pages && !state.cache.has(page)
        };
        if wanted {
            let _ = self.inner.load_page(page, true).await;
        }
    }

    pub fn view(&self) -> PageView<T> {
        self.inner.view()
    }

    pub fn is_page_loaded(&self, page: u32) -> bool {
        self.inner.state.lock().unwrap().loaded_pages.contains(&page)
    }

    pub fn is_page_preloaded(&self, page: u32) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .preloaded_pages
            .contains(&page)
    }

    /// Replace any pending preload sequence with a new one: wait out the
    /// quiet period, compute candidates around the current page, then
    /// load them one by one. The cancel flag stops the sequence between
    /// pages; requests already in flight are left to finish.
    pub fn preload_next(&self) {
        if !self.inner.config.enable_background_preload {
            return;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&self.inner);
        let flag = Arc::clone(&cancel);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.config.preload_delay).await;
            if flag.load(Ordering::Relaxed) {
                return;
            }

            let candidates = {
                let state = inner.state.lock().unwrap();
                state.cache.preload_candidates(
                    state.current_page,
                    inner.config.preload_pages,
                    state.total_pages,
                )
            };

            for page in candidates {
                if flag.load(Ordering::Relaxed) {
                    return;
                }
                debug!(page, "preloading");
                let _ = inner.load_page(page, true).await;
            }
        });

        let mut preload = self.inner.preload.lock().unwrap();
        preload.cancel.store(true, Ordering::Relaxed);
        preload.cancel = cancel;
        preload.handle = Some(handle);
    }

    /// Stop background work and drop all cached data. The paginator is
    /// inert afterwards; callers drop it next.
    pub fn shutdown(&self) {
        let mut preload = self.inner.preload.lock().unwrap();
        preload.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = preload.handle.take() {
            handle.abort();
        }
        drop(preload);

        let mut state = self.inner.state.lock().unwrap();
        state.cache.clear();
        state.loaded_pages.clear();
        state.preloaded_pages.clear();
    }
}

impl<T, F> Inner<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: PageFetcher<T>,
{
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            use_cache: true,
            max_concurrent: self.config.max_concurrent,
            retry: self.config.retry,
        }
    }

    /// Load one page through the batch loader unless it is already
    /// cached. `is_preload` keeps the fetch off the foreground loading
    /// indicator and records the page as speculative.
    async fn load_page(&self, page: u32, is_preload: bool) -> Result<(), LoadError> {
        let filters = {
            let mut state = self.state.lock().unwrap();
            if state.cache.get(page).is_some() {
                state.loaded_pages.insert(page);
                return Ok(());
            }
            if is_preload {
                state.is_preloading = true;
            } else {
                state.is_loading = true;
                state.error = None;
            }
            state.filters.clone()
        };

        let result = self
            .loader
            .load_pages(&[page], &filters, self.load_options())
            .await;
        self.commit(result, is_preload)
    }

    /// Reload a page bypassing in-flight dedup, guaranteeing a fresh
    /// network round trip.
    async fn load_page_fresh(&self, page: u32) -> Result<(), LoadError> {
        let filters = {
            let mut state = self.state.lock().unwrap();
            state.is_loading = true;
            state.error = None;
            state.filters.clone()
        };

        let options = LoadOptions {
            use_cache: false,
            ..self.load_options()
        };
        let result = self.loader.load_pages(&[page], &filters, options).await;
        self.commit(result, false)
    }

    /// Write a settled load into the cache and derived state. Failed
    /// loads never touch the cache.
    fn commit(
        &self,
        result: Result<BatchResponse<T>, LoadError>,
        is_preload: bool,
    ) -> Result<(), LoadError> {
        let mut state = self.state.lock().unwrap();
        if is_preload {
            state.is_preloading = false;
        } else {
            state.is_loading = false;
        }

        match result {
            Ok(response) => {
                state.total_items = response.pagination.total_items;
                state.total_pages = response.pagination.total_pages;

                for (page, items) in response.data {
                    state.cache.set(page, items);
                    state.loaded_pages.insert(page);
                    if is_preload {
                        state.preloaded_pages.insert(page);
                    }
                }

                // Totals are authoritative; drop anything the server no
                // longer acknowledges.
                let total_pages = state.total_pages;
                let stale: Vec<u32> = state
                    .cache
                    .pages()
                    .filter(|p| *p > total_pages)
                    .collect();
                for page in stale {
                    state.cache.delete(page);
                }
                state.loaded_pages.retain(|p| *p <= total_pages);
                state.preloaded_pages.retain(|p| *p <= total_pages);

                state.is_initial_load = false;
                if !is_preload {
                    state.error = None;
                    state.retry_count = 0;
                }
                Ok(())
            }
            Err(e) => {
                if is_preload {
                    warn!(error = %e, "background preload failed");
                } else {
                    state.error = Some(e.to_string());
                    state.retry_count += 1;
                }
                Err(e)
            }
        }
    }

    fn reset_pages(&self) {
        let mut state = self.state.lock().unwrap();
        state.cache.clear();
        state.loaded_pages.clear();
        state.preloaded_pages.clear();
        state.current_page = 1;
    }

    fn cancel_preload(&self) {
        let mut preload = self.preload.lock().unwrap();
        preload.cancel.store(true, Ordering::Relaxed);
        preload.handle = None;
    }

    fn view(&self) -> PageView<T> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let current_items = state
            .cache
            .get(state.current_page)
            .map(|entry| entry.items.clone())
            .unwrap_or_default();

        let items_per_page = self.config.items_per_page as u64;
        let start_index = (state.current_page as u64).saturating_sub(1) * items_per_page;
        let end_index = (start_index + items_per_page).min(state.total_items);

        PageView {
            current_page: state.current_page,
            total_pages: state.total_pages,
            total_items: state.total_items,
            items_per_page: self.config.items_per_page,
            current_items,
            start_index,
            end_index,
            has_next_page: state.current_page < state.total_pages,
            has_prev_page: state.current_page > 1,
            is_loading: state.is_loading,
            is_preloading: state.is_preloading,
            is_initial_load: state.is_initial_load,
            error: state.error.clone(),
            retry_count: state.retry_count,
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::ClientError;
    use crate::models::{BatchPagination, BatchRequest, BatchResponse};

    /// Serves `total_items` synthetic records; page N holds strings
    /// "N-0", "N-1", ... Counts every network call it answers.
    struct MockFetcher {
        calls: AtomicUsize,
        total_items: u64,
        fail_times: AtomicUsize,
    }

    impl MockFetcher {
        fn new(total_items: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                total_items,
                fail_times: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PageFetcher<String> for Arc<MockFetcher> {
        async fn fetch_batch(
            &self,
            request: BatchRequest,
        ) -> Result<BatchResponse<String>, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;

            if self
                .fail_times
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ClientError::Status {
                    status: 500,
                    body: "backend down".into(),
                });
            }

            let per_page = request.items_per_page as u64;
            let total_pages = self.total_items.div_ceil(per_page) as u32;
            let data = request
                .pages
                .iter()
                .filter(|&&page| page >= 1 && page <= total_pages)
                .map(|&page| {
                    let count = per_page.min(self.total_items - (page as u64 - 1) * per_page);
                    let items = (0..count).map(|i| format!("{page}-{i}")).collect();
                    (page, items)
                })
                .collect();

            Ok(BatchResponse {
                data,
                pagination: BatchPagination {
                    total_items: self.total_items,
                    total_pages,
                    items_per_page: request.items_per_page,
                    loaded_pages: request.pages,
                },
            })
        }
    }

    fn quiet_config() -> PaginationConfig {
        PaginationConfig {
            enable_background_preload: false,
            ..PaginationConfig::default()
        }
    }

    fn paginator(
        fetcher: &Arc<MockFetcher>,
        config: PaginationConfig,
    ) -> Paginator<String, Arc<MockFetcher>> {
        Paginator::new(Arc::clone(fetcher), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());

        pager.initial_load().await.unwrap();

        let view = pager.view();
        assert_eq!(view.current_page, 1);
        assert_eq!(view.total_pages, 5);
        assert_eq!(view.total_items, 45);
        assert_eq!(view.current_items.len(), 10);
        assert_eq!(view.current_items[0], "1-0");
        assert!(!view.is_initial_load);
        assert!(!view.is_loading);
        assert!(view.has_next_page);
        assert!(!view.has_prev_page);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_navigation_is_noop() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());
        pager.initial_load().await.unwrap();

        pager.go_to_page(0).await;
        assert_eq!(pager.view().current_page, 1);

        pager.go_to_page(6).await;
        assert_eq!(pager.view().current_page, 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_before_first_load_is_noop() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());

        pager.go_to_page(1).await;
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(pager.view().total_pages, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_navigation_issues_no_network_call() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());
        pager.initial_load().await.unwrap();

        pager.go_to_page(2).await;
        assert_eq!(fetcher.calls(), 2);

        // Both pages are warm now; bouncing between them is free.
        pager.go_to_page(1).await;
        pager.go_to_page(2).await;
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(pager.view().current_items[0], "2-0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_prev_first_last() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());
        pager.initial_load().await.unwrap();

        pager.next_page().await;
        assert_eq!(pager.view().current_page, 2);

        pager.prev_page().await;
        assert_eq!(pager.view().current_page, 1);
        pager.prev_page().await;
        assert_eq!(pager.view().current_page, 1);

        pager.last_page().await;
        let view = pager.view();
        assert_eq!(view.current_page, 5);
        assert!(!view.has_next_page);
        // Last page holds the remainder.
        assert_eq!(view.current_items.len(), 5);
        assert_eq!(view.end_index, 45);

        pager.first_page().await;
        assert_eq!(pager.view().current_page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_change_resets_everything() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());
        pager.initial_load().await.unwrap();
        pager.go_to_page(3).await;
        assert_eq!(pager.view().current_page, 3);

        let mut filters = FilterSet::new();
        filters.insert("status".into(), serde_json::json!("accepted"));
        pager.set_filters(filters).await.unwrap();

        let view = pager.view();
        assert_eq!(view.current_page, 1);
        // Old pages are gone; page 1 was re-fetched fresh.
        assert_eq!(fetcher.calls(), 3);
        assert!(pager.is_page_loaded(1));
        assert!(!pager.is_page_loaded(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_page_invalidates_only_that_page() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());
        pager.initial_load().await.unwrap();
        pager.go_to_page(2).await;
        assert_eq!(fetcher.calls(), 2);

        pager.refresh_page(Some(2)).await.unwrap();
        assert_eq!(fetcher.calls(), 3);

        // Page 1 survived the refresh.
        pager.go_to_page(1).await;
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_all_reloads_from_page_one() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());
        pager.initial_load().await.unwrap();
        pager.go_to_page(4).await;

        pager.refresh_all().await.unwrap();
        let view = pager.view();
        assert_eq!(view.current_page, 1);
        assert_eq!(fetcher.calls(), 3);
        assert!(!pager.is_page_loaded(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_preload_marks_pages() {
        let fetcher = MockFetcher::new(45);
        let config = PaginationConfig {
            enable_background_preload: true,
            preload_delay: Duration::from_millis(500),
            ..PaginationConfig::default()
        };
        let pager = paginator(&fetcher, config);
        pager.initial_load().await.unwrap();

        // Let the quiet period elapse and the preload sequence run.
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(pager.is_page_loaded(2));
        assert!(pager.is_page_loaded(3));
        assert!(pager.is_page_preloaded(2));
        assert!(pager.is_page_preloaded(3));
        // Page 1 was a foreground load, not a preload.
        assert!(!pager.is_page_preloaded(1));

        let view = pager.view();
        assert!(!view.is_loading);
        assert!(!view.is_preloading);

        // Preloaded pages are warm: no further calls on navigation.
        let calls = fetcher.calls();
        pager.go_to_page(2).await;
        assert_eq!(fetcher.calls(), calls);

        pager.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_subset_invariant() {
        let fetcher = MockFetcher::new(45);
        let config = PaginationConfig {
            enable_background_preload: true,
            ..PaginationConfig::default()
        };
        let pager = paginator(&fetcher, config);
        pager.initial_load().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        pager.go_to_page(3).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        pager.refresh_page(None).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let total_pages = pager.view().total_pages;
        for page in 1..=total_pages + 2 {
            if pager.is_page_preloaded(page) {
                assert!(pager.is_page_loaded(page));
            }
            if pager.is_page_loaded(page) {
                assert!(page >= 1 && page <= total_pages);
            }
        }
        pager.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_sets_error_and_retry_recovers() {
        let fetcher = MockFetcher::new(45);
        // Exhaust the default retry budget (2 retries = 3 tries).
        fetcher.fail_times.store(3, Ordering::SeqCst);
        let pager = paginator(&fetcher, quiet_config());

        pager.initial_load().await.unwrap_err();
        let view = pager.view();
        assert!(view.error.as_deref().unwrap().contains("500"));
        assert_eq!(view.retry_count, 1);
        assert!(view.is_initial_load);

        // Backend is healthy again; user-initiated retry succeeds.
        pager.retry().await.unwrap();
        let view = pager.view();
        assert!(view.error.is_none());
        assert_eq!(view.retry_count, 0);
        assert_eq!(view.total_pages, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_state() {
        let fetcher = MockFetcher::new(45);
        let pager = paginator(&fetcher, quiet_config());
        pager.initial_load().await.unwrap();

        pager.shutdown();
        assert!(!pager.is_page_loaded(1));
        assert!(pager.view().current_items.is_empty());
    }
}
