use parking_lot::Mutex;
use std::sync::atomic::{ AtomicBool, Ordering };

use crate::{ error::MreadError, metadata::ResourcePage };

/// Async seam between a paginator and whatever serves its pages; fetch
/// functions in `getter` implement it for the real APIs, tests script it.
pub(crate) trait PageSource<T> {
    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<ResourcePage<T>, MreadError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PageMode {
    /// Infinite scroll: every successful fetch appends to the item list.
    Append,
    /// Discrete pages: every successful fetch replaces the item list.
    Replace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FetchKind {
    Network,
    Http,
    Parse,
}

pub(crate) fn fetch_kind(err: &MreadError) -> FetchKind {
    match err {
        MreadError::NetworkError(_) => FetchKind::Network,
        MreadError::StatusError(_) => FetchKind::Http,
        _ => FetchKind::Parse,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PageState {
    Idle,
    Loading,
    Loaded,
    Failed {
        kind: FetchKind,
        message: String,
    },
}

struct PageData<T> {
    items: Vec<T>,
    offset: u32,
    page: u32,
    has_more: bool,
    state: PageState,
    // bumped by reset so a stale in-flight fetch cannot land its result
    generation: u64,
}

/// Cursor state machine over one paginated query. One instance owns one
/// cursor; at most one fetch is ever in flight, late triggers are dropped
/// instead of queued. A failed fetch keeps everything already loaded.
pub(crate) struct Paginator<T, S> {
    source: S,
    limit: u32,
    mode: PageMode,
    data: Mutex<PageData<T>>,
    in_flight: AtomicBool,
}

// releases the in-flight slot even when the owning future is dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> Drop for InFlight<'a> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: Clone, S: PageSource<T>> Paginator<T, S> {
    pub(crate) fn append(source: S, limit: u32) -> Paginator<T, S> {
        Paginator::new(source, limit, PageMode::Append)
    }

    pub(crate) fn paged(source: S, limit: u32) -> Paginator<T, S> {
        Paginator::new(source, limit, PageMode::Replace)
    }

    fn new(source: S, limit: u32, mode: PageMode) -> Paginator<T, S> {
        Paginator {
            source,
            limit,
            mode,
            data: Mutex::new(PageData {
                items: Vec::new(),
                offset: 0,
                page: 0,
                has_more: true,
                state: PageState::Idle,
                generation: 0,
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    pub(crate) fn items(&self) -> Vec<T> {
        self.data.lock().items.clone()
    }

    pub(crate) fn state(&self) -> PageState {
        self.data.lock().state.clone()
    }

    pub(crate) fn has_more(&self) -> bool {
        self.data.lock().has_more
    }

    pub(crate) fn offset(&self) -> u32 {
        self.data.lock().offset
    }

    pub(crate) fn current_page(&self) -> u32 {
        self.data.lock().page
    }

    /// Drops all loaded items and rewinds the cursor; the result of any
    /// fetch still in flight is discarded when it lands.
    pub(crate) fn reset(&self) {
        let mut data = self.data.lock();
        data.items.clear();
        data.offset = 0;
        data.page = 0;
        data.has_more = true;
        data.state = PageState::Idle;
        data.generation += 1;
    }

    /// Fetches the next page and appends it. Returns true only when a fetch
    /// ran and succeeded; a call while another fetch is pending, or past the
    /// end of the collection, is a no-op.
    pub(crate) async fn load_more(&self) -> bool {
        if !self.data.lock().has_more {
            return false;
        }
        if self.in_flight.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return false;
        }
        let _guard = InFlight(&self.in_flight);
        let (offset, generation) = {
            let mut data = self.data.lock();
            data.state = PageState::Loading;
            (data.offset, data.generation)
        };
        let result = self.source.fetch_page(offset, self.limit).await;
        let mut data = self.data.lock();
        if data.generation != generation {
            return false;
        }
        match result {
            Ok(page) => {
                data.has_more = (page.items.len() as u32) >= self.limit;
                data.offset += self.limit;
                data.items.extend(page.items);
                data.state = PageState::Loaded;
                true
            }
            Err(err) => {
                data.state = PageState::Failed {
                    kind: fetch_kind(&err),
                    message: err.to_string(),
                };
                false
            }
        }
    }

    /// Refetches from the start and replaces the loaded items. Explicit:
    /// the hosting screen calls this on becoming visible, nothing happens
    /// implicitly.
    pub(crate) async fn refresh(&self) -> bool {
        if self.in_flight.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return false;
        }
        let _guard = InFlight(&self.in_flight);
        let generation = {
            let mut data = self.data.lock();
            data.state = PageState::Loading;
            data.generation
        };
        let result = self.source.fetch_page(0, self.limit).await;
        let mut data = self.data.lock();
        if data.generation != generation {
            return false;
        }
        match result {
            Ok(page) => {
                data.has_more = (page.items.len() as u32) >= self.limit;
                data.offset = match self.mode {
                    PageMode::Append => self.limit,
                    PageMode::Replace => 0,
                };
                data.page = 1;
                data.items = page.items;
                data.state = PageState::Loaded;
                true
            }
            Err(err) => {
                data.state = PageState::Failed {
                    kind: fetch_kind(&err),
                    message: err.to_string(),
                };
                false
            }
        }
    }

    /// Replace-mode navigation to 1-based page `n`; page numbers below 1
    /// are rejected as no-ops.
    pub(crate) async fn go_to_page(&self, n: u32) -> bool {
        if self.mode != PageMode::Replace || n < 1 {
            return false;
        }
        if self.in_flight.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return false;
        }
        let _guard = InFlight(&self.in_flight);
        let offset = (n - 1) * self.limit;
        let generation = {
            let mut data = self.data.lock();
            data.state = PageState::Loading;
            data.generation
        };
        let result = self.source.fetch_page(offset, self.limit).await;
        let mut data = self.data.lock();
        if data.generation != generation {
            return false;
        }
        match result {
            Ok(page) => {
                data.has_more = (page.items.len() as u32) >= self.limit;
                data.offset = offset;
                data.page = n;
                data.items = page.items;
                data.state = PageState::Loaded;
                true
            }
            Err(err) => {
                data.state = PageState::Failed {
                    kind: fetch_kind(&err),
                    message: err.to_string(),
                };
                false
            }
        }
    }

    pub(crate) async fn next_page(&self) -> bool {
        if !self.has_more() {
            return false;
        }
        let page = self.current_page();
        self.go_to_page(page + 1).await
    }

    pub(crate) async fn previous_page(&self) -> bool {
        let page = self.current_page();
        if page <= 1 {
            return false;
        }
        self.go_to_page(page - 1).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    struct ScriptSource {
        pages: Mutex<VecDeque<Result<ResourcePage<u32>, MreadError>>>,
        calls: AtomicUsize,
        offsets: Mutex<Vec<u32>>,
    }

    impl ScriptSource {
        fn new(pages: Vec<Result<ResourcePage<u32>, MreadError>>) -> ScriptSource {
            ScriptSource {
                pages: Mutex::new(pages.into()),
                calls: AtomicUsize::new(0),
                offsets: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PageSource<u32> for ScriptSource {
        async fn fetch_page(
            &self,
            offset: u32,
            _limit: u32
        ) -> Result<ResourcePage<u32>, MreadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.offsets.lock().push(offset);
            match self.pages.lock().pop_front() {
                Some(page) => page,
                None => Ok(ResourcePage { items: Vec::new(), total: None }),
            }
        }
    }

    // fetch_page blocks until the test hands out a permit
    struct GatedSource {
        gate: Semaphore,
        calls: AtomicUsize,
    }

    impl PageSource<u32> for GatedSource {
        async fn fetch_page(
            &self,
            _offset: u32,
            limit: u32
        ) -> Result<ResourcePage<u32>, MreadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await;
            Ok(ResourcePage { items: (0..limit).collect(), total: None })
        }
    }

    fn page_of(len: u32) -> Result<ResourcePage<u32>, MreadError> {
        Ok(ResourcePage { items: (0..len).collect(), total: None })
    }

    // three appends over pages of [limit, limit, limit - 1] end the collection
    #[tokio::test]
    async fn test_append_mode_ends_on_short_page() {
        let paginator = Paginator::append(
            ScriptSource::new(vec![page_of(5), page_of(5), page_of(4)]),
            5
        );

        assert!(paginator.load_more().await);
        assert!(paginator.has_more());
        assert!(paginator.load_more().await);
        assert!(paginator.has_more());
        assert!(paginator.load_more().await);
        assert!(!paginator.has_more());

        assert_eq!(paginator.items().len(), 14);
        assert_eq!(paginator.state(), PageState::Loaded);

        // the collection is exhausted, a further trigger must not fetch
        assert!(!paginator.load_more().await);
        assert_eq!(paginator.source.calls(), 3);
    }

    // offsets advance by limit per successful append
    #[tokio::test]
    async fn test_append_mode_advances_offset_by_limit() {
        let paginator = Paginator::append(
            ScriptSource::new(vec![page_of(5), page_of(5), page_of(0)]),
            5
        );

        paginator.load_more().await;
        paginator.load_more().await;
        paginator.load_more().await;

        assert_eq!(*paginator.source.offsets.lock(), vec![0, 5, 10]);
    }

    // a second trigger while the first fetch is pending is dropped, not queued
    #[tokio::test]
    async fn test_concurrent_load_more_fetches_once() {
        let paginator = Paginator::append(
            GatedSource { gate: Semaphore::new(0), calls: AtomicUsize::new(0) },
            5
        );

        let first = paginator.load_more();
        futures::join!(first, async {
            assert!(!paginator.load_more().await);
            paginator.source.gate.add_permits(1);
        });

        assert_eq!(paginator.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(paginator.items().len(), 5);
    }

    // a failed fetch keeps the loaded items and allows a retry
    #[tokio::test]
    async fn test_failure_keeps_items_and_allows_retry() {
        let paginator = Paginator::append(
            ScriptSource::new(
                vec![
                    page_of(5),
                    Err(MreadError::JsonError(String::from("bad page"))),
                    page_of(3)
                ]
            ),
            5
        );

        assert!(paginator.load_more().await);
        assert!(!paginator.load_more().await);

        match paginator.state() {
            PageState::Failed { kind, .. } => assert_eq!(kind, FetchKind::Parse),
            state => panic!("expected failed state, got {:?}", state),
        }
        assert_eq!(paginator.items().len(), 5);

        assert!(paginator.load_more().await);
        assert_eq!(paginator.items().len(), 8);
        assert!(!paginator.has_more());
    }

    // replace mode swaps the item list and tracks the page number
    #[tokio::test]
    async fn test_replace_mode_replaces_items() {
        let paginator = Paginator::paged(
            ScriptSource::new(vec![page_of(4), page_of(4)]),
            4
        );

        assert!(paginator.go_to_page(1).await);
        assert_eq!(paginator.items().len(), 4);
        assert_eq!(paginator.current_page(), 1);

        assert!(paginator.next_page().await);
        assert_eq!(paginator.items().len(), 4);
        assert_eq!(paginator.current_page(), 2);
        assert_eq!(*paginator.source.offsets.lock(), vec![0, 4]);
    }

    // page numbers below 1 are rejected without touching the network
    #[tokio::test]
    async fn test_go_to_page_rejects_zero() {
        let paginator = Paginator::paged(ScriptSource::new(vec![page_of(4)]), 4);

        assert!(paginator.go_to_page(1).await);
        assert!(!paginator.go_to_page(0).await);

        assert_eq!(paginator.source.calls(), 1);
        assert_eq!(paginator.current_page(), 1);
    }

    // previous-page navigation is disabled on the first page
    #[tokio::test]
    async fn test_previous_page_on_first_page_is_noop() {
        let paginator = Paginator::paged(ScriptSource::new(vec![page_of(4), page_of(4)]), 4);

        assert!(!paginator.previous_page().await);
        assert!(paginator.go_to_page(1).await);
        assert!(!paginator.previous_page().await);

        assert_eq!(paginator.source.calls(), 1);
    }

    // goToPage lands on offset (n - 1) * limit
    #[tokio::test]
    async fn test_go_to_page_offset_formula() {
        let paginator = Paginator::paged(ScriptSource::new(vec![page_of(4)]), 4);

        assert!(paginator.go_to_page(3).await);

        assert_eq!(*paginator.source.offsets.lock(), vec![8]);
        assert_eq!(paginator.offset(), 8);
    }

    // go_to_page is an append-mode no-op
    #[tokio::test]
    async fn test_go_to_page_in_append_mode_is_noop() {
        let paginator = Paginator::append(ScriptSource::new(vec![page_of(4)]), 4);

        assert!(!paginator.go_to_page(2).await);
        assert_eq!(paginator.source.calls(), 0);
    }

    // refresh replaces accumulated items instead of appending again
    #[tokio::test]
    async fn test_refresh_replaces_accumulated_items() {
        let paginator = Paginator::append(
            ScriptSource::new(vec![page_of(5), page_of(5), page_of(5)]),
            5
        );

        paginator.load_more().await;
        paginator.load_more().await;
        assert_eq!(paginator.items().len(), 10);

        assert!(paginator.refresh().await);

        assert_eq!(paginator.items().len(), 5);
        assert_eq!(paginator.offset(), 5);
        assert_eq!(*paginator.source.offsets.lock(), vec![0, 5, 0]);
    }

    // reset rewinds the cursor so the next fetch starts over
    #[tokio::test]
    async fn test_reset_rewinds_cursor() {
        let paginator = Paginator::append(
            ScriptSource::new(vec![page_of(2), page_of(5)]),
            5
        );

        paginator.load_more().await;
        assert!(!paginator.has_more());

        paginator.reset();

        assert_eq!(paginator.items().len(), 0);
        assert_eq!(paginator.state(), PageState::Idle);
        assert!(paginator.load_more().await);
        assert_eq!(paginator.items().len(), 5);
        assert_eq!(*paginator.source.offsets.lock(), vec![0, 0]);
    }
}
