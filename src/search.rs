use crate::api::{ApiError, Backend, SearchResults};
use crate::history::{self, History, HistoryEntry, HistoryState, flag_value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub const DEFAULT_PAGE_LEN: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub include_related_forms: bool,
    pub ignore_diacritics: bool,
}

/// One page of a search, as carried in history entries and the address bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    pub query: String,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub include_related_forms: bool,
    #[serde(default)]
    pub ignore_diacritics: bool,
}

fn first_page() -> u32 {
    1
}

impl SearchState {
    pub fn new(query: impl Into<String>, page: u32, options: SearchOptions) -> Self {
        Self {
            query: query.into(),
            page: page.max(1),
            include_related_forms: options.include_related_forms,
            ignore_diacritics: options.ignore_diacritics,
        }
    }

    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            include_related_forms: self.include_related_forms,
            ignore_diacritics: self.ignore_diacritics,
        }
    }

    pub fn query_string(&self) -> String {
        history::search_query_string(self)
    }

    /// Rebuilds a search from an address-bar URL. Returns `None` without a
    /// non-empty `q` parameter.
    pub fn from_query(url: &str) -> Option<Self> {
        let mut query = None;
        let mut page = 1;
        let mut options = SearchOptions::default();
        for (key, value) in history::parse_query(url) {
            match key.as_str() {
                "q" => query = Some(value),
                "page" => page = parse_page(&value),
                "include_related" | "related_forms" => {
                    options.include_related_forms = flag_value(&value)
                }
                "ignore_diacritics" => options.ignore_diacritics = flag_value(&value),
                _ => {}
            }
        }
        query
            .filter(|q| !q.trim().is_empty())
            .map(|q| Self::new(q, page, options))
    }
}

/// Coerces a raw page number to a positive page, falling back to 1.
pub fn normalize_page(raw: Option<i64>) -> u32 {
    match raw {
        Some(page) if page >= 1 => u32::try_from(page).unwrap_or(u32::MAX),
        Some(page) => {
            warn!(page, "page number must be positive; using page 1");
            1
        }
        None => 1,
    }
}

/// Parses the text of a page-number field. Blank means page 1.
pub fn parse_page(raw: &str) -> u32 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 1;
    }
    match trimmed.parse::<i64>() {
        Ok(page) => normalize_page(Some(page)),
        Err(_) => {
            warn!(raw = trimmed, "page number is not numeric; using page 1");
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_len: u32,
    pub result_count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    pub fn for_results(result_count: u64, page: u32, page_len: u32) -> Self {
        let page = page.max(1);
        Self {
            page,
            page_len,
            result_count,
            has_next: result_count > u64::from(page) * u64::from(page_len),
            has_previous: page > 1,
        }
    }

    /// 1-based inclusive range of results shown on this page, if any.
    pub fn shown_range(&self) -> Option<(u64, u64)> {
        let first = u64::from(self.page.saturating_sub(1)) * u64::from(self.page_len) + 1;
        if self.page_len == 0 || first > self.result_count {
            return None;
        }
        let last = (u64::from(self.page) * u64::from(self.page_len)).min(self.result_count);
        Some((first, last))
    }
}

/// The parts of the search page the controller reads and writes.
pub trait SearchPage {
    fn query_field(&self) -> String;

    fn set_query_field(&self, query: &str);

    /// Text of the page-number field, when the page has one.
    fn page_field(&self) -> Option<String>;

    fn search_options(&self) -> SearchOptions;

    fn set_search_options(&self, options: SearchOptions);

    /// Page marker stored with the results currently on screen.
    fn displayed_page(&self) -> Option<u32>;

    /// Shows a result set and stores `state.page` as the displayed page.
    fn render_results(&self, state: &SearchState, results: &SearchResults, pagination: &Pagination);

    /// Shows an error in place of results. The stored page marker is kept.
    fn render_error(&self, state: &SearchState, error: &ApiError);
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub state: SearchState,
    pub results: SearchResults,
    pub pagination: Pagination,
}

/// Drives paginated searches and keeps the history stack in step with the
/// page of results on screen.
pub struct SearchController<B, H, P> {
    backend: B,
    history: H,
    page: P,
    page_len: u32,
}

impl<B, H, P> SearchController<B, H, P>
where
    B: Backend,
    H: History,
    P: SearchPage,
{
    pub fn new(backend: B, history: H, page: P) -> Self {
        Self {
            backend,
            history,
            page,
            page_len: DEFAULT_PAGE_LEN,
        }
    }

    /// Page length assumed when a response does not report one.
    pub fn with_page_len(mut self, page_len: u32) -> Self {
        self.page_len = page_len.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Runs one search request and renders its outcome.
    ///
    /// Without an explicit `page` the page-number field is used, else page 1.
    /// History is only touched after a successful response.
    pub async fn submit_search(
        &self,
        query: &str,
        page: Option<i64>,
        update_history: bool,
        options: SearchOptions,
    ) -> Result<SearchOutcome, ApiError> {
        let page = match page {
            Some(raw) => normalize_page(Some(raw)),
            None => self
                .page
                .page_field()
                .map(|field| parse_page(&field))
                .unwrap_or(1),
        };
        let state = SearchState::new(query, page, options);
        debug!(query = %state.query, page, update_history, "submitting search");

        match self.backend.search(&state).await {
            Ok(results) => {
                let page_len = if results.page_len == 0 {
                    self.page_len
                } else {
                    results.page_len
                };
                let pagination = Pagination::for_results(results.result_count, state.page, page_len);
                self.page.render_results(&state, &results, &pagination);
                if update_history {
                    self.history
                        .push_state(HistoryState::Search(state.clone()), state.query_string());
                }
                info!(
                    query = %state.query,
                    page = state.page,
                    results = results.result_count,
                    "search completed"
                );
                Ok(SearchOutcome {
                    state,
                    results,
                    pagination,
                })
            }
            Err(err) => {
                match &err {
                    ApiError::NotFound(_) => info!(query = %state.query, "search found nothing"),
                    ApiError::RequestFailed(_) => {
                        error!(query = %state.query, page = state.page, error = %err, "search failed")
                    }
                }
                self.page.render_error(&state, &err);
                Err(err)
            }
        }
    }

    /// Moves `offset` pages away from the page currently on screen.
    pub async fn change_page(&self, offset: i64) -> Result<SearchOutcome, ApiError> {
        let current = self.page.displayed_page().unwrap_or(1);
        let query = self.page.query_field();
        let options = self.page.search_options();
        self.submit_search(&query, Some(i64::from(current) + offset), true, options)
            .await
    }

    /// Replays a search from a back/forward navigation without pushing a new
    /// entry. Entries without search state are ignored.
    pub async fn on_history_navigate(
        &self,
        entry: &HistoryEntry,
    ) -> Option<Result<SearchOutcome, ApiError>> {
        let Some(HistoryState::Search(state)) = &entry.state else {
            debug!(url = %entry.url, "history entry has no search state");
            return None;
        };
        self.page.set_query_field(&state.query);
        self.page.set_search_options(state.options());
        Some(
            self.submit_search(&state.query, Some(i64::from(state.page)), false, state.options())
                .await,
        )
    }

    /// Runs the search encoded in a page URL, as on first load.
    pub async fn restore_from_url(&self, url: &str) -> Option<Result<SearchOutcome, ApiError>> {
        let state = SearchState::from_query(url)?;
        self.page.set_query_field(&state.query);
        self.page.set_search_options(state.options());
        Some(
            self.submit_search(&state.query, Some(i64::from(state.page)), false, state.options())
                .await,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedResults {
    pub state: SearchState,
    pub results: SearchResults,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSurface {
    pub query: String,
    pub page_field: Option<String>,
    pub options: SearchOptions,
    pub displayed: Option<DisplayedResults>,
    pub error: Option<String>,
}

/// `SearchPage` kept in memory, for the command line and tests.
#[derive(Default)]
pub struct MemoryPage {
    inner: Mutex<PageSurface>,
}

impl MemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_page_field(&self, value: Option<String>) {
        self.inner.lock().page_field = value;
    }

    pub fn snapshot(&self) -> PageSurface {
        self.inner.lock().clone()
    }
}

impl SearchPage for MemoryPage {
    fn query_field(&self) -> String {
        self.inner.lock().query.clone()
    }

    fn set_query_field(&self, query: &str) {
        self.inner.lock().query = query.to_string();
    }

    fn page_field(&self) -> Option<String> {
        self.inner.lock().page_field.clone()
    }

    fn search_options(&self) -> SearchOptions {
        self.inner.lock().options
    }

    fn set_search_options(&self, options: SearchOptions) {
        self.inner.lock().options = options;
    }

    fn displayed_page(&self) -> Option<u32> {
        self.inner
            .lock()
            .displayed
            .as_ref()
            .map(|shown| shown.state.page)
    }

    fn render_results(&self, state: &SearchState, results: &SearchResults, pagination: &Pagination) {
        let mut surface = self.inner.lock();
        surface.query = state.query.clone();
        surface.options = state.options();
        surface.error = None;
        surface.displayed = Some(DisplayedResults {
            state: state.clone(),
            results: results.clone(),
            pagination: *pagination,
        });
    }

    fn render_error(&self, _state: &SearchState, error: &ApiError) {
        self.inner.lock().error = Some(error.user_message().to_string());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{
        BetaCodeConversion, ResolvedReference, SearchHit, TypeaheadHint, WikiInfo, WordParse,
    };
    use crate::history::SessionHistory;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted backend that records every search request.
    #[derive(Clone, Default)]
    pub(crate) struct FakeBackend {
        pub requests: Arc<Mutex<Vec<SearchState>>>,
        pub failures: Arc<Mutex<VecDeque<ApiError>>>,
        pub result_count: u64,
    }

    impl FakeBackend {
        pub fn with_results(result_count: u64) -> Self {
            Self {
                result_count,
                ..Self::default()
            }
        }

        pub fn fail_next(&self, err: ApiError) {
            self.failures.lock().push_back(err);
        }

        pub fn requests(&self) -> Vec<SearchState> {
            self.requests.lock().clone()
        }
    }

    impl Backend for FakeBackend {
        async fn search(&self, state: &SearchState) -> Result<SearchResults, ApiError> {
            self.requests.lock().push(state.clone());
            let failure = self.failures.lock().pop_front();
            if let Some(err) = failure {
                return Err(err);
            }
            Ok(SearchResults {
                result_count: self.result_count,
                page: state.page,
                page_len: 10,
                results: vec![SearchHit {
                    description: format!("{} #{}", state.query, state.page),
                    ..SearchHit::default()
                }],
                ..SearchResults::default()
            })
        }

        async fn word_parse(&self, word: &str) -> Result<Vec<WordParse>, ApiError> {
            Err(ApiError::NotFound(word.to_string()))
        }

        async fn wikipedia_info(&self, topic: &str) -> Result<WikiInfo, ApiError> {
            Err(ApiError::NotFound(topic.to_string()))
        }

        async fn convert_query_beta_code(&self, query: &str) -> Result<String, ApiError> {
            Ok(query.to_string())
        }

        async fn beta_code_to_unicode(&self, text: &str) -> Result<BetaCodeConversion, ApiError> {
            Ok(BetaCodeConversion {
                unicode: text.to_string(),
                beta_code: text.to_string(),
            })
        }

        async fn resolve_reference(
            &self,
            work: &str,
            reference: &str,
        ) -> Result<ResolvedReference, ApiError> {
            Ok(ResolvedReference {
                url: format!("/work/{work}/{reference}"),
                ..ResolvedReference::default()
            })
        }

        async fn typeahead_hints(&self) -> Result<Vec<TypeaheadHint>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn controller(
        result_count: u64,
    ) -> (
        SearchController<FakeBackend, SessionHistory, MemoryPage>,
        FakeBackend,
        SessionHistory,
    ) {
        let backend = FakeBackend::with_results(result_count);
        let history = SessionHistory::new("/search");
        let controller = SearchController::new(backend.clone(), history.clone(), MemoryPage::new());
        (controller, backend, history)
    }

    #[test]
    fn non_positive_pages_become_one() {
        assert_eq!(normalize_page(Some(0)), 1);
        assert_eq!(normalize_page(Some(-5)), 1);
        assert_eq!(normalize_page(Some(4)), 4);
        assert_eq!(normalize_page(None), 1);
        assert_eq!(parse_page("abc"), 1);
        assert_eq!(parse_page(" 7 "), 7);
        assert_eq!(parse_page(""), 1);
    }

    #[test]
    fn pagination_offers_next_only_when_more_results() {
        let second = Pagination::for_results(25, 2, 10);
        assert!(second.has_next);
        assert!(second.has_previous);
        let third = Pagination::for_results(25, 3, 10);
        assert!(!third.has_next);
        assert_eq!(third.shown_range(), Some((21, 25)));
        let first = Pagination::for_results(25, 1, 10);
        assert!(!first.has_previous);
        assert_eq!(Pagination::for_results(5, 4, 10).shown_range(), None);
    }

    #[test]
    fn state_from_url_reads_flags_and_page() {
        let state =
            SearchState::from_query("/search?q=logos&page=3&include_related=1&ignore_diacritics=0")
                .unwrap();
        assert_eq!(state.query, "logos");
        assert_eq!(state.page, 3);
        assert!(state.include_related_forms);
        assert!(!state.ignore_diacritics);
        assert!(SearchState::from_query("/search?page=2").is_none());
        assert_eq!(SearchState::from_query("?q=x&page=-2").unwrap().page, 1);
    }

    #[tokio::test]
    async fn zero_and_negative_pages_request_page_one() {
        let (controller, backend, _) = controller(25);
        for page in [0, -5, 1] {
            controller
                .submit_search("logos", Some(page), true, SearchOptions::default())
                .await
                .unwrap();
        }
        let pages: Vec<u32> = backend.requests().iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn missing_page_reads_page_field() {
        let (controller, backend, _) = controller(25);
        controller.page().set_page_field(Some("2".into()));
        controller
            .submit_search("logos", None, true, SearchOptions::default())
            .await
            .unwrap();
        controller.page().set_page_field(Some(String::new()));
        controller
            .submit_search("logos", None, true, SearchOptions::default())
            .await
            .unwrap();
        let pages: Vec<u32> = backend.requests().iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![2, 1]);
    }

    #[tokio::test]
    async fn success_pushes_history_with_state_and_url() {
        let (controller, _, history) = controller(25);
        let options = SearchOptions {
            include_related_forms: true,
            ignore_diacritics: false,
        };
        let outcome = controller
            .submit_search("logos", Some(3), true, options)
            .await
            .unwrap();
        assert!(!outcome.pagination.has_next);
        let current = history.current().unwrap();
        assert_eq!(current.url, "?q=logos&page=3&include_related=1&ignore_diacritics=0");
        assert_eq!(
            current.state,
            Some(HistoryState::Search(SearchState::new("logos", 3, options)))
        );
    }

    #[tokio::test]
    async fn update_history_false_leaves_stack_alone() {
        let (controller, _, history) = controller(25);
        controller
            .submit_search("logos", Some(1), false, SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn failure_renders_error_without_touching_history() {
        let (controller, backend, history) = controller(25);
        controller
            .submit_search("logos", Some(1), true, SearchOptions::default())
            .await
            .unwrap();
        backend.fail_next(ApiError::RequestFailed("boom".into()));
        let err = controller.change_page(1).await.unwrap_err();
        assert!(matches!(err, ApiError::RequestFailed(_)));
        assert_eq!(history.len(), 2);
        let surface = controller.page().snapshot();
        assert_eq!(
            surface.error.as_deref(),
            Some(ApiError::RequestFailed(String::new()).user_message())
        );
        assert_eq!(controller.page().displayed_page(), Some(1));
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn change_page_reads_displayed_marker() {
        let (controller, backend, _) = controller(45);
        controller.page().set_query_field("logos");
        controller
            .submit_search("logos", Some(2), true, SearchOptions::default())
            .await
            .unwrap();
        controller.change_page(1).await.unwrap();
        controller.change_page(-1).await.unwrap();
        let pages: Vec<u32> = backend.requests().iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![2, 3, 2]);
        assert_eq!(controller.page().displayed_page(), Some(2));
    }

    #[tokio::test]
    async fn back_navigation_replays_without_pushing() {
        let (controller, backend, history) = controller(45);
        controller
            .submit_search("foo", Some(1), true, SearchOptions::default())
            .await
            .unwrap();
        controller
            .submit_search("foo", Some(3), true, SearchOptions::default())
            .await
            .unwrap();
        let pushed = history.current().unwrap();
        controller.page().set_query_field("something else");

        let replayed = controller.on_history_navigate(&pushed).await.unwrap().unwrap();
        assert_eq!(replayed.state.page, 3);
        let requests = backend.requests();
        assert_eq!(requests[1], requests[2]);
        assert_eq!(history.len(), 3);
        assert_eq!(controller.page().query_field(), "foo");

        let previous = history.back().unwrap();
        let replayed = controller.on_history_navigate(&previous).await.unwrap().unwrap();
        assert_eq!(replayed.state.page, 1);
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn plain_history_entry_is_ignored() {
        let (controller, backend, _) = controller(25);
        let entry = HistoryEntry::plain("/work/new-testament");
        assert!(controller.on_history_navigate(&entry).await.is_none());
        let verse = HistoryEntry {
            state: Some(HistoryState::Verse { verse: "4".into() }),
            url: "?verse=4".into(),
        };
        assert!(controller.on_history_navigate(&verse).await.is_none());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn restore_from_url_runs_without_pushing() {
        let (controller, backend, history) = controller(25);
        let outcome = controller
            .restore_from_url("/search?q=logos&page=2&ignore_diacritics=1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.state.page, 2);
        assert!(backend.requests()[0].ignore_diacritics);
        assert!(controller.page().search_options().ignore_diacritics);
        assert_eq!(history.len(), 1);
    }
}
