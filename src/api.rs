use crate::search::SearchState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

#[cfg(feature = "http")]
pub use http::HttpBackend;

/// Failure modes of a backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport failure, undecodable body or a non-success status.
    RequestFailed(String),
    /// The server answered but had nothing for the request (403/404).
    NotFound(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Message shown to the reader in place of the results.
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::RequestFailed(_) => "The request could not be completed. Please try again.",
            ApiError::NotFound(_) => "Nothing was found for this request.",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RequestFailed(message) => write!(f, "request failed: {message}"),
            ApiError::NotFound(resource) => write!(f, "not found: {resource}"),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub result_count: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_len: u32,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    #[serde(default)]
    pub matched_terms: BTreeMap<String, u64>,
    #[serde(default)]
    pub matched_works: BTreeMap<String, u64>,
    #[serde(default)]
    pub matched_sections: BTreeMap<String, u64>,
    #[serde(default)]
    pub match_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub verse: String,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub work: String,
    #[serde(default)]
    pub work_title_slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub highlights: String,
    #[serde(default)]
    pub content_snippet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WordParse {
    #[serde(default)]
    pub form: String,
    #[serde(default)]
    pub lemma: Option<String>,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub similarity: i64,
    #[serde(default)]
    pub ignoring_diacritics: bool,
    #[serde(default)]
    pub ignoring_numerals: bool,
    #[serde(default)]
    pub lexicon_entries: Vec<LexiconEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconEntry {
    #[serde(default)]
    pub work_id: u64,
    #[serde(default)]
    pub work_title: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub lemma_lexical_form: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiInfo {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub searched_for: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetaCodeConversion {
    pub unicode: String,
    #[serde(rename = "beta-code", default)]
    pub beta_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub url: String,
    #[serde(default)]
    pub divisions: Vec<String>,
    #[serde(default)]
    pub work_title: Option<String>,
    #[serde(default)]
    pub division_title: Option<String>,
}

/// One entry of the works/authors typeahead list. Authors carry an empty URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeaheadHint {
    pub desc: String,
    #[serde(default)]
    pub url: String,
}

/// The TextCritical REST endpoints consumed by the reader.
///
/// Each call issues exactly one request; nothing is retried or cancelled.
pub trait Backend {
    fn search(
        &self,
        state: &SearchState,
    ) -> impl Future<Output = Result<SearchResults, ApiError>> + Send;

    fn word_parse(&self, word: &str)
    -> impl Future<Output = Result<Vec<WordParse>, ApiError>> + Send;

    /// Topic information; a missing article is reported as `NotFound`.
    fn wikipedia_info(&self, topic: &str)
    -> impl Future<Output = Result<WikiInfo, ApiError>> + Send;

    /// Converts the beta-code parts of a search query to Greek unicode.
    fn convert_query_beta_code(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    fn beta_code_to_unicode(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<BetaCodeConversion, ApiError>> + Send;

    fn resolve_reference(
        &self,
        work: &str,
        reference: &str,
    ) -> impl Future<Output = Result<ResolvedReference, ApiError>> + Send;

    fn typeahead_hints(&self) -> impl Future<Output = Result<Vec<TypeaheadHint>, ApiError>> + Send;
}

/// Query parameters sent to the search endpoint.
pub fn search_endpoint_query(state: &SearchState) -> String {
    format!(
        "q={}&page={}&related_forms={}&ignore_diacritics={}",
        crate::history::encode_component(&state.query),
        state.page,
        u8::from(state.include_related_forms),
        u8::from(state.ignore_diacritics),
    )
}

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::config::ClientConfig;
    use crate::history::encode_component;
    use reqwest::{Client, StatusCode};
    use serde::de::DeserializeOwned;
    use tracing::debug;

    impl From<reqwest::Error> for ApiError {
        fn from(value: reqwest::Error) -> Self {
            ApiError::RequestFailed(value.to_string())
        }
    }

    /// `Backend` over HTTP against a configurable base URL.
    #[derive(Clone)]
    pub struct HttpBackend {
        client: Client,
        base_url: String,
    }

    impl HttpBackend {
        pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
            let client = Client::builder()
                .user_agent(&config.user_agent)
                .timeout(config.timeout)
                .gzip(true)
                .build()?;
            Ok(Self {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
            })
        }

        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        fn endpoint(&self, path_and_query: &str) -> String {
            format!("{}{}", self.base_url, path_and_query)
        }

        async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
            debug!(%url, "requesting");
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
                debug!(%url, %status, "nothing found");
                return Err(ApiError::NotFound(url));
            }
            if !status.is_success() {
                return Err(ApiError::RequestFailed(format!("{url} returned {status}")));
            }
            Ok(response.json::<T>().await?)
        }
    }

    impl Backend for HttpBackend {
        async fn search(&self, state: &SearchState) -> Result<SearchResults, ApiError> {
            let url = self.endpoint(&format!("/api/search/?{}", search_endpoint_query(state)));
            self.get_json(url).await
        }

        async fn word_parse(&self, word: &str) -> Result<Vec<WordParse>, ApiError> {
            let url = self.endpoint(&format!("/api/word_parse/{}", encode_component(word)));
            self.get_json(url).await
        }

        async fn wikipedia_info(&self, topic: &str) -> Result<WikiInfo, ApiError> {
            let url = self.endpoint(&format!("/api/wikipedia_info/{}", encode_component(topic)));
            self.get_json(url).await
        }

        async fn convert_query_beta_code(&self, query: &str) -> Result<String, ApiError> {
            let url = self.endpoint(&format!(
                "/api/convert_query_beta_code/?q={}",
                encode_component(query)
            ));
            self.get_json(url).await
        }

        async fn beta_code_to_unicode(&self, text: &str) -> Result<BetaCodeConversion, ApiError> {
            let url = self.endpoint(&format!(
                "/api/beta_code_to_unicode/?text={}",
                encode_component(text)
            ));
            self.get_json(url).await
        }

        async fn resolve_reference(
            &self,
            work: &str,
            reference: &str,
        ) -> Result<ResolvedReference, ApiError> {
            let url = self.endpoint(&format!(
                "/api/resolve_reference/?work={}&ref={}",
                encode_component(work),
                encode_component(reference)
            ));
            self.get_json(url).await
        }

        async fn typeahead_hints(&self) -> Result<Vec<TypeaheadHint>, ApiError> {
            self.get_json(self.endpoint("/api/works_typeahead_hints")).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchOptions;

    #[test]
    fn search_endpoint_encodes_flags_and_query() {
        let state = SearchState::new(
            "λόγος AND work:john",
            2,
            SearchOptions {
                include_related_forms: true,
                ignore_diacritics: false,
            },
        );
        let query = search_endpoint_query(&state);
        assert!(query.starts_with("q=%CE%BB"));
        assert!(query.contains("%20AND%20work%3Ajohn"));
        assert!(query.ends_with("&page=2&related_forms=1&ignore_diacritics=0"));
    }

    #[test]
    fn search_results_tolerate_missing_fields() {
        let payload = r#"{"result_count": 25, "page": 2, "page_len": 10,
            "results": [{"url": "/work/new-testament/john/1/1", "description": "John 1:1"}],
            "matched_terms": {"logos": 25}}"#;
        let results: SearchResults = serde_json::from_str(payload).unwrap();
        assert_eq!(results.result_count, 25);
        assert_eq!(results.results[0].description, "John 1:1");
        assert_eq!(results.matched_terms.get("logos"), Some(&25));
        assert!(results.matched_works.is_empty());
    }

    #[test]
    fn beta_code_conversion_reads_dashed_key() {
        let payload = r#"{"unicode": "λόγος", "beta-code": "lo/gos"}"#;
        let converted: BetaCodeConversion = serde_json::from_str(payload).unwrap();
        assert_eq!(converted.beta_code, "lo/gos");
    }

    #[test]
    fn not_found_has_friendlier_message() {
        let missing = ApiError::NotFound("/api/wikipedia_info/x".into());
        let failed = ApiError::RequestFailed("timeout".into());
        assert!(missing.is_not_found());
        assert_ne!(missing.user_message(), failed.user_message());
        assert_eq!(failed.to_string(), "request failed: timeout");
    }
}
