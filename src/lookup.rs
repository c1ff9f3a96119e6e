use crate::api::{ApiError, Backend, BetaCodeConversion, WikiInfo, WordParse};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::{debug, error};

const DEFAULT_WORD_CACHE: usize = 128;

/// Result of a lookup that may legitimately come back empty.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Found(T),
    NothingFound { message: String },
}

impl<T> LookupOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            LookupOutcome::Found(value) => Some(value),
            LookupOutcome::NothingFound { .. } => None,
        }
    }
}

/// Word morphology, topic and beta-code lookups behind the reader's dialogs.
pub struct Lookups<B> {
    backend: B,
    word_cache: Mutex<LruCache<String, Vec<WordParse>>>,
}

impl<B: Backend> Lookups<B> {
    pub fn new(backend: B) -> Self {
        Self::with_capacity(backend, DEFAULT_WORD_CACHE)
    }

    pub fn with_capacity(backend: B, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            backend,
            word_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn word_parse(&self, word: &str) -> Result<LookupOutcome<Vec<WordParse>>, ApiError> {
        let word = word.trim();
        if word.is_empty() {
            return Ok(nothing_found("No word was given."));
        }
        let cached = self.word_cache.lock().get(word).cloned();
        if let Some(parses) = cached {
            debug!(word, "word parse served from cache");
            return Ok(LookupOutcome::Found(parses));
        }
        match self.backend.word_parse(word).await {
            Ok(parses) if parses.is_empty() => Ok(nothing_found(format!(
                "No morphological information was found for {word}."
            ))),
            Ok(parses) => {
                self.word_cache.lock().put(word.to_string(), parses.clone());
                Ok(LookupOutcome::Found(parses))
            }
            Err(ApiError::NotFound(_)) => Ok(nothing_found(format!(
                "No morphological information was found for {word}."
            ))),
            Err(err) => {
                error!(word, error = %err, "word parse failed");
                Err(err)
            }
        }
    }

    pub async fn topic_info(&self, topic: &str) -> Result<LookupOutcome<WikiInfo>, ApiError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Ok(nothing_found("No topic was given."));
        }
        match self.backend.wikipedia_info(topic).await {
            Ok(info) => Ok(LookupOutcome::Found(info)),
            Err(ApiError::NotFound(_)) => Ok(nothing_found(format!(
                "No information could be found for {topic}."
            ))),
            Err(err) => {
                error!(topic, error = %err, "topic lookup failed");
                Err(err)
            }
        }
    }

    /// Converts the beta-code terms of a search query before it is submitted.
    pub async fn convert_query(&self, query: &str) -> Result<String, ApiError> {
        self.backend
            .convert_query_beta_code(query)
            .await
            .inspect_err(|err| error!(query, error = %err, "beta-code query conversion failed"))
    }

    pub async fn beta_code_to_unicode(&self, text: &str) -> Result<BetaCodeConversion, ApiError> {
        self.backend
            .beta_code_to_unicode(text)
            .await
            .inspect_err(|err| error!(text, error = %err, "beta-code conversion failed"))
    }
}

fn nothing_found<T>(message: impl Into<String>) -> LookupOutcome<T> {
    LookupOutcome::NothingFound {
        message: message.into(),
    }
}
