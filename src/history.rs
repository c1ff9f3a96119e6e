use crate::search::SearchState;
use parking_lot::Mutex;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// State attached to a history entry pushed by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryState {
    Search(SearchState),
    Verse { verse: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: Option<HistoryState>,
    pub url: String,
}

impl HistoryEntry {
    /// An entry produced by ordinary navigation, without reader state.
    pub fn plain(url: impl Into<String>) -> Self {
        Self {
            state: None,
            url: url.into(),
        }
    }
}

/// The browser history stack as seen by the reader.
pub trait History {
    fn push_state(&self, state: HistoryState, url: String);

    fn current(&self) -> Option<HistoryEntry>;
}

/// In-memory history with browser-like back/forward semantics.
#[derive(Clone, Default)]
pub struct SessionHistory {
    inner: Arc<Mutex<HistoryStack>>,
}

#[derive(Default)]
struct HistoryStack {
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl SessionHistory {
    pub fn new(initial_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HistoryStack {
                entries: vec![HistoryEntry::plain(initial_url)],
                cursor: 0,
            })),
        }
    }

    /// Moves one entry back and returns the entry now current.
    pub fn back(&self) -> Option<HistoryEntry> {
        let mut stack = self.inner.lock();
        if stack.cursor == 0 || stack.entries.is_empty() {
            return None;
        }
        stack.cursor -= 1;
        stack.entries.get(stack.cursor).cloned()
    }

    pub fn forward(&self) -> Option<HistoryEntry> {
        let mut stack = self.inner.lock();
        if stack.cursor + 1 >= stack.entries.len() {
            return None;
        }
        stack.cursor += 1;
        stack.entries.get(stack.cursor).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.lock().entries.clone()
    }
}

impl History for SessionHistory {
    fn push_state(&self, state: HistoryState, url: String) {
        let mut stack = self.inner.lock();
        if !stack.entries.is_empty() {
            let keep = stack.cursor + 1;
            stack.entries.truncate(keep);
        }
        stack.entries.push(HistoryEntry {
            state: Some(state),
            url,
        });
        stack.cursor = stack.entries.len() - 1;
    }

    fn current(&self) -> Option<HistoryEntry> {
        let stack = self.inner.lock();
        stack.entries.get(stack.cursor).cloned()
    }
}

pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Decodes the query part of `url` (everything after the first `?`, up to
/// any fragment) into ordered key/value pairs. Repeated keys are kept.
pub fn parse_query(url: &str) -> Vec<(String, String)> {
    let query = match url.split_once('?') {
        Some((_, query)) => query,
        None if url.contains('=') => url,
        None => return Vec::new(),
    };
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

/// First value of `key` in the query part of `url`.
pub fn query_value(url: &str, key: &str) -> Option<String> {
    parse_query(url)
        .into_iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
}

/// Address-bar query string for a search; `page` is omitted on page 1.
pub fn search_query_string(state: &SearchState) -> String {
    let mut url = format!("?q={}", encode_component(&state.query));
    if state.page > 1 {
        url.push_str(&format!("&page={}", state.page));
    }
    url.push_str(&format!(
        "&include_related={}&ignore_diacritics={}",
        u8::from(state.include_related_forms),
        u8::from(state.ignore_diacritics)
    ));
    url
}

pub(crate) fn flag_value(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
