use crate::api::{ApiError, Backend, TypeaheadHint};
use parking_lot::RwLock;
use rapidfuzz::fuzz;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

const PREFIX_SCORE: f64 = 2.0;
const SUBSTRING_SCORE: f64 = 1.5;
const MIN_SIMILARITY: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HintMatch {
    pub hint: TypeaheadHint,
    pub score: f64,
}

/// Works/authors typeahead list, fetched once per session.
pub struct HintIndex<B> {
    backend: B,
    hints: RwLock<Option<Arc<Vec<TypeaheadHint>>>>,
}

impl<B: Backend> HintIndex<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            hints: RwLock::new(None),
        }
    }

    pub async fn hints(&self) -> Result<Arc<Vec<TypeaheadHint>>, ApiError> {
        let cached = self.hints.read().clone();
        if let Some(hints) = cached {
            return Ok(hints);
        }
        let fetched = Arc::new(self.backend.typeahead_hints().await?);
        info!(count = fetched.len(), "loaded typeahead hints");
        *self.hints.write() = Some(Arc::clone(&fetched));
        Ok(fetched)
    }

    pub async fn suggest(&self, query: &str, limit: usize) -> Result<Vec<HintMatch>, ApiError> {
        let hints = self.hints().await?;
        Ok(filter_hints(&hints, query, limit))
    }

    /// Drops the cached list so the next call fetches it again.
    pub fn invalidate(&self) {
        *self.hints.write() = None;
    }
}

/// Ranks hints against `query`: prefix matches first, then substring
/// matches, then close fuzzy matches on the whole description or one of its
/// words.
pub fn filter_hints(hints: &[TypeaheadHint], query: &str, limit: usize) -> Vec<HintMatch> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }
    let mut matches: Vec<HintMatch> = hints
        .iter()
        .filter_map(|hint| {
            score_hint(&needle, &hint.desc).map(|score| HintMatch {
                hint: hint.clone(),
                score,
            })
        })
        .collect();
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.hint.desc.cmp(&b.hint.desc))
    });
    matches.truncate(limit);
    matches
}

fn score_hint(needle: &str, desc: &str) -> Option<f64> {
    let haystack = desc.to_lowercase();
    if haystack.starts_with(needle) {
        return Some(PREFIX_SCORE);
    }
    if haystack.contains(needle) {
        return Some(SUBSTRING_SCORE);
    }
    let whole = fuzz::ratio(needle.chars(), haystack.chars());
    let best = haystack
        .split_whitespace()
        .map(|word| fuzz::ratio(needle.chars(), word.chars()))
        .fold(whole, f64::max);
    (best >= MIN_SIMILARITY).then_some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests::FakeBackend;

    fn hint(desc: &str, url: &str) -> TypeaheadHint {
        TypeaheadHint {
            desc: desc.to_string(),
            url: url.to_string(),
        }
    }

    fn catalogue() -> Vec<TypeaheadHint> {
        vec![
            hint("Iliad", "/work/iliad"),
            hint("Odyssey", "/work/odyssey"),
            hint("Homer", ""),
            hint("Homeric Hymns", "/work/homeric-hymns"),
            hint("New Testament", "/work/new-testament"),
        ]
    }

    #[test]
    fn prefix_matches_rank_first() {
        let matches = filter_hints(&catalogue(), "hom", 10);
        let names: Vec<&str> = matches.iter().map(|m| m.hint.desc.as_str()).collect();
        assert_eq!(names, vec!["Homer", "Homeric Hymns"]);
    }

    #[test]
    fn substring_and_fuzzy_matches_follow() {
        let matches = filter_hints(&catalogue(), "testament", 10);
        assert_eq!(matches[0].hint.desc, "New Testament");
        assert_eq!(matches[0].score, SUBSTRING_SCORE);

        let fuzzy = filter_hints(&catalogue(), "odysey", 10);
        assert_eq!(fuzzy.len(), 1);
        assert_eq!(fuzzy[0].hint.desc, "Odyssey");
        assert!(fuzzy[0].score < SUBSTRING_SCORE);
    }

    #[test]
    fn blank_query_and_limit_are_respected() {
        assert!(filter_hints(&catalogue(), "  ", 10).is_empty());
        assert_eq!(filter_hints(&catalogue(), "o", 2).len(), 2);
        assert!(filter_hints(&catalogue(), "zzzz", 10).is_empty());
    }

    #[tokio::test]
    async fn hints_are_fetched_once() {
        let index = HintIndex::new(FakeBackend::default());
        let first = index.hints().await.unwrap();
        let second = index.hints().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        index.invalidate();
        let third = index.hints().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
