//! Turns typed references such as "1 Thessalonians 2:3" into reading paths.

use crate::api::{ApiError, Backend};
use tracing::debug;

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ':' | '.' | '_')
}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ',' | '&' | '-' | '_')
}

/// Reduces `text` to a token without whitespace.
///
/// Characters outside `[A-Za-z0-9,&_-]` and whitespace are dropped. If any
/// whitespace remains, literal hyphens become underscores and whitespace
/// becomes hyphens; text without whitespace is returned as is, so a slug
/// passed back through is unchanged.
pub fn slugify(text: &str) -> String {
    let kept: String = text
        .trim()
        .chars()
        .filter(|&c| is_slug_char(c) || c.is_whitespace())
        .collect();
    if !kept.chars().any(char::is_whitespace) {
        return kept;
    }
    kept.chars()
        .map(|c| match c {
            '-' => '_',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}

/// Splits a reference into lower-cased path tokens.
///
/// Occurrences of a known division name are never split, even when the name
/// contains delimiters. Longer names win where names overlap.
pub fn tokenize(reference: &str, divisions: &[String]) -> Vec<String> {
    let normalized = reference.trim().to_lowercase();
    let mut names: Vec<String> = divisions
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    names.dedup();

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut rest = normalized.as_str();
    while let Some(ch) = rest.chars().next() {
        if let Some(name) = names.iter().find(|name| rest.starts_with(name.as_str())) {
            current.push_str(name);
            rest = &rest[name.len()..];
            continue;
        }
        if is_delimiter(ch) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// First two non-empty segments of a URL path (work and author identifiers).
pub fn path_prefix(url_path: &str) -> Vec<String> {
    let path = url_path.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .take(2)
        .map(str::to_string)
        .collect()
}

/// Appends the tokens of `reference` to `prefix` as an absolute path.
///
/// ```
/// use textcritical_rs::reference::resolve_path;
/// let path = resolve_path("Romans 14:1", &[], &["work", "romans"]);
/// assert_eq!(path, "/work/romans/romans/14/1");
/// ```
pub fn resolve_path<S: AsRef<str>>(reference: &str, divisions: &[String], prefix: &[S]) -> String {
    let segments: Vec<String> = prefix
        .iter()
        .map(|segment| segment.as_ref().to_string())
        .chain(tokenize(reference, divisions))
        .collect();
    format!("/{}", segments.join("/"))
}

/// How a reference is turned into a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// Split locally, keeping the listed division names whole.
    Local {
        divisions: Vec<String>,
        prefix: Vec<String>,
    },
    /// Ask the server to resolve the reference within `work`.
    Remote { work: String },
}

impl ResolveStrategy {
    /// Picks local splitting when division names are known, otherwise the
    /// server resolver for the work in `current_path`.
    pub fn for_context(divisions: &[String], current_path: &str) -> Self {
        let prefix = path_prefix(current_path);
        if divisions.is_empty() {
            if let Some(work) = prefix.get(1) {
                return ResolveStrategy::Remote { work: work.clone() };
            }
        }
        ResolveStrategy::Local {
            divisions: divisions.to_vec(),
            prefix,
        }
    }

    pub async fn resolve<B: Backend>(&self, backend: &B, reference: &str) -> Result<String, ApiError> {
        match self {
            ResolveStrategy::Local { divisions, prefix } => {
                let path = resolve_path(reference, divisions, prefix);
                debug!(reference, %path, "resolved reference locally");
                Ok(path)
            }
            ResolveStrategy::Remote { work } => {
                let resolved = backend.resolve_reference(work, reference.trim()).await?;
                debug!(reference, work = %work, url = %resolved.url, "resolved reference remotely");
                Ok(resolved.url)
            }
        }
    }
}
