use crate::history::{self, History, HistoryState, encode_component};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub fn verse_anchor(verse: &str) -> String {
    format!("verse_{verse}")
}

/// Values of the repeatable `highlight` parameter, in order.
pub fn highlights_from_query(url: &str) -> Vec<String> {
    history::parse_query(url)
        .into_iter()
        .filter(|(key, value)| key == "highlight" && !value.is_empty())
        .map(|(_, value)| value)
        .collect()
}

pub fn verse_url(base_url: &str, verse: &str, highlights: &[String]) -> String {
    let base = base_url.split(['?', '#']).next().unwrap_or_default();
    let mut url = format!("{base}?verse={}", encode_component(verse));
    for highlight in highlights {
        url.push_str("&highlight=");
        url.push_str(&encode_component(highlight));
    }
    url
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerseNavigation {
    /// The verse was highlighted and a history entry was pushed.
    Scrolled { anchor: String, url: String },
    /// No base URL is known; the link should navigate normally.
    DefaultLink,
}

pub struct VerseNavigator<H> {
    history: H,
    base_url: Option<String>,
    highlights: Vec<String>,
}

impl<H: History> VerseNavigator<H> {
    pub fn new(history: H, base_url: Option<String>) -> Self {
        Self {
            history,
            base_url,
            highlights: Vec::new(),
        }
    }

    /// Keeps the given highlight terms on verse URLs.
    pub fn with_highlights(mut self, highlights: Vec<String>) -> Self {
        self.highlights = highlights;
        self
    }

    pub fn scroll_to_verse(&self, verse: &str) -> VerseNavigation {
        let Some(base) = self
            .base_url
            .as_deref()
            .filter(|base| !base.trim().is_empty())
        else {
            warn!(verse, "no base URL for verse navigation; using the default link");
            return VerseNavigation::DefaultLink;
        };
        let url = verse_url(base, verse, &self.highlights);
        self.history.push_state(
            HistoryState::Verse {
                verse: verse.to_string(),
            },
            url.clone(),
        );
        debug!(verse, %url, "scrolled to verse");
        VerseNavigation::Scrolled {
            anchor: verse_anchor(verse),
            url,
        }
    }
}

/// Reading preferences kept between sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderSettings {
    #[serde(default)]
    pub break_verses: bool,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
}

impl SettingsStore {
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> ReaderSettings {
        let Some(path) = &self.path else {
            return ReaderSettings::default();
        };
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return ReaderSettings::default();
            }
            Err(err) => {
                warn!(error = %err, path = %path.display(), "failed to read reader settings");
                return ReaderSettings::default();
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "ignoring unreadable reader settings");
                ReaderSettings::default()
            }
        }
    }

    pub fn save(&self, settings: &ReaderSettings) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(error = %err, "failed to create settings directory");
                return;
            }
        }
        let bytes = match serde_json::to_vec_pretty(settings) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to serialize reader settings");
                return;
            }
        };
        if let Err(err) = fs::write(path, bytes) {
            warn!(error = %err, path = %path.display(), "failed to write reader settings");
        }
    }

    pub fn toggle_break_verses(&self) -> ReaderSettings {
        let mut settings = self.load();
        settings.break_verses = !settings.break_verses;
        self.save(&settings);
        settings
    }
}
