//! Client-side reading tools for the TextCritical site: reference
//! resolution, paginated search with history, and dialog lookups.

pub mod api;
pub mod config;
pub mod hints;
pub mod history;
pub mod lookup;
pub mod reader;
pub mod reference;
pub mod search;

pub use api::{ApiError, Backend};
#[cfg(feature = "http")]
pub use api::HttpBackend;
pub use config::ClientConfig;
pub use history::{History, HistoryEntry, HistoryState, SessionHistory};
pub use reference::{ResolveStrategy, resolve_path, slugify};
pub use search::{
    MemoryPage, Pagination, SearchController, SearchOptions, SearchOutcome, SearchPage,
    SearchState,
};
