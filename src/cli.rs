use std::error::Error;
use std::time::Duration;

use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use textcritical_rs::api::{SearchResults, WordParse};
use textcritical_rs::hints::{HintIndex, HintMatch};
use textcritical_rs::lookup::{LookupOutcome, Lookups};
use textcritical_rs::reader::SettingsStore;
use textcritical_rs::{
    ApiError, ClientConfig, History, HttpBackend, MemoryPage, Pagination, ResolveStrategy,
    SearchController, SearchOptions, SessionHistory,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "textcritical", about = "Read and search TextCritical from the terminal", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the TextCritical site (overrides TEXTCRITICAL_BASE_URL).
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a typed reference such as "John 3:16" into a reading URL.
    Resolve {
        reference: String,
        /// Path of the page the reference is typed on.
        #[arg(long, default_value = "/")]
        path: String,
        /// Division names that contain spaces (e.g. "1 John"); repeatable.
        #[arg(short, long = "division")]
        divisions: Vec<String>,
    },
    /// Search the texts.
    Search {
        query: String,
        /// Page of results to show.
        #[arg(short, long, allow_negative_numbers = true)]
        page: Option<i64>,
        /// Include related forms of the search terms.
        #[arg(long)]
        related_forms: bool,
        /// Match regardless of accents and breathings.
        #[arg(long)]
        ignore_diacritics: bool,
        /// Convert beta-code terms in the query to Greek first.
        #[arg(long)]
        beta_code: bool,
    },
    /// Show the morphology of a word.
    Parse { word: String },
    /// Show background information on a topic.
    Wiki { topic: String },
    /// Convert beta code to Greek unicode.
    Beta {
        text: String,
        /// Treat the text as a search query and only convert its beta-code terms.
        #[arg(long)]
        query: bool,
    },
    /// Suggest works and authors matching a partial name.
    Hints {
        query: String,
        /// Maximum number of suggestions to return.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show or change reader settings.
    Settings {
        /// Flip the verse-per-line layout preference.
        #[arg(long)]
        toggle_break_verses: bool,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url.clone() {
        config = config.with_base_url(base_url);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    config.validate()?;

    if let Command::Settings {
        toggle_break_verses,
    } = cli.command
    {
        return handle_settings(&config, toggle_break_verses, cli.json);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli.command, config, cli.json))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn dispatch(command: Command, config: ClientConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let backend = HttpBackend::new(&config)?;
    match command {
        Command::Resolve {
            reference,
            path,
            divisions,
        } => handle_resolve(&backend, &reference, &path, &divisions, as_json).await,
        Command::Search {
            query,
            page,
            related_forms,
            ignore_diacritics,
            beta_code,
        } => {
            let options = SearchOptions {
                include_related_forms: related_forms,
                ignore_diacritics,
            };
            handle_search(backend, &config, query, page, options, beta_code, as_json).await
        }
        Command::Parse { word } => handle_parse(backend, &word, as_json).await,
        Command::Wiki { topic } => handle_topic(backend, &topic, as_json).await,
        Command::Beta { text, query } => handle_beta(backend, &text, query, as_json).await,
        Command::Hints { query, limit } => handle_hints(backend, &query, limit, as_json).await,
        Command::Settings {
            toggle_break_verses,
        } => handle_settings(&config, toggle_break_verses, as_json),
    }
}

async fn handle_resolve(
    backend: &HttpBackend,
    reference: &str,
    path: &str,
    divisions: &[String],
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if reference.trim().is_empty() {
        return Err("Reference cannot be empty".into());
    }
    let strategy = ResolveStrategy::for_context(divisions, path);
    let url = match strategy.resolve(backend, reference).await {
        Ok(url) => url,
        Err(ApiError::NotFound(_)) => {
            return Err(format!("No passage matches the reference {reference:?}").into());
        }
        Err(err) => return Err(err.into()),
    };
    let mode = match strategy {
        ResolveStrategy::Local { .. } => "local",
        ResolveStrategy::Remote { .. } => "remote",
    };

    if as_json {
        let payload = json!({ "reference": reference, "strategy": mode, "url": url });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}{}", backend.base_url(), url);
    }
    Ok(())
}

async fn handle_search(
    backend: HttpBackend,
    config: &ClientConfig,
    query: String,
    page: Option<i64>,
    options: SearchOptions,
    beta_code: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if query.trim().is_empty() {
        return Err("Search query cannot be empty".into());
    }
    let query = if beta_code {
        Lookups::new(backend.clone()).convert_query(&query).await?
    } else {
        query
    };
    let search_url = format!("{}/search", config.base_url);
    let history = SessionHistory::new(search_url.clone());
    let controller = SearchController::new(backend, history.clone(), MemoryPage::new())
        .with_page_len(config.page_len);

    let outcome = match controller.submit_search(&query, page, true, options).await {
        Ok(outcome) => outcome,
        Err(err @ ApiError::NotFound(_)) => {
            if as_json {
                let payload = json!({ "query": query, "found": false, "message": err.user_message() });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{}", err.user_message());
            }
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    let page_url = history
        .current()
        .map(|entry| format!("{search_url}{}", entry.url))
        .unwrap_or(search_url);

    if as_json {
        let payload = json!({
            "state": outcome.state,
            "url": page_url,
            "pagination": outcome.pagination,
            "results": outcome.results,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_search_results(&outcome.state.query, &outcome.results, &outcome.pagination);
        println!("\n{page_url}");
    }
    Ok(())
}

async fn handle_parse(backend: HttpBackend, word: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let lookups = Lookups::new(backend);
    match lookups.word_parse(word).await? {
        LookupOutcome::Found(parses) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(&parses)?);
            } else {
                print_parses(word, &parses);
            }
        }
        LookupOutcome::NothingFound { message } => print_nothing_found(word, &message, as_json)?,
    }
    Ok(())
}

async fn handle_topic(backend: HttpBackend, topic: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let lookups = Lookups::new(backend);
    match lookups.topic_info(topic).await? {
        LookupOutcome::Found(info) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{}", info.title);
                println!("{}", info.url);
                render_markdown_block("Summary", &info.summary);
            }
        }
        LookupOutcome::NothingFound { message } => print_nothing_found(topic, &message, as_json)?,
    }
    Ok(())
}

async fn handle_beta(
    backend: HttpBackend,
    text: &str,
    as_query: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let lookups = Lookups::new(backend);
    if as_query {
        let converted = lookups.convert_query(text).await?;
        if as_json {
            let payload = json!({ "query": text, "converted": converted });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else {
            println!("{converted}");
        }
        return Ok(());
    }
    let converted = lookups.beta_code_to_unicode(text).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&converted)?);
    } else {
        println!("{}", converted.unicode);
    }
    Ok(())
}

async fn handle_hints(
    backend: HttpBackend,
    query: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if query.trim().is_empty() {
        return Err("Hint query cannot be empty".into());
    }
    let index = HintIndex::new(backend);
    let matches = index.suggest(query, limit.max(1)).await?;
    if as_json {
        let payload = json!({ "query": query, "limit": limit, "results": matches });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_hint_table(query, &matches);
    }
    Ok(())
}

fn handle_settings(config: &ClientConfig, toggle: bool, as_json: bool) -> Result<(), Box<dyn Error>> {
    let store = match &config.settings_path {
        Some(path) => SettingsStore::persistent(path),
        None => {
            warn!("no settings path available; changes will not be kept");
            SettingsStore::ephemeral()
        }
    };
    let settings = if toggle {
        store.toggle_break_verses()
    } else {
        store.load()
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        println!("break_verses: {}", settings.break_verses);
        if let Some(path) = store.path() {
            println!("stored in {}", path.display());
        }
    }
    Ok(())
}

fn print_search_results(query: &str, results: &SearchResults, pagination: &Pagination) {
    let Some((first, last)) = pagination.shown_range() else {
        println!("No results for \"{query}\" on page {}.", pagination.page);
        return;
    };
    println!(
        "Results {first}-{last} of {} for \"{query}\" (page {}):",
        pagination.result_count, pagination.page
    );
    let width = results
        .results
        .iter()
        .map(|hit| hit.description.chars().count())
        .max()
        .unwrap_or(4)
        .max("PASSAGE".len());
    println!("{:<width$}  {}", "PASSAGE", "TEXT", width = width);
    println!("{:-<width$}  {}", "", "----", width = width);
    for hit in &results.results {
        println!("{:<width$}  {}", hit.description, hit.content_snippet, width = width);
    }

    let terms: Vec<String> = results
        .matched_terms
        .iter()
        .map(|(term, count)| format!("{term} ({count})"))
        .collect();
    if let Some(terms) = format_list(terms, 8) {
        println!("\nMatched terms: {terms}");
    }
    let works: Vec<String> = results
        .matched_works
        .iter()
        .map(|(work, count)| format!("{work} ({count})"))
        .collect();
    if let Some(works) = format_list(works, 6) {
        println!("Matched works: {works}");
    }

    let mut nav = Vec::new();
    if pagination.has_previous {
        nav.push(format!("previous: --page {}", pagination.page - 1));
    }
    if pagination.has_next {
        nav.push(format!("next: --page {}", pagination.page + 1));
    }
    if !nav.is_empty() {
        println!("\n{}", nav.join("  |  "));
    }
}

fn print_parses(word: &str, parses: &[WordParse]) {
    println!("Morphology for {word}:");
    for parse in parses {
        let lemma = parse.lemma.as_deref().unwrap_or("<unknown lemma>");
        println!("- {} ({lemma}): {}", parse.form, parse.description);
        if let Some(meaning) = parse.meaning.as_deref().filter(|m| !m.is_empty()) {
            println!("    Meaning: {meaning}");
        }
        let sources: Vec<String> = parse
            .lexicon_entries
            .iter()
            .map(|entry| entry.work_title.clone())
            .collect();
        if let Some(sources) = format_list(sources, 3) {
            println!("    Lexicon: {sources}");
        }
        if parse.ignoring_diacritics || parse.ignoring_numerals {
            println!("    (approximate match)");
        }
    }
}

fn print_hint_table(query: &str, rows: &[HintMatch]) {
    if rows.is_empty() {
        println!("No works or authors match \"{query}\".");
        return;
    }
    let width = rows
        .iter()
        .map(|row| row.hint.desc.chars().count())
        .max()
        .unwrap_or(4)
        .max("NAME".len());
    println!("{:<width$}  {}", "NAME", "URL", width = width);
    println!("{:-<width$}  {}", "", "---", width = width);
    for row in rows {
        let url = if row.hint.url.is_empty() {
            "<author>"
        } else {
            row.hint.url.as_str()
        };
        println!("{:<width$}  {}", row.hint.desc, url, width = width);
    }
}

fn print_nothing_found(subject: &str, message: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    if as_json {
        let payload = json!({ "query": subject, "found": false, "message": message });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{message}");
    }
    Ok(())
}

fn format_list(items: Vec<String>, limit: usize) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let truncated = items.len() > limit;
    let display = if truncated {
        &items[..limit]
    } else {
        &items[..]
    };
    let mut text = display.join(", ");
    if truncated {
        text.push_str(", …");
    }
    Some(text)
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
