//! Command line front end. Every subcommand is a call into the tool registry.

use crate::config::{self, Config};
use crate::logging;
use crate::service::SearchService;
use crate::tool::base::{ToolContext, ToolResult};
use crate::tool::ToolRegistry;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Multi-engine web search with priority failover
#[derive(Parser)]
#[command(name = "search-fusion", version, about)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, env = "SEARCH_FUSION_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the web
    Search {
        query: String,
        /// Number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        num_results: usize,
        /// "auto" or an engine name
        #[arg(short, long, default_value = "auto")]
        engine: String,
    },

    /// Fetch a page as readable text
    Fetch {
        url: String,
        /// Page of the split content to print
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        page: u64,
        #[arg(long)]
        max_length: Option<usize>,
        /// Skip Jina Reader
        #[arg(long)]
        no_jina: bool,
    },

    /// Show engine health and search statistics
    Engines,

    /// Look up an entity on Wikipedia
    Wiki {
        entity: String,
        /// Leading sentences to return, 0 for everything
        #[arg(short, long, default_value_t = 10)]
        sentences: usize,
    },

    /// Find an archived snapshot on the Wayback Machine
    Wayback {
        url: String,
        /// Snapshot date as YYYY-MM-DD
        #[arg(short, long)]
        date: Option<String>,
    },

    /// List tool definitions as JSON
    Tools,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = logging::init(&config.logging)?;

    let service = SearchService::from_config(&config)?;
    let registry = service.tools();

    let outcome = run_command(&registry, cli.command).await;
    service.shutdown();
    outcome
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = config::load_from_path(path)?;
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        None => config::load_or_create_config(),
    }
}

async fn run_command(registry: &ToolRegistry, command: Command) -> Result<()> {
    let result = execute(registry, command).await?;
    eprintln!("{}", result.title);
    println!("{}", result.output);
    Ok(())
}

async fn execute(registry: &ToolRegistry, command: Command) -> Result<ToolResult> {
    let (tool, params) = match command {
        Command::Tools => {
            let definitions = registry.list_tool_definitions();
            let title = format!("{} tools", definitions.len());
            return Ok(ToolResult::json(title, &Value::Array(definitions)));
        }
        Command::Search {
            query,
            num_results,
            engine,
        } => (
            "search",
            json!({"query": query, "num_results": num_results, "engine": engine}),
        ),
        Command::Fetch {
            url,
            page,
            max_length,
            no_jina,
        } => return fetch_page(registry, &url, page, max_length, !no_jina).await,
        Command::Engines => ("get_available_engines", json!({})),
        Command::Wiki { entity, sentences } => (
            "search_wikipedia",
            json!({"entity": entity, "first_sentences": sentences}),
        ),
        Command::Wayback { url, date } => ("search_archived_webpage", wayback_params(url, date.as_deref())?),
    };

    call(registry, tool, params).await
}

/// Later pages are served from the in-process page cache, which starts
/// empty on every run, so the document is fetched first.
async fn fetch_page(
    registry: &ToolRegistry,
    url: &str,
    page: u64,
    max_length: Option<usize>,
    use_jina: bool,
) -> Result<ToolResult> {
    let params = json!({"url": url, "max_length": max_length, "use_jina": use_jina});
    let first = call(registry, "fetch_url", params.clone()).await?;
    if page == 1 {
        return Ok(first);
    }

    let body: Value = serde_json::from_str(&first.output).context("Unexpected fetch_url output")?;
    let Some(page_id) = body["page_id"].as_str() else {
        bail!("Page {page} requested but {url} fits on a single page");
    };

    let mut params = params;
    params["page_number"] = json!(page);
    params["page_id"] = json!(page_id);
    call(registry, "fetch_url", params).await
}

async fn call(registry: &ToolRegistry, tool: &str, params: Value) -> Result<ToolResult> {
    let tool = registry
        .get(tool)
        .with_context(|| format!("Tool not registered: {tool}"))?;
    Ok(tool.execute(params, &ToolContext::detached()).await?)
}

fn wayback_params(url: String, date: Option<&str>) -> Result<Value> {
    let mut params = json!({"url": url});
    if let Some(date) = date {
        let date = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{date}', expected YYYY-MM-DD"))?;
        params["year"] = json!(chrono::Datelike::year(&date));
        params["month"] = json!(chrono::Datelike::month(&date));
        params["day"] = json!(chrono::Datelike::day(&date));
    }
    Ok(params)
}
