use byte_unit::{Byte, UnitType};
use clap::CommandFactory;
use clap::Parser;
use colored::*;
use crossbeam_channel::{after, bounded, select};
use env_logger::{Builder, Env, Target};
use fedsearch::cli::{Cli, Commands, OutputFormat};
use fedsearch::config::Config;
use fedsearch::engine::{EngineEvent, LocalSearchEngine};
use fedsearch::error::{Result, SearchError};
use fedsearch::http::ReqwestClient;
use fedsearch::result::SearchResult;
use fedsearch::search::SourceCategory;
use fedsearch::sources::SourceDefinition;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct SearchReport<'a> {
    query: &'a str,
    token: String,
    finished: bool,
    results: &'a [Arc<SearchResult>],
}

/// How a search run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished,
    Enough,
    TimedOut,
    Interrupted,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let start_time = Instant::now();
    info!("Application started with command: {:?}", cli.command);

    match &cli.command {
        Commands::Search {
            query,
            sources,
            category,
            max_results,
            timeout_secs,
            output,
            metrics,
        } => {
            let config = Config::load(cli.config.as_deref())?;
            let selected = select_sources(config.configured_sources(), sources, *category)?;
            let http = Arc::new(ReqwestClient::new()?);
            let context = Arc::new(config.search_context(http));
            let (engine, events) =
                LocalSearchEngine::new(Arc::clone(&context), selected, config.engine_config())?;

            let (interrupt_tx, interrupt_rx) = bounded(1);
            ctrlc::set_handler(move || {
                interrupt_tx.try_send(()).ok();
            })
            .map_err(|e| SearchError::Other(format!("cannot install Ctrl-C handler: {e}")))?;

            let pb = if *output == OutputFormat::Json {
                ProgressBar::hidden()
            } else {
                ProgressBar::new_spinner().with_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {msg}")
                        .map_err(|e| SearchError::Other(e.to_string()))?
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
                )
            };
            pb.enable_steady_tick(Duration::from_millis(100));

            let Some(token) = engine.perform_search(query) else {
                pb.finish_and_clear();
                println!("{}", "Nothing to search for".yellow());
                return Ok(());
            };
            pb.set_message(format!("Searching for \"{query}\"..."));

            let deadline = after(Duration::from_secs(*timeout_secs));
            let limit = max_results.unwrap_or(usize::MAX);
            let mut results: Vec<Arc<SearchResult>> = Vec::new();
            let outcome = loop {
                select! {
                    recv(events) -> event => match event {
                        Ok(EngineEvent::Results { results: batch, .. }) => {
                            results.extend(batch);
                            pb.set_message(format!("{} results for \"{}\"", results.len(), query));
                            if results.len() >= limit {
                                results.truncate(limit);
                                break Outcome::Enough;
                            }
                        }
                        Ok(EngineEvent::Finished { .. }) => break Outcome::Finished,
                        Err(_) => break Outcome::Finished,
                    },
                    recv(interrupt_rx) -> _ => break Outcome::Interrupted,
                    recv(deadline) -> _ => break Outcome::TimedOut,
                }
            };
            pb.finish_and_clear();
            match outcome {
                Outcome::TimedOut => warn!("Search {} timed out after {}s", token, timeout_secs),
                Outcome::Interrupted => warn!("Search {} interrupted", token),
                _ => info!("Search {} ended: {:?}", token, outcome),
            }
            if !engine.shutdown(SHUTDOWN_GRACE) {
                warn!("Some sources were still running at exit");
            }

            match output {
                OutputFormat::Text => print_results(&results, outcome),
                OutputFormat::Json => {
                    let report = SearchReport {
                        query,
                        token: token.to_string(),
                        finished: outcome == Outcome::Finished,
                        results: &results,
                    };
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }

            if *metrics {
                match output {
                    OutputFormat::Text => println!("\n{}", context.metrics.gather()),
                    OutputFormat::Json => eprintln!("{}", context.metrics.gather()),
                }
            }
        }
        Commands::Sources => {
            let config = Config::load(cli.config.as_deref())?;
            print_sources(&config.configured_sources());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "fedsearch", &mut std::io::stdout());
        }
    }

    info!(
        "Application finished. Total elapsed time: {:.2?}",
        start_time.elapsed()
    );
    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir)?;
            }
        }
        let log_file = fs::File::create(log_path)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| SearchError::Other(e.to_string()))?;
    Ok(())
}

/// Keeps only the requested sources enabled. Unknown names are an error.
fn select_sources(
    mut sources: Vec<SourceDefinition>,
    names: &[String],
    category: Option<SourceCategory>,
) -> Result<Vec<SourceDefinition>> {
    for name in names {
        if !sources.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
            return Err(SearchError::Config(format!("unknown source \"{name}\"")));
        }
    }
    for source in &mut sources {
        if !names.is_empty() {
            source.enabled = names.iter().any(|n| n.eq_ignore_ascii_case(&source.name));
        }
        if category.is_some_and(|c| c != source.category) {
            source.enabled = false;
        }
    }
    Ok(sources)
}

fn format_size(size: i64) -> String {
    if size < 0 {
        return "?".to_string();
    }
    let adjusted = Byte::from_u64(size as u64).get_appropriate_unit(UnitType::Binary);
    format!("{:.2} {}", adjusted.get_value(), adjusted.get_unit())
}

fn print_results(results: &[Arc<SearchResult>], outcome: Outcome) {
    if results.is_empty() {
        println!("{}", "No results found".yellow());
    } else {
        println!(
            "\n{} {} {}",
            "Found".green(),
            results.len(),
            "results:".green()
        );
    }

    for result in results {
        let mut line = format!(
            "{} {}",
            format!("[{}]", result.source()).cyan(),
            result.display_name().bold()
        );
        if let Some(size) = result.size() {
            line.push_str(&format!("  {}", format_size(size).dimmed()));
        }
        if let Some(seeds) = result.seeds() {
            line.push_str(&format!("  {} {}", seeds.to_string().green(), "seeds".dimmed()));
        }
        println!("{line}");

        let link = result
            .stream()
            .map(|s| s.url.as_str())
            .or_else(|| result.torrent().map(|t| t.url.as_str()))
            .unwrap_or_else(|| result.details_url());
        if !link.is_empty() {
            println!("    {}", link.dimmed());
        }
    }

    match outcome {
        Outcome::TimedOut => println!("\n{}", "Search timed out before every source finished".yellow()),
        Outcome::Interrupted => println!("\n{}", "Search cancelled".yellow()),
        Outcome::Enough | Outcome::Finished => {}
    }
}

fn print_sources(sources: &[SourceDefinition]) {
    println!("{}", "Sources:".green().bold());
    for source in sources {
        let state = if source.enabled {
            "enabled".green()
        } else {
            "disabled".red()
        };
        let crawl = if source.crawler.is_some() {
            format!(", crawls up to {}", source.config.num_crawls)
        } else {
            String::new()
        };
        println!(
            "  {:<14} {:<14} {}  (pages: {}{})",
            source.name.cyan(),
            source.category.to_string(),
            state,
            source.config.max_pages,
            crawl
        );
    }
}
