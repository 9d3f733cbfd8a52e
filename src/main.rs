//! CLI entry point for `mailsift`.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailsift::config::{self, Config};
use mailsift::query::compile::explain;
use mailsift::query::parse::parse_query;
use mailsift::search::SearchEngine;
use mailsift::store::mbox::MboxStore;
use mailsift::store::{MailStore, Overview, SortKey};

/// Search MBOX mailboxes with boolean queries.
#[derive(Parser)]
#[command(name = "mailsift", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding one MBOX file per mailbox
    #[arg(long, global = true, value_name = "DIR", env = "MAILSIFT_ROOT")]
    root: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a mailbox
    Search {
        /// Query, e.g. `from:alice is:unread OR is:flagged`
        query: String,
        /// Mailbox to search (defaults to the configured one)
        #[arg(short, long)]
        mailbox: Option<String>,
        /// Treat QUERY as the name of a saved search
        #[arg(long)]
        saved: bool,
        /// Sort key: arrival, date, from, subject, size, to, cc
        #[arg(long, value_name = "KEY")]
        sort: Option<SortKey>,
        /// Reverse the sort order
        #[arg(long)]
        reverse: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how a query would be evaluated
    Explain {
        query: String,
        /// Treat QUERY as the name of a saved search
        #[arg(long)]
        saved: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Search {
            query,
            mailbox,
            saved,
            sort,
            reverse,
            json,
        } => {
            let text = resolve_query(&config, &query, saved)?;
            let root = cli
                .root
                .or_else(|| config.store.root.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let mailbox = mailbox.unwrap_or_else(|| config.search.default_mailbox.clone());
            cmd_search(&config, root, &mailbox, &text, sort, reverse, json)
        }
        Commands::Explain { query, saved } => {
            let text = resolve_query(&config, &query, saved)?;
            let parsed = parse_query(&text)?;
            print!("{}", explain(&parsed));
            Ok(())
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailsift.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// The query text: `query` itself, or the saved search it names.
fn resolve_query(config: &Config, query: &str, saved: bool) -> anyhow::Result<String> {
    if !saved {
        return Ok(query.to_string());
    }
    config
        .saved_search(query)
        .map(String::from)
        .with_context(|| format!("no saved search named '{query}'"))
}

/// Run a search and print the matching messages.
fn cmd_search(
    config: &Config,
    root: PathBuf,
    mailbox: &str,
    text: &str,
    sort: Option<SortKey>,
    reverse: bool,
    json: bool,
) -> anyhow::Result<()> {
    let query = parse_query(text)?;
    let mut store = MboxStore::open(&root).with_body_cache(config.store.body_cache_size);

    let path = store.resolve(mailbox)?;
    let file_size = std::fs::metadata(&path)
        .with_context(|| format!("cannot read {}", path.display()))?
        .len();
    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Loading [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("#>-"),
    );
    store.load_mailbox(
        mailbox,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    let start = Instant::now();
    let mut engine = SearchEngine::with_options(store, config.search.options());
    let key = sort.unwrap_or(config.search.sort);
    let descending = config.search.is_descending() != reverse;
    let ids = if key == SortKey::Arrival && !descending {
        engine.search(&query, mailbox)?
    } else {
        engine.search_and_sort(&query, mailbox, key, descending)?
    };
    let elapsed = start.elapsed();

    let overview = engine.store_mut().fetch_overview(ids.as_slice())?;
    if json {
        print_results_json(mailbox, text, &overview)?;
    } else {
        print_results_table(&overview, elapsed);
    }
    Ok(())
}

/// Print search results as a human-readable table.
fn print_results_table(results: &[Overview], elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {} result(s) in {:.2?}", results.len(), elapsed);
    println!();

    if results.is_empty() {
        return;
    }

    println!(
        "  {:<6} {:<17} {:<25} {:<40} {:>8}",
        "UID", "Date", "From", "Subject", "Size"
    );
    println!("  {}", "-".repeat(100));

    for entry in results {
        let date = entry
            .date
            .as_deref()
            .and_then(|d| chrono::DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let from: String = entry.from.as_deref().unwrap_or("").chars().take(24).collect();
        let subject: String = entry
            .subject
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(39)
            .collect();

        println!(
            "  {:<6} {:<17} {:<25} {:<40} {:>8}",
            entry.uid,
            date,
            from,
            subject,
            format_size(entry.size, BINARY)
        );
    }
    println!();
}

/// Print search results as JSON.
fn print_results_json(mailbox: &str, query: &str, results: &[Overview]) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "mailbox": mailbox,
        "query": query,
        "result_count": results.len(),
        "results": results,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsift", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
