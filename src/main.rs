mod fetch;
mod ingest;
mod parser;
mod query;
mod settings;
mod table;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fetch::HttpFetcher;
use ingest::{Outputs, Pipeline, RunOutcome, SourceColumns};
use settings::Settings;
use table::Table;

const EXIT_FAILED: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "watchlist_scraper", about = "Movie watchlist metadata scraper")]
struct Cli {
    /// Config file (default: ./watchlist.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape film pages listed by URL
    Scrape {
        #[command(flatten)]
        run: RunArgs,
        /// Column holding each film's page URL
        #[arg(long)]
        url_column: Option<String>,
    },
    /// Look films up by title + year through the OMDb API
    Lookup {
        #[command(flatten)]
        run: RunArgs,
        /// Column holding the title
        #[arg(long)]
        title_column: Option<String>,
        /// Column holding the year
        #[arg(long)]
        year_column: Option<String>,
        /// OMDb API key (or set WATCHLIST_OMDB_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },
    /// List movies matching runtime/genre criteria
    Filter {
        #[command(flatten)]
        args: QueryArgs,
    },
    /// Suggest random movies matching runtime/genre criteria
    Suggest {
        #[command(flatten)]
        args: QueryArgs,
        /// How many suggestions
        #[arg(short = 'n', long, default_value = "3")]
        count: usize,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Input watchlist table
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Where the full table goes after a complete run
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Where the table goes if the run stops early
    #[arg(long)]
    partial_output: Option<PathBuf>,
    /// Minimum pause between requests, in seconds
    #[arg(long)]
    min_delay: Option<f64>,
    /// Maximum pause between requests, in seconds
    #[arg(long)]
    max_delay: Option<f64>,
    /// Per-request timeout, in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Field delimiter (single character, or "tab")
    #[arg(long)]
    delimiter: Option<String>,
}

#[derive(Args)]
struct QueryArgs {
    /// Metadata table (default: the configured output)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Minimum runtime in minutes
    #[arg(long)]
    min_runtime: Option<u32>,
    /// Maximum runtime in minutes
    #[arg(long)]
    max_runtime: Option<u32>,
    /// Genre that must appear (repeatable)
    #[arg(short, long = "genre")]
    genres: Vec<String>,
    /// Field delimiter (single character, or "tab")
    #[arg(long)]
    delimiter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let code = match cli.command {
        Commands::Scrape { run, url_column } => {
            set(&mut settings.url_column, url_column);
            apply_run_args(&mut settings, &run, false);
            settings.validate()?;
            let source = SourceColumns::Page {
                url: settings.url_column.clone(),
            };
            scrape(&settings, source, settings.page_pacer()).await?
        }
        Commands::Lookup {
            run,
            title_column,
            year_column,
            api_key,
        } => {
            set(&mut settings.title_column, title_column);
            set(&mut settings.year_column, year_column);
            if api_key.is_some() {
                settings.omdb_api_key = api_key;
            }
            apply_run_args(&mut settings, &run, true);
            settings.validate()?;
            if settings.lookup_api().is_none() {
                bail!("lookup needs an API key: pass --api-key or set WATCHLIST_OMDB_API_KEY");
            }
            let source = SourceColumns::Lookup {
                title: settings.title_column.clone(),
                year: settings.year_column.clone(),
            };
            scrape(&settings, source, settings.lookup_pacer()).await?
        }
        Commands::Filter { args } => {
            let (movies, criteria) = load_query(&mut settings, args)?;
            let matches = query::filter(&movies, &criteria);
            if matches.is_empty() {
                println!("\nNo movies match your criteria.");
            } else {
                println!("\nFound {} matching movie(s):\n", matches.len());
                for m in &matches {
                    println!("  • {}", m);
                }
                println!();
            }
            ExitCode::SUCCESS
        }
        Commands::Suggest { args, count } => {
            let (movies, criteria) = load_query(&mut settings, args)?;
            let matches = query::filter(&movies, &criteria);
            if matches.is_empty() {
                println!("\nNo movies available.");
            } else {
                let picks = query::suggest(&matches, count, &mut rand::rng());
                if matches.len() <= count {
                    println!("\nOnly {} movie(s) available. Displaying all:", matches.len());
                } else {
                    println!("\nHere are {} random movie suggestions:", picks.len());
                }
                for (i, m) in picks.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, m);
                }
            }
            ExitCode::SUCCESS
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("finished in {}", format_duration(elapsed));
    }

    Ok(code)
}

/// Load the input, run the pipeline, and map the outcome to an exit code.
async fn scrape(
    settings: &Settings,
    source: SourceColumns,
    pacer: ingest::Pacer,
) -> anyhow::Result<ExitCode> {
    let delimiter = settings.delimiter_byte()?;
    let mut table = Table::load(&settings.input, delimiter, &source.required())
        .context("Failed to load watchlist")?;
    println!(
        "Loaded {} rows from {:?} (columns: {})",
        table.len(),
        settings.input,
        table.headers().join(", ")
    );

    let fetcher = HttpFetcher::new(settings.timeout(), &settings.user_agent, settings.lookup_api())
        .context("Failed to build HTTP client")?;
    let outputs = Outputs {
        final_path: settings.output.clone(),
        partial_path: settings.partial_output.clone(),
        delimiter,
    };
    let pipeline = Pipeline::new(fetcher, source, pacer, outputs).with_progress(progress_bar());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current row");
            on_ctrl_c.cancel();
        }
    });

    let outcome = pipeline
        .run(&mut table, &cancel)
        .await
        .context("Failed to save results")?;
    let stats = *outcome.stats();

    match &outcome {
        RunOutcome::Completed(_) => {
            println!(
                "All done! {} fetched, {} without a match, {} skipped. Results saved to {:?}",
                stats.fetched, stats.unmatched, stats.skipped, settings.output
            );
        }
        RunOutcome::Failed {
            row,
            identifier,
            error,
            ..
        } => {
            eprintln!(
                "Error processing row {}/{} ({}): {}",
                row + 1,
                stats.rows,
                identifier,
                error
            );
            eprintln!("Partial results saved to {:?}", settings.partial_output);
        }
        RunOutcome::Interrupted { row, .. } => {
            eprintln!(
                "Interrupted before row {}/{}. Partial results saved to {:?}",
                row + 1,
                stats.rows,
                settings.partial_output
            );
        }
    }
    Ok(ExitCode::from(exit_status(&outcome)))
}

fn exit_status(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Completed(_) => 0,
        RunOutcome::Failed { .. } => EXIT_FAILED,
        RunOutcome::Interrupted { .. } => EXIT_INTERRUPTED,
    }
}

fn load_query(
    settings: &mut Settings,
    args: QueryArgs,
) -> anyhow::Result<(Vec<query::Movie>, query::Criteria)> {
    set(&mut settings.delimiter, args.delimiter);
    settings.validate()?;
    let path = args.input.unwrap_or_else(|| settings.output.clone());
    let movies = query::load_movies(&path, settings.delimiter_byte()?)
        .with_context(|| format!("Failed to load {:?}", path))?;

    let (criteria, swapped) = query::Criteria::new(args.min_runtime, args.max_runtime, &args.genres);
    if swapped {
        println!("Minimum exceeds maximum; swapping values.");
    }
    println!("Filtering for {}.", criteria.describe());
    Ok((movies, criteria))
}

fn apply_run_args(settings: &mut Settings, run: &RunArgs, lookup: bool) {
    set(&mut settings.input, run.input.clone());
    set(&mut settings.output, run.output.clone());
    set(&mut settings.partial_output, run.partial_output.clone());
    set(&mut settings.timeout_secs, run.timeout);
    set(&mut settings.delimiter, run.delimiter.clone());
    let (min, max) = if lookup {
        (&mut settings.lookup_min_delay_secs, &mut settings.lookup_max_delay_secs)
    } else {
        (&mut settings.min_delay_secs, &mut settings.max_delay_secs)
    };
    set(min, run.min_delay);
    set(max, run.max_delay);
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
