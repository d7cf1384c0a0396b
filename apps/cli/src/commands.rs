//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use tenderflow_core::{BroadcastSink, Collaborators, Pipeline, RunOutcome};
use tenderflow_documents::DocxConverter;
use tenderflow_oracle::{GeminiClient, OllamaEmbedder, SemanticScorer};
use tenderflow_shared::{AppConfig, init_config, load_config, load_config_from, validate_api_key};
use tenderflow_storage::{archive_tender, list_results};
use tracing::info;

use crate::render;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Tenderflow: pick the relevant tenders and prepare their forms.
#[derive(Parser)]
#[command(
    name = "tenderflow",
    version,
    about = "Filter tender PDFs for relevance, extract their forms, and convert them to DOCX.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to the config file (defaults to ~/.tenderflow/tenderflow.toml).
    #[arg(long, global = true, env = "TENDERFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the filter → extract → convert pipeline over the input folders.
    Run {
        /// Print pipeline events as JSON lines instead of progress bars.
        #[arg(long)]
        events_json: bool,
    },

    /// List processed tenders from their metadata files.
    Results {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Zip a tender's extracted PDFs and converted DOCX files.
    Archive {
        /// Tender folder name.
        tender: String,

        /// Directory to write the archive into (defaults to the current directory).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// Pipeline events are already rendered on stdout, so the default level only
/// lets warnings through to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tenderflow=warn",
        1 => "tenderflow=info",
        2 => "tenderflow=debug",
        _ => "tenderflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run { events_json } => cmd_run(config_path, events_json),
        Command::Results { json } => cmd_results(config_path, json),
        Command::Archive { tender, out } => cmd_archive(config_path, &tender, out),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_run(config_path: Option<&Path>, events_json: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let api_key = validate_api_key(&config)?;

    // The oracle clients use blocking HTTP, so they are built (and later
    // dropped) outside the async runtime.
    let oracle = GeminiClient::new(&config.gemini, api_key)?
        .with_relevance_profile(
            config.filter.company_profile.clone(),
            config.filter.relevance_window_chars,
        );
    let embedder = OllamaEmbedder::new(&config.embedding)?;
    info!(
        gemini_model = oracle.model(),
        embedding_model = embedder.model(),
        "oracles configured"
    );
    let scorer = SemanticScorer::new(
        Arc::new(embedder),
        &config.filter.capability_descriptors,
        config.filter.semantic_sample_chars,
    )
    .wrap_err("could not prepare the semantic scorer (is the embedding server running?)")?;

    let sink = Arc::new(BroadcastSink::default());
    let events = sink.subscribe();
    let pipeline = Arc::new(Pipeline::new(
        &config,
        Collaborators {
            oracle: Arc::new(oracle),
            scorer: Arc::new(scorer),
            converter: Arc::new(DocxConverter::new()),
            sink,
        },
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start async runtime")?;

    let outcome = runtime.block_on(async {
        let renderer = tokio::spawn(render::render_events(events, events_json));

        let interrupt = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    pipeline.stop();
                }
            })
        };

        let outcome = pipeline.run().await;
        interrupt.abort();
        // The renderer exits on the completion event.
        let _ = renderer.await;
        outcome
    })?;

    if !events_json {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    println!();
    match outcome {
        RunOutcome::Completed(summary) => {
            println!("  Pipeline completed!");
            println!("  Filtered:  {}", summary.filtered);
            println!("  Extracted: {}", summary.extracted);
            println!("  Converted: {}", summary.converted);
            println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
        }
        RunOutcome::Stopped { after } => {
            println!("  Pipeline stopped during {after}.");
        }
        RunOutcome::NoRelevantTenders => println!("  No relevant tenders found."),
        RunOutcome::NoFormsExtracted => println!("  No forms were extracted."),
    }
    println!();
}

fn cmd_results(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let entries = list_results(&config.processing.output_folders.metadata)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No processed tenders yet.");
        return Ok(());
    }

    println!("{:<40} {:>5}  {:<20}  DESCRIPTION", "TENDER", "FORMS", "LAST DATE");
    for entry in &entries {
        println!(
            "{:<40} {:>5}  {:<20}  {}",
            entry.tender_id, entry.forms_count, entry.last_date, entry.description
        );
    }
    Ok(())
}

fn cmd_archive(config_path: Option<&Path>, tender: &str, out: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let dest = match out {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| eyre!("cannot determine working directory: {e}"))?,
    };
    let folders = &config.processing.output_folders;

    info!(tender, dest = %dest.display(), "archiving tender");
    let path = archive_tender(&folders.extracted, &folders.docx, tender, &dest)?;
    println!("Archive written to: {}", path.display());
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, toml::to_string_pretty(&AppConfig::default())?)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
