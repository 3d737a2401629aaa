use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

use keyscope_lib::{config::Config, search_with_limits, state::AppState, store::DocumentStore, web};

#[derive(Parser)]
#[command(name = "keyscope", about = "Find every key in a JSON document whose name contains a term")]
struct Cli {
    /// TOML file layered over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the upload-and-search web UI (default).
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        upload_dir: Option<PathBuf>,
    },
    /// Search one file and print `path<TAB>value` lines.
    Search {
        file: PathBuf,
        term: String,
        /// Print the matches as a JSON array instead.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command.unwrap_or(Command::Serve { bind: None, upload_dir: None }) {
        Command::Serve { bind, upload_dir } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(dir) = upload_dir {
                config.server.upload_dir = dir;
            }
            serve(config).await
        }
        Command::Search { file, term, json } => search_file(&config, file, &term, json),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let store = DocumentStore::open(&config.server.upload_dir)
        .with_context(|| format!("opening upload dir {}", config.server.upload_dir.display()))?;
    let state = Arc::new(AppState::new(store, &config));
    let router = web::build_router(state, config.server.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    web::serve(listener, router).await
}

fn search_file(config: &Config, file: PathBuf, term: &str, json: bool) -> anyhow::Result<()> {
    let term = term.trim();
    if term.is_empty() {
        anyhow::bail!("Please enter a key to search.");
    }
    let f = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
    let doc: Value = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("Failed to parse JSON file {}", file.display()))?;

    let matches = search_with_limits(&doc, term, config.search_limits())?;
    tracing::debug!(file = %file.display(), term, matches = matches.len(), "search finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
    } else {
        for m in &matches {
            println!("{}\t{}", m.path, m.value);
        }
    }
    Ok(())
}
