use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use butterfly::{
    analysis::OpenAiCompletionService,
    cli::{self, create_spinner, render_report},
    config::{self, Config, BUTTERFLY_API_KEY},
    logging,
    pipeline::{Pipeline, Scheduler},
    storage::{Database, KeyStore, ReportStore},
    utils::resolve_against,
};
use clap::{Parser, Subcommand};
use colored::*;
use log::info;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory or butterfly.toml to use
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// SQLite database for keys and reports
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse now, then again every scan interval until Ctrl-C
    Run,
    /// Analyse once and print the report
    Analyze {
        /// Directory to analyse instead of the project root
        #[arg(long)]
        root: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Manage API keys
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },
    /// Write a default butterfly.toml
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        dir: String,
    },
}

#[derive(Subcommand)]
enum KeysCommand {
    /// Issue a new key
    Issue,
    /// Check whether a key is valid
    Validate { key: String },
    /// Revoke a key
    Revoke { key: String },
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    if let Err(e) = logging::init(&args.log_level) {
        eprintln!("[WARNING] {}", e);
    }

    if let Err(e) = dispatch(args).await {
        cli::print_error(&format!("Error: {:#}", e));
        process::exit(1);
    }
}

async fn dispatch(args: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;

    if let Some(Command::Init { dir }) = &args.command {
        let root = resolve_against(dir, &cwd);
        let path = Config::write_default(&root)?;
        cli::print_info(&format!("Configuration ready at {}", path.display()));
        return Ok(());
    }

    let mut config = load_config(&args, &cwd)?;
    if let Some(database) = &args.database {
        config.storage.database_path = resolve_against(database, &cwd);
    }
    config.validate()?;

    match args.command {
        None | Some(Command::Run) => run(config).await,
        Some(Command::Analyze { root, json, output }) => {
            if let Some(root) = root {
                config.project_root = resolve_against(&root, &cwd);
            }
            let output = output.map(|o| resolve_against(&o, &cwd));
            analyze(config, json, output).await
        }
        Some(Command::Keys { action }) => keys(&config, action),
        Some(Command::Init { .. }) => Ok(()),
    }
}

fn load_config(args: &Cli, cwd: &Path) -> Result<Config> {
    let Some(location) = &args.config else {
        return Ok(Config::load(cwd)?);
    };

    let path = resolve_against(location, cwd);
    if path.is_dir() {
        return Ok(Config::load(&path)?);
    }

    let mut config = Config::from_file(&path)?;
    config::load_env_file(&config.project_root)?;
    config.apply_env();
    Ok(config)
}

fn open_database(config: &Config) -> Result<Database> {
    let path = config.database_path();
    Database::open(&path).with_context(|| format!("cannot open {}", path.display()))
}

fn pipeline(config: &Config, db: Database) -> Result<Pipeline> {
    let api_key = config.api_keys.openai_api_key()?;
    let service = Arc::new(OpenAiCompletionService::new(&config.completion, api_key)?);
    Ok(Pipeline::from_config(config, service)
        .with_report_store(ReportStore::new(db), config.storage.user_id.clone()))
}

/// Makes sure the project holds a valid client key, issuing one on first use
fn ensure_client_key(config: &Config, store: &KeyStore) -> Result<()> {
    let key = match config.api_keys.butterfly_api_key.clone() {
        Some(key) => key,
        None => {
            let Some(record) = store.issue()? else {
                bail!("could not generate a unique API key, try again");
            };
            let path = config::set_env_value(&config.project_root, BUTTERFLY_API_KEY, &record.key)?;
            cli::print_info(&format!("New API key stored in {}", path.display()));
            record.key
        }
    };

    if !store.validate(&key)? {
        bail!("{} is invalid or expired; remove it from .env to issue a new one", BUTTERFLY_API_KEY);
    }
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    cli::print_banner();
    let db = open_database(&config)?;
    let store = KeyStore::new(db.clone(), config.keys.validity_days);
    ensure_client_key(&config, &store)?;

    let pipeline = Arc::new(pipeline(&config, db)?);

    let spinner = create_spinner(format!("Analysing {}", pipeline.root().display()));
    let first = pipeline.run().await;
    spinner.finish_and_clear();
    match first {
        Ok(report) => println!("{}", render_report(&report)),
        Err(e) => {
            if e.is_fatal() {
                return Err(e.into());
            }
            cli::print_warning(&format!("Initial analysis failed: {}", e));
        }
    }

    let token = CancellationToken::new();
    let handle = Scheduler::spawn(pipeline, config.scan_interval(), token.clone());
    cli::print_info(&format!(
        "Watching {} every {}s, press Ctrl-C to stop",
        config.project_root.display(),
        config.scan_interval_secs
    ));

    tokio::signal::ctrl_c().await?;
    token.cancel();
    let runs = handle.await?;
    info!("Stopped after {} scheduled runs", runs);
    Ok(())
}

async fn analyze(config: Config, json: bool, output: Option<PathBuf>) -> Result<()> {
    let db = open_database(&config)?;
    let mut pipeline = pipeline(&config, db)?;
    if let Some(path) = output {
        pipeline = pipeline.with_json_output(path);
    }

    let spinner = (!json).then(|| create_spinner(format!("Analysing {}", pipeline.root().display())));
    let result = pipeline.run().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let report = result?;
    if json {
        println!("{}", report.to_json_pretty()?);
    } else {
        println!("{}", render_report(&report));
    }
    Ok(())
}

fn keys(config: &Config, action: KeysCommand) -> Result<()> {
    let store = KeyStore::new(open_database(config)?, config.keys.validity_days);
    match action {
        KeysCommand::Issue => {
            let Some(record) = store.issue()? else {
                bail!("could not generate a unique API key, try again");
            };
            println!("{}", record.key);
            println!("{} {}", "expires".dimmed(), record.expires_at.to_rfc3339());
        }
        KeysCommand::Validate { key } => {
            if store.validate(key.trim())? {
                println!("{}", "valid".green());
            } else {
                println!("{}", "invalid".red());
                process::exit(2);
            }
        }
        KeysCommand::Revoke { key } => {
            if store.revoke(key.trim())? {
                println!("{}", "revoked".green());
            } else {
                println!("{}", "no such key".yellow());
            }
        }
    }
    Ok(())
}
