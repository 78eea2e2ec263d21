use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use butterfly::{
    api::{create_app, AppState},
    analysis::OpenAiCompletionService,
    broker::{Broker, BrokerEvent},
    config::Config,
    pipeline::{Pipeline, Scheduler},
    storage::{Database, ReportStore},
    utils::normalize_user_input_path,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "butterfly-server", version, about = "Key service and live report feed")]
struct Args {
    /// Project directory whose butterfly.toml is used
    #[arg(short, long, default_value = ".")]
    root: String,

    /// Override the configured bind address
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve keys and the feed without running scheduled analyses
    #[arg(long)]
    no_schedule: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let root: PathBuf = normalize_user_input_path(&args.root);
    let config = Config::load(&root)?;
    config.validate()?;

    let db = Database::open(&config.database_path())?;
    let broker = Broker::new();
    let state = AppState::from_config(db.clone(), &config, broker.clone());

    let token = CancellationToken::new();
    let scheduler = if args.no_schedule {
        None
    } else {
        match config.api_keys.openai_api_key() {
            Ok(key) => {
                let service = Arc::new(OpenAiCompletionService::new(&config.completion, key)?);
                let pipeline = Pipeline::from_config(&config, service)
                    .with_report_store(ReportStore::new(db), config.storage.user_id.clone())
                    .with_broker(broker.clone());
                Some(Scheduler::spawn(Arc::new(pipeline), config.scan_interval(), token.clone()))
            }
            Err(e) => {
                warn!("Scheduled analysis disabled: {}", e);
                None
            }
        }
    };

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Butterfly server starting");
    info!("Project root: {}", config.project_root.display());
    info!("Database: {}", config.database_path().display());
    info!("Health check: http://{}/health", addr);
    info!("Report feed: ws://{}/ws", addr);

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    let shutdown = token.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
            }
            shutdown.cancel();
        })
        .await?;

    broker.publish(BrokerEvent::notice("Server shutting down"));
    if let Some(handle) = scheduler {
        let runs = handle.await?;
        info!("Completed {} scheduled analyses", runs);
    }

    Ok(())
}
