use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use loqui::api::{AppState, create_router};
use loqui::auth::AuthState;
use loqui::chat::{ChatService, QuotaLedger};
use loqui::completion::{CompletionBackend, HttpCompletionClient, ScriptedBackend};
use loqui::config::{AppConfig, CompletionProvider};
use loqui::db::Database;
use loqui::storage::LocalObjectStore;
use loqui::store::{EphemeralStore, PersistenceGateway, SqliteStore};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Loqui - dual-mode conversational chat server.",
    propagate_version = true
)]
struct Cli {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeCommand),
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Bind address override
    #[arg(long)]
    host: Option<String>,
    /// Port override
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("loqui=info,tower_http=info")),
        )
        .init();

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve(cmd) => {
            if let Some(host) = cmd.host {
                config.server.host = host;
            }
            if let Some(port) = cmd.port {
                config.server.port = port;
            }
            serve(config)
        }
    }
}

#[tokio::main]
async fn serve(config: AppConfig) -> Result<()> {
    if config.auth.jwt_secret.is_empty() {
        bail!("auth.jwt_secret must be set (LOQUI_AUTH__JWT_SECRET)");
    }

    let completion = build_completion_backend(&config)?;

    let db = Database::new(&config.database.path).await?;
    let objects = Arc::new(LocalObjectStore::new(
        &config.storage.root,
        &config.storage.public_base_url,
    ));

    let gateway = Arc::new(PersistenceGateway::new(
        Arc::new(SqliteStore::new(db)),
        Arc::new(EphemeralStore::new()),
        objects.clone(),
    ));
    let ledger = Arc::new(QuotaLedger::new(gateway.clone()));
    let chat = Arc::new(ChatService::new(gateway.clone(), ledger.clone(), completion));
    let auth = AuthState::new(&config.auth.jwt_secret);

    let state = AppState::new(gateway, ledger, chat, objects, auth);
    let router = create_router(state, &config.server.cors_origins);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing bind address")?;
    let listener = TcpListener::bind(addr).await.context("binding listener")?;
    info!(%addr, "loqui listening");

    axum::serve(listener, router).await.context("serving")?;
    Ok(())
}

fn build_completion_backend(config: &AppConfig) -> Result<Arc<dyn CompletionBackend>> {
    match config.completion.provider {
        CompletionProvider::Google => {
            let api_key = config
                .completion
                .api_key
                .clone()
                .filter(|key| !key.is_empty());
            let Some(api_key) = api_key else {
                bail!("completion.api_key must be set (LOQUI_COMPLETION__API_KEY)");
            };
            Ok(Arc::new(HttpCompletionClient::new(
                &config.completion.base_url,
                &config.completion.model,
                api_key,
            )))
        }
        CompletionProvider::Scripted => Ok(Arc::new(ScriptedBackend::new([config
            .completion
            .scripted_reply
            .clone()]))),
    }
}
