use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qrpass::cli::{self, Commands, TokenCommands};
use qrpass::config::{self, Config, LogFormat};
use qrpass::qr::{PngQrEncoder, QrEncoder};
use qrpass::service::{InvalidateError, TokenInvalidator, TokenIssuer, TokenQuery};
use qrpass::store::{self, TokenStore};
use qrpass::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(cfg.log_format);

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { port }) => run_server(cfg, port).await,
        Some(Commands::InitDb) => {
            let db = open_store(&cfg).await?;
            println!("Token table ready.");
            db.close().await;
            Ok(())
        }
        Some(Commands::Token { command }) => {
            let db = open_store(&cfg).await?;
            let result = handle_token_command(command, db.clone(), &cfg).await;
            db.close().await;
            result
        }
        None => run_server(cfg, None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "qrpass=debug,tower_http=debug".into()),
    );

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Connect and make sure the schema exists.
async fn open_store(cfg: &Config) -> anyhow::Result<Arc<dyn TokenStore>> {
    let db = store::connect(&cfg.store())
        .await
        .context("failed to open token store")?;
    db.init_schema().await.context("failed to initialize schema")?;
    Ok(db)
}

async fn run_server(cfg: Config, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("Connecting to token store...");
    let db = open_store(&cfg).await?;

    let port = port.unwrap_or(cfg.port);
    let state = Arc::new(AppState::new(db.clone(), cfg)?);
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("qrpass listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing token store");
    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn handle_token_command(
    cmd: TokenCommands,
    db: Arc<dyn TokenStore>,
    cfg: &Config,
) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Issue { out, no_image } => {
            let encoder: Arc<dyn QrEncoder> = Arc::new(PngQrEncoder::new(cfg.qr()));
            let issuer = TokenIssuer::new(db, encoder);

            if no_image {
                let issued = issuer.issue_value().await?;
                println!("{}", issued.value);
                return Ok(());
            }

            let issued = issuer.issue().await?;
            tokio::fs::create_dir_all(&out)
                .await
                .with_context(|| format!("cannot create {}", out.display()))?;
            let path = out.join(format!("{}.png", issued.token.value));
            tokio::fs::write(&path, &issued.image)
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!(
                "Token issued:\n  ID:    {}\n  Token: {}\n  QR:    {}",
                issued.token.id,
                issued.token.value,
                path.display()
            );
        }
        TokenCommands::List => {
            let tokens = TokenQuery::new(db).pending_tokens().await?;
            if tokens.is_empty() {
                println!("No pending tokens.");
            } else {
                for t in tokens {
                    println!("{}", t);
                }
            }
        }
        TokenCommands::Show { token } => match db.find(&token).await? {
            Some(t) => {
                println!("{:<6} {:<38} {:<8} {:<26} USED AT", "ID", "TOKEN", "STATE", "CREATED");
                println!(
                    "{:<6} {:<38} {:<8} {:<26} {}",
                    t.id,
                    t.value,
                    t.state.as_str(),
                    t.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    t.used_at
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| "-".into())
                );
            }
            None => anyhow::bail!("token not found"),
        },
        TokenCommands::Invalidate { token } => {
            match TokenInvalidator::new(db).invalidate(&token).await {
                Ok(()) => println!("Token invalidated."),
                Err(InvalidateError::Store(e)) => return Err(e.into()),
                Err(e) => anyhow::bail!("{}", e),
            }
        }
    }
    Ok(())
}
