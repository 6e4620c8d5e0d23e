//! Ebookchi Auth Server
//!
//! Serves the magic-link sign-in flow over HTTP.
//!
//! # Configuration
//!
//! Settings come from `~/.config/ebookchi/config.yaml` (or the file named by
//! `EBOOKCHI_CONFIG`), overridden by `EBOOKCHI_*` environment variables.
//! `EBOOKCHI_JWT_SECRET` has no default and must be at least 32 bytes.
//!
//! ```yaml
//! port: 8080
//! environment: production
//! public_url: "https://api.ebookchi.example"
//! success_redirect_url: "https://ebookchi.example/profile"
//! smtp:
//!   host: smtp.example.com
//!   port: 587
//!   user: mailer
//!   pass: secret
//!   from_email: noreply@ebookchi.example
//! ```

use ebookchi_auth::auth::TokenCodec;
use ebookchi_auth::config::Config;
use ebookchi_auth::db::{init_db, TokenStore};
use ebookchi_auth::mail::{spawn_mail_worker, EmailSender, MailQueue};
use ebookchi_auth::server::{request_span, router, spawn_expiry_sweeper, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ebookchi_auth=info,ebookchi_server=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("EBOOKCHI_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path)?;
    config.validate()?;

    tracing::info!("Environment: {:?}", config.environment);
    tracing::info!("Database: {}", config.database_path.display());

    let pool = init_db(&config.database_path).await?;
    let codec = TokenCodec::new();

    // Mail goes out in the background so requests never wait on SMTP
    let sender = match config.smtp.clone() {
        Some(smtp) => {
            tracing::info!("SMTP relay: {}:{}", smtp.host, smtp.port);
            Some(EmailSender::new(smtp))
        }
        None => {
            tracing::warn!("No SMTP settings - sign-in emails will be discarded");
            None
        }
    };
    let (mail, outbox) = MailQueue::channel();
    spawn_mail_worker(sender, outbox);

    spawn_expiry_sweeper(
        TokenStore::new(pool.clone(), codec.clone()),
        Duration::from_secs(config.sweep_interval_secs),
    );

    let state = AppState::new(pool, &config, codec, mail);
    // Spans carry the path only; /auth/verify query strings hold live tokens
    let app = router(state).layer(TraceLayer::new_for_http().make_span_with(request_span));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
