//! TaskDesk server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use taskdesk_api::{AppState, Logo};
use taskdesk_common::{Config, LocalStorage};
use taskdesk_core::{PesapalGateway, SmtpMailer, asset::mime_for};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "taskdesk=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Read the receipt logo, if one is configured.
async fn load_logo(config: &Config) -> Option<Logo> {
    let path = config.mail.logo_path.as_ref()?;
    match tokio::fs::read(path).await {
        Ok(data) => Some(Logo {
            content_type: mime_for(&path.to_string_lossy()).to_string(),
            data,
        }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Receipt logo not loaded");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let config = Config::load().context("loading configuration")?;
    init_tracing(&config.server.log_format);

    info!("Starting taskdesk server...");

    // Connect to database
    let db = taskdesk_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    taskdesk_db::migrate(&db).await?;
    info!("Migrations completed");

    tokio::fs::create_dir_all(&config.storage.upload_dir)
        .await
        .with_context(|| format!("creating {}", config.storage.upload_dir.display()))?;
    let storage = Arc::new(LocalStorage::new(config.storage.upload_dir.clone()));

    let mailer = Arc::new(SmtpMailer::from_config(&config.mail)?);
    if config.mail.suppress_send {
        info!("Email sending is suppressed; messages will only be logged");
    }

    let gateway = Arc::new(PesapalGateway::new(
        &config.payments,
        config.payment_callback_url(),
        PesapalGateway::token_cache(&config.payments),
    )?);
    info!(
        sandbox = config.payments.use_sandbox,
        callback = %config.payment_callback_url(),
        "Payment gateway configured"
    );

    let logo = load_logo(&config).await;
    let max_upload_bytes = config.storage.max_upload_bytes;
    let bind = (config.server.host.clone(), config.server.port);

    let state = AppState::build(
        Arc::new(db),
        Arc::new(config),
        mailer,
        storage,
        gateway,
        logo,
    );

    let app = taskdesk_api::app(state)
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind((bind.0.as_str(), bind.1)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}
