//! The `notarius serve` subcommand.
//!
//! Loads the service configuration, refuses to start unless the trust
//! configuration builds, then serves the verification API until ctrl-c.

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use notarius_api::config::ServiceConfig;
use notarius_api::router::{AppState, build_router};
use notarius_verifier::Verifier;

/// Arguments for `notarius serve`.
#[derive(Args)]
pub struct ServeArgs {
    /// Service config file (default: the per-user `notarius.toml`).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Listen address, overriding the config file.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Execute the serve command.
pub async fn execute(args: ServeArgs) -> Result<()> {
    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let addr = config.bind_addr()?;
    let trust_config = config
        .trust_config()
        .wrap_err("refusing to start without a valid trust configuration")?;
    let app = build_router(AppState::new(Verifier::new(trust_config)));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("cannot bind {addr}"))?;
    tracing::info!(%addr, "notarius listening");
    eprintln!("notarius listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    tracing::info!("notarius stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
