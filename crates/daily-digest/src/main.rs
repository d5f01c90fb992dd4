//! Daily digest CLI - Jira & Confluence activity by email.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use daily_digest::config::AppConfig;
use daily_digest::mail::EmailSender;
use daily_digest::pipeline::DigestPipeline;
use daily_digest::render::EmailRenderer;
use daily_digest::scheduler::run_daily;
use daily_digest::server::{self, AppState};

/// Daily digest - collect yesterday's Jira and Confluence activity and email it.
#[derive(Parser)]
#[command(name = "daily-digest")]
#[command(about = "Daily Jira & Confluence digest")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory with digest.html.hbs / digest.txt.hbs overrides
    #[arg(long, global = true, env = "TEMPLATE_DIR")]
    template_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP trigger, with the daily scheduler alongside
    Serve {
        /// Only serve the HTTP trigger
        #[arg(long)]
        no_scheduler: bool,
    },

    /// Run the daily scheduler without the HTTP trigger
    Schedule,

    /// Run one digest now and exit (for CronJob use)
    RunOnce,

    /// Verify SMTP connectivity and credentials without sending
    CheckSmtp,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { no_scheduler } => {
            let pipeline = build_pipeline(&config, cli.template_dir.as_ref())?;
            serve(&config, pipeline, !no_scheduler).await?;
        }
        Commands::Schedule => {
            let pipeline = build_pipeline(&config, cli.template_dir.as_ref())?;
            let shutdown = spawn_shutdown_listener();
            run_daily(pipeline, config.schedule, wait_for(shutdown)).await;
        }
        Commands::RunOnce => {
            let pipeline = build_pipeline(&config, cli.template_dir.as_ref())?;
            let report = pipeline
                .run(Utc::now())
                .await
                .context("Digest run failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::CheckSmtp => {
            let sender = EmailSender::new(&config.smtp).context("Invalid SMTP settings")?;
            sender
                .check_connection()
                .await
                .context("SMTP connection check failed")?;
            println!(
                "SMTP connection to {}:{} OK",
                config.smtp.host, config.smtp.port
            );
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "daily_digest=debug,tower_http=debug,info"
    } else {
        "daily_digest=info,tower_http=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let (json_layer, text_layer) = if json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn build_pipeline(config: &AppConfig, template_dir: Option<&PathBuf>) -> Result<DigestPipeline> {
    let tz = config.schedule.timezone;
    let renderer = match template_dir {
        Some(dir) => EmailRenderer::from_dir(dir, tz),
        None => EmailRenderer::new(tz),
    }
    .context("Failed to load email templates")?;

    DigestPipeline::from_config(config, renderer)
}

async fn serve(config: &AppConfig, pipeline: DigestPipeline, with_scheduler: bool) -> Result<()> {
    let shutdown = spawn_shutdown_listener();

    let scheduler = with_scheduler.then(|| {
        let pipeline = pipeline.clone();
        let schedule = config.schedule;
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run_daily(pipeline, schedule, wait_for(shutdown)).await })
    });

    let app = server::build_router(AppState {
        pipeline,
        trigger_token: config.server.trigger_token.clone(),
    });

    if config.server.trigger_token.is_none() {
        warn!("TRIGGER_TOKEN not set - /run-digest accepts unauthenticated requests");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(port = config.server.port, "Daily digest service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for(shutdown))
        .await
        .context("Server error")?;

    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler task panicked");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Flip a watch flag on Ctrl-C or SIGTERM.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.ok();
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Could not install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received SIGINT, shutting down"),
            () = terminate => info!("Received SIGTERM, shutting down"),
        }

        let _ = tx.send(true);
    });

    rx
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
