// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! restyle CLI and server entry point

use axum::http::{header::CONTENT_TYPE, HeaderName, Method};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use restyle::api::{self, AppState};
use restyle::client::ApiClient;
use restyle::dispatcher::InferenceClient;
use restyle::encoder::{self, ImageSource};
use restyle::poller::{PollState, StatusPoller};
use restyle::reconciler::Reconciler;
use restyle::session::SessionCache;
use restyle::store::models::JobRecord;
use restyle::store::{SqliteStore, Store};
use restyle::submitter::{JobSubmitter, TransformRequest};
use restyle::{assets, Config, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "restyle")]
#[command(about = "AI hairstyle transformation job orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "restyle.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize the database
    InitDb,

    /// Submit a transformation to a running server
    Submit {
        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,

        /// User id sent in the identity header
        #[arg(short, long)]
        user: String,

        /// Subject image: local file or http(s) URL (defaults to the cached image)
        #[arg(short, long)]
        image: Option<String>,

        /// Style reference image: local file or http(s) URL
        #[arg(long)]
        style: Option<String>,

        /// Hairstyle descriptor, e.g. "Afro, short"
        #[arg(long)]
        hairstyle: String,

        /// Poll until the job settles
        #[arg(short, long)]
        wait: bool,

        /// Session cache file
        #[arg(long, default_value = ".restyle-session.json")]
        session: String,
    },

    /// Poll a job and print each state change
    Watch {
        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,

        /// User id sent in the identity header
        #[arg(short, long)]
        user: String,

        /// Job id (defaults to the last job submitted from this session)
        #[arg(short, long)]
        job: Option<String>,

        /// Session cache file
        #[arg(long, default_value = ".restyle-session.json")]
        session: String,
    },

    /// Show a job straight from the store
    Status {
        /// Job id
        #[arg(short, long)]
        job: String,
    },

    /// List a user's jobs, newest first
    History {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Maximum number of jobs
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List jobs still PENDING after the given age
    Stale {
        /// Age threshold in minutes
        #[arg(long, default_value = "30", value_parser = clap::value_parser!(i64).range(0..=MAX_STALE_MINS))]
        older_than_mins: i64,
    },
}

/// Ten years, in minutes
const MAX_STALE_MINS: i64 = 10 * 366 * 24 * 60;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            tracing::info!("Starting restyle server on {}:{}", host, port);
            serve(&config, &host, port).await
        }
        Commands::InitDb => {
            tracing::info!("Initializing database");
            init_db(&config).await
        }
        Commands::Submit {
            server,
            user,
            image,
            style,
            hairstyle,
            wait,
            session,
        } => {
            let mut session = SessionCache::load(&session).await;
            submit(
                &config,
                &server,
                &user,
                image.as_deref(),
                style.as_deref(),
                &hairstyle,
                wait,
                &mut session,
            )
            .await
        }
        Commands::Watch {
            server,
            user,
            job,
            session,
        } => {
            let session = SessionCache::load(&session).await;
            let job = session.job_or_last(job.as_deref())?;
            watch(&config, &server, &user, &job).await
        }
        Commands::Status { job } => {
            tracing::info!("Getting status for {}", job);
            status(&config, &job).await
        }
        Commands::History { user, limit } => history(&config, &user, limit).await,
        Commands::Stale { older_than_mins } => stale(&config, older_than_mins).await,
    }
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::new(&config.database.url, config.database.max_connections).await
}

async fn serve(config: &Config, host: &str, port: u16) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(open_store(config).await?);
    let assets = assets::from_config(config.assets.as_ref())?;

    let submitter = JobSubmitter::from_config(config, store.clone(), assets.clone()).await?;
    let reconciler = Reconciler::new(store.clone(), assets, config.webhook.rehost_output);

    let provider = InferenceClient::new(&config.inference)?;
    let healthy = provider.health_check().await?;
    tracing::info!("Inference provider health check: {}", if healthy { "ok" } else { "unhealthy" });
    if !healthy {
        tracing::warn!("Inference provider reported unhealthy; submissions may fail until it warms up");
    }

    if config.webhook.secret.is_none() {
        tracing::warn!("No webhook secret configured; provider callbacks are not authenticated");
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        submitter: Arc::new(submitter),
        reconciler: Arc::new(reconciler),
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?,
    };

    let user_header = HeaderName::from_bytes(config.auth.user_header.as_bytes())
        .map_err(|e| Error::Config(format!("invalid auth.user_header: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, user_header])
        .max_age(Duration::from_secs(60 * 60));

    let app = api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Listening on http://{}:{}", host, port);
    tracing::info!("Provider callbacks go to {}", config.server.callback_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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

async fn init_db(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let healthy = store.health_check().await?;
    tracing::info!(
        "Database {} ready ({})",
        config.database.url,
        if healthy { "ok" } else { "unhealthy" }
    );
    Ok(())
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// URLs pass through; anything else is read as a local file and encoded
async fn resolve_image_arg(arg: &str) -> Result<String> {
    if is_url(arg) {
        return Ok(arg.to_string());
    }
    let source = ImageSource::from_path(arg).await?;
    encoder::encode(&source)
}

#[allow(clippy::too_many_arguments)]
async fn submit(
    config: &Config,
    server: &str,
    user: &str,
    image: Option<&str>,
    style: Option<&str>,
    hairstyle: &str,
    wait: bool,
    session: &mut SessionCache,
) -> Result<()> {
    let subject = match image {
        Some(arg) => resolve_image_arg(arg).await?,
        None => match session.uploaded_image.clone() {
            Some(cached) => {
                tracing::info!("Reusing cached image from {}", session.path().display());
                cached
            }
            None => {
                return Err(Error::Validation(
                    "no --image given and no cached image in the session".to_string(),
                ))
            }
        },
    };
    let style_image = match style {
        Some(arg) => Some(resolve_image_arg(arg).await?),
        None => None,
    };

    let mut request = TransformRequest {
        haircut_type: hairstyle.to_string(),
        style_image,
        ..TransformRequest::default()
    };
    if is_url(&subject) {
        request.image_url = Some(subject.clone());
    } else {
        request.image_data = Some(subject.clone());
    }

    let client = Arc::new(ApiClient::new(
        server,
        user,
        &config.auth.user_header,
        config.inference.timeout(),
    )?);
    let job_id = client.submit_transform(&request).await?;
    tracing::info!("Submitted job {}", job_id);

    session.remember_image(subject);
    session.remember_job(job_id.clone());
    session.save().await?;

    if wait {
        let poller = StatusPoller::from_config(client, &config.poller);
        let state = poller.wait(&job_id).await;
        report_final(&job_id, &state);
    }
    Ok(())
}

async fn watch(config: &Config, server: &str, user: &str, job_id: &str) -> Result<()> {
    let client = Arc::new(ApiClient::new(
        server,
        user,
        &config.auth.user_header,
        config.inference.timeout(),
    )?);
    let poller = Arc::new(StatusPoller::from_config(client, &config.poller));
    let mut handle = poller.spawn(job_id);

    while let Some(state) = handle.changed().await {
        tracing::info!("Job {}: {}", job_id, state);
    }
    report_final(job_id, &handle.finish().await);
    Ok(())
}

fn report_final(job_id: &str, state: &PollState) {
    match state {
        PollState::Completed { .. } => tracing::info!("Job {} finished: {}", job_id, state),
        PollState::Stale => tracing::warn!(
            "Job {} is still pending; the provider may never call back",
            job_id
        ),
        _ => tracing::warn!("Job {} ended as {}", job_id, state),
    }
}

fn log_job(job: &JobRecord) {
    tracing::info!(
        "Job {} user={} status={} style={:?} created={} output={}",
        job.id,
        job.user_id,
        job.status,
        job.settings.hairstyle_type,
        job.created_at.to_rfc3339(),
        job.output_url.as_deref().unwrap_or("-")
    );
    if let Some(ref error) = job.error {
        tracing::info!("  error: {}", error);
    }
}

async fn status(config: &Config, job_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    match store.get_job(job_id).await? {
        Some(job) => {
            log_job(&job);
            Ok(())
        }
        None => Err(Error::JobNotFound(job_id.to_string())),
    }
}

async fn history(config: &Config, user: &str, limit: usize) -> Result<()> {
    let store = open_store(config).await?;
    let jobs = store.list_jobs_for_user(user, limit).await?;
    if jobs.is_empty() {
        tracing::info!("No jobs for {}", user);
    }
    for job in &jobs {
        log_job(job);
    }
    Ok(())
}

async fn stale(config: &Config, older_than_mins: i64) -> Result<()> {
    let store = open_store(config).await?;
    let cutoff = stale_cutoff(Utc::now(), older_than_mins)?;
    let jobs = store.list_stale_jobs(cutoff).await?;
    tracing::info!(
        "{} job(s) pending since before {}",
        jobs.len(),
        cutoff.to_rfc3339()
    );
    for job in &jobs {
        log_job(job);
    }
    Ok(())
}

fn stale_cutoff(now: DateTime<Utc>, older_than_mins: i64) -> Result<DateTime<Utc>> {
    ChronoDuration::try_minutes(older_than_mins)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| Error::Validation(format!("--older-than-mins {} is out of range", older_than_mins)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_cutoff() {
        let now = Utc::now();
        assert_eq!(stale_cutoff(now, 30).unwrap(), now - ChronoDuration::minutes(30));
        assert!(matches!(stale_cutoff(now, i64::MAX), Err(Error::Validation(_))));
    }

    #[test]
    fn test_stale_age_bounded_by_parser() {
        assert!(Cli::try_parse_from(["restyle", "stale", "--older-than-mins", "45"]).is_ok());
        assert!(Cli::try_parse_from(["restyle", "stale", "--older-than-mins", "-1"]).is_err());
        let too_old = i64::MAX.to_string();
        assert!(Cli::try_parse_from(["restyle", "stale", "--older-than-mins", too_old.as_str()]).is_err());
    }

    #[test]
    fn test_watch_job_is_optional() {
        let cli = Cli::try_parse_from(["restyle", "watch", "--user", "u1"]).unwrap();
        match cli.command {
            Commands::Watch { job, .. } => assert!(job.is_none()),
            _ => panic!("expected watch"),
        }
    }
}
