//! Replication Group Operator
//!
//! Watches `ReplicationGroup` resources and the PersistentVolumeClaims they
//! select, and keeps each group's claim and volume inventory current.

use anyhow::Context as _;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kube::CustomResourceExt;
use replication_group_operator::controller::{self, ControllerConfig, Metrics};
use replication_group_operator::{Error, ReplicationGroup, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Replication Group Operator - keeps replication groups in sync with their claims
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Maximum number of groups reconciled at once
    #[arg(long, env = "CONCURRENCY", default_value = "4")]
    concurrency: u16,

    /// Requeue period for healthy groups, in seconds
    #[arg(long, env = "RESYNC_SECS", default_value = "600")]
    resync_secs: u64,

    /// First retry delay after a transient failure, in milliseconds
    #[arg(long, env = "BACKOFF_BASE_MS", default_value = "500")]
    backoff_base_ms: u64,

    /// Upper bound on the retry delay, in seconds
    #[arg(long, env = "BACKOFF_MAX_SECS", default_value = "300")]
    backoff_max_secs: u64,

    /// Retry delay for groups with configuration errors, in seconds
    #[arg(long, env = "INVALID_REQUEUE_SECS", default_value = "300")]
    invalid_requeue_secs: u64,

    /// Do not write derived state back to group status
    #[arg(long, env = "NO_STATUS")]
    no_status: bool,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print the ReplicationGroup CRD as YAML and exit
    #[arg(long)]
    print_crd: bool,
}

impl Args {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone(),
            concurrency: self.concurrency.max(1),
            resync_period: Duration::from_secs(self.resync_secs),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
            invalid_requeue: Duration::from_secs(self.invalid_requeue_secs),
            publish_status: !self.no_status,
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_crd {
        let crd = serde_yaml::to_string(&ReplicationGroup::crd())
            .context("failed to render ReplicationGroup CRD")?;
        print!("{}", crd);
        return Ok(());
    }

    init_logging(&args)?;

    let config = args.controller_config();
    info!("Starting Replication Group Operator");
    info!("  Version: {}", replication_group_operator::VERSION);
    info!(
        "  Namespace: {}",
        config.namespace.as_deref().unwrap_or("<all>")
    );
    info!("  Concurrency: {}", config.concurrency);
    info!("  Status publishing: {}", config.publish_status);

    let metrics = Arc::new(Metrics::new()?);
    let ready = Arc::new(AtomicBool::new(false));

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_ready = ready.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_ready).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, server_metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;

    controller::run(client, config, metrics, ready)
        .await
        .context("controller exited with an error")?;

    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |d: &str| {
        d.parse()
            .map_err(|e| Error::Configuration(format!("invalid log directive {}: {}", d, e)))
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("kube=info")?)
        .add_directive(directive("tower=warn")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, ready: Arc<AtomicBool>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let ready = ready.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let ready = ready.load(Ordering::SeqCst);
                async move {
                    let (status, body) = match req.uri().path() {
                        "/healthz" | "/livez" => (StatusCode::OK, "ok"),
                        "/readyz" if ready => (StatusCode::OK, "ok"),
                        "/readyz" => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
                        _ => (StatusCode::NOT_FOUND, "not found"),
                    };
                    let mut response = Response::new(Body::from(body));
                    *response.status_mut() = status;
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, metrics: Arc<Metrics>) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok(buffer) => {
                                let mut response = Response::new(Body::from(buffer));
                                response.headers_mut().insert(
                                    CONTENT_TYPE,
                                    HeaderValue::from_static("text/plain; version=0.0.4"),
                                );
                                response
                            }
                            Err(e) => {
                                let mut response = Response::new(Body::from(e.to_string()));
                                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                response
                            }
                        },
                        _ => {
                            let mut response = Response::new(Body::from("not found"));
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            response
                        }
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
