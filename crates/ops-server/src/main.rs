//! OpsConsole Server
//!
//! HTTP server for the operations console: timers, budget-driven invoicing
//! and payroll runs behind a single JSON API.

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ops_api::AppState;
use ops_billing::{InvoiceService, OverrunAutomator};
use ops_core::config::AppConfig;
use ops_core::{Clock, LockRegistry, SystemClock};
use ops_db::{
    ClientStore, Database, EmployeeStore, InvoiceStore, MemoryClientStore, MemoryEmployeeStore,
    MemoryInvoiceStore, MemoryPayrollStore, MemoryProjectStore, MemoryTimeEntryStore,
    PayrollStore, PgClientStore, PgEmployeeStore, PgInvoiceStore, PgPayrollStore, PgProjectStore,
    PgTimeEntryStore, ProjectStore, TimeEntryStore,
};
use ops_notifications::{MemoryNotificationSink, NotificationSink, PgNotificationSink};
use ops_payroll::PayrollEngine;
use ops_timer::TimerEngine;

mod health;
mod metrics;

use health::{HealthChecker, HealthConfig};
use metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Configuration rejected ({e}); continuing with defaults");
            AppConfig::default()
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server_addr(),
        "Starting OpsConsole"
    );

    // Postgres when reachable, in-memory stores otherwise. Memory mode is
    // for development; the health endpoint reports it as degraded.
    let db = match Database::connect(&config.database).await {
        Ok(db) => Some(db),
        Err(e) => {
            tracing::warn!("No database ({e}); running with in-memory stores");
            None
        }
    };

    let health = match db {
        Some(ref db) => HealthChecker::new(HealthConfig::default()).with_pool(db.pool().clone()),
        None => HealthChecker::new(HealthConfig::default()),
    };

    let stores = match db {
        Some(ref db) => Stores::postgres(db.pool()),
        None => Stores::in_memory(),
    };
    let state = build_state(stores, &config);

    let app = build_router(
        state,
        Arc::new(health),
        Arc::new(Metrics::new()),
        Duration::from_secs(config.server.request_timeout_seconds),
    );

    let addr = config.server_addr();
    info!(%addr, "Accepting connections");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = db {
        db.close().await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Env-filtered tracing to stdout.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,ops_server=debug,ops_api=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Backing stores for the engines, Postgres or in-memory.
struct Stores {
    entries: Arc<dyn TimeEntryStore>,
    projects: Arc<dyn ProjectStore>,
    employees: Arc<dyn EmployeeStore>,
    clients: Arc<dyn ClientStore>,
    invoices: Arc<dyn InvoiceStore>,
    payroll: Arc<dyn PayrollStore>,
    notifications: Arc<dyn NotificationSink>,
}

impl Stores {
    fn postgres(pool: &PgPool) -> Self {
        Self {
            entries: Arc::new(PgTimeEntryStore::new(pool.clone())),
            projects: Arc::new(PgProjectStore::new(pool.clone())),
            employees: Arc::new(PgEmployeeStore::new(pool.clone())),
            clients: Arc::new(PgClientStore::new(pool.clone())),
            invoices: Arc::new(PgInvoiceStore::new(pool.clone())),
            payroll: Arc::new(PgPayrollStore::new(pool.clone())),
            notifications: Arc::new(PgNotificationSink::new(pool.clone())),
        }
    }

    fn in_memory() -> Self {
        Self {
            entries: Arc::new(MemoryTimeEntryStore::new()),
            projects: Arc::new(MemoryProjectStore::new()),
            employees: Arc::new(MemoryEmployeeStore::new()),
            clients: Arc::new(MemoryClientStore::new()),
            invoices: Arc::new(MemoryInvoiceStore::new()),
            payroll: Arc::new(MemoryPayrollStore::new()),
            notifications: Arc::new(MemoryNotificationSink::new()),
        }
    }
}

/// Wire stores, locks and engines into the API state.
///
/// The overrun automator doubles as the timer engine's budget hook, so
/// every change to logged hours re-checks the project budget.
fn build_state(stores: Stores, config: &AppConfig) -> AppState {
    let locks = Arc::new(LockRegistry::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let automator = Arc::new(OverrunAutomator::new(
        stores.entries.clone(),
        stores.projects.clone(),
        stores.clients.clone(),
        stores.invoices.clone(),
        stores.notifications.clone(),
        locks.clone(),
        clock.clone(),
        &config.billing,
    ));

    let timer = Arc::new(TimerEngine::new(
        stores.entries.clone(),
        stores.projects.clone(),
        stores.notifications.clone(),
        automator,
        locks.clone(),
        clock.clone(),
        &config.timer,
    ));

    let invoices = Arc::new(InvoiceService::new(
        stores.invoices.clone(),
        stores.projects.clone(),
        stores.clients.clone(),
        clock.clone(),
        &config.billing,
    ));

    let payroll = Arc::new(PayrollEngine::new(
        stores.payroll,
        stores.entries.clone(),
        stores.employees,
        stores.notifications.clone(),
        locks,
        clock,
        &config.payroll,
    ));

    AppState {
        timer,
        invoices,
        payroll,
        entries: stores.entries,
        notifications: stores.notifications,
    }
}

/// Assemble routes, middleware and shared state into the app.
fn build_router(
    state: AppState,
    health: Arc<HealthChecker>,
    metrics: Arc<Metrics>,
    request_timeout: Duration,
) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::alive))
        .route("/health/live", get(health::alive))
        .route("/health/ready", get(health::report))
        .route("/health/full", get(health::report))
        .with_state(health);

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/metrics.json", get(metrics::json_metrics))
        .with_state(metrics.clone());

    Router::new()
        .merge(health_routes)
        .merge(metrics_routes)
        .merge(ops_api::router().with_state(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .layer(middleware::from_fn_with_state(
            metrics,
            metrics::metrics_middleware,
        ))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let state = build_state(Stores::in_memory(), &AppConfig::default());
        build_router(
            state,
            Arc::new(HealthChecker::new(HealthConfig::default())),
            Arc::new(Metrics::new()),
            Duration::from_secs(60),
        )
    }

    async fn status_of(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        assert_eq!(status_of(test_app(), "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_reports_memory_mode() {
        assert_eq!(status_of(test_app(), "/health/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_root_is_mounted() {
        assert_eq!(status_of(test_app(), "/api/v1").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        assert_eq!(status_of(test_app(), "/metrics").await, StatusCode::OK);
    }
}
