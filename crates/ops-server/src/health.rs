//! Health check system
//!
//! Liveness is unconditional; readiness reflects the backing store. Reports
//! are cached briefly so probe storms do not turn into database load.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but with a caveat worth surfacing.
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Degraded still serves traffic; only Unhealthy drops out of rotation.
    pub fn is_serving(&self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

/// State of one dependency, reported under `components` in the payload.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    fn degraded(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Degraded,
            message: Some(message.to_string()),
            latency_ms: 0,
            details: None,
        }
    }
}

/// Body served by the readiness and full-report endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    pub fn http_status(&self) -> StatusCode {
        if self.status.is_serving() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Budget for a single dependency probe.
    pub probe_timeout: Duration,
    /// How long a report may be served from cache.
    pub cache_ttl: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(10),
        }
    }
}

struct CachedReport {
    report: HealthReport,
    taken_at: Instant,
}

/// Probes the backing store on demand and caches the result.
///
/// Without a pool (in-memory mode) the checker never reports worse than
/// Degraded, so the server stays in rotation.
pub struct HealthChecker {
    config: HealthConfig,
    started: Instant,
    cache: RwLock<Option<CachedReport>>,
    pool: Option<PgPool>,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            cache: RwLock::new(None),
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub async fn check(&self) -> HealthReport {
        if let Some(report) = self.cached().await {
            debug!("serving cached health report");
            return report;
        }

        let report = self.probe().await;
        *self.cache.write().await = Some(CachedReport {
            report: report.clone(),
            taken_at: Instant::now(),
        });
        report
    }

    async fn cached(&self) -> Option<HealthReport> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        (cached.taken_at.elapsed() < self.config.cache_ttl).then(|| cached.report.clone())
    }

    async fn probe(&self) -> HealthReport {
        let store = match self.pool {
            Some(ref pool) => self.probe_database(pool).await,
            None => ComponentHealth::degraded(
                "store",
                "Running on in-memory stores; data is not persistent",
            ),
        };

        // The store is the only dependency, so it decides the overall state.
        HealthReport {
            status: store.status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
            components: vec![store],
            timestamp: chrono::Utc::now(),
        }
    }

    async fn probe_database(&self, pool: &PgPool) -> ComponentHealth {
        let start = Instant::now();

        let outcome = tokio::time::timeout(
            self.config.probe_timeout,
            sqlx::query("SELECT 1").execute(pool),
        )
        .await;

        let (status, message) = match outcome {
            Ok(Ok(_)) => (HealthStatus::Healthy, None),
            Ok(Err(e)) => (HealthStatus::Unhealthy, Some(e.to_string())),
            Err(_) => (
                HealthStatus::Unhealthy,
                Some("health query timed out".to_string()),
            ),
        };

        ComponentHealth {
            name: "database".to_string(),
            status,
            message,
            latency_ms: start.elapsed().as_millis() as u64,
            details: Some(serde_json::json!({
                "type": "postgresql",
                "pool_size": pool.size(),
                "idle_connections": pool.num_idle(),
            })),
        }
    }
}

/// Bare liveness probe. Also mounted at /health for load balancers.
pub async fn alive() -> &'static str {
    "OK"
}

/// Readiness and full-report endpoint.
pub async fn report(
    State(checker): State<Arc<HealthChecker>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = checker.check().await;
    (report.http_status(), Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_mode_reports_degraded() {
        let checker = HealthChecker::new(HealthConfig::default());
        let report = checker.check().await;

        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.status.is_serving());
        assert_eq!(report.components.len(), 1);
        assert_eq!(report.components[0].name, "store");
        assert_eq!(report.http_status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reports_are_cached_for_ttl() {
        let checker = HealthChecker::new(HealthConfig {
            cache_ttl: Duration::from_secs(60),
            ..Default::default()
        });

        let first = checker.check().await;
        let second = checker.check().await;

        assert_eq!(first.timestamp, second.timestamp);
    }

    #[test]
    fn test_unhealthy_maps_to_service_unavailable() {
        let report = HealthReport {
            status: HealthStatus::Unhealthy,
            version: "test".into(),
            uptime_seconds: 0,
            components: vec![],
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(report.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
