//! # colorcast-observability
//!
//! Observability-Crate fuer Colorcast:
//! - Health-Check-Endpunkt (`/health`) mit aktueller Verbindungsanzahl
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthStatus, VerbindungsQuelle};
pub use logging::{
    log_format_gueltig, log_level_gueltig, logging_initialisieren, panic_hook_installieren,
};
pub use metrics::{metrics_router, ColorcastMetrics};
pub use middleware::{timing_middleware, PFAD_OHNE_ROUTE};
