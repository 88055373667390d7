//! Prometheus-kompatible Metriken fuer Colorcast
//!
//! Registrierte Metriken:
//! - `colorcast_connected_clients` – Gauge: Aktuell registrierte Verbindungen
//! - `colorcast_messages_total` – Counter: Klassifizierte eingehende Nachrichten
//! - `colorcast_deliveries_total` – Counter: Erfolgreiche Zustellungen
//! - `colorcast_delivery_failures_total` – Counter: Fehlgeschlagene Zustellungen
//! - `colorcast_heartbeat_evictions_total` – Counter: Per Heartbeat entfernte Verbindungen
//! - `colorcast_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `colorcast_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Colorcast-Prometheus-Metriken
///
/// Clone teilt die zugrundeliegenden Zaehler.
#[derive(Clone)]
pub struct ColorcastMetrics {
    pub registry: Arc<Registry>,

    // Relay-Metriken
    pub connected_clients: IntGauge,
    pub messages_total: IntCounter,
    pub deliveries_total: IntCounter,
    pub delivery_failures_total: IntCounter,
    pub heartbeat_evictions_total: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl ColorcastMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Relay-Metriken ---
        let connected_clients = IntGauge::with_opts(Opts::new(
            "colorcast_connected_clients",
            "Anzahl aktuell registrierter Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let messages_total = IntCounter::with_opts(Opts::new(
            "colorcast_messages_total",
            "Gesamtanzahl klassifizierter eingehender Nachrichten",
        ))?;
        registry.register(Box::new(messages_total.clone()))?;

        let deliveries_total = IntCounter::with_opts(Opts::new(
            "colorcast_deliveries_total",
            "Gesamtanzahl erfolgreicher Zustellungen",
        ))?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let delivery_failures_total = IntCounter::with_opts(Opts::new(
            "colorcast_delivery_failures_total",
            "Gesamtanzahl fehlgeschlagener Zustellungen",
        ))?;
        registry.register(Box::new(delivery_failures_total.clone()))?;

        let heartbeat_evictions_total = IntCounter::with_opts(Opts::new(
            "colorcast_heartbeat_evictions_total",
            "Verbindungen, die wegen fehlender Heartbeat-Antwort entfernt wurden",
        ))?;
        registry.register(Box::new(heartbeat_evictions_total.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("colorcast_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "colorcast_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            messages_total,
            deliveries_total,
            delivery_failures_total,
            heartbeat_evictions_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: ColorcastMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<ColorcastMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
