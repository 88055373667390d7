//! Health-Check-Endpunkt fuer Colorcast
//!
//! Endpoint: `GET /health`
//! Response: `{"status":"ok","connections":<n>,"timestamp":"<ISO-8601>"}`
//!
//! Reiner Lesezugriff auf die Verbindungsanzahl zum Zeitpunkt der Anfrage.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Liefert die aktuelle Anzahl registrierter Verbindungen
pub trait VerbindungsQuelle: Send + Sync + 'static {
    fn verbindungs_anzahl(&self) -> usize;
}

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub connections: usize,
    pub timestamp: String,
}

impl HealthResponse {
    /// Erstellt eine Antwort fuer die gegebene Verbindungsanzahl
    pub fn neu(connections: usize) -> Self {
        Self {
            status: HealthStatus::Ok,
            connections,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(quelle: Arc<dyn VerbindungsQuelle>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(quelle)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(quelle): State<Arc<dyn VerbindungsQuelle>>) -> Json<HealthResponse> {
    Json(HealthResponse::neu(quelle.verbindungs_anzahl()))
}
