//! Gemeinsamer Relay-Zustand
//!
//! Haelt Registry, Broadcaster, Konfiguration und Metriken als
//! Arc-Referenzen, die sicher zwischen tokio-Tasks geteilt werden.

use colorcast_core::ColorcastError;
use colorcast_observability::ColorcastMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::Broadcaster;
use crate::error::RelayResult;
use crate::registry::VerbindungsRegistry;

/// Konfiguration fuer das Relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Periode des Heartbeat-Monitors
    pub heartbeat_intervall: Duration,
    /// Maximale Dauer des geordneten Shutdowns
    pub shutdown_frist: Duration,
    /// Maximale Groesse einer eingehenden Nachricht in Bytes
    pub max_nachricht_bytes: usize,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Stellt `/metrics` bereit
    pub metriken_endpunkt: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat_intervall: Duration::from_secs(30),
            shutdown_frist: Duration::from_secs(5),
            max_nachricht_bytes: 4096,
            send_queue_groesse: 64,
            metriken_endpunkt: true,
        }
    }
}

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    /// Relay-Konfiguration
    pub config: Arc<RelayConfig>,
    /// Registry aller offenen Verbindungen
    pub registry: Arc<VerbindungsRegistry>,
    /// Broadcaster (Zustellung an alle ausser dem Sender)
    pub broadcaster: Broadcaster,
    /// Prometheus-Metriken
    pub metriken: ColorcastMetrics,
    /// Gesetzt sobald der Shutdown laeuft
    stoppend: AtomicBool,
}

impl RelayState {
    /// Erstellt einen neuen RelayState
    pub fn neu(config: RelayConfig) -> RelayResult<Arc<Self>> {
        let metriken = ColorcastMetrics::neu().map_err(ColorcastError::from)?;
        let registry = Arc::new(VerbindungsRegistry::neu());
        let broadcaster = Broadcaster::neu(Arc::clone(&registry), metriken.clone());

        Ok(Arc::new(Self {
            config: Arc::new(config),
            registry,
            broadcaster,
            metriken,
            stoppend: AtomicBool::new(false),
        }))
    }

    /// Gibt true zurueck sobald der Shutdown begonnen hat
    pub fn faehrt_herunter(&self) -> bool {
        self.stoppend.load(Ordering::Acquire)
    }

    /// Markiert den Beginn des Shutdowns. Gibt false zurueck wenn er schon lief.
    pub(crate) fn shutdown_markieren(&self) -> bool {
        !self.stoppend.swap(true, Ordering::AcqRel)
    }

    /// Aktualisiert die Verbindungs-Gauge aus der Registry
    pub(crate) fn verbindungs_gauge_aktualisieren(&self) {
        self.metriken
            .connected_clients
            .set(self.registry.anzahl() as i64);
    }
}
