//! Heartbeat-Monitor – Erkennt und entfernt tote Verbindungen
//!
//! Zwei-Strike-Verfahren pro Zyklus und Verbindung:
//! - war die Verbindung seit der letzten Probe still (`lebendig == false`),
//!   wird sie entfernt (gleicher Abbaupfad wie ein normales Close)
//! - sonst wird sie als verdaechtig markiert und bekommt einen Ping
//!
//! Ein Pong setzt `lebendig` wieder auf true. Eine Verbindung wird also
//! erst nach einem vollen verpassten Zyklus entfernt.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::lifecycle::{verbindung_trennen, TrennGrund};
use crate::registry::Ausgehend;
use crate::server_state::RelayState;

/// Ergebnis eines Heartbeat-Zyklus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZyklusBericht {
    /// Verbindungen, an die ein Ping ging
    pub geprobt: usize,
    /// Verbindungen, die entfernt wurden
    pub entfernt: usize,
}

/// Periodischer Liveness-Pruefer
pub struct HeartbeatMonitor {
    state: Arc<RelayState>,
    intervall: Duration,
}

impl HeartbeatMonitor {
    /// Erstellt einen Monitor mit dem konfigurierten Intervall
    pub fn neu(state: Arc<RelayState>) -> Self {
        let intervall = state
            .config
            .heartbeat_intervall
            .max(Duration::from_millis(1));
        Self { state, intervall }
    }

    /// Fuehrt einen einzelnen Zyklus ueber alle registrierten Verbindungen aus
    pub fn zyklus(&self) -> ZyklusBericht {
        let mut bericht = ZyklusBericht::default();

        for id in self.state.registry.alle_ausser(None) {
            match self.state.registry.als_verdaechtig_markieren(&id) {
                // Inzwischen entfernt
                None => {}
                Some(false) => {
                    tracing::warn!(verbindung = %id, "Keine Antwort auf Heartbeat, Verbindung wird entfernt");
                    if verbindung_trennen(&self.state, id, TrennGrund::HerzschlagTimeout) {
                        self.state.metriken.heartbeat_evictions_total.inc();
                        bericht.entfernt += 1;
                    }
                }
                Some(true) => {
                    let Some(handle) = self.state.registry.handle_von(&id) else {
                        continue;
                    };
                    match handle.senden(Ausgehend::Ping) {
                        Ok(()) => bericht.geprobt += 1,
                        // Bleibt verdaechtig und faellt im naechsten Zyklus raus
                        Err(e) => {
                            tracing::debug!(verbindung = %id, fehler = %e, "Ping nicht einreihbar")
                        }
                    }
                }
            }
        }

        tracing::debug!(
            geprobt = bericht.geprobt,
            entfernt = bericht.entfernt,
            "Heartbeat-Zyklus abgeschlossen"
        );
        bericht
    }

    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt
    pub async fn laufen(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut takt = tokio::time::interval(self.intervall);
        takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Erster Tick kommt sofort
        takt.tick().await;

        tracing::debug!(intervall_sek = self.intervall.as_secs(), "Heartbeat gestartet");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = takt.tick() => {
                    self.zyklus();
                }
                Ok(()) = shutdown_rx.changed() => {}
            }
        }

        tracing::info!("Heartbeat gestoppt");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
