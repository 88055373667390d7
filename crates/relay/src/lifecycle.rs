//! Lebenszyklus – Start, geordneter Shutdown, Verbindungsabbau
//!
//! ## Zustaende
//! ```text
//! Startend --(Listener gebunden)--> Laufend --(Signal/Admin/Fehler)--> Stoppend --> Gestoppt
//! ```
//!
//! ## Shutdown
//! 1. Heartbeat abbrechen, Listener schliessen (`shutdown_tx`)
//! 2. Systemhinweis an alle Verbindungen
//! 3. Jede Verbindung mit Code 1001 schliessen
//! 4. Warten bis Registry leer und Listener beendet, hoechstens `shutdown_frist`
//! 5. Danach erzwungen beenden
//!
//! ## Verbindungsabbau
//! `verbindung_trennen` ist der einzige Abbaupfad fuer einzelne
//! Verbindungen (Client schliesst, Transportfehler, Heartbeat, Shutdown).

use colorcast_core::types::VerbindungsId;
use colorcast_core::ColorcastError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::RelayResult;
use crate::heartbeat::HeartbeatMonitor;
use crate::registry::Ausgehend;
use crate::server_state::RelayState;
use crate::ws;

/// WebSocket-Statuscode fuer das Schliessen beim Shutdown ("going away")
pub const CLOSE_CODE_SHUTDOWN: u16 = 1001;
/// Text des Shutdown-Hinweises und Close-Grund
pub const SHUTDOWN_TEXT: &str = "Server wird heruntergefahren";

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Zustand des Relays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LebenszyklusZustand {
    Startend,
    Laufend,
    Stoppend,
    Gestoppt,
}

/// Ausgang des Shutdowns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beendigung {
    /// Alle Verbindungen und der Listener wurden innerhalb der Frist geschlossen
    Sauber,
    /// Frist ueberschritten, Rest wurde hart abgebrochen
    Erzwungen,
    /// Ausgeloest durch einen fatalen Fehler, Abbau innerhalb der Frist
    Fehlgeschlagen,
}

impl Beendigung {
    /// Nur ein sauberer Shutdown ohne fatalen Fehler gilt als Erfolg
    pub fn ist_erfolgreich(&self) -> bool {
        matches!(self, Self::Sauber)
    }
}

/// Ausloeser des Shutdowns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownGrund {
    /// Betriebssystem-Signal (SIGINT, SIGTERM)
    Signal(&'static str),
    /// Administrativer Befehl
    Administrativ,
    /// Nicht einer Verbindung zuordenbarer Fehler
    Fehler(String),
}

impl std::fmt::Display for ShutdownGrund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "Signal {name}"),
            Self::Administrativ => f.write_str("administrativ"),
            Self::Fehler(detail) => write!(f, "Fehler: {detail}"),
        }
    }
}

/// Grund fuer das Trennen einer einzelnen Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrennGrund {
    /// Client hat geschlossen
    Geschlossen,
    /// Transportfehler auf der Verbindung
    Transportfehler,
    /// Keine Antwort auf die Liveness-Probe
    HerzschlagTimeout,
    /// Server faehrt herunter
    Shutdown,
    /// Eintrag wurde bereits anderweitig aus der Registry entfernt
    Entfernt,
}

impl std::fmt::Display for TrennGrund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Geschlossen => "geschlossen",
            Self::Transportfehler => "transportfehler",
            Self::HerzschlagTimeout => "heartbeat-timeout",
            Self::Shutdown => "shutdown",
            Self::Entfernt => "entfernt",
        })
    }
}

/// Clonebarer Ausloeser fuer einen administrativen Shutdown
#[derive(Debug, Clone)]
pub struct ShutdownAusloeser {
    tx: mpsc::UnboundedSender<ShutdownGrund>,
}

impl ShutdownAusloeser {
    /// Fordert den Shutdown an. Gibt false zurueck wenn das Relay schon beendet ist.
    pub fn ausloesen(&self, grund: ShutdownGrund) -> bool {
        self.tx.send(grund).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Verbindungsabbau
// ---------------------------------------------------------------------------

/// Entfernt eine Verbindung und informiert die verbleibenden Clients
///
/// Idempotent: nur der erste Aufruf fuer eine ID entfernt den Eintrag und
/// verschickt den Hinweis, jeder weitere liefert `false`. Mit dem Eintrag
/// wird das Send-Handle verworfen, was den Verbindungs-Task beendet.
/// Waehrend des Shutdowns entfaellt der Hinweis.
pub fn verbindung_trennen(state: &RelayState, id: VerbindungsId, grund: TrennGrund) -> bool {
    let Some(verbindung) = state.registry.entfernen(&id) else {
        return false;
    };
    state.verbindungs_gauge_aktualisieren();

    tracing::info!(
        verbindung = %id,
        grund = %grund,
        rolle = %verbindung.rolle,
        dauer_sek = verbindung.sitzungsdauer().as_secs(),
        nachrichten = verbindung.nachrichten,
        verbleibend = state.registry.anzahl(),
        "Client getrennt"
    );

    if !state.faehrt_herunter() {
        state
            .broadcaster
            .systemhinweis_senden(format!("{id} hat die Verbindung getrennt"), None);
    }
    true
}

// ---------------------------------------------------------------------------
// Lebenszyklus
// ---------------------------------------------------------------------------

/// Steuert Start und Shutdown des Relays
pub struct Lebenszyklus {
    state: Arc<RelayState>,
    zustand_tx: watch::Sender<LebenszyklusZustand>,
    /// `true` sobald Heartbeat und Listener stoppen sollen
    shutdown_tx: watch::Sender<bool>,
    anforderung_tx: mpsc::UnboundedSender<ShutdownGrund>,
    anforderung_rx: mpsc::UnboundedReceiver<ShutdownGrund>,
}

impl Lebenszyklus {
    /// Erstellt einen neuen Lebenszyklus im Zustand `Startend`
    pub fn neu(state: Arc<RelayState>) -> Self {
        let (zustand_tx, _) = watch::channel(LebenszyklusZustand::Startend);
        let (shutdown_tx, _) = watch::channel(false);
        let (anforderung_tx, anforderung_rx) = mpsc::unbounded_channel();
        Self {
            state,
            zustand_tx,
            shutdown_tx,
            anforderung_tx,
            anforderung_rx,
        }
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> LebenszyklusZustand {
        *self.zustand_tx.borrow()
    }

    /// Beobachtet Zustandswechsel
    pub fn zustand_beobachten(&self) -> watch::Receiver<LebenszyklusZustand> {
        self.zustand_tx.subscribe()
    }

    /// Ausloeser fuer einen administrativen Shutdown
    pub fn ausloeser(&self) -> ShutdownAusloeser {
        ShutdownAusloeser {
            tx: self.anforderung_tx.clone(),
        }
    }

    /// Bindet den Listener und wechselt nach `Laufend`
    pub async fn binden(&self, adresse: SocketAddr) -> RelayResult<TcpListener> {
        let listener = TcpListener::bind(adresse)
            .await
            .map_err(|e| ColorcastError::Binden(format!("{adresse}: {e}")))?;
        let lokal = listener.local_addr()?;

        self.zustand_setzen(LebenszyklusZustand::Laufend);
        tracing::info!(
            adresse = %lokal,
            websocket = %format!("ws://{lokal}/ws"),
            health = %format!("http://{lokal}/health"),
            heartbeat_sek = self.state.config.heartbeat_intervall.as_secs(),
            "Relay gestartet"
        );
        Ok(listener)
    }

    /// Bindet den Listener und laeuft bis zum Shutdown
    pub async fn ausfuehren<F>(self, adresse: SocketAddr, stopp_signal: F) -> RelayResult<Beendigung>
    where
        F: Future<Output = ShutdownGrund>,
    {
        let listener = self.binden(adresse).await?;
        Ok(self.ausfuehren_mit(listener, stopp_signal).await)
    }

    /// Bedient einen bereits gebundenen Listener bis zum Shutdown
    ///
    /// Der Shutdown beginnt beim ersten von: `stopp_signal`, einem
    /// administrativen Ausloeser, dem Ende des HTTP-Servers oder dem Ende
    /// des Heartbeat-Tasks.
    pub async fn ausfuehren_mit<F>(mut self, listener: TcpListener, stopp_signal: F) -> Beendigung
    where
        F: Future<Output = ShutdownGrund>,
    {
        let router = ws::router(Arc::clone(&self.state));
        let mut listener_shutdown = self.shutdown_tx.subscribe();
        let mut server = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = listener_shutdown.wait_for(|stopp| *stopp).await;
            })
            .await
        });

        let monitor = HeartbeatMonitor::neu(Arc::clone(&self.state));
        let mut heartbeat = tokio::spawn(monitor.laufen(self.shutdown_tx.subscribe()));

        tokio::pin!(stopp_signal);
        let (grund, server_laeuft, heartbeat_laeuft) = tokio::select! {
            grund = &mut stopp_signal => (grund, true, true),
            Some(grund) = self.anforderung_rx.recv() => (grund, true, true),
            ergebnis = &mut server => {
                let detail = match ergebnis {
                    Ok(Ok(())) => "HTTP-Server unerwartet beendet".to_string(),
                    Ok(Err(e)) => format!("HTTP-Server: {e}"),
                    Err(e) => format!("HTTP-Server-Task: {e}"),
                };
                (ShutdownGrund::Fehler(detail), false, true)
            }
            ergebnis = &mut heartbeat => {
                let detail = match ergebnis {
                    Ok(()) => "Heartbeat unerwartet beendet".to_string(),
                    Err(e) => format!("Heartbeat-Task: {e}"),
                };
                (ShutdownGrund::Fehler(detail), true, false)
            }
        };

        self.herunterfahren(
            grund,
            server_laeuft.then_some(server),
            heartbeat_laeuft.then_some(heartbeat),
        )
        .await
    }

    async fn herunterfahren(
        &self,
        grund: ShutdownGrund,
        mut server: Option<JoinHandle<std::io::Result<()>>>,
        mut heartbeat: Option<JoinHandle<()>>,
    ) -> Beendigung {
        self.state.shutdown_markieren();
        self.zustand_setzen(LebenszyklusZustand::Stoppend);
        match &grund {
            ShutdownGrund::Fehler(_) => {
                tracing::error!(grund = %grund, "Fataler Fehler, Relay wird heruntergefahren")
            }
            _ => tracing::info!(grund = %grund, "Relay wird heruntergefahren"),
        }

        // Heartbeat abbrechen und Listener schliessen
        self.shutdown_tx.send_replace(true);

        let registry = &self.state.registry;
        let benachrichtigt = self.state.broadcaster.systemhinweis_senden(SHUTDOWN_TEXT, None);

        let mut geschlossen = 0;
        for id in registry.alle_ausser(None) {
            let Some(handle) = registry.handle_von(&id) else {
                continue;
            };
            let auftrag = Ausgehend::Schliessen {
                code: CLOSE_CODE_SHUTDOWN,
                grund: SHUTDOWN_TEXT.to_string(),
            };
            match handle.senden(auftrag) {
                Ok(()) => geschlossen += 1,
                Err(e) => {
                    tracing::debug!(verbindung = %id, fehler = %e, "Close nicht einreihbar, Verbindung wird verworfen");
                    verbindung_trennen(&self.state, id, TrennGrund::Shutdown);
                }
            }
        }
        tracing::info!(benachrichtigt, geschlossen, "Verbindungen werden geschlossen");

        let frist = self.state.config.shutdown_frist;
        let abbau = async {
            let mut anzahl = registry.anzahl_beobachten();
            let _ = anzahl.wait_for(|n| *n == 0).await;

            if let Some(heartbeat) = heartbeat.as_mut() {
                if let Err(e) = heartbeat.await {
                    tracing::warn!(fehler = %e, "Heartbeat-Task fehlerhaft beendet");
                }
            }
            if let Some(server) = server.as_mut() {
                match server.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(fehler = %e, "HTTP-Server mit Fehler beendet"),
                    Err(e) => tracing::warn!(fehler = %e, "HTTP-Server-Task fehlerhaft beendet"),
                }
            }
        };
        let ergebnis = tokio::time::timeout(frist, abbau).await;

        let beendigung = match ergebnis {
            Ok(()) if matches!(grund, ShutdownGrund::Fehler(_)) => {
                tracing::warn!(grund = %grund, "Relay nach fatalem Fehler gestoppt");
                Beendigung::Fehlgeschlagen
            }
            Ok(()) => {
                tracing::info!("Relay sauber gestoppt");
                Beendigung::Sauber
            }
            Err(_) => {
                tracing::error!(
                    fehler = %ColorcastError::ShutdownZeitlimit(frist),
                    verbleibend = registry.anzahl(),
                    "Shutdown wird erzwungen"
                );
                for id in registry.alle_ausser(None) {
                    verbindung_trennen(&self.state, id, TrennGrund::Shutdown);
                }
                if let Some(server) = &server {
                    server.abort();
                }
                if let Some(heartbeat) = &heartbeat {
                    heartbeat.abort();
                }
                Beendigung::Erzwungen
            }
        };

        self.zustand_setzen(LebenszyklusZustand::Gestoppt);
        beendigung
    }

    fn zustand_setzen(&self, neu: LebenszyklusZustand) {
        let alt = self.zustand_tx.send_replace(neu);
        if alt != neu {
            tracing::debug!(von = ?alt, nach = ?neu, "Zustandswechsel");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VerbindungsHandle;
    use crate::server_state::RelayConfig;
    use std::time::Duration;

    fn test_state() -> Arc<RelayState> {
        RelayState::neu(RelayConfig {
            shutdown_frist: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap()
    }

    /// Simuliert einen Verbindungs-Task: sammelt Auftraege und trennt bei Close
    fn simulierter_client(
        state: Arc<RelayState>,
    ) -> (VerbindungsId, JoinHandle<Vec<Ausgehend>>) {
        let (handle, mut rx) = VerbindungsHandle::neu(16);
        let id = state.registry.registrieren(handle, "127.0.0.1:1");
        let task = tokio::spawn(async move {
            let mut empfangen = Vec::new();
            while let Some(auftrag) = rx.recv().await {
                let ist_close = matches!(auftrag, Ausgehend::Schliessen { .. });
                empfangen.push(auftrag);
                if ist_close {
                    break;
                }
            }
            verbindung_trennen(&state, id, TrennGrund::Geschlossen);
            empfangen
        });
        (id, task)
    }

    fn shutdown_hinweise(auftraege: &[Ausgehend]) -> usize {
        auftraege
            .iter()
            .filter(|a| matches!(a, Ausgehend::Text(t) if t.contains(SHUTDOWN_TEXT)))
            .count()
    }

    #[test]
    fn trennen_ist_idempotent_und_benachrichtigt_einmal() {
        let state = test_state();
        let (h1, _rx1) = VerbindungsHandle::neu(8);
        let (h2, mut rx2) = VerbindungsHandle::neu(8);
        let weg = state.registry.registrieren(h1, "a");
        let _bleibt = state.registry.registrieren(h2, "b");

        assert!(verbindung_trennen(&state, weg, TrennGrund::Geschlossen));
        assert!(!verbindung_trennen(&state, weg, TrennGrund::HerzschlagTimeout));

        let Ausgehend::Text(hinweis) = rx2.try_recv().unwrap() else {
            panic!("Systemhinweis erwartet");
        };
        assert!(hinweis.contains(&format!("{weg} hat die Verbindung getrennt")));
        assert!(rx2.try_recv().is_err(), "kein doppelter Hinweis");
        assert_eq!(state.registry.anzahl(), 1);
    }

    #[test]
    fn trennen_waehrend_shutdown_ohne_hinweis() {
        let state = test_state();
        let (h1, _rx1) = VerbindungsHandle::neu(8);
        let (h2, mut rx2) = VerbindungsHandle::neu(8);
        let weg = state.registry.registrieren(h1, "a");
        state.registry.registrieren(h2, "b");

        state.shutdown_markieren();
        assert!(verbindung_trennen(&state, weg, TrennGrund::Shutdown));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_benachrichtigt_jede_verbindung_genau_einmal() {
        let state = test_state();
        let lebenszyklus = Lebenszyklus::neu(Arc::clone(&state));
        let mut zustand = lebenszyklus.zustand_beobachten();
        let ausloeser = lebenszyklus.ausloeser();

        let listener = lebenszyklus
            .binden("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(lebenszyklus.zustand(), LebenszyklusZustand::Laufend);

        let clients: Vec<_> = (0..3).map(|_| simulierter_client(Arc::clone(&state))).collect();

        let lauf = tokio::spawn(lebenszyklus.ausfuehren_mit(listener, std::future::pending()));
        assert!(ausloeser.ausloesen(ShutdownGrund::Administrativ));

        let beendigung = lauf.await.unwrap();
        assert_eq!(beendigung, Beendigung::Sauber);
        assert_eq!(*zustand.borrow_and_update(), LebenszyklusZustand::Gestoppt);
        assert_eq!(state.registry.anzahl(), 0);

        for (_, task) in clients {
            let auftraege = task.await.unwrap();
            assert_eq!(shutdown_hinweise(&auftraege), 1);
            assert_eq!(
                auftraege.last(),
                Some(&Ausgehend::Schliessen {
                    code: CLOSE_CODE_SHUTDOWN,
                    grund: SHUTDOWN_TEXT.to_string()
                })
            );
        }
    }

    #[tokio::test]
    async fn shutdown_ohne_antwort_wird_erzwungen() {
        let state = test_state();
        let lebenszyklus = Lebenszyklus::neu(Arc::clone(&state));
        let listener = lebenszyklus
            .binden("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        // Empfaenger wird gehalten, aber nie gelesen: die Verbindung trennt sich nicht selbst
        let (handle, _rx) = VerbindungsHandle::neu(8);
        state.registry.registrieren(handle, "127.0.0.1:2");

        let beendigung = lebenszyklus
            .ausfuehren_mit(listener, async { ShutdownGrund::Signal("SIGTERM") })
            .await;

        assert_eq!(beendigung, Beendigung::Erzwungen);
        assert_eq!(state.registry.anzahl(), 0);
    }

    #[tokio::test]
    async fn binden_an_belegten_port_schlaegt_fehl() {
        let belegt = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = belegt.local_addr().unwrap();

        let lebenszyklus = Lebenszyklus::neu(test_state());
        assert!(lebenszyklus.binden(adresse).await.is_err());
        assert_eq!(lebenszyklus.zustand(), LebenszyklusZustand::Startend);
    }

    #[test]
    fn grund_anzeige() {
        assert_eq!(ShutdownGrund::Signal("SIGINT").to_string(), "Signal SIGINT");
        assert!(Beendigung::Sauber.ist_erfolgreich());
        assert!(!Beendigung::Erzwungen.ist_erfolgreich());
        assert!(!Beendigung::Fehlgeschlagen.ist_erfolgreich());
        assert_eq!(TrennGrund::HerzschlagTimeout.to_string(), "heartbeat-timeout");
        assert_eq!(TrennGrund::Entfernt.to_string(), "entfernt");
    }
}
