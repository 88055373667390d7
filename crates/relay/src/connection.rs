//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Der Task ist der einzige Besitzer des Sockets und
//! verarbeitet drei Ereignisarten der Reihe nach:
//!
//! ```text
//! Nachricht -> klassifizieren -> Rolle setzen -> Broadcast an alle anderen
//! Close     -> verbindung_trennen
//! Fehler    -> loggen, dann verbindung_trennen
//! ```
//!
//! Ausgehende Auftraege (Tokens anderer Clients, Pings, Close) kommen ueber
//! die Send-Queue, deren Handle in der Registry liegt. Wird der Eintrag
//! entfernt, loest sein Beenden-Signal aus und der Task endet, auch wenn
//! er gerade in einem Schreibvorgang haengt.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use colorcast_core::types::{ClientRolle, VerbindungsId};
use colorcast_protocol::{klassifizieren, Hinweis};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::{verbindung_trennen, TrennGrund, CLOSE_CODE_SHUTDOWN, SHUTDOWN_TEXT};
use crate::error::RelayError;
use crate::registry::{Ausgehend, VerbindungsHandle};
use crate::server_state::RelayState;

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<RelayState>,
    remote: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<RelayState>, remote: SocketAddr) -> Self {
        Self { state, remote }
    }

    /// Startet die Verarbeitungsschleife
    ///
    /// Laeuft bis der Client schliesst, ein Transportfehler auftritt oder
    /// die Verbindung aus der Registry entfernt wird.
    pub async fn verarbeiten(self, mut socket: WebSocket) {
        if self.state.faehrt_herunter() {
            tracing::debug!(remote = %self.remote, "Verbindung waehrend Shutdown abgelehnt");
            let _ = socket.send(shutdown_close()).await;
            return;
        }

        let (handle, mut rx) = VerbindungsHandle::neu(self.state.config.send_queue_groesse);
        let beendet = handle.beendet();
        let id = self.state.registry.registrieren(handle, self.remote.to_string());
        self.state.verbindungs_gauge_aktualisieren();

        // Shutdown kann zwischen Pruefung und Registrierung begonnen haben
        if self.state.faehrt_herunter() {
            let _ = schreiben(&mut socket, shutdown_close(), &beendet, id).await;
            verbindung_trennen(&self.state, id, TrennGrund::Shutdown);
            return;
        }

        let grund = loop {
            tokio::select! {
                eingehend = socket.recv() => match eingehend {
                    Some(Ok(Message::Text(text))) => self.nachricht_verarbeiten(id, text.as_bytes()),
                    Some(Ok(Message::Binary(daten))) => self.nachricht_verarbeiten(id, &daten),
                    Some(Ok(Message::Pong(_))) => {
                        self.state.registry.als_lebendig_markieren(&id);
                        tracing::trace!(verbindung = %id, "Pong empfangen");
                    }
                    // axum beantwortet Pings selbst
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(
                            verbindung = %id,
                            code = frame.as_ref().map(|f| f.code),
                            "Close vom Client"
                        );
                        break TrennGrund::Geschlossen;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(verbindung = %id, fehler = %e, "Transportfehler");
                        break TrennGrund::Transportfehler;
                    }
                    None => break TrennGrund::Geschlossen,
                },

                ausgehend = rx.recv() => {
                    let nachricht = match ausgehend {
                        Some(Ausgehend::Text(text)) => Message::Text(text),
                        Some(Ausgehend::Ping) => Message::Ping(Vec::new()),
                        Some(Ausgehend::Schliessen { code, grund }) => {
                            let frame = CloseFrame { code, reason: grund.into() };
                            let _ = schreiben(&mut socket, Message::Close(Some(frame)), &beendet, id).await;
                            break TrennGrund::Shutdown;
                        }
                        None => break TrennGrund::Entfernt,
                    };
                    if let Err(grund) = schreiben(&mut socket, nachricht, &beendet, id).await {
                        break grund;
                    }
                }

                // Entfernt durch Heartbeat oder erzwungenen Shutdown
                _ = beendet.cancelled() => {
                    tracing::debug!(verbindung = %id, "Verbindung wird hart beendet");
                    break TrennGrund::Entfernt;
                }
            }
        };

        verbindung_trennen(&self.state, id, grund);
        tracing::debug!(verbindung = %id, "Verbindungs-Task beendet");
    }

    /// Klassifiziert eine eingehende Payload und leitet das Token weiter
    fn nachricht_verarbeiten(&self, id: VerbindungsId, payload: &[u8]) {
        let max = self.state.config.max_nachricht_bytes;
        if payload.len() > max {
            tracing::warn!(verbindung = %id, bytes = payload.len(), max, "Nachricht zu gross");
            self.fehler_senden(
                id,
                Hinweis::fehler(
                    "Nachricht zu gross",
                    format!("{} Bytes, erlaubt sind {max}", payload.len()),
                ),
            );
            return;
        }

        let klassifizierung = klassifizieren(payload);
        if let Some(rolle) = klassifizierung.rolle() {
            self.rolle_deklarieren(id, rolle);
        }

        self.state.registry.nachricht_zaehlen(&id);
        self.state.metriken.messages_total.inc();

        let token = klassifizierung.token();
        let empfaenger = self.state.broadcaster.senden(token, Some(id));

        tracing::info!(
            verbindung = %id,
            token = %token,
            quelle = ?klassifizierung.quelle(),
            empfaenger,
            "Farbe an {empfaenger} Clients gesendet"
        );
    }

    /// Die erste Deklaration gilt, spaetere abweichende werden ignoriert
    fn rolle_deklarieren(&self, id: VerbindungsId, rolle: ClientRolle) {
        let Some(aktuell) = self.state.registry.nachschlagen(&id).map(|v| v.rolle) else {
            return;
        };
        if aktuell == rolle {
            return;
        }
        if aktuell.ist_deklariert() {
            tracing::debug!(verbindung = %id, aktuell = %aktuell, deklariert = %rolle, "Rollenwechsel ignoriert");
            return;
        }
        if self.state.registry.rolle_setzen(&id, rolle) {
            tracing::info!(verbindung = %id, rolle = %rolle, "Client-Rolle deklariert");
        }
    }

    /// Sendet einen Fehlerhinweis nur an die verursachende Verbindung
    fn fehler_senden(&self, id: VerbindungsId, hinweis: Hinweis) {
        let Some(handle) = self.state.registry.handle_von(&id) else {
            return;
        };
        let ergebnis = hinweis
            .als_json()
            .map_err(RelayError::from)
            .and_then(|json| handle.senden(Ausgehend::Text(json)));
        if let Err(e) = ergebnis {
            tracing::debug!(verbindung = %id, fehler = %e, "Fehlerhinweis nicht zustellbar");
        }
    }
}

/// Schreibt einen Frame, bricht aber ab sobald die Verbindung entfernt wird
///
/// Ein Client, der nicht mehr liest, kann das Senden beliebig lange
/// blockieren. Nach dem Entfernen darf der Socket nicht offen bleiben.
async fn schreiben(
    socket: &mut WebSocket,
    nachricht: Message,
    beendet: &CancellationToken,
    id: VerbindungsId,
) -> Result<(), TrennGrund> {
    tokio::select! {
        ergebnis = socket.send(nachricht) => ergebnis.map_err(|e| {
            tracing::warn!(verbindung = %id, fehler = %e, "Senden fehlgeschlagen");
            TrennGrund::Transportfehler
        }),
        _ = beendet.cancelled() => {
            tracing::debug!(verbindung = %id, "Haengendes Senden abgebrochen");
            Err(TrennGrund::Entfernt)
        }
    }
}

fn shutdown_close() -> Message {
    Message::Close(Some(CloseFrame {
        code: CLOSE_CODE_SHUTDOWN,
        reason: SHUTDOWN_TEXT.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::RelayConfig;
    use tokio::sync::mpsc;

    fn verbindung(state: &Arc<RelayState>) -> (VerbindungsId, mpsc::Receiver<Ausgehend>) {
        let (handle, rx) = VerbindungsHandle::neu(8);
        (state.registry.registrieren(handle, "127.0.0.1:9"), rx)
    }

    fn text(rx: &mut mpsc::Receiver<Ausgehend>) -> Option<String> {
        match rx.try_recv().ok()? {
            Ausgehend::Text(t) => Some(t),
            _ => None,
        }
    }

    fn setup(config: RelayConfig) -> (Arc<RelayState>, ClientConnection) {
        let state = RelayState::neu(config).unwrap();
        let conn = ClientConnection::neu(Arc::clone(&state), "127.0.0.1:9".parse().unwrap());
        (state, conn)
    }

    #[test]
    fn token_geht_an_alle_ausser_sender() {
        let (state, conn) = setup(RelayConfig::default());
        let (sender, mut rx_sender) = verbindung(&state);
        let (_a, mut rx_a) = verbindung(&state);
        let (_b, mut rx_b) = verbindung(&state);

        conn.nachricht_verarbeiten(sender, br#"{"color":"blue","clientType":"web"}"#);

        assert_eq!(text(&mut rx_a).as_deref(), Some("blue"));
        assert_eq!(text(&mut rx_b).as_deref(), Some("blue"));
        assert!(rx_sender.try_recv().is_err());
        assert_eq!(state.registry.nachschlagen(&sender).unwrap().nachrichten, 1);
    }

    #[test]
    fn erste_rollen_deklaration_gilt() {
        let (state, conn) = setup(RelayConfig::default());
        let (id, _rx) = verbindung(&state);

        conn.nachricht_verarbeiten(id, b"red");
        assert_eq!(state.registry.nachschlagen(&id).unwrap().rolle, ClientRolle::Unbekannt);

        conn.nachricht_verarbeiten(id, br#"{"color":"red","clientType":"unity"}"#);
        conn.nachricht_verarbeiten(id, br#"{"color":"red","clientType":"web"}"#);
        assert_eq!(state.registry.nachschlagen(&id).unwrap().rolle, ClientRolle::Unity);
    }

    #[test]
    fn zu_grosse_nachricht_erzeugt_fehlerhinweis() {
        let (state, conn) = setup(RelayConfig {
            max_nachricht_bytes: 8,
            ..Default::default()
        });
        let (sender, mut rx_sender) = verbindung(&state);
        let (_andere, mut rx_andere) = verbindung(&state);

        conn.nachricht_verarbeiten(sender, b"viel-zu-langer-text");

        let json = text(&mut rx_sender).unwrap();
        let wert: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(wert["type"], "error");
        assert_eq!(wert["message"], "Nachricht zu gross");
        assert!(rx_andere.try_recv().is_err());
        assert_eq!(state.registry.nachschlagen(&sender).unwrap().nachrichten, 0);
    }

    #[test]
    fn einzelner_client_ohne_empfaenger() {
        let (state, conn) = setup(RelayConfig::default());
        let (id, mut rx) = verbindung(&state);

        conn.nachricht_verarbeiten(id, b"green");
        assert!(rx.try_recv().is_err());
        assert_eq!(state.metriken.messages_total.get(), 1);
    }
}
