//! Broadcaster – Stellt Tokens an alle anderen Verbindungen zu
//!
//! Farb-Tokens gehen als nackter Text raus, ohne Envelope, damit die
//! Unity-Anwendung sie ohne Parsen verarbeiten kann. Nur administrative
//! Hinweise werden als JSON verpackt.
//!
//! ## Zustellung
//! Best-effort, hoechstens einmal pro Empfaenger. Scheitert die Zustellung
//! an ein Ziel (Queue voll oder geschlossen), wird das geloggt und die
//! restlichen Ziele werden trotzdem beliefert. Fehler erreichen nie den
//! Aufrufer.

use colorcast_core::types::VerbindungsId;
use colorcast_observability::ColorcastMetrics;
use colorcast_protocol::Hinweis;
use std::sync::Arc;

use crate::registry::{Ausgehend, VerbindungsRegistry};

/// Zentraler Broadcaster fuer alle Verbindungen
///
/// Clone teilt Registry und Metriken.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<VerbindungsRegistry>,
    metriken: ColorcastMetrics,
}

impl Broadcaster {
    /// Erstellt einen neuen Broadcaster
    pub fn neu(registry: Arc<VerbindungsRegistry>, metriken: ColorcastMetrics) -> Self {
        Self { registry, metriken }
    }

    /// Stellt ein Token unveraendert an alle Verbindungen ausser `ausgenommen` zu
    ///
    /// Gibt die Anzahl der erfolgreichen Zustellungen zurueck.
    pub fn senden(&self, token: &str, ausgenommen: Option<VerbindungsId>) -> usize {
        let ziele = self.registry.alle_ausser(ausgenommen);

        let mut zugestellt = 0;
        for id in ziele {
            // Ziel kann seit dem Snapshot entfernt worden sein
            let Some(handle) = self.registry.handle_von(&id) else {
                continue;
            };
            if !handle.ist_offen() {
                continue;
            }

            match handle.senden(Ausgehend::Text(token.to_owned())) {
                Ok(()) => zugestellt += 1,
                Err(e) => {
                    self.metriken.delivery_failures_total.inc();
                    tracing::warn!(verbindung = %id, fehler = %e, "Zustellung fehlgeschlagen");
                }
            }
        }

        self.metriken.deliveries_total.inc_by(zugestellt as u64);
        zugestellt
    }

    /// Verpackt `text` als Systemhinweis und stellt ihn zu
    ///
    /// Nur fuer administrative Hinweise, nie fuer Farb-Tokens.
    pub fn systemhinweis_senden(
        &self,
        text: impl Into<String>,
        ausgenommen: Option<VerbindungsId>,
    ) -> usize {
        match Hinweis::system(text).als_json() {
            Ok(json) => self.senden(&json, ausgenommen),
            Err(e) => {
                tracing::error!(fehler = %e, "Systemhinweis nicht serialisierbar");
                0
            }
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
    use tokio::sync::mpsc;

    fn aufbau() -> (Arc<VerbindungsRegistry>, Broadcaster, ColorcastMetrics) {
        let registry = Arc::new(VerbindungsRegistry::neu());
        let metriken = ColorcastMetrics::neu().unwrap();
        let broadcaster = Broadcaster::neu(Arc::clone(&registry), metriken.clone());
        (registry, broadcaster, metriken)
    }

    fn verbinden(
        registry: &VerbindungsRegistry,
        queue: usize,
    ) -> (VerbindungsId, mpsc::Receiver<Ausgehend>) {
        let (handle, rx) = VerbindungsHandle::neu(queue);
        (registry.registrieren(handle, "127.0.0.1:1"), rx)
    }

    #[test]
    fn sender_empfaengt_eigenes_token_nicht() {
        let (registry, broadcaster, _) = aufbau();
        let (sender, mut rx_sender) = verbinden(&registry, 8);
        let mut andere: Vec<_> = (0..4).map(|_| verbinden(&registry, 8).1).collect();

        let zugestellt = broadcaster.senden("red", Some(sender));
        assert_eq!(zugestellt, 4);

        assert!(rx_sender.try_recv().is_err(), "Sender darf nichts empfangen");
        for rx in &mut andere {
            assert_eq!(rx.try_recv().unwrap(), Ausgehend::Text("red".into()));
            assert!(rx.try_recv().is_err(), "genau eine Zustellung pro Ziel");
        }
    }

    #[test]
    fn token_wird_ohne_envelope_zugestellt() {
        let (registry, broadcaster, _) = aufbau();
        let (sender, _rx_s) = verbinden(&registry, 8);
        let (_ziel, mut rx) = verbinden(&registry, 8);

        broadcaster.senden("#FF0000", Some(sender));
        assert_eq!(rx.try_recv().unwrap(), Ausgehend::Text("#FF0000".into()));
    }

    #[test]
    fn volle_queue_blockiert_andere_ziele_nicht() {
        let (registry, broadcaster, metriken) = aufbau();
        let (sender, _rx_s) = verbinden(&registry, 8);
        let (_voll, mut rx_voll) = verbinden(&registry, 1);
        let (_ok, mut rx_ok) = verbinden(&registry, 8);

        // Queue des ersten Ziels fuellen
        assert_eq!(broadcaster.senden("blue", Some(sender)), 2);
        assert_eq!(broadcaster.senden("green", Some(sender)), 1);

        assert_eq!(rx_voll.try_recv().unwrap(), Ausgehend::Text("blue".into()));
        assert!(rx_voll.try_recv().is_err());
        assert_eq!(rx_ok.try_recv().unwrap(), Ausgehend::Text("blue".into()));
        assert_eq!(rx_ok.try_recv().unwrap(), Ausgehend::Text("green".into()));

        assert_eq!(metriken.delivery_failures_total.get(), 1);
        assert_eq!(metriken.deliveries_total.get(), 3);
    }

    #[test]
    fn geschlossene_verbindung_wird_uebersprungen() {
        let (registry, broadcaster, metriken) = aufbau();
        let (sender, _rx_s) = verbinden(&registry, 8);
        let (_tot, rx_tot) = verbinden(&registry, 8);
        let (_lebt, mut rx_lebt) = verbinden(&registry, 8);

        drop(rx_tot);
        assert_eq!(broadcaster.senden("red", Some(sender)), 1);
        assert!(rx_lebt.try_recv().is_ok());
        // Nicht offen heisst kein Zustellversuch, also auch kein Fehler
        assert_eq!(metriken.delivery_failures_total.get(), 0);
    }

    #[test]
    fn systemhinweis_an_alle() {
        let (registry, broadcaster, _) = aufbau();
        let mut empfaenger: Vec<_> = (0..3).map(|_| verbinden(&registry, 8).1).collect();

        assert_eq!(broadcaster.systemhinweis_senden("Server wird heruntergefahren", None), 3);

        for rx in &mut empfaenger {
            let Ausgehend::Text(json) = rx.try_recv().unwrap() else {
                panic!("Text-Auftrag erwartet");
            };
            let wert: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(wert["type"], "system");
            assert_eq!(wert["message"], "Server wird heruntergefahren");
            assert!(wert["timestamp"].is_string());
        }
    }

    #[test]
    fn leere_registry_liefert_null() {
        let (_registry, broadcaster, _) = aufbau();
        assert_eq!(broadcaster.senden("red", None), 0);
    }
}
