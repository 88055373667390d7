//! Verbindungs-Registry – Einziger geteilter Zustand des Relays
//!
//! Haelt alle offenen Verbindungen samt Metadaten. Kein anderer Teil des
//! Relays greift direkt auf Verbindungszustand zu, Broadcaster und
//! Heartbeat arbeiten nur mit Snapshots und den Operationen hier.
//!
//! ## Konsistenz
//! Ein einzelner Mutex schuetzt die Abbildung ID -> Verbindung und den
//! ID-Zaehler. `registrieren`, `entfernen`, `rolle_setzen` und
//! `alle_ausser` sehen dadurch immer einen konsistenten Zustand. Der Lock
//! wird nie ueber einen await-Punkt gehalten.

use chrono::{DateTime, Utc};
use colorcast_core::types::{ClientRolle, VerbindungsId};
use colorcast_observability::VerbindungsQuelle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};

// ---------------------------------------------------------------------------
// Ausgehende Nachrichten
// ---------------------------------------------------------------------------

/// Auftrag an den Verbindungs-Task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ausgehend {
    /// Text-Frame, unveraendert senden
    Text(String),
    /// Liveness-Probe (WebSocket-Ping)
    Ping,
    /// Geordnetes Schliessen mit Statuscode
    Schliessen { code: u16, grund: String },
}

// ---------------------------------------------------------------------------
// VerbindungsHandle
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines Verbindungs-Tasks
///
/// Der Eintrag in der Registry besitzt das Handle. Wird der Eintrag
/// entfernt, loest die Registry `beendet` aus und verwirft das Handle.
/// Der Verbindungs-Task bricht dann auch ein haengendes Senden ab und
/// schliesst den Socket.
#[derive(Debug, Clone)]
pub struct VerbindungsHandle {
    tx: mpsc::Sender<Ausgehend>,
    beendet: CancellationToken,
}

impl VerbindungsHandle {
    /// Erstellt ein Handle mit begrenzter Queue und gibt die Empfangsseite zurueck
    pub fn neu(queue_groesse: usize) -> (Self, mpsc::Receiver<Ausgehend>) {
        let (tx, rx) = mpsc::channel(queue_groesse.max(1));
        let handle = Self {
            tx,
            beendet: CancellationToken::new(),
        };
        (handle, rx)
    }

    /// Signal, das beim Entfernen aus der Registry ausgeloest wird
    pub fn beendet(&self) -> CancellationToken {
        self.beendet.clone()
    }

    /// Loest das Beenden-Signal aus
    fn beenden(&self) {
        self.beendet.cancel();
    }

    /// Prueft ob der Verbindungs-Task noch empfaengt
    pub fn ist_offen(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Reiht einen Auftrag nicht-blockierend ein
    pub fn senden(&self, auftrag: Ausgehend) -> RelayResult<()> {
        self.tx.try_send(auftrag).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::QueueVoll,
            mpsc::error::TrySendError::Closed(_) => RelayError::VerbindungGeschlossen,
        })
    }
}

// ---------------------------------------------------------------------------
// Verbindung
// ---------------------------------------------------------------------------

/// Eintrag einer offenen Verbindung
#[derive(Debug, Clone)]
pub struct Verbindung {
    /// Eindeutige, nie wiederverwendete ID
    pub id: VerbindungsId,
    /// Gegenstelle zum Zeitpunkt des Verbindungsaufbaus
    pub remote_adresse: String,
    /// Deklarierte Rolle
    pub rolle: ClientRolle,
    /// Zeitpunkt des Verbindungsaufbaus
    pub verbunden_um: DateTime<Utc>,
    /// Hat auf die letzte Probe geantwortet
    pub lebendig: bool,
    /// Anzahl klassifizierter eingehender Nachrichten
    pub nachrichten: u64,
    /// Send-Queue des Verbindungs-Tasks
    pub handle: VerbindungsHandle,
}

impl Verbindung {
    /// Dauer seit dem Verbindungsaufbau
    pub fn sitzungsdauer(&self) -> Duration {
        (Utc::now() - self.verbunden_um).to_std().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// VerbindungsRegistry
// ---------------------------------------------------------------------------

/// Registry aller offenen Verbindungen
pub struct VerbindungsRegistry {
    inner: Mutex<RegistryInner>,
    /// Aktuelle Anzahl, fuer den Shutdown beobachtbar
    anzahl_tx: watch::Sender<usize>,
}

struct RegistryInner {
    verbindungen: HashMap<VerbindungsId, Verbindung>,
    /// Naechste zu vergebende Nummer, wird nie zurueckgesetzt
    naechste_id: u64,
}

impl VerbindungsRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        let (anzahl_tx, _) = watch::channel(0);
        Self {
            inner: Mutex::new(RegistryInner {
                verbindungen: HashMap::new(),
                naechste_id: 1,
            }),
            anzahl_tx,
        }
    }

    /// Registriert eine neue Verbindung und vergibt ihre ID
    pub fn registrieren(
        &self,
        handle: VerbindungsHandle,
        remote_adresse: impl Into<String>,
    ) -> VerbindungsId {
        let remote_adresse = remote_adresse.into();
        let (id, anzahl) = {
            let mut inner = self.inner.lock();
            let id = VerbindungsId(inner.naechste_id);
            inner.naechste_id += 1;
            inner.verbindungen.insert(
                id,
                Verbindung {
                    id,
                    remote_adresse: remote_adresse.clone(),
                    rolle: ClientRolle::Unbekannt,
                    verbunden_um: Utc::now(),
                    lebendig: true,
                    nachrichten: 0,
                    handle,
                },
            );
            (id, inner.verbindungen.len())
        };
        self.anzahl_tx.send_replace(anzahl);

        tracing::info!(
            verbindung = %id,
            remote = %remote_adresse,
            verbindungen = anzahl,
            "Client verbunden"
        );
        id
    }

    /// Gibt eine Kopie des Eintrags zurueck
    pub fn nachschlagen(&self, id: &VerbindungsId) -> Option<Verbindung> {
        self.inner.lock().verbindungen.get(id).cloned()
    }

    /// Gibt nur das Send-Handle zurueck (ohne den ganzen Eintrag zu kopieren)
    pub fn handle_von(&self, id: &VerbindungsId) -> Option<VerbindungsHandle> {
        self.inner
            .lock()
            .verbindungen
            .get(id)
            .map(|v| v.handle.clone())
    }

    /// Setzt die Rolle. Gibt false zurueck wenn die Verbindung nicht mehr existiert.
    pub fn rolle_setzen(&self, id: &VerbindungsId, rolle: ClientRolle) -> bool {
        match self.inner.lock().verbindungen.get_mut(id) {
            Some(v) => {
                v.rolle = rolle;
                true
            }
            None => false,
        }
    }

    /// Erhoeht den Nachrichtenzaehler und gibt den neuen Stand zurueck
    pub fn nachricht_zaehlen(&self, id: &VerbindungsId) -> Option<u64> {
        let mut inner = self.inner.lock();
        let v = inner.verbindungen.get_mut(id)?;
        v.nachrichten += 1;
        Some(v.nachrichten)
    }

    /// Markiert eine Verbindung als lebendig (Antwort auf eine Probe)
    pub fn als_lebendig_markieren(&self, id: &VerbindungsId) -> bool {
        match self.inner.lock().verbindungen.get_mut(id) {
            Some(v) => {
                v.lebendig = true;
                true
            }
            None => false,
        }
    }

    /// Markiert eine Verbindung als verdaechtig und gibt den vorherigen
    /// Liveness-Wert zurueck
    ///
    /// Lesen und Zuruecksetzen passieren unter demselben Lock, ein
    /// gleichzeitig eintreffendes Pong geht dadurch nicht verloren.
    pub fn als_verdaechtig_markieren(&self, id: &VerbindungsId) -> Option<bool> {
        let mut inner = self.inner.lock();
        let v = inner.verbindungen.get_mut(id)?;
        Some(std::mem::replace(&mut v.lebendig, false))
    }

    /// Entfernt eine Verbindung
    ///
    /// Idempotent: ein zweiter Aufruf fuer dieselbe ID liefert `None`.
    pub fn entfernen(&self, id: &VerbindungsId) -> Option<Verbindung> {
        let (entfernt, anzahl) = {
            let mut inner = self.inner.lock();
            let entfernt = inner.verbindungen.remove(id);
            (entfernt, inner.verbindungen.len())
        };
        if let Some(verbindung) = &entfernt {
            verbindung.handle.beenden();
            self.anzahl_tx.send_replace(anzahl);
        }
        entfernt
    }

    /// Snapshot aller registrierten IDs ausser der ausgenommenen
    ///
    /// Die Reihenfolge ist nicht festgelegt.
    pub fn alle_ausser(&self, ausgenommen: Option<VerbindungsId>) -> Vec<VerbindungsId> {
        self.inner
            .lock()
            .verbindungen
            .keys()
            .copied()
            .filter(|id| Some(*id) != ausgenommen)
            .collect()
    }

    /// Anzahl der registrierten Verbindungen
    pub fn anzahl(&self) -> usize {
        self.inner.lock().verbindungen.len()
    }

    /// Beobachtet die Anzahl der registrierten Verbindungen
    pub fn anzahl_beobachten(&self) -> watch::Receiver<usize> {
        self.anzahl_tx.subscribe()
    }
}

impl Default for VerbindungsRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

impl VerbindungsQuelle for VerbindungsRegistry {
    fn verbindungs_anzahl(&self) -> usize {
        self.anzahl()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
