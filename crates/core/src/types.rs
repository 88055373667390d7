//! Gemeinsame Identifikationstypen fuer Colorcast
//!
//! Verbindungs-IDs verwenden das Newtype-Pattern, damit sie nicht mit
//! anderen Zaehlern verwechselt werden koennen.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ColorcastError;

/// Eindeutige Verbindungs-ID
///
/// Wird monoton vergeben und innerhalb eines Prozesses nie wiederverwendet,
/// auch nicht nachdem die Verbindung geschlossen wurde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub u64);

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Deklarierte Client-Kategorie
///
/// Dient nur der Diagnose, das Broadcast-Verhalten haengt nicht davon ab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRolle {
    /// Noch keine Rolle deklariert
    #[default]
    #[serde(rename = "unknown")]
    Unbekannt,
    /// Browser-Frontend
    Web,
    /// Game-Engine-Anwendung
    Unity,
}

impl ClientRolle {
    /// Protokoll-Bezeichnung der Rolle
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Unbekannt => "unknown",
            Self::Web => "web",
            Self::Unity => "unity",
        }
    }

    /// Gibt true zurueck wenn eine Rolle deklariert wurde
    pub fn ist_deklariert(&self) -> bool {
        !matches!(self, Self::Unbekannt)
    }
}

impl std::fmt::Display for ClientRolle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

impl FromStr for ClientRolle {
    type Err = ColorcastError;

    /// Nur die deklarierbaren Rollen `web` und `unity` werden akzeptiert
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "unity" => Ok(Self::Unity),
            andere => Err(ColorcastError::UnbekannteRolle(andere.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbindungs_id_anzeige() {
        assert_eq!(VerbindungsId(7).to_string(), "client-7");
    }

    #[test]
    fn verbindungs_ids_sind_geordnet() {
        assert!(VerbindungsId(1) < VerbindungsId(2));
    }

    #[test]
    fn rolle_standard_ist_unbekannt() {
        assert_eq!(ClientRolle::default(), ClientRolle::Unbekannt);
        assert!(!ClientRolle::default().ist_deklariert());
    }

    #[test]
    fn rolle_parsen() {
        assert_eq!("web".parse::<ClientRolle>().unwrap(), ClientRolle::Web);
        assert_eq!("unity".parse::<ClientRolle>().unwrap(), ClientRolle::Unity);
        // Gross-/Kleinschreibung zaehlt, "unknown" ist nicht deklarierbar
        assert!("Unity".parse::<ClientRolle>().is_err());
        assert!("unknown".parse::<ClientRolle>().is_err());
    }

    #[test]
    fn rolle_ist_serde_kompatibel() {
        assert_eq!(serde_json::to_string(&ClientRolle::Unity).unwrap(), "\"unity\"");
        assert_eq!(
            serde_json::to_string(&ClientRolle::Unbekannt).unwrap(),
            "\"unknown\""
        );
        let rolle: ClientRolle = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(rolle, ClientRolle::Web);
    }
}
