//! Ausgehende Hinweis-Envelopes
//!
//! Administrative Nachrichten (Client getrennt, Server faehrt herunter)
//! und Fehlerhinweise an den verursachenden Client werden als JSON
//! verschickt. Farb-Tokens laufen nie durch diese Typen.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Strukturierter Hinweis, getaggt ueber das Feld `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Hinweis {
    /// Systemhinweis an alle (oder alle ausser einem) Clients
    System {
        message: String,
        /// ISO-8601 mit Millisekunden, UTC
        timestamp: String,
    },
    /// Fehlerhinweis, nur an die verursachende Verbindung
    Error { message: String, error: String },
}

impl Hinweis {
    /// Erstellt einen Systemhinweis mit aktuellem Zeitstempel
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            message: text.into(),
            timestamp: zeitstempel_iso(),
        }
    }

    /// Erstellt einen Fehlerhinweis
    pub fn fehler(text: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Error {
            message: text.into(),
            error: detail.into(),
        }
    }

    /// Serialisiert den Hinweis zu JSON-Text
    pub fn als_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Aktueller Zeitpunkt als ISO-8601 (`2024-01-01T12:00:00.000Z`)
pub fn zeitstempel_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
