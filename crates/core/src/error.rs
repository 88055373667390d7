//! Fehlertypen fuer Colorcast
//!
//! Zentraler Fehler-Enum fuer Zustaende, die nicht einer einzelnen
//! Verbindung zugeordnet werden koennen. Untermodule definieren eigene
//! Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Colorcast
pub type Result<T> = std::result::Result<T, ColorcastError>;

/// Alle prozessweiten Fehler im Colorcast-System
#[derive(Debug, Error)]
pub enum ColorcastError {
    // --- Protokoll ---
    #[error("Unbekannte Client-Rolle: {0}")]
    UnbekannteRolle(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Lebenszyklus ---
    #[error("Listener konnte nicht gebunden werden: {0}")]
    Binden(String),

    #[error("Shutdown-Frist von {0:?} ueberschritten")]
    ShutdownZeitlimit(std::time::Duration),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ColorcastError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}
