//! Fehlertypen fuer das Relay

use colorcast_core::ColorcastError;
use thiserror::Error;

/// Fehlertyp fuer das Relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO-Fehler (Listener, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Prozessweiter Fehler aus dem Kern
    #[error(transparent)]
    Kern(#[from] ColorcastError),

    /// Send-Queue der Verbindung ist voll
    #[error("Send-Queue voll")]
    QueueVoll,

    /// Verbindung ist bereits geschlossen
    #[error("Verbindung geschlossen")]
    VerbindungGeschlossen,

    /// Hinweis konnte nicht serialisiert werden
    #[error("Serialisierungsfehler: {0}")]
    Serialisierung(#[from] serde_json::Error),
}

/// Result-Typ fuer das Relay
pub type RelayResult<T> = Result<T, RelayError>;
