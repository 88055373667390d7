//! colorcast-relay – WebSocket-Relay fuer Farbbefehle
//!
//! Dieser Crate nimmt beliebig viele WebSocket-Verbindungen an, empfaengt
//! Farbbefehle von einem Client und leitet sie an alle anderen weiter.
//! Browser-Frontends und die Unity-Anwendung teilen sich keinen anderen
//! Kommunikationsweg.
//!
//! ## Architektur
//!
//! ```text
//! Lebenszyklus (Startend -> Laufend -> Stoppend -> Gestoppt)
//!     |
//!     +-- axum::serve (ws::router)
//!     |       |
//!     |       v
//!     |   ClientConnection (pro Verbindung ein Task)
//!     |       |  Nachricht -> klassifizieren -> Broadcaster
//!     |       |  Pong      -> Registry (lebendig)
//!     |       |  Close     -> verbindung_trennen
//!     |
//!     +-- HeartbeatMonitor (periodisch: Ping / Entfernen)
//!
//! VerbindungsRegistry – einziger geteilter Zustand (Mutex)
//! Broadcaster         – Zustellung an alle ausser dem Sender
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod lifecycle;
pub mod registry;
pub mod server_state;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::Broadcaster;
pub use connection::ClientConnection;
pub use error::{RelayError, RelayResult};
pub use heartbeat::HeartbeatMonitor;
pub use lifecycle::{
    verbindung_trennen, Beendigung, Lebenszyklus, LebenszyklusZustand, ShutdownAusloeser,
    ShutdownGrund, TrennGrund,
};
pub use registry::{Ausgehend, Verbindung, VerbindungsHandle, VerbindungsRegistry};
pub use server_state::{RelayConfig, RelayState};
