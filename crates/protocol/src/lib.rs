//! colorcast-protocol – Nachrichtenformate des Relays
//!
//! Dieses Crate beschreibt alles, was ueber die WebSocket-Verbindung
//! laeuft: die Klassifizierung eingehender Payloads (Klartext-Farbe oder
//! strukturiertes Dokument) und die ausgehenden Hinweis-Envelopes.
//!
//! Farb-Tokens selbst werden nie verpackt, sie gehen als nackter Text
//! an die Empfaenger.

pub mod hinweis;
pub mod nachricht;

pub use hinweis::Hinweis;
pub use nachricht::{klassifizieren, Klassifizierung, TokenQuelle};
