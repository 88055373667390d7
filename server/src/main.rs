//! Colorcast Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet das Relay.
//! Der Exit-Code spiegelt den Ausgang des Shutdowns.

use anyhow::Result;
use colorcast_observability::{logging_initialisieren, panic_hook_installieren};
use colorcast_relay::Beendigung;
use colorcast_server::{config::ServerConfig, Server};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match ausfuehren().await {
        Ok(beendigung) if beendigung.ist_erfolgreich() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(fehler = %format!("{e:#}"), "Server konnte nicht gestartet werden");
            eprintln!("colorcast-server: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn ausfuehren() -> Result<Beendigung> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("COLORCAST_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt), PORT hat Vorrang
    let mut config = ServerConfig::laden(&config_pfad)?;
    config.port_ueberschreiben(std::env::var("PORT").ok().as_deref())?;

    logging_initialisieren(&config.logging.level, &config.logging.format);
    panic_hook_installieren();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Colorcast Server wird initialisiert"
    );

    Server::neu(config).starten().await
}
