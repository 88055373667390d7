//! colorcast-server – Bibliotheks-Root
//!
//! Deklariert die Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Tests bereit.

pub mod config;

use anyhow::Result;
use colorcast_relay::{Beendigung, Lebenszyklus, RelayState, ShutdownGrund};
use config::ServerConfig;
use std::future::Future;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet das Relay und laeuft bis SIGINT/SIGTERM (bzw. Ctrl-C)
    pub async fn starten(self) -> Result<Beendigung> {
        let signal = stopp_signal()?;
        self.starten_mit(signal).await
    }

    /// Startet das Relay und laeuft bis `stopp_signal` ausloest
    ///
    /// Reihenfolge:
    /// 1. Konfiguration pruefen
    /// 2. Relay-Zustand (Registry, Metriken) anlegen
    /// 3. Listener binden (Startend -> Laufend)
    /// 4. Verbindungen bedienen bis zum Shutdown
    pub async fn starten_mit<F>(self, stopp_signal: F) -> Result<Beendigung>
    where
        F: Future<Output = ShutdownGrund>,
    {
        self.config.validieren()?;
        let adresse = self.config.bind_adresse()?;

        tracing::info!(
            adresse = %adresse,
            heartbeat_sek = self.config.relay.heartbeat_sek,
            shutdown_grace_sek = self.config.relay.shutdown_grace_sek,
            metriken = self.config.observability.metriken,
            "Server startet"
        );

        let state = RelayState::neu(self.config.relay_config())?;
        let beendigung = Lebenszyklus::neu(state)
            .ausfuehren(adresse, stopp_signal)
            .await?;

        tracing::info!(beendigung = ?beendigung, "Server beendet");
        Ok(beendigung)
    }
}

/// Registriert die Signal-Handler und liefert ein Future, das beim ersten
/// Signal endet
#[cfg(unix)]
fn stopp_signal() -> std::io::Result<impl Future<Output = ShutdownGrund>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => ShutdownGrund::Signal("SIGTERM"),
            _ = sigint.recv() => ShutdownGrund::Signal("SIGINT"),
        }
    })
}

#[cfg(not(unix))]
fn stopp_signal() -> std::io::Result<impl Future<Output = ShutdownGrund>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(fehler = %e, "Ctrl-C-Handler nicht verfuegbar");
            std::future::pending::<()>().await;
        }
        ShutdownGrund::Signal("Ctrl-C")
    })
}
