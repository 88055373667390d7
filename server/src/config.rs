//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist. Die Umgebungsvariable `PORT` ueberschreibt den Port.

use colorcast_core::ColorcastError;
use colorcast_observability::{log_format_gueltig, log_level_gueltig};
use colorcast_relay::RelayConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Einstellungen (Heartbeat, Shutdown, Limits)
    pub relay: RelayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen
    pub observability: ObservabilityEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    /// Port fuer HTTP und WebSocket
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Heartbeat-Periode in Sekunden
    pub heartbeat_sek: u64,
    /// Maximale Dauer des geordneten Shutdowns in Sekunden
    pub shutdown_grace_sek: u64,
    /// Maximale Groesse einer eingehenden Nachricht
    pub max_nachricht_bytes: usize,
    /// Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            heartbeat_sek: 30,
            shutdown_grace_sek: 5,
            max_nachricht_bytes: 4096,
            send_queue_groesse: 64,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Stellt `/metrics` bereit
    pub metriken: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self { metriken: true }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Logging ist hier noch nicht initialisiert
                eprintln!("Konfigurationsdatei '{pfad}' nicht gefunden, verwende Standardwerte");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Uebernimmt den Port aus dem Wert von `PORT`, falls gesetzt
    pub fn port_ueberschreiben(&mut self, wert: Option<&str>) -> Result<(), ColorcastError> {
        let Some(wert) = wert else {
            return Ok(());
        };
        self.netzwerk.port = wert.trim().parse().map_err(|_| {
            ColorcastError::konfiguration(format!("PORT ist kein gueltiger Port: '{wert}'"))
        })?;
        Ok(())
    }

    /// Prueft die Werte auf Plausibilitaet
    pub fn validieren(&self) -> Result<(), ColorcastError> {
        if self.relay.heartbeat_sek == 0 {
            return Err(ColorcastError::konfiguration("relay.heartbeat_sek muss > 0 sein"));
        }
        if self.relay.shutdown_grace_sek == 0 {
            return Err(ColorcastError::konfiguration(
                "relay.shutdown_grace_sek muss > 0 sein",
            ));
        }
        if self.relay.max_nachricht_bytes == 0 {
            return Err(ColorcastError::konfiguration(
                "relay.max_nachricht_bytes muss > 0 sein",
            ));
        }
        if self.relay.send_queue_groesse == 0 {
            return Err(ColorcastError::konfiguration(
                "relay.send_queue_groesse muss > 0 sein",
            ));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(ColorcastError::konfiguration(format!(
                "Unbekanntes Log-Level: '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(ColorcastError::konfiguration(format!(
                "Unbekanntes Log-Format: '{}'",
                self.logging.format
            )));
        }
        self.bind_adresse().map(|_| ())
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> Result<SocketAddr, ColorcastError> {
        let ip: IpAddr = self.netzwerk.bind_adresse.parse().map_err(|_| {
            ColorcastError::konfiguration(format!(
                "Ungueltige Bind-Adresse: '{}'",
                self.netzwerk.bind_adresse
            ))
        })?;
        Ok(SocketAddr::new(ip, self.netzwerk.port))
    }

    /// Leitet die Relay-Konfiguration ab
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            heartbeat_intervall: Duration::from_secs(self.relay.heartbeat_sek),
            shutdown_frist: Duration::from_secs(self.relay.shutdown_grace_sek),
            max_nachricht_bytes: self.relay.max_nachricht_bytes,
            send_queue_groesse: self.relay.send_queue_groesse,
            metriken_endpunkt: self.observability.metriken,
        }
    }
}
