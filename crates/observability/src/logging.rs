//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `CC_LOG_LEVEL`: Log-Level bzw. Filter-Direktive, Standard aus der Konfiguration
//! - `CC_LOG_FORMAT`: Format (text/json), Standard aus der Konfiguration

use tracing_subscriber::{fmt, EnvFilter};

/// Initialisiert das Logging-System.
///
/// `CC_LOG_LEVEL` und `CC_LOG_FORMAT` haben Vorrang vor den uebergebenen
/// Werten. Faellt auf `info` / `text` zurueck wenn nichts Gueltiges gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env("CC_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = log_format_aus_env().unwrap_or_else(|| format.to_string());

    match format_env.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Leitet Panics an `tracing` weiter.
///
/// Panics in abgekoppelten Tasks (z.B. einem Verbindungs-Task) werden
/// dadurch geloggt, eskalieren aber nicht.
pub fn panic_hook_installieren() {
    std::panic::set_hook(Box::new(|info| {
        let ort = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unbekannt".to_string());
        let nachricht = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "<kein Text>".to_string()
        };
        tracing::error!(ort = %ort, nachricht = %nachricht, "Panic in Task");
    }));
}

/// Gibt das konfigurierte Log-Format aus der Umgebung zurueck, falls gueltig.
pub fn log_format_aus_env() -> Option<String> {
    std::env::var("CC_LOG_FORMAT")
        .ok()
        .filter(|f| log_format_gueltig(f))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level));
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
        assert!(!log_format_gueltig("JSON"));
    }

    #[test]
    fn log_format_aus_env_verhalten() {
        // Ein Test fuer alle Faelle, damit parallele Tests sich nicht ueberschneiden
        std::env::remove_var("CC_LOG_FORMAT");
        assert_eq!(log_format_aus_env(), None);

        std::env::set_var("CC_LOG_FORMAT", "json");
        assert_eq!(log_format_aus_env().as_deref(), Some("json"));

        std::env::set_var("CC_LOG_FORMAT", "xml");
        assert_eq!(log_format_aus_env(), None);

        std::env::remove_var("CC_LOG_FORMAT");
    }
}
