//! Eingehende Nachrichten – Klassifizierung
//!
//! Jede eingehende Payload ist entweder ein strukturiertes JSON-Dokument
//! oder ein opakes Farb-Token als Klartext.
//!
//! ## Strukturiertes Format
//! ```text
//! {"color": "#FF0000", "clientType": "unity"}
//! ```
//! - `color` ist das Token, fehlt es, wird `message` verwendet
//! - fehlen beide, ist der Rohtext der Payload das Token
//! - `clientType` ist optional und deklariert die Rolle des Senders
//!
//! Die Klassifizierung schlaegt nie fehl: eine ungueltige Payload wird
//! als Klartext-Token behandelt.

use colorcast_core::types::ClientRolle;
use serde_json::{Map, Value};

/// Feldname des primaeren Tokens
const FELD_FARBE: &str = "color";
/// Feldname des Ersatz-Tokens
const FELD_NACHRICHT: &str = "message";
/// Feldname der Rollen-Deklaration
const FELD_ROLLE: &str = "clientType";

// ---------------------------------------------------------------------------
// Klassifizierung
// ---------------------------------------------------------------------------

/// Herkunft des Tokens innerhalb eines strukturierten Dokuments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenQuelle {
    /// Aus dem `color`-Feld
    Farbe,
    /// Aus dem `message`-Feld
    Nachricht,
    /// Weder `color` noch `message` vorhanden, Rohtext der Payload
    Rohtext,
}

/// Ergebnis der Klassifizierung einer eingehenden Payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Klassifizierung {
    /// Gueltiges JSON-Objekt
    Strukturiert {
        token: String,
        quelle: TokenQuelle,
        rolle: Option<ClientRolle>,
    },
    /// Kein JSON-Objekt, die gesamte Payload ist das Token
    Klartext { token: String },
}

impl Klassifizierung {
    /// Das weiterzuleitende Token
    pub fn token(&self) -> &str {
        match self {
            Self::Strukturiert { token, .. } | Self::Klartext { token } => token,
        }
    }

    /// Die deklarierte Rolle, falls vorhanden
    pub fn rolle(&self) -> Option<ClientRolle> {
        match self {
            Self::Strukturiert { rolle, .. } => *rolle,
            Self::Klartext { .. } => None,
        }
    }

    /// Herkunft des Tokens, `None` bei Klartext
    pub fn quelle(&self) -> Option<TokenQuelle> {
        match self {
            Self::Strukturiert { quelle, .. } => Some(*quelle),
            Self::Klartext { .. } => None,
        }
    }
}

/// Klassifiziert eine rohe Payload
///
/// Nur JSON-Objekte gelten als strukturiert. Andere gueltige JSON-Werte
/// (`"red"`, `123`) sind kein Schluessel-Wert-Dokument und werden wie
/// Klartext unveraendert weitergeleitet.
pub fn klassifizieren(payload: &[u8]) -> Klassifizierung {
    let rohtext = || String::from_utf8_lossy(payload).into_owned();

    let dokument = match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(dokument)) => dokument,
        Ok(_) | Err(_) => return Klassifizierung::Klartext { token: rohtext() },
    };

    let rolle = dokument
        .get(FELD_ROLLE)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<ClientRolle>().ok());

    let (token, quelle) = match token_aus_dokument(&dokument) {
        Some(gefunden) => gefunden,
        None => (rohtext(), TokenQuelle::Rohtext),
    };

    Klassifizierung::Strukturiert {
        token,
        quelle,
        rolle,
    }
}

fn token_aus_dokument(dokument: &Map<String, Value>) -> Option<(String, TokenQuelle)> {
    if let Some(token) = dokument.get(FELD_FARBE).and_then(feld_als_token) {
        return Some((token, TokenQuelle::Farbe));
    }
    dokument
        .get(FELD_NACHRICHT)
        .and_then(feld_als_token)
        .map(|token| (token, TokenQuelle::Nachricht))
}

/// Strings werden ohne Anfuehrungszeichen uebernommen, andere Werte in
/// ihrer kompakten JSON-Form. `null` und leere Strings zaehlen als fehlend.
fn feld_als_token(wert: &Value) -> Option<String> {
    match wert {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        anderer => Some(anderer.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn klartext_wird_unveraendert_weitergeleitet() {
        let k = klassifizieren(b"red");
        assert_eq!(k, Klassifizierung::Klartext { token: "red".into() });
        assert_eq!(k.rolle(), None);
        assert_eq!(k.quelle(), None);
    }

    #[test]
    fn quelle_benennt_das_tokenfeld() {
        assert_eq!(klassifizieren(b"red").quelle(), None);
        assert_eq!(
            klassifizieren(br#"{"color":"red","message":"hi"}"#).quelle(),
            Some(TokenQuelle::Farbe)
        );
        assert_eq!(
            klassifizieren(br#"{"message":"hi"}"#).quelle(),
            Some(TokenQuelle::Nachricht)
        );
        assert_eq!(
            klassifizieren(br#"{"clientType":"web"}"#).quelle(),
            Some(TokenQuelle::Rohtext)
        );
    }

    #[test]
    fn hex_farbe_als_klartext() {
        let k = klassifizieren(b"#00ff7f");
        assert_eq!(k.token(), "#00ff7f");
    }

    #[test]
    fn farbe_mit_rolle_unity() {
        let k = klassifizieren(br##"{"color":"#FF0000","clientType":"unity"}"##);
        assert_eq!(k.token(), "#FF0000");
        assert_eq!(k.rolle(), Some(ClientRolle::Unity));
        assert!(matches!(
            k,
            Klassifizierung::Strukturiert {
                quelle: TokenQuelle::Farbe,
                ..
            }
        ));
    }

    #[test]
    fn message_feld_als_ersatz() {
        let k = klassifizieren(br##"{"message":"#00FF00"}"##);
        assert_eq!(k.token(), "#00FF00");
        assert_eq!(k.rolle(), None);
        assert!(matches!(
            k,
            Klassifizierung::Strukturiert {
                quelle: TokenQuelle::Nachricht,
                ..
            }
        ));
    }

    #[test]
    fn color_hat_vorrang_vor_message() {
        let k = klassifizieren(br#"{"message":"blue","color":"green"}"#);
        assert_eq!(k.token(), "green");
    }

    #[test]
    fn ohne_token_feld_wird_rohtext_verwendet() {
        let payload = br#"{"clientType":"web"}"#;
        let k = klassifizieren(payload);
        assert_eq!(k.token(), r#"{"clientType":"web"}"#);
        assert_eq!(k.rolle(), Some(ClientRolle::Web));
        assert!(matches!(
            k,
            Klassifizierung::Strukturiert {
                quelle: TokenQuelle::Rohtext,
                ..
            }
        ));
    }

    #[test]
    fn leeres_oder_null_color_faellt_auf_message_zurueck() {
        assert_eq!(klassifizieren(br#"{"color":"","message":"red"}"#).token(), "red");
        assert_eq!(klassifizieren(br#"{"color":null,"message":"red"}"#).token(), "red");
    }

    #[test]
    fn nicht_string_token_in_json_form() {
        let k = klassifizieren(br#"{"color":[255,0,0]}"#);
        assert_eq!(k.token(), "[255,0,0]");
    }

    #[test]
    fn unbekannte_rolle_wird_ignoriert() {
        let k = klassifizieren(br#"{"color":"red","clientType":"android"}"#);
        assert_eq!(k.token(), "red");
        assert_eq!(k.rolle(), None);
    }

    #[test]
    fn json_string_ist_kein_dokument() {
        let k = klassifizieren(br#""red""#);
        assert_eq!(k, Klassifizierung::Klartext { token: r#""red""#.into() });
    }

    #[test]
    fn kaputtes_json_faellt_auf_klartext_zurueck() {
        let k = klassifizieren(br#"{"color":"red""#);
        assert_eq!(k.token(), r#"{"color":"red""#);
        assert_eq!(k.quelle(), None);
    }

    #[test]
    fn ungueltiges_utf8_wird_verlustbehaftet_dekodiert() {
        let k = klassifizieren(&[0x72, 0x65, 0x64, 0xff]);
        assert_eq!(k.token(), "red\u{fffd}");
    }
}
