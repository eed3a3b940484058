//! Prompt templates for case extraction.
//!
//! The law office works in German, so instructions and schema hints are in
//! German. Schema keys match the serde names in `crate::case::model`.

use serde::{Deserialize, Serialize};

/// Target schema shown to models that must answer in `CaseData` shape.
const CASE_SCHEMA: &str = r#"{
  "mandant": {
    "vorname": "", "nachname": "", "anrede": "Herr/Frau",
    "adresse": { "strasse": "", "hausnummer": "", "plz": "", "ort": "" },
    "email": "", "telefon": ""
  },
  "gegner_versicherung": {
    "name": "", "schadennummer": "",
    "adresse": { "strasse": "", "hausnummer": "", "plz": "", "ort": "" }
  },
  "unfall": {
    "datum": "YYYY-MM-DD", "ort": "",
    "kennzeichen_gegner": "", "kennzeichen_mandant": "",
    "weitere_kennzeichen": []
  },
  "fahrzeug": { "typ": "Marke Modell", "kw": "110", "ez": "YYYY-MM-DD" },
  "betreff": "",
  "zusammenfassung": "",
  "handlungsbedarf": ""
}"#;

/// Intermediate schema of the vision stage. Looser than `CaseData`: the
/// vision model only collects what it sees.
const RAW_SCHEMA: &str = r#"{
  "persons": [
    {"name": "Vor- und Nachname", "address": "Vollständige Adresse", "phone": "", "email": "", "salutation": "Herr/Frau"}
  ],
  "vehicles": [
    {"plate": "XX-XX-1234", "make_model": "VW Golf", "kw": "110", "first_registration": "YYYY-MM-DD", "holder": ""}
  ],
  "accident": {
    "date": "YYYY-MM-DD", "location": "", "description": "",
    "plates_involved": ["XX-XX-1234", "YY-YY-5678"]
  },
  "insurers": [
    {"name": "", "claim_number": "", "address": ""}
  ]
}"#;

const EXTRACTION_HINTS: &str = "\
WICHTIG:
1. Suche aktiv nach Telefonnummern und E-Mail-Adressen des Mandanten.
2. Fahrzeugschein (Scan/Foto): Kennzeichen, Halter, FIN. Marke (D.1) und Handelsbezeichnung (D.3); \
Feld J (Fahrzeugklasse) ist NICHT das Modell. Nennleistung in kW (P.2), Erstzulassung (B).
3. Unfalldaten: Datum, Ort, Kennzeichen, Schadennummer.
4. Achte auf MEHRERE Kennzeichen (z.B. Anhänger).";

/// Output of the vision stage, used when the model's answer is unusable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    pub persons: Vec<serde_json::Value>,
    pub vehicles: Vec<serde_json::Value>,
    pub accident: serde_json::Map<String, serde_json::Value>,
    pub insurers: Vec<serde_json::Value>,
}

impl RawExtraction {
    pub fn empty_value() -> serde_json::Value {
        serde_json::to_value(Self::default()).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// Stage A: collect raw facts from the email and its attachments.
pub fn vision_prompt(email_text: &str, attachment_names: &[&str]) -> String {
    let manifest = if attachment_names.is_empty() {
        "(keine)".to_string()
    } else {
        attachment_names.join(", ")
    };

    format!(
        "Du bist ein Datenextraktions-Assistent für eine Rechtsanwaltskanzlei (Verkehrsrecht).\n\n\
         Analysiere die folgende E-Mail (inklusive Header, Signatur, Footer) UND die angehängten \
         Bilder/Dokumente (z.B. Fahrzeugscheine, Unfallskizzen).\n\n\
         {EXTRACTION_HINTS}\n\n\
         E-MAIL:\n{email_text}\n\n\
         ANHÄNGE:\n{manifest}\n\n\
         AUFGABE:\nExtrahiere ALLE Daten, die du findest, als JSON:\n{RAW_SCHEMA}\n\n\
         Wenn Informationen nicht vorhanden sind, setze den Wert auf null.\n\
         Antworte NUR mit validem JSON, ohne Markdown, ohne Erklärungen."
    )
}

/// Stage B: map raw facts onto the exact case schema.
pub fn mapping_prompt(raw: &serde_json::Value) -> String {
    let raw_pretty = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());

    format!(
        "Du bist ein Daten-Mapping-Assistent für eine Rechtsanwaltskanzlei.\n\n\
         Nimm die folgenden extrahierten Rohdaten und bilde sie auf das Akten-Schema ab.\n\n\
         ROHDATEN:\n{raw_pretty}\n\n\
         SCHEMA:\n{CASE_SCHEMA}\n\n\
         MAPPING-REGELN:\n\
         1. Trenne Namen: \"Max Mustermann\" -> vorname=\"Max\", nachname=\"Mustermann\"\n\
         2. Trenne Adressen: \"Berliner Str. 1, 10115 Berlin\" -> strasse=\"Berliner Str.\", \
         hausnummer=\"1\", plz=\"10115\", ort=\"Berlin\"\n\
         3. Leite die Anrede ab: \"Jennifer\" -> \"Frau\", \"Thomas\" -> \"Herr\"\n\
         4. Erste Person in \"persons\" = Mandant\n\
         5. Erste Versicherung in \"insurers\" = Gegner-Versicherung\n\
         6. Erstes Fahrzeug in \"vehicles\" = Fahrzeug des Mandanten\n\
         7. Wenn Daten fehlen, setze null. ERFINDE KEINE DATEN!\n\
         8. betreff = \"Verkehrsunfall vom [Datum]\"\n\
         9. zusammenfassung = kurze Beschreibung des Unfalls\n\
         10. handlungsbedarf = \"Akte prüfen und Mandant kontaktieren\"\n\n\
         Antworte NUR mit dem gemappten JSON, ohne Markdown, ohne Erklärungen."
    )
}

/// Single-stage prompt for the cloud provider.
pub fn cloud_prompt(email_text: &str) -> String {
    format!(
        "Du bist ein juristischer Assistent. Analysiere die folgende E-Mail (inklusive Header, \
         Signatur, Footer) UND die angehängten Bilder/Dokumente (z.B. Fahrzeugscheine, \
         Unfallskizzen). Extrahiere strukturierte Daten für eine neue Verkehrsrecht-Akte.\n\n\
         {EXTRACTION_HINTS}\n\n\
         E-Mail Text:\n{email_text}\n\n\
         Antworte NUR mit validem JSON (ohne Markdown), das genau diesem Schema entspricht:\n\
         {CASE_SCHEMA}"
    )
}
