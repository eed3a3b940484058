//! Normalized case schema produced by extraction.
//!
//! Wire keys follow the German field names the prompts ask for
//! (`vorname`, `adresse`, `kennzeichen_gegner`, ...). English aliases are
//! accepted on input. Every leaf is a string (empty = unknown) and every
//! nested object is always present, so consumers never branch on
//! "missing" vs "empty".

use serde::{Deserialize, Deserializer, Serialize};

// ── Leaf types ──────────────────────────────────────────────────────

/// Postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    #[serde(alias = "street", deserialize_with = "lenient_string")]
    pub strasse: String,
    #[serde(alias = "house_number", deserialize_with = "lenient_string")]
    pub hausnummer: String,
    #[serde(alias = "zip", deserialize_with = "lenient_string")]
    pub plz: String,
    #[serde(alias = "city", deserialize_with = "lenient_string")]
    pub ort: String,
}

/// The client (Mandant).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    #[serde(alias = "first_name", deserialize_with = "lenient_string")]
    pub vorname: String,
    #[serde(alias = "last_name", deserialize_with = "lenient_string")]
    pub nachname: String,
    #[serde(rename = "anrede", alias = "salutation", deserialize_with = "lenient_string")]
    pub salutation: String,
    #[serde(rename = "adresse", alias = "address", deserialize_with = "null_as_default")]
    pub address: Address,
    #[serde(deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(alias = "phone", deserialize_with = "lenient_string")]
    pub telefon: String,
}

/// The opposing party's insurer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Insurance {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(
        rename = "schadennummer",
        alias = "claim_number",
        deserialize_with = "lenient_string"
    )]
    pub claim_number: String,
    #[serde(rename = "adresse", alias = "address", deserialize_with = "null_as_default")]
    pub address: Address,
}

/// Accident facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Accident {
    /// ISO 8601 date (`YYYY-MM-DD`) or empty.
    #[serde(rename = "datum", alias = "date", deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(rename = "ort", alias = "location", deserialize_with = "lenient_string")]
    pub location: String,
    #[serde(
        rename = "kennzeichen_gegner",
        alias = "plate_opponent",
        deserialize_with = "lenient_string"
    )]
    pub plate_opponent: String,
    #[serde(
        rename = "kennzeichen_mandant",
        alias = "plate_client",
        deserialize_with = "lenient_string"
    )]
    pub plate_client: String,
    /// Trailers, second vehicles, ... in the order they were found.
    #[serde(
        rename = "weitere_kennzeichen",
        alias = "additional_plates",
        deserialize_with = "lenient_string_list"
    )]
    pub additional_plates: Vec<String>,
}

/// The client's vehicle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vehicle {
    #[serde(rename = "typ", alias = "type", deserialize_with = "lenient_string")]
    pub vehicle_type: String,
    #[serde(rename = "kw", alias = "power_kw", deserialize_with = "lenient_string")]
    pub power_kw: String,
    #[serde(
        rename = "ez",
        alias = "first_registration",
        deserialize_with = "lenient_string"
    )]
    pub first_registration: String,
}

// ── Root ────────────────────────────────────────────────────────────

/// Root extraction result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseData {
    #[serde(alias = "client", deserialize_with = "null_as_default")]
    pub mandant: Person,
    #[serde(alias = "opposing_insurance", deserialize_with = "null_as_default")]
    pub gegner_versicherung: Insurance,
    #[serde(alias = "accident", deserialize_with = "null_as_default")]
    pub unfall: Accident,
    #[serde(alias = "vehicle", deserialize_with = "null_as_default")]
    pub fahrzeug: Vehicle,
    #[serde(alias = "subject", deserialize_with = "lenient_string")]
    pub betreff: String,
    #[serde(alias = "summary", deserialize_with = "lenient_string")]
    pub zusammenfassung: String,
    #[serde(alias = "action_required", deserialize_with = "lenient_string")]
    pub handlungsbedarf: String,
}

impl CaseData {
    /// Normalize arbitrary provider JSON into the case schema.
    ///
    /// Fails only when the top level is not an object or a nested value has
    /// an incompatible shape (e.g. `"mandant": "Max Mustermann"`).
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// A record whose only content is a note in `zusammenfassung`.
    pub fn degraded(note: impl Into<String>) -> Self {
        Self {
            zusammenfassung: note.into(),
            ..Self::default()
        }
    }

    /// Number of top-level sections carrying at least one non-empty value.
    pub fn filled_sections(&self) -> usize {
        let sections = [
            self.mandant != Person::default(),
            self.gegner_versicherung != Insurance::default(),
            self.unfall != Accident::default(),
            self.fahrzeug != Vehicle::default(),
            !self.betreff.is_empty(),
            !self.zusammenfassung.is_empty(),
            !self.handlungsbedarf.is_empty(),
        ];
        sections.into_iter().filter(|filled| *filled).count()
    }
}

impl Person {
    /// "Vorname Nachname", or whichever half is known.
    pub fn display_name(&self) -> String {
        [self.vorname.trim(), self.nachname.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Lenient deserializers ───────────────────────────────────────────

/// `null` becomes `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts strings, numbers, booleans, and `null` (→ empty).
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(serde::de::Error::custom)
}

/// A list of plates; a bare string becomes a one-element list, nulls and
/// blanks are dropped.
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let items = match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = scalar_to_string(item).map_err(serde::de::Error::custom)?;
        if !text.is_empty() {
            out.push(text);
        }
    }
    Ok(out)
}

fn scalar_to_string(value: serde_json::Value) -> Result<String, String> {
    match value {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a scalar, got {other}")),
    }
}
