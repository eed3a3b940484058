//! Request and response bodies of the case-management backend.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::case::{Accident, Vehicle};

/// New client (Mandant). Empty optional fields are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientPayload {
    pub vorname: String,
    pub nachname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub anrede: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub strasse: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hausnummer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub plz: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ort: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub telefon: String,
}

/// Opposing insurer (Gegner), looked up by name or created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsurerPayload {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub strasse: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hausnummer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub plz: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ort: String,
}

/// New case (Akte) with the extracted facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CasePayload {
    pub mandant_id: i64,
    pub gegner_id: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schadennummer: String,
    pub unfall: Accident,
    pub fahrzeug: Vehicle,
    pub betreff: String,
    pub zusammenfassung: String,
    pub handlungsbedarf: String,
}

/// Review ticket on a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketPayload {
    pub akte_id: i64,
    pub titel: String,
    pub beschreibung: String,
    pub faellig_am: NaiveDate,
}

/// One file to attach to a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub case_id: i64,
    pub filename: String,
    pub title: String,
    pub content: Vec<u8>,
}

/// `{ "id": ... }` returned by the create endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RecordId {
    pub id: i64,
}

/// Response of the case creation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedCase {
    pub id: i64,
    #[serde(alias = "reference", alias = "case_reference", default)]
    pub aktenzeichen: String,
}
