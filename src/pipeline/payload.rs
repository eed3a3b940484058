//! Mapping extracted case data onto backend request bodies.

use chrono::NaiveDate;

use crate::backend::{CasePayload, ClientPayload, InsurerPayload, TicketPayload};
use crate::case::{CaseData, Person};

/// Insurer name used when none was extracted.
pub const UNKNOWN_INSURER: &str = "Unbekannte Versicherung";

/// Client surname used when no name was extracted.
pub const UNKNOWN_CLIENT: &str = "Unbekannt";

fn clean(value: &str) -> String {
    value.trim().to_string()
}

pub fn client_payload(person: &Person) -> ClientPayload {
    let mut payload = ClientPayload {
        vorname: clean(&person.vorname),
        nachname: clean(&person.nachname),
        anrede: clean(&person.salutation),
        strasse: clean(&person.address.strasse),
        hausnummer: clean(&person.address.hausnummer),
        plz: clean(&person.address.plz),
        ort: clean(&person.address.ort),
        email: clean(&person.email),
        telefon: clean(&person.telefon),
    };
    if payload.vorname.is_empty() && payload.nachname.is_empty() {
        payload.nachname = UNKNOWN_CLIENT.to_string();
    }
    payload
}

pub fn insurer_payload(data: &CaseData) -> InsurerPayload {
    let insurer = &data.gegner_versicherung;
    let name = clean(&insurer.name);
    InsurerPayload {
        name: if name.is_empty() {
            UNKNOWN_INSURER.to_string()
        } else {
            name
        },
        strasse: clean(&insurer.address.strasse),
        hausnummer: clean(&insurer.address.hausnummer),
        plz: clean(&insurer.address.plz),
        ort: clean(&insurer.address.ort),
    }
}

/// `fallback_subject` is used when the model produced no `betreff`,
/// typically the email subject.
pub fn case_payload(
    data: &CaseData,
    client_id: i64,
    insurer_id: i64,
    fallback_subject: &str,
) -> CasePayload {
    let betreff = match clean(&data.betreff) {
        b if b.is_empty() => clean(fallback_subject),
        b => b,
    };

    CasePayload {
        mandant_id: client_id,
        gegner_id: insurer_id,
        schadennummer: clean(&data.gegner_versicherung.claim_number),
        unfall: data.unfall.clone(),
        fahrzeug: data.fahrzeug.clone(),
        betreff,
        zusammenfassung: data.zusammenfassung.clone(),
        handlungsbedarf: data.handlungsbedarf.clone(),
    }
}

/// Review ticket for a freshly created case, due on `due`.
pub fn ticket_payload(
    data: &CaseData,
    case_id: i64,
    case_reference: &str,
    due: NaiveDate,
) -> TicketPayload {
    let mut beschreibung = String::new();
    let client = data.mandant.display_name();
    if !client.is_empty() {
        beschreibung.push_str(&format!("Mandant: {client}\n"));
    }
    if !data.zusammenfassung.trim().is_empty() {
        beschreibung.push_str(&format!("Zusammenfassung: {}\n", data.zusammenfassung.trim()));
    }
    let action = match data.handlungsbedarf.trim() {
        "" => "Akte prüfen und Mandant kontaktieren",
        other => other,
    };
    beschreibung.push_str(&format!("Handlungsbedarf: {action}"));

    TicketPayload {
        akte_id: case_id,
        titel: format!("KI-Akte prüfen: {case_reference}"),
        beschreibung,
        faellig_am: due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{Address, Insurance};

    fn sample() -> CaseData {
        CaseData {
            mandant: Person {
                vorname: " Max ".into(),
                nachname: "Mustermann".into(),
                salutation: "Herr".into(),
                address: Address {
                    strasse: "Berliner Str.".into(),
                    hausnummer: "1".into(),
                    plz: "10115".into(),
                    ort: "Berlin".into(),
                },
                email: String::new(),
                telefon: "  ".into(),
            },
            gegner_versicherung: Insurance {
                name: "HUK-Coburg".into(),
                claim_number: "SN-123".into(),
                address: Address::default(),
            },
            zusammenfassung: "Auffahrunfall an der Ampel".into(),
            ..Default::default()
        }
    }

    #[test]
    fn client_payload_trims_and_omits_blank_contact() {
        let json = serde_json::to_value(client_payload(&sample().mandant)).unwrap();
        assert_eq!(json["vorname"], "Max");
        assert_eq!(json["plz"], "10115");
        assert!(json.get("email").is_none());
        assert!(json.get("telefon").is_none());
    }

    #[test]
    fn nameless_client_gets_placeholder() {
        let payload = client_payload(&Person::default());
        assert_eq!(payload.nachname, UNKNOWN_CLIENT);
    }

    #[test]
    fn blank_insurer_name_gets_placeholder() {
        let payload = insurer_payload(&CaseData::default());
        assert_eq!(payload.name, UNKNOWN_INSURER);
        assert_eq!(insurer_payload(&sample()).name, "HUK-Coburg");
    }

    #[test]
    fn case_payload_carries_ids_and_facts() {
        let payload = case_payload(&sample(), 11, 22, "Unfall gestern");
        assert_eq!(payload.mandant_id, 11);
        assert_eq!(payload.gegner_id, 22);
        assert_eq!(payload.schadennummer, "SN-123");
        assert_eq!(payload.betreff, "Unfall gestern");
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["unfall"]["weitere_kennzeichen"].is_array());
        assert!(json["fahrzeug"].is_object());
    }

    #[test]
    fn extracted_subject_wins_over_fallback() {
        let mut data = sample();
        data.betreff = "Verkehrsunfall vom 2024-03-01".into();
        assert_eq!(case_payload(&data, 1, 2, "Fwd: Unfall").betreff, data.betreff);
    }

    #[test]
    fn ticket_summarizes_case() {
        let due = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let ticket = ticket_payload(&sample(), 5, "AZ-5/24", due);
        assert_eq!(ticket.akte_id, 5);
        assert_eq!(ticket.titel, "KI-Akte prüfen: AZ-5/24");
        assert!(ticket.beschreibung.contains("Mandant: Max Mustermann"));
        assert!(ticket.beschreibung.contains("Auffahrunfall"));
        assert!(ticket.beschreibung.ends_with("Akte prüfen und Mandant kontaktieren"));
        assert_eq!(ticket.faellig_am, due);
    }
}
