//! Parser for the registry's inner search document.
//!
//! The search result is a standalone XML document of the form
//! `<root><dane>...</dane></root>`. Whether an entity was found is decided by
//! structure alone: a `dane` section with fields and no `ErrorCode` is a hit,
//! anything else (including a document that fails to parse) is a miss.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Country name appended to every composed address.
pub const COUNTRY_NAME: &str = "Poľsko";

const DATA_SECTION: &str = "dane";
const ERROR_CODE: &str = "ErrorCode";

/// Normalized result of a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRecord {
    /// Entity was found in the registry
    pub valid: bool,
    /// NIP
    pub tax_id: String,
    /// REGON
    pub registry_id: String,
    /// Legal name
    pub name: String,
    /// Composed one-line address
    pub address: String,
    pub street: String,
    pub building_number: String,
    pub unit_number: String,
    pub postal_code: String,
    pub city: String,
    /// Entity type code (`P` legal person, `F` natural person, ...)
    pub entity_type: String,
    pub voivodeship: String,
    pub county: String,
    pub commune: String,
    pub postal_city: String,
    pub nip_status: String,
    pub silo_id: String,
    pub activity_end_date: String,
    /// When the record was produced
    pub requested_at: DateTime<Utc>,
}

impl EntityRecord {
    /// A miss: only the echoed tax id survives.
    pub fn not_found(tax_id: impl Into<String>) -> Self {
        Self {
            valid: false,
            tax_id: tax_id.into(),
            registry_id: String::new(),
            name: String::new(),
            address: String::new(),
            street: String::new(),
            building_number: String::new(),
            unit_number: String::new(),
            postal_code: String::new(),
            city: String::new(),
            entity_type: String::new(),
            voivodeship: String::new(),
            county: String::new(),
            commune: String::new(),
            postal_city: String::new(),
            nip_status: String::new(),
            silo_id: String::new(),
            activity_end_date: String::new(),
            requested_at: Utc::now(),
        }
    }

    fn found(data: &DataSection) -> Self {
        let street = data.get("Ulica");
        let building_number = data.get("NrNieruchomosci");
        let unit_number = data.get("NrLokalu");
        let postal_code = data.get("KodPocztowy");
        let city = data.get("Miejscowosc");

        Self {
            valid: true,
            tax_id: data.get("Nip"),
            registry_id: data.get("Regon"),
            name: data.get("Nazwa"),
            address: compose_address(&street, &building_number, &unit_number, &postal_code, &city),
            street,
            building_number,
            unit_number,
            postal_code,
            city,
            entity_type: data.get("Typ"),
            voivodeship: data.get("Wojewodztwo"),
            county: data.get("Powiat"),
            commune: data.get("Gmina"),
            postal_city: data.get("MiejscowoscPoczty"),
            nip_status: data.get("StatusNip"),
            silo_id: data.get("SilosID"),
            activity_end_date: data.get("DataZakonczeniaDzialalnosci"),
            requested_at: Utc::now(),
        }
    }
}

/// Format the one-line address consumers depend on.
///
/// The unit number is always printed, so an empty one leaves a double space.
pub fn compose_address(
    street: &str,
    building_number: &str,
    unit_number: &str,
    postal_code: &str,
    city: &str,
) -> String {
    format!(
        "{}, nr {}, lok. {} {} {} {}",
        street, building_number, unit_number, postal_code, city, COUNTRY_NAME
    )
}

/// Parse the inner search document. Never fails.
pub fn parse_entity(xml: &str) -> EntityRecord {
    let data = match read_data_section(xml) {
        Ok(data) => data,
        Err(reason) => {
            debug!(reason = %reason, "Search result is not well-formed XML");
            return EntityRecord::not_found("");
        }
    };

    // A `dane` holding only text has no fields, so it counts as absent and
    // the record is invalid.
    match data {
        Some(data) if !data.fields.is_empty() && !data.fields.contains_key(ERROR_CODE) => {
            EntityRecord::found(&data)
        }
        Some(data) => {
            debug!(
                error_code = ?data.fields.get(ERROR_CODE),
                "Registry reported no matching entity"
            );
            EntityRecord::not_found(data.get("Nip"))
        }
        None => EntityRecord::not_found(""),
    }
}

/// Direct text of each child of the first `dane` element.
#[derive(Debug, Default)]
struct DataSection {
    fields: HashMap<String, String>,
}

impl DataSection {
    fn get(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }
}

fn read_data_section(xml: &str) -> Result<Option<DataSection>, String> {
    // Field text is kept verbatim, so whitespace is only skipped between elements.
    let mut reader = Reader::from_str(xml);

    let mut first_event = true;
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut in_data = false;
    let mut section: Option<DataSection> = None;
    let mut field: Option<(String, String)> = None;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                let name = local_name_str(e);
                match depth {
                    1 if root_seen => return Err("multiple root elements".to_string()),
                    1 => root_seen = true,
                    2 if name == DATA_SECTION && section.is_none() => {
                        in_data = true;
                        section = Some(DataSection::default());
                    }
                    3 if in_data => field = Some((name, String::new())),
                    _ => {}
                }
            }

            Ok(Event::Empty(ref e)) => {
                let name = local_name_str(e);
                match depth {
                    0 if root_seen => return Err("multiple root elements".to_string()),
                    0 => root_seen = true,
                    1 if name == DATA_SECTION && section.is_none() => {
                        section = Some(DataSection::default());
                    }
                    2 if in_data => {
                        if let Some(ref mut data) = section {
                            data.fields.entry(name).or_default();
                        }
                    }
                    _ => {}
                }
            }

            Ok(Event::Text(ref e)) => {
                let blank = e.iter().all(u8::is_ascii_whitespace);
                if depth == 0 && !blank {
                    return Err("text outside the root element".to_string());
                }
                if depth == 3 {
                    if let Some((_, ref mut value)) = field {
                        let text = e.unescape().map_err(|err| err.to_string())?;
                        value.push_str(&text);
                    }
                }
            }

            Ok(Event::CData(ref e)) => {
                if depth == 3 {
                    if let Some((_, ref mut value)) = field {
                        value.push_str(&String::from_utf8_lossy(e));
                    }
                }
            }

            Ok(Event::End(_)) => {
                if depth == 0 {
                    return Err("unexpected closing tag".to_string());
                }
                if depth == 3 && in_data {
                    if let (Some((name, value)), Some(data)) = (field.take(), &mut section) {
                        data.fields.entry(name).or_insert(value);
                    }
                }
                if depth == 2 && in_data {
                    in_data = false;
                }
                depth -= 1;
            }

            Ok(Event::Decl(_)) if !first_event => {
                return Err("XML declaration is only allowed at the start".to_string());
            }

            Ok(Event::DocType(_)) => {
                return Err("DOCTYPE declarations are not allowed".to_string());
            }

            Ok(Event::Eof) => break,

            Err(e) => return Err(e.to_string()),

            _ => {}
        }

        first_event = false;
        buf.clear();
    }

    if !root_seen {
        return Err("no root element".to_string());
    }
    if depth != 0 {
        return Err("unclosed elements at end of document".to_string());
    }

    Ok(section)
}

fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref()).unwrap_or("").to_string()
}
