//! Authenticated search of the registry by NIP.

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::parser::{parse_entity, EntityRecord};
use crate::session::{routing_header, SessionId};
use crate::transport::{
    ClientOptions, RawXml, SoapBody, SoapHeader, SoapTransport, BIR_DATA_CONTRACT_NS, BIR_NS,
};
use quick_xml::escape::escape;
use tracing::debug;

/// Search operation name.
pub const SEARCH_OPERATION: &str = "DaneSzukajPodmioty";
/// Search action URI.
pub const SEARCH_ACTION: &str =
    "http://CIS/BIR/PUBL/2014/07/IUslugaBIRzewnPubl/DaneSzukajPodmioty";

/// Declaration prepended to the inner result document, which arrives without one.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Headers for the search call; the action header comes last.
pub fn search_headers(config: &RegistryConfig) -> Vec<SoapHeader> {
    vec![
        routing_header(config),
        SoapHeader::addressing("Action", SEARCH_ACTION),
    ]
}

/// Search criteria for a single NIP.
///
/// The registry takes its criteria as untyped XML, so the payload is sent as
/// a raw fragment rather than typed parameters.
pub fn search_criteria(tax_id: &str) -> RawXml {
    RawXml::new(format!(
        "<ns2:DaneSzukajPodmioty><ns2:pParametryWyszukiwania><ns1:Nip>{}</ns1:Nip></ns2:pParametryWyszukiwania></ns2:DaneSzukajPodmioty>",
        escape(tax_id)
    ))
    .with_namespace("ns1", BIR_DATA_CONTRACT_NS)
    .with_namespace("ns2", BIR_NS)
}

/// Looks entities up inside an open session.
pub struct EntityLookup<'a> {
    config: &'a RegistryConfig,
    transport: &'a dyn SoapTransport,
}

impl<'a> EntityLookup<'a> {
    pub fn new(config: &'a RegistryConfig, transport: &'a dyn SoapTransport) -> Self {
        Self { config, transport }
    }

    /// Search by NIP. Always yields a record; a miss has `valid == false`.
    ///
    /// `session` must not be empty.
    pub fn find_by_tax_id(
        &self,
        session: &SessionId,
        tax_id: &str,
    ) -> Result<EntityRecord, RegistryError> {
        let mut client = self
            .transport
            .client(ClientOptions::new(self.config, session.as_str()))?;
        client.set_headers(search_headers(self.config));

        debug!(operation = SEARCH_OPERATION, tax_id = %tax_id, "Searching registry");

        let response = client.call(SEARCH_OPERATION, SoapBody::Raw(search_criteria(tax_id)))?;
        let document = format!(
            "{}{}",
            XML_DECLARATION,
            response.result.as_deref().unwrap_or_default()
        );

        let record = parse_entity(&document);
        debug!(tax_id = %tax_id, valid = record.valid, "Registry search finished");
        Ok(record)
    }
}
