//! Integration tests for the bir-nip-validator crate.
//!
//! These tests exercise the public API end-to-end. The registry is simulated
//! at the wire level: requests are serialized with the real envelope builder
//! and canned MTOM responses go through the real envelope reader.

use bir_nip_validator::config::{RegistryConfig, SERVICE_TEST_URL, TEST_KEY};
use bir_nip_validator::error::{ErrorObserver, RegistryError};
use bir_nip_validator::lookup::search_criteria;
use bir_nip_validator::parser::parse_entity;
use bir_nip_validator::transport::{
    build_envelope, extract_envelope, parse_response, ClientOptions, SoapBody, SoapClient,
    SoapHeader, SoapResponse, SoapTransport,
};
use bir_nip_validator::{PolandNipValidator, ValidationRequest};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper: a registry simulated at the wire level
// ============================================================================

#[derive(Debug, Clone)]
struct WireRequest {
    session: Option<String>,
    envelope: String,
}

#[derive(Default)]
struct WireLog {
    requests: Vec<WireRequest>,
}

/// Answers login with `session` and search with `search_body`.
#[derive(Clone)]
struct SimulatedRegistry {
    session: Option<String>,
    search_body: String,
    log: Arc<Mutex<WireLog>>,
}

impl SimulatedRegistry {
    fn new(session: Option<&str>, search_body: &str) -> Self {
        Self {
            session: session.map(String::from),
            search_body: search_body.to_string(),
            log: Arc::default(),
        }
    }

    fn requests(&self) -> Vec<WireRequest> {
        self.log.lock().unwrap().requests.clone()
    }
}

impl SoapTransport for SimulatedRegistry {
    fn client(&self, options: ClientOptions) -> Result<Box<dyn SoapClient>, RegistryError> {
        Ok(Box::new(SimulatedClient {
            registry: self.clone(),
            options,
            headers: Vec::new(),
        }))
    }
}

struct SimulatedClient {
    registry: SimulatedRegistry,
    options: ClientOptions,
    headers: Vec<SoapHeader>,
}

impl SoapClient for SimulatedClient {
    fn set_headers(&mut self, headers: Vec<SoapHeader>) {
        self.headers = headers;
    }

    fn call(&self, operation: &str, body: SoapBody) -> Result<SoapResponse, RegistryError> {
        let envelope = build_envelope(self.options.soap_version, &self.headers, operation, &body);
        self.registry.log.lock().unwrap().requests.push(WireRequest {
            session: self.options.session.clone(),
            envelope,
        });

        let raw = match operation {
            "Zaloguj" => mtom(&login_envelope(self.registry.session.as_deref())),
            "DaneSzukajPodmioty" => self.registry.search_body.clone(),
            other => panic!("unexpected operation {}", other),
        };

        let envelope = extract_envelope(&raw)
            .ok_or_else(|| RegistryError::Envelope("no envelope".to_string()))?;
        parse_response(envelope, operation)
    }
}

fn mtom(envelope: &str) -> String {
    format!(
        "\r\n--uuid:5a1b\r\nContent-ID: <http://tempuri.org/0>\r\nContent-Transfer-Encoding: 8bit\r\n\
Content-Type: application/xop+xml;charset=utf-8;type=\"application/soap+xml\"\r\n\r\n{}\r\n--uuid:5a1b--\r\n",
        envelope
    )
}

fn login_envelope(session: Option<&str>) -> String {
    let result = match session {
        Some(sid) => format!("<ZalogujResult>{}</ZalogujResult>", sid),
        None => "<ZalogujResult/>".to_string(),
    };
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://www.w3.org/2005/08/addressing"><s:Header><a:Action s:mustUnderstand="1">http://CIS/BIR/PUBL/2014/07/IUslugaBIRzewnPubl/ZalogujResponse</a:Action></s:Header><s:Body><ZalogujResponse xmlns="http://CIS/BIR/PUBL/2014/07">{}</ZalogujResponse></s:Body></s:Envelope>"#,
        result
    )
}

fn search_envelope(inner: &str) -> String {
    let escaped = inner
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    mtom(&format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><DaneSzukajPodmiotyResponse xmlns="http://CIS/BIR/PUBL/2014/07"><DaneSzukajPodmiotyResult>{}</DaneSzukajPodmiotyResult></DaneSzukajPodmiotyResponse></s:Body></s:Envelope>"#,
        escaped
    ))
}

const FOUND_INNER: &str = r#"
<root>
  <dane>
    <Regon>000331501</Regon>
    <Nip>5261040828</Nip>
    <StatusNip />
    <Nazwa>GŁÓWNY URZĄD STATYSTYCZNY</Nazwa>
    <Wojewodztwo>MAZOWIECKIE</Wojewodztwo>
    <Powiat>m. st. Warszawa</Powiat>
    <Gmina>Śródmieście</Gmina>
    <Miejscowosc>Warszawa</Miejscowosc>
    <KodPocztowy>00-925</KodPocztowy>
    <Ulica>ul. Test-Krucza</Ulica>
    <NrNieruchomosci>208</NrNieruchomosci>
    <NrLokalu />
    <Typ>P</Typ>
    <SilosID>6</SilosID>
    <DataZakonczeniaDzialalnosci />
    <MiejscowoscPoczty>Warszawa</MiejscowoscPoczty>
  </dane>
</root>"#;

const NOT_FOUND_INNER: &str = r#"
<root>
  <dane>
    <ErrorCode>4</ErrorCode>
    <ErrorMessagePl>Nie znaleziono podmiotu dla podanych kryteriów wyszukiwania.</ErrorMessagePl>
    <ErrorMessageEn>No data found for the specified search criteria.</ErrorMessageEn>
    <Nip>526104082</Nip>
  </dane>
</root>"#;

#[derive(Default)]
struct CountingObserver {
    errors: Mutex<Vec<String>>,
}

impl ErrorObserver for CountingObserver {
    fn observe(&self, error: &RegistryError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

fn validator_for(registry: &SimulatedRegistry) -> (PolandNipValidator, Arc<CountingObserver>) {
    let observer = Arc::new(CountingObserver::default());
    let validator = PolandNipValidator::new(
        RegistryConfig::default(),
        Arc::new(registry.clone()),
        observer.clone(),
    );
    (validator, observer)
}

// ============================================================================
// End-to-end: found entity
// ============================================================================

#[test]
fn test_e2e_company_info_found() {
    let registry = SimulatedRegistry::new(Some("abc123sid"), &search_envelope(FOUND_INNER));
    let (validator, observer) = validator_for(&registry);

    let record = validator
        .company_info(&ValidationRequest::new("5261040828"))
        .expect("record expected");

    assert!(record.valid);
    assert_eq!(record.tax_id, "5261040828");
    assert_eq!(record.registry_id, "000331501");
    assert_eq!(record.name, "GŁÓWNY URZĄD STATYSTYCZNY");
    assert_eq!(record.entity_type, "P");
    assert_eq!(record.postal_code, "00-925");
    assert_eq!(record.city, "Warszawa");
    assert_eq!(record.street, "ul. Test-Krucza");
    assert_eq!(
        record.address,
        "ul. Test-Krucza, nr 208, lok.  00-925 Warszawa Poľsko"
    );
    assert!(observer.errors.lock().unwrap().is_empty());
}

#[test]
fn test_e2e_check_vat_found() {
    let registry = SimulatedRegistry::new(Some("abc123sid"), &search_envelope(FOUND_INNER));
    let (validator, _) = validator_for(&registry);

    assert!(validator.check_vat(&ValidationRequest::new("5261040828")));
}

// ============================================================================
// End-to-end: wire shape of the two calls
// ============================================================================

#[test]
fn test_e2e_wire_requests() {
    let registry = SimulatedRegistry::new(Some("abc123sid"), &search_envelope(FOUND_INNER));
    let (validator, _) = validator_for(&registry);
    validator.check_vat(&ValidationRequest::new("5261040828"));

    let requests = registry.requests();
    assert_eq!(requests.len(), 2);

    let login = &requests[0];
    assert!(login.session.is_none());
    assert!(login.envelope.contains(&format!(
        r#"<To xmlns="http://www.w3.org/2005/08/addressing">{}</To>"#,
        SERVICE_TEST_URL
    )));
    assert!(login.envelope.contains(
        "<Action xmlns=\"http://www.w3.org/2005/08/addressing\">http://CIS/BIR/PUBL/2014/07/IUslugaBIRzewnPubl/Zaloguj</Action>"
    ));
    assert!(login
        .envelope
        .contains(&format!("<pKluczUzytkownika>{}</pKluczUzytkownika>", TEST_KEY)));

    let search = &requests[1];
    assert_eq!(search.session.as_deref(), Some("abc123sid"));
    assert!(search.envelope.contains("IUslugaBIRzewnPubl/DaneSzukajPodmioty</Action>"));
    assert!(search.envelope.contains(r#"xmlns:ns1="http://CIS/BIR/PUBL/2014/07/DataContract""#));
    assert!(search.envelope.contains(r#"xmlns:ns2="http://CIS/BIR/PUBL/2014/07""#));
    assert!(search.envelope.contains(&search_criteria("5261040828").fragment));
}

// ============================================================================
// End-to-end: misses and refused sessions
// ============================================================================

#[test]
fn test_e2e_not_found() {
    let registry = SimulatedRegistry::new(Some("sid"), &search_envelope(NOT_FOUND_INNER));
    let (validator, observer) = validator_for(&registry);
    let request = ValidationRequest::new("526104082");

    assert!(!validator.check_vat(&request));

    let record = validator.company_info(&request).expect("record expected");
    assert!(!record.valid);
    assert_eq!(record.tax_id, "526104082");
    assert_eq!(record.registry_id, "");
    assert_eq!(record.name, "");
    assert_eq!(record.address, "");
    assert!(observer.errors.lock().unwrap().is_empty());
}

#[test]
fn test_e2e_refused_session_skips_search() {
    let registry = SimulatedRegistry::new(None, &search_envelope(FOUND_INNER));
    let (validator, observer) = validator_for(&registry);
    let request = ValidationRequest::new("5261040828");

    assert!(!validator.check_vat(&request));
    assert!(validator.company_info(&request).is_none());

    let requests = registry.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| !r.envelope.contains("DaneSzukajPodmioty")));
    assert!(observer.errors.lock().unwrap().is_empty());
}

// ============================================================================
// End-to-end: failures are contained and observed
// ============================================================================

#[test]
fn test_e2e_search_fault_contained() {
    let fault = mtom(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><s:Fault><s:Code><s:Value>s:Receiver</s:Value></s:Code><s:Reason><s:Text xml:lang="pl-PL">Brak sesji</s:Text></s:Reason></s:Fault></s:Body></s:Envelope>"#,
    );
    let registry = SimulatedRegistry::new(Some("sid"), &fault);
    let (validator, observer) = validator_for(&registry);
    let request = ValidationRequest::new("5261040828");

    assert!(!validator.check_vat(&request));
    assert!(validator.company_info(&request).is_none());

    let errors = observer.errors.lock().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("Brak sesji"));
}

#[test]
fn test_e2e_non_soap_response_contained() {
    let registry = SimulatedRegistry::new(Some("sid"), "<html><body>Bad Gateway</body></html>");
    let (validator, observer) = validator_for(&registry);

    assert!(!validator.check_vat(&ValidationRequest::new("5261040828")));
    assert_eq!(observer.errors.lock().unwrap().len(), 1);
}

#[test]
fn test_e2e_garbled_inner_document_is_invalid_not_error() {
    let registry = SimulatedRegistry::new(Some("sid"), &search_envelope("<root><dane><Nip>1"));
    let (validator, observer) = validator_for(&registry);

    let record = validator
        .company_info(&ValidationRequest::new("1"))
        .expect("record expected");
    assert!(!record.valid);
    assert_eq!(record.tax_id, "");
    assert!(observer.errors.lock().unwrap().is_empty());
}

// ============================================================================
// Entry point consistency
// ============================================================================

#[test]
fn test_check_vat_matches_company_info() {
    for inner in [FOUND_INNER, NOT_FOUND_INNER, "", "<root></root>"] {
        let registry = SimulatedRegistry::new(Some("sid"), &search_envelope(inner));
        let (validator, _) = validator_for(&registry);
        let request = ValidationRequest::new("5261040828");

        let from_info = validator
            .company_info(&request)
            .map(|r| r.valid)
            .unwrap_or(false);
        assert_eq!(validator.check_vat(&request), from_info);
    }
}

// ============================================================================
// Parser on its own
// ============================================================================

#[test]
fn test_parse_entity_with_declaration() {
    let record = parse_entity(&format!(
        r#"<?xml version="1.0" encoding="utf-8"?>{}"#,
        FOUND_INNER
    ));
    assert!(record.valid);
    assert_eq!(record.voivodeship, "MAZOWIECKIE");
}

#[test]
fn test_record_serializes_to_json() {
    let record = parse_entity(FOUND_INNER);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["registry_id"], "000331501");
    assert!(json["requested_at"].is_string());
}
