//! SOAP transport used to reach the BIR registry.
//!
//! The registry is only ever called through [`SoapTransport`], which hands out
//! a fresh [`SoapClient`] per remote call. [`HttpSoapTransport`] is the
//! production implementation on top of a blocking `reqwest` client.

use crate::config::{RegistryConfig, SoapVersion};
use crate::error::RegistryError;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, warn};

/// WS-Addressing namespace used for the routing and action headers.
pub const ADDRESSING_NS: &str = "http://www.w3.org/2005/08/addressing";
/// Service contract namespace.
pub const BIR_NS: &str = "http://CIS/BIR/PUBL/2014/07";
/// Data contract namespace used inside search criteria.
pub const BIR_DATA_CONTRACT_NS: &str = "http://CIS/BIR/PUBL/2014/07/DataContract";

/// HTTP header carrying the session id on authenticated calls.
pub const SESSION_HEADER: &str = "sid";

/// Binding style marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStyle {
    Document,
    Rpc,
}

/// Body encoding marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingUse {
    Literal,
    Encoded,
}

/// WSDL caching mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsdlCache {
    None,
    Memory,
    Disk,
}

/// HTTP authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authentication {
    Basic,
    Digest,
}

/// Options a transport client is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Endpoint the envelope is posted to
    pub location: String,
    /// WSDL contract location
    pub wsdl: String,
    pub soap_version: SoapVersion,
    pub style: BindingStyle,
    pub encoding_use: EncodingUse,
    /// Log response bodies at debug level
    pub trace: bool,
    pub connection_timeout: Duration,
    pub wsdl_cache: WsdlCache,
    pub authentication: Authentication,
    /// Session id; `Some` only for authenticated clients
    pub session: Option<String>,
}

impl ClientOptions {
    /// Build client options. An empty `sid` produces an unauthenticated client.
    pub fn new(config: &RegistryConfig, sid: &str) -> Self {
        Self {
            location: config.service_url.clone(),
            wsdl: config.wsdl_url.clone(),
            soap_version: config.soap_version,
            style: BindingStyle::Document,
            encoding_use: EncodingUse::Encoded,
            trace: true,
            connection_timeout: config.connect_timeout(),
            wsdl_cache: WsdlCache::None,
            authentication: Authentication::Digest,
            session: (!sid.is_empty()).then(|| sid.to_string()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// A SOAP header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapHeader {
    pub namespace: String,
    pub name: String,
    pub value: String,
}

impl SoapHeader {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    /// WS-Addressing header.
    pub fn addressing(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ADDRESSING_NS, name, value)
    }
}

/// A literal XML fragment sent as an opaque parameter value.
///
/// The fragment is written into the SOAP body untouched. Every prefix it uses
/// must be listed in `namespaces` so it is declared on the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawXml {
    pub fragment: String,
    pub namespaces: Vec<(String, String)>,
}

impl RawXml {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            namespaces: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }
}

/// Body of a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoapBody {
    /// Simple named parameters wrapped in an operation element.
    Params {
        namespace: String,
        params: Vec<(String, String)>,
    },
    /// Untyped XML payload.
    Raw(RawXml),
}

/// Response of a remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoapResponse {
    /// Text of the `{operation}Result` element, if present
    pub result: Option<String>,
}

/// Builds transport clients.
pub trait SoapTransport: Send + Sync {
    fn client(&self, options: ClientOptions) -> Result<Box<dyn SoapClient>, RegistryError>;
}

/// A client bound to one set of options.
pub trait SoapClient {
    fn set_headers(&mut self, headers: Vec<SoapHeader>);

    fn call(&self, operation: &str, body: SoapBody) -> Result<SoapResponse, RegistryError>;
}

/// Blocking HTTP transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpSoapTransport;

impl SoapTransport for HttpSoapTransport {
    fn client(&self, options: ClientOptions) -> Result<Box<dyn SoapClient>, RegistryError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(options.connection_timeout)
            .build()?;

        Ok(Box::new(HttpSoapClient {
            http,
            options,
            headers: Vec::new(),
        }))
    }
}

struct HttpSoapClient {
    http: reqwest::blocking::Client,
    options: ClientOptions,
    headers: Vec<SoapHeader>,
}

impl SoapClient for HttpSoapClient {
    fn set_headers(&mut self, headers: Vec<SoapHeader>) {
        self.headers = headers;
    }

    fn call(&self, operation: &str, body: SoapBody) -> Result<SoapResponse, RegistryError> {
        let envelope = build_envelope(self.options.soap_version, &self.headers, operation, &body);

        debug!(
            operation = %operation,
            location = %self.options.location,
            authenticated = self.options.is_authenticated(),
            "Sending SOAP request"
        );

        let response = self.request(envelope).send()?;
        let status = response.status();
        let text = response.text()?;

        if self.options.trace {
            debug!(operation = %operation, status = status.as_u16(), body = %text, "SOAP response body");
        }

        read_reply(status, &text, operation)
    }
}

impl HttpSoapClient {
    fn action(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == "Action" && h.namespace == ADDRESSING_NS)
            .map(|h| h.value.as_str())
    }

    fn request(&self, envelope: String) -> reqwest::blocking::RequestBuilder {
        let action = self.action().unwrap_or_default();

        let mut request = self.http.post(&self.options.location);
        request = match self.options.soap_version {
            SoapVersion::Soap12 => request.header(
                CONTENT_TYPE,
                format!("application/soap+xml; charset=utf-8; action=\"{}\"", action),
            ),
            SoapVersion::Soap11 => request
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .header("SOAPAction", format!("\"{}\"", action)),
        };
        if let Some(ref sid) = self.options.session {
            request = request.header(SESSION_HEADER, sid);
        }
        request.body(envelope)
    }
}

/// Turn an HTTP reply into a response.
///
/// A fault wins over the status code; a non-2xx reply without one is a
/// [`RegistryError::Status`].
pub fn read_reply(
    status: StatusCode,
    text: &str,
    operation: &str,
) -> Result<SoapResponse, RegistryError> {
    let status_error = || RegistryError::Status {
        status: status.as_u16(),
        body: text.chars().take(200).collect(),
    };

    let Some(envelope_xml) = extract_envelope(text) else {
        if !status.is_success() {
            return Err(status_error());
        }
        return Err(RegistryError::Envelope(
            "no SOAP Envelope in response body".to_string(),
        ));
    };

    let parsed = parse_response(envelope_xml, operation)?;
    if !status.is_success() {
        warn!(status = status.as_u16(), operation = %operation, "Registry returned error status without fault");
        return Err(status_error());
    }
    Ok(parsed)
}

/// Serialize a request envelope.
pub fn build_envelope(
    version: SoapVersion,
    headers: &[SoapHeader],
    operation: &str,
    body: &SoapBody,
) -> String {
    let mut declarations = String::new();
    if let SoapBody::Raw(raw) = body {
        for (prefix, uri) in &raw.namespaces {
            let _ = write!(declarations, " xmlns:{}=\"{}\"", prefix, escape(uri.as_str()));
        }
    }

    let mut header_xml = String::new();
    for h in headers {
        let _ = write!(
            header_xml,
            "<{name} xmlns=\"{ns}\">{value}</{name}>",
            name = h.name,
            ns = escape(h.namespace.as_str()),
            value = escape(h.value.as_str()),
        );
    }

    let body_xml = match body {
        SoapBody::Params { namespace, params } => {
            let mut inner = String::new();
            for (name, value) in params {
                let _ = write!(inner, "<{name}>{}</{name}>", escape(value.as_str()));
            }
            format!(
                "<{op} xmlns=\"{ns}\">{inner}</{op}>",
                op = operation,
                ns = escape(namespace.as_str()),
            )
        }
        SoapBody::Raw(raw) => raw.fragment.clone(),
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="{}"{}><soap:Header>{}</soap:Header><soap:Body>{}</soap:Body></soap:Envelope>"#,
        version.envelope_namespace(),
        declarations,
        header_xml,
        body_xml
    )
}

/// Locate the SOAP envelope inside a raw response body.
///
/// The registry answers with MTOM multipart bodies, so the envelope is
/// surrounded by MIME boundaries and part headers.
pub fn extract_envelope(raw: &str) -> Option<&str> {
    let (start, tag) = raw.match_indices('<').find_map(|(idx, _)| {
        let name: &str = raw[idx + 1..]
            .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .next()?;
        (name == "Envelope" || name.ends_with(":Envelope")).then_some((idx, name))
    })?;

    let closing = format!("</{}>", tag);
    let end = raw.rfind(&closing)? + closing.len();
    (end > start).then(|| &raw[start..end])
}

/// Read the `{operation}Result` element, or the fault, out of an envelope.
pub fn parse_response(xml: &str, operation: &str) -> Result<SoapResponse, RegistryError> {
    let result_name = format!("{}Result", operation);

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut saw_envelope = false;
    let mut result: Option<String> = None;
    let mut capture: Option<(usize, String)> = None;
    let mut in_fault = false;
    let mut fault_code: Option<String> = None;
    let mut fault_reason: Option<String> = None;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name_str(e);
                if stack.is_empty() && name == "Envelope" {
                    saw_envelope = true;
                }
                if name == "Fault" {
                    in_fault = true;
                }
                stack.push(name);
                if result.is_none() && capture.is_none() && stack.last() == Some(&result_name) {
                    capture = Some((stack.len(), String::new()));
                }
            }

            Ok(Event::Empty(ref e)) => {
                let name = local_name_str(e);
                if name == result_name && result.is_none() && capture.is_none() {
                    result = Some(String::new());
                }
                if name == "Fault" {
                    in_fault = true;
                }
            }

            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| RegistryError::XmlParse(err.to_string()))?;
                if let Some((depth, value)) = capture.as_mut() {
                    if *depth == stack.len() {
                        value.push_str(&text);
                    }
                }
                if in_fault {
                    record_fault_text(&stack, &text, &mut fault_code, &mut fault_reason);
                }
            }

            Ok(Event::CData(ref e)) => {
                if let Some((depth, value)) = capture.as_mut() {
                    if *depth == stack.len() {
                        value.push_str(&String::from_utf8_lossy(e));
                    }
                }
            }

            Ok(Event::End(_)) => {
                if capture.as_ref().is_some_and(|(depth, _)| *depth == stack.len()) {
                    result = capture.take().map(|(_, value)| value);
                }
                stack.pop();
            }

            Ok(Event::DocType(_)) => {
                return Err(RegistryError::Envelope(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }

            Ok(Event::Eof) => break,

            Err(e) => return Err(RegistryError::XmlParse(e.to_string())),

            _ => {}
        }

        buf.clear();
    }

    if !saw_envelope {
        return Err(RegistryError::Envelope("missing Envelope element".to_string()));
    }
    if in_fault {
        return Err(RegistryError::fault(fault_code, fault_reason));
    }

    Ok(SoapResponse { result })
}

fn record_fault_text(
    stack: &[String],
    text: &str,
    code: &mut Option<String>,
    reason: &mut Option<String>,
) {
    let current = stack.last().map(String::as_str);
    let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());

    match (parent, current) {
        // SOAP 1.2
        (Some("Code"), Some("Value")) if code.is_none() => *code = Some(text.to_string()),
        (Some("Reason"), Some("Text")) if reason.is_none() => *reason = Some(text.to_string()),
        // SOAP 1.1
        (_, Some("faultcode")) if code.is_none() => *code = Some(text.to_string()),
        (_, Some("faultstring")) if reason.is_none() => *reason = Some(text.to_string()),
        _ => {}
    }
}

fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref()).unwrap_or("").to_string()
}
