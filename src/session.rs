//! Login handshake with the registry.

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::transport::{ClientOptions, SoapBody, SoapHeader, SoapTransport, BIR_NS};
use std::fmt;
use tracing::{debug, info};

/// Login operation name.
pub const LOGIN_OPERATION: &str = "Zaloguj";
/// Login action URI.
pub const LOGIN_ACTION: &str = "http://CIS/BIR/PUBL/2014/07/IUslugaBIRzewnPubl/Zaloguj";
/// Name of the single login parameter.
pub const ACCESS_KEY_PARAM: &str = "pKluczUzytkownika";

/// Opaque session token handed out by the registry.
///
/// An empty id means the registry refused to open a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Routing header sent with every registry call.
pub fn routing_header(config: &RegistryConfig) -> SoapHeader {
    SoapHeader::addressing("To", config.service_url.clone())
}

/// Headers for the login call; the action header comes last.
pub fn login_headers(config: &RegistryConfig) -> Vec<SoapHeader> {
    vec![
        routing_header(config),
        SoapHeader::addressing("Action", LOGIN_ACTION),
    ]
}

/// Opens registry sessions.
pub struct SessionManager<'a> {
    config: &'a RegistryConfig,
    transport: &'a dyn SoapTransport,
}

impl<'a> SessionManager<'a> {
    pub fn new(config: &'a RegistryConfig, transport: &'a dyn SoapTransport) -> Self {
        Self { config, transport }
    }

    /// Log in with `access_key`.
    ///
    /// A missing session in the response yields an empty [`SessionId`], not an
    /// error.
    pub fn logon(&self, access_key: &str) -> Result<SessionId, RegistryError> {
        let mut client = self.transport.client(ClientOptions::new(self.config, ""))?;
        client.set_headers(login_headers(self.config));

        debug!(operation = LOGIN_OPERATION, "Opening registry session");

        let response = client.call(
            LOGIN_OPERATION,
            SoapBody::Params {
                namespace: BIR_NS.to_string(),
                params: vec![(ACCESS_KEY_PARAM.to_string(), access_key.to_string())],
            },
        )?;

        let session = SessionId::new(response.result.unwrap_or_default());
        if session.is_empty() {
            info!("Registry did not open a session");
        } else {
            debug!("Registry session opened");
        }
        Ok(session)
    }
}
