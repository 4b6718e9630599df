//! Configuration types for the BIR registry client.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sandbox service endpoint.
pub const SERVICE_TEST_URL: &str =
    "https://wyszukiwarkaregontest.stat.gov.pl/wsBIR/UslugaBIRzewnPubl.svc";

/// Sandbox WSDL contract.
pub const WSDL_FILE_TEST_URL: &str =
    "https://wyszukiwarkaregontest.stat.gov.pl/wsBIR/wsdl/UslugaBIRzewnPubl-ver11-test.wsdl";

/// Shared key accepted by the sandbox registry.
pub const TEST_KEY: &str = "abcde12345abcde12345";

/// Environment variable overriding the service URL.
pub const ENV_SERVICE_URL: &str = "CONF_POLAND_NIP_CHECKER_PRODUCTION_URL";
/// Environment variable overriding the WSDL URL.
pub const ENV_WSDL_URL: &str = "CONF_POLAND_NIP_CHECKER_WSDL_URL";
/// Environment variable overriding the access key.
pub const ENV_ACCESS_KEY: &str = "CONF_POLAND_NIP_CHECKER_KEY";

/// Main configuration for the registry client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Service endpoint the SOAP calls are posted to
    pub service_url: String,

    /// WSDL contract location
    pub wsdl_url: String,

    /// User key sent with the login operation
    pub access_key: String,

    /// Connection establishment timeout in seconds
    pub connect_timeout_secs: u64,

    /// SOAP protocol version
    pub soap_version: SoapVersion,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            service_url: SERVICE_TEST_URL.to_string(),
            wsdl_url: WSDL_FILE_TEST_URL.to_string(),
            access_key: TEST_KEY.to_string(),
            connect_timeout_secs: 25,
            soap_version: SoapVersion::Soap12,
        }
    }
}

impl RegistryConfig {
    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`. Empty values count as unset.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_SERVICE_URL) {
            self.service_url = url;
        }
        if let Some(url) = get(ENV_WSDL_URL) {
            self.wsdl_url = url;
        }
        if let Some(key) = get(ENV_ACCESS_KEY) {
            self.access_key = key;
        }
        self
    }

    /// Check that the configuration can drive a login.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.service_url.trim().is_empty() {
            return Err(RegistryError::Config("service_url must not be empty".into()));
        }
        if self.access_key.is_empty() {
            return Err(RegistryError::Config("access_key must not be empty".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(RegistryError::Config(
                "connect_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Connection timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI for this version.
    pub fn envelope_namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => "http://schemas.xmlsoap.org/soap/envelope/",
            Self::Soap12 => "http://www.w3.org/2003/05/soap-envelope",
        }
    }
}
