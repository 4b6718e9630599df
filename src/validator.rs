//! NIP validation against the BIR registry.
//!
//! [`PolandNipValidator`] runs login, search and parsing in sequence and is
//! the only place where registry errors are contained. Both entry points
//! report failures to the configured [`ErrorObserver`] and answer with their
//! negative result instead.

use crate::config::RegistryConfig;
use crate::error::{ErrorObserver, RegistryError, TracingErrorObserver};
use crate::lookup::EntityLookup;
use crate::parser::EntityRecord;
use crate::session::SessionManager;
use crate::transport::{HttpSoapTransport, SoapTransport};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tax identifier to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    tax_id: String,
}

impl ValidationRequest {
    pub fn new(tax_id: impl Into<String>) -> Self {
        Self {
            tax_id: tax_id.into(),
        }
    }

    pub fn tax_id(&self) -> &str {
        &self.tax_id
    }
}

/// Validates Polish NIPs with the BIR registry.
pub struct PolandNipValidator {
    config: RegistryConfig,
    transport: Arc<dyn SoapTransport>,
    observer: Arc<dyn ErrorObserver>,
}

impl PolandNipValidator {
    pub fn new(
        config: RegistryConfig,
        transport: Arc<dyn SoapTransport>,
        observer: Arc<dyn ErrorObserver>,
    ) -> Self {
        Self {
            config,
            transport,
            observer,
        }
    }

    /// Validator over HTTP that reports errors through `tracing`.
    pub fn from_config(config: RegistryConfig) -> Self {
        Self::new(
            config,
            Arc::new(HttpSoapTransport),
            Arc::new(TracingErrorObserver),
        )
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Whether the registry knows `request`'s NIP. Never fails.
    pub fn check_vat(&self, request: &ValidationRequest) -> bool {
        match self.lookup(request) {
            Ok(record) => record.is_some_and(|r| r.valid),
            Err(err) => {
                self.contain(request, err);
                false
            }
        }
    }

    /// Registry record for `request`'s NIP.
    ///
    /// `None` when no session could be opened or the lookup failed; a NIP the
    /// registry does not know yields `Some` record with `valid == false`.
    pub fn company_info(&self, request: &ValidationRequest) -> Option<EntityRecord> {
        match self.lookup(request) {
            Ok(record) => record,
            Err(err) => {
                self.contain(request, err);
                None
            }
        }
    }

    fn lookup(&self, request: &ValidationRequest) -> Result<Option<EntityRecord>, RegistryError> {
        let transport = self.transport.as_ref();

        let session = SessionManager::new(&self.config, transport).logon(&self.config.access_key)?;
        if session.is_empty() {
            info!(tax_id = %request.tax_id(), "No registry session, skipping lookup");
            return Ok(None);
        }

        let record =
            EntityLookup::new(&self.config, transport).find_by_tax_id(&session, request.tax_id())?;
        debug!(tax_id = %request.tax_id(), valid = record.valid, "NIP lookup complete");
        Ok(Some(record))
    }

    fn contain(&self, request: &ValidationRequest, err: RegistryError) {
        warn!(tax_id = %request.tax_id(), error = %err, "NIP validation failed");
        self.observer.observe(&err);
    }
}
