//! Polish NIP validation against the GUS BIR registry
//!
//! Verifies a tax identification number (NIP) with the national business
//! registry's SOAP service and extracts the company record when it is known.
//!
//! # Features
//!
//! - Session login with a user key
//! - Entity search by NIP with raw-XML criteria
//! - Parsing of the escaped inner result document
//! - Error containment at the validator boundary
//!
//! # Example
//!
//! ```ignore
//! use bir_nip_validator::{PolandNipValidator, RegistryConfig, ValidationRequest};
//!
//! let validator = PolandNipValidator::from_config(RegistryConfig::default().with_env_overrides());
//! let request = ValidationRequest::new("5261040828");
//! if let Some(record) = validator.company_info(&request) {
//!     println!("{}: {}", record.name, record.address);
//! }
//! ```

pub mod config;
pub mod error;
pub mod lookup;
pub mod parser;
pub mod session;
pub mod transport;
pub mod validator;

pub use config::RegistryConfig;
pub use error::{ErrorObserver, RegistryError, TracingErrorObserver};
pub use parser::EntityRecord;
pub use transport::{HttpSoapTransport, SoapTransport};
pub use validator::{PolandNipValidator, ValidationRequest};
