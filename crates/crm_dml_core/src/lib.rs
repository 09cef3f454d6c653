//! CRM record manipulation exercises over an injectable record store.
//! The store owns identity, validation and referential integrity; the
//! exercises only build, mutate and submit records.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::account::Account;
pub use model::case::Case;
pub use model::contact::Contact;
pub use model::lead::Lead;
pub use model::opportunity::Opportunity;
pub use model::{
    FieldDef, FieldKind, FieldValue, RecordDecodeError, RecordId, RecordValidationError, SObject,
    SObjectType,
};
pub use repo::memory_store::InMemoryRecordStore;
pub use repo::record_store::{Filter, RecordQuery, RecordStore, StoreError, StoreResult};
pub use repo::sqlite_store::SqliteRecordStore;
pub use service::dml_service::DmlService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
