//! Record manipulation use-cases.
//!
//! # Responsibility
//! - Compose record store verbs into the DML exercises.
//! - Stay storage-agnostic: every exercise runs against any `RecordStore`.

pub mod dml_service;
