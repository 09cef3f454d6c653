//! Record store contract and persistence adapters.
//!
//! # Responsibility
//! - Define the storage verbs exercises depend on (`RecordStore`).
//! - Provide a SQLite adapter and an in-memory fake with the same semantics.
//!
//! # Invariants
//! - Writes run `SObject::validate()` on every record before persistence.
//! - Adapters return semantic errors (`NotFound`, `MissingId`, …) in
//!   addition to transport errors.

pub mod memory_store;
pub mod record_store;
pub mod sqlite_store;
