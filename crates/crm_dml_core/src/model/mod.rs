//! CRM record model shared by every store adapter and exercise.
//!
//! # Responsibility
//! - Define the record types (Account, Contact, Opportunity, Lead, Case).
//! - Describe each record's field table so adapters can persist and filter
//!   records without per-type code.
//!
//! # Invariants
//! - Every record is identified by a store-assigned `RecordId`.
//! - `SObject::to_values()` and `SObject::FIELDS` share one column order.
//! - Every non-id field is optional so projected reads can leave it unset.

pub mod account;
pub mod case;
pub mod contact;
pub mod lead;
pub mod opportunity;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier assigned by the record store on create.
pub type RecordId = Uuid;

/// Built-in CRM object types known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SObjectType {
    Account,
    Contact,
    Opportunity,
    Lead,
    Case,
}

impl SObjectType {
    /// CRM API name, e.g. `Account`.
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::Contact => "Contact",
            Self::Opportunity => "Opportunity",
            Self::Lead => "Lead",
            Self::Case => "Case",
        }
    }

    /// Backing SQLite table.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Account => "accounts",
            Self::Contact => "contacts",
            Self::Opportunity => "opportunities",
            Self::Lead => "leads",
            Self::Case => "cases",
        }
    }

    /// Field table of the record type, excluding `Id`.
    pub fn fields(self) -> &'static [FieldDef] {
        match self {
            Self::Account => account::Account::FIELDS,
            Self::Contact => contact::Contact::FIELDS,
            Self::Opportunity => opportunity::Opportunity::FIELDS,
            Self::Lead => lead::Lead::FIELDS,
            Self::Case => case::Case::FIELDS,
        }
    }
}

impl Display for SObjectType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Storage kind of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    /// Lookup to another record type.
    Reference(SObjectType),
}

/// Static description of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// CRM API name used in queries (`LastName`).
    pub name: &'static str,
    /// SQLite column name (`last_name`).
    pub column: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }
}

/// Untyped field value exchanged between records and stores.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Id(RecordId),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns whether this value can be stored in a field of `kind`.
    pub fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::Null, _)
                | (Self::Text(_), FieldKind::Text)
                | (Self::Number(_), FieldKind::Number)
                | (Self::Date(_), FieldKind::Date)
                | (Self::Id(_), FieldKind::Reference(_))
        )
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<RecordId> for FieldValue {
    fn from(value: RecordId) -> Self {
        Self::Id(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Record-level validation failure, raised before any write.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValidationError {
    MissingRequiredField {
        object: SObjectType,
        field: &'static str,
    },
    InvalidEmail(String),
    NonFiniteAmount(f64),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequiredField { object, field } => {
                write!(f, "required field missing: {object}.{field}")
            }
            Self::InvalidEmail(value) => write!(f, "invalid email address: `{value}`"),
            Self::NonFiniteAmount(value) => write!(f, "amount must be finite, got {value}"),
        }
    }
}

impl Error for RecordValidationError {}

/// Failure decoding stored values back into a typed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDecodeError {
    pub object: SObjectType,
    pub message: String,
}

impl Display for RecordDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot decode {} record: {}", self.object, self.message)
    }
}

impl Error for RecordDecodeError {}

/// A CRM record that can be persisted by a `RecordStore`.
pub trait SObject: Clone {
    const OBJECT: SObjectType;
    /// Field table in `to_values()` order, excluding `Id`.
    const FIELDS: &'static [FieldDef];

    fn id(&self) -> Option<RecordId>;
    fn set_id(&mut self, id: RecordId);
    fn validate(&self) -> Result<(), RecordValidationError>;
    fn to_values(&self) -> Vec<FieldValue>;
    fn from_values(id: RecordId, values: Vec<FieldValue>) -> Result<Self, RecordDecodeError>;

    /// Looks up a field by API name (case-sensitive).
    fn field_index(name: &str) -> Option<usize> {
        Self::FIELDS.iter().position(|field| field.name == name)
    }
}

/// Sequential typed reader over a record's stored values.
pub(crate) struct FieldReader {
    object: SObjectType,
    values: std::vec::IntoIter<FieldValue>,
}

impl FieldReader {
    pub(crate) fn new(object: SObjectType, values: Vec<FieldValue>) -> Self {
        Self {
            object,
            values: values.into_iter(),
        }
    }

    pub(crate) fn text(&mut self) -> Result<Option<String>, RecordDecodeError> {
        match self.next()? {
            FieldValue::Null => Ok(None),
            FieldValue::Text(value) => Ok(Some(value)),
            other => Err(self.mismatch("text", &other)),
        }
    }

    pub(crate) fn number(&mut self) -> Result<Option<f64>, RecordDecodeError> {
        match self.next()? {
            FieldValue::Null => Ok(None),
            FieldValue::Number(value) => Ok(Some(value)),
            other => Err(self.mismatch("number", &other)),
        }
    }

    pub(crate) fn date(&mut self) -> Result<Option<NaiveDate>, RecordDecodeError> {
        match self.next()? {
            FieldValue::Null => Ok(None),
            FieldValue::Date(value) => Ok(Some(value)),
            other => Err(self.mismatch("date", &other)),
        }
    }

    pub(crate) fn reference(&mut self) -> Result<Option<RecordId>, RecordDecodeError> {
        match self.next()? {
            FieldValue::Null => Ok(None),
            FieldValue::Id(value) => Ok(Some(value)),
            other => Err(self.mismatch("reference", &other)),
        }
    }

    fn next(&mut self) -> Result<FieldValue, RecordDecodeError> {
        self.values.next().ok_or_else(|| RecordDecodeError {
            object: self.object,
            message: "fewer values than fields".to_string(),
        })
    }

    fn mismatch(&self, expected: &str, actual: &FieldValue) -> RecordDecodeError {
        RecordDecodeError {
            object: self.object,
            message: format!("expected {expected} value, got {actual:?}"),
        }
    }
}

/// Returns whether an optional text field holds a non-blank value.
pub(crate) fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|text| !text.trim().is_empty())
}

pub(crate) fn require(
    object: SObjectType,
    field: &'static str,
    present: bool,
) -> Result<(), RecordValidationError> {
    if present {
        Ok(())
    } else {
        Err(RecordValidationError::MissingRequiredField { object, field })
    }
}
