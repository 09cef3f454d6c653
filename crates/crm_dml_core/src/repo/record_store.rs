//! Record store contract shared by every persistence adapter.
//!
//! # Responsibility
//! - Define the create/update/upsert/delete/read verbs the exercises use.
//! - Resolve query filters and projections against a record's field table
//!   once, so adapters only deal with column positions.
//!
//! # Invariants
//! - Every write validates all records before touching storage.
//! - Batches are atomic: either every record is written or none is.
//! - Ids are written back into caller records only after a batch commits.

use crate::db::DbError;
use crate::model::{
    FieldDef, FieldKind, FieldValue, RecordDecodeError, RecordId, RecordValidationError, SObject,
    SObjectType,
};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a record store. Exercises surface these unchanged.
#[derive(Debug)]
pub enum StoreError {
    Validation(RecordValidationError),
    Db(DbError),
    NotFound(RecordId),
    /// Update/delete submitted a record that was never created.
    MissingId(SObjectType),
    /// Create submitted a record that already has an id.
    IdAlreadySet(RecordId),
    UnknownField {
        object: SObjectType,
        field: String,
    },
    InvalidFilter(String),
    InvalidReference {
        field: &'static str,
        id: RecordId,
    },
    MissingKey {
        object: SObjectType,
        field: &'static str,
    },
    DuplicateKey {
        object: SObjectType,
        field: &'static str,
        matches: usize,
    },
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::MissingId(object) => write!(f, "{object} record has no id"),
            Self::IdAlreadySet(id) => write!(f, "cannot create record with existing id {id}"),
            Self::UnknownField { object, field } => {
                write!(f, "unknown field `{field}` on {object}")
            }
            Self::InvalidFilter(message) => write!(f, "invalid filter: {message}"),
            Self::InvalidReference { field, id } => {
                write!(f, "{field} references missing record {id}")
            }
            Self::MissingKey { object, field } => {
                write!(f, "upsert key {object}.{field} is not set")
            }
            Self::DuplicateKey {
                object,
                field,
                matches,
            } => write!(
                f,
                "upsert key {object}.{field} matched {matches} records; expected at most one"
            ),
            Self::InvalidData(message) => write!(f, "invalid stored record data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecordValidationError> for StoreError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RecordDecodeError> for StoreError {
    fn from(value: RecordDecodeError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Record filter, expressed with CRM API field names.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    #[default]
    All,
    Id(RecordId),
    Ids(Vec<RecordId>),
    Eq {
        field: String,
        value: FieldValue,
    },
    In {
        field: String,
        values: Vec<FieldValue>,
    },
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            first => Self::And(vec![first, other]),
        }
    }
}

/// Read request: filter, optional field projection and row limit.
///
/// `fields = None` populates every field; `Some(list)` populates only the
/// listed fields. `Id` is always populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub filter: Filter,
    pub fields: Option<Vec<String>>,
    pub limit: Option<u32>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: RecordId) -> Self {
        Self::filtered(Filter::Id(id)).limit(1)
    }

    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|field| (*field).to_string()).collect());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Storage verbs over CRM records.
///
/// Implementations must keep the invariants listed in the module docs;
/// `InMemoryRecordStore` and `SqliteRecordStore` behave identically.
pub trait RecordStore {
    /// Inserts new records and writes the assigned ids back into them.
    fn create<T: SObject>(&self, records: &mut [T]) -> StoreResult<()>;
    /// Overwrites existing records matched by id.
    fn update<T: SObject>(&self, records: &[T]) -> StoreResult<()>;
    /// Updates records that carry an id and creates the rest.
    fn upsert<T: SObject>(&self, records: &mut [T]) -> StoreResult<()>;
    /// Like `upsert`, but records without an id are matched on `key_field`.
    fn upsert_on<T: SObject>(&self, records: &mut [T], key_field: &str) -> StoreResult<()>;
    /// Removes records by id.
    fn delete<T: SObject>(&self, records: &[T]) -> StoreResult<()>;
    /// Returns matching records in insertion order.
    fn read<T: SObject>(&self, query: &RecordQuery) -> StoreResult<Vec<T>>;

    /// Fetches one record by id with every field populated.
    fn get<T: SObject>(&self, id: RecordId) -> StoreResult<Option<T>> {
        Ok(self.read::<T>(&RecordQuery::by_id(id))?.into_iter().next())
    }
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn create<T: SObject>(&self, records: &mut [T]) -> StoreResult<()> {
        (**self).create(records)
    }

    fn update<T: SObject>(&self, records: &[T]) -> StoreResult<()> {
        (**self).update(records)
    }

    fn upsert<T: SObject>(&self, records: &mut [T]) -> StoreResult<()> {
        (**self).upsert(records)
    }

    fn upsert_on<T: SObject>(&self, records: &mut [T], key_field: &str) -> StoreResult<()> {
        (**self).upsert_on(records, key_field)
    }

    fn delete<T: SObject>(&self, records: &[T]) -> StoreResult<()> {
        (**self).delete(records)
    }

    fn read<T: SObject>(&self, query: &RecordQuery) -> StoreResult<Vec<T>> {
        (**self).read(query)
    }
}

/// Filter with field names resolved to column positions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResolvedFilter {
    All,
    Ids(Vec<RecordId>),
    Eq(usize, FieldValue),
    In(usize, Vec<FieldValue>),
    And(Vec<ResolvedFilter>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedQuery {
    pub filter: ResolvedFilter,
    /// `true` at positions that stay populated.
    pub projection: Option<Vec<bool>>,
    pub limit: Option<u32>,
}

impl ResolvedQuery {
    /// Clears every value outside the projection.
    pub fn project(&self, values: Vec<FieldValue>) -> Vec<FieldValue> {
        match &self.projection {
            None => values,
            Some(mask) => values
                .into_iter()
                .zip(mask)
                .map(|(value, keep)| if *keep { value } else { FieldValue::Null })
                .collect(),
        }
    }
}

pub(crate) fn resolve_query<T: SObject>(query: &RecordQuery) -> StoreResult<ResolvedQuery> {
    let projection = match &query.fields {
        None => None,
        Some(fields) => {
            let mut mask = vec![false; T::FIELDS.len()];
            for field in fields {
                if field == "Id" {
                    continue;
                }
                mask[resolve_field::<T>(field)?] = true;
            }
            Some(mask)
        }
    };

    Ok(ResolvedQuery {
        filter: resolve_filter::<T>(&query.filter)?,
        projection,
        limit: query.limit,
    })
}

pub(crate) fn resolve_field<T: SObject>(name: &str) -> StoreResult<usize> {
    T::field_index(name).ok_or_else(|| StoreError::UnknownField {
        object: T::OBJECT,
        field: name.to_string(),
    })
}

fn resolve_filter<T: SObject>(filter: &Filter) -> StoreResult<ResolvedFilter> {
    match filter {
        Filter::All => Ok(ResolvedFilter::All),
        Filter::Id(id) => Ok(ResolvedFilter::Ids(vec![*id])),
        Filter::Ids(ids) => Ok(ResolvedFilter::Ids(ids.clone())),
        Filter::Eq { field, value } => {
            if field == "Id" {
                return match value {
                    FieldValue::Id(id) => Ok(ResolvedFilter::Ids(vec![*id])),
                    FieldValue::Null => Ok(ResolvedFilter::Ids(Vec::new())),
                    other => Err(kind_mismatch::<T>(field, other)),
                };
            }
            let index = resolve_field::<T>(field)?;
            ensure_fits::<T>(index, value)?;
            Ok(ResolvedFilter::Eq(index, value.clone()))
        }
        Filter::In { field, values } if field == "Id" => values
            .iter()
            .filter(|value| !value.is_null())
            .map(|value| match value {
                FieldValue::Id(id) => Ok(*id),
                other => Err(kind_mismatch::<T>(field, other)),
            })
            .collect::<StoreResult<Vec<_>>>()
            .map(ResolvedFilter::Ids),
        Filter::In { field, values } => {
            let index = resolve_field::<T>(field)?;
            for value in values {
                ensure_fits::<T>(index, value)?;
            }
            Ok(ResolvedFilter::In(index, values.clone()))
        }
        Filter::And(filters) => filters
            .iter()
            .map(resolve_filter::<T>)
            .collect::<StoreResult<Vec<_>>>()
            .map(ResolvedFilter::And),
    }
}

fn ensure_fits<T: SObject>(index: usize, value: &FieldValue) -> StoreResult<()> {
    let field = &T::FIELDS[index];
    if value.fits(field.kind) {
        Ok(())
    } else {
        Err(kind_mismatch::<T>(field.name, value))
    }
}

fn kind_mismatch<T: SObject>(field: &str, value: &FieldValue) -> StoreError {
    StoreError::InvalidFilter(format!(
        "value {value:?} does not match the type of {}.{field}",
        T::OBJECT
    ))
}

/// Validates a create batch: no ids yet, every record valid.
pub(crate) fn check_create_batch<T: SObject>(records: &[T]) -> StoreResult<()> {
    for record in records {
        if let Some(id) = record.id() {
            return Err(StoreError::IdAlreadySet(id));
        }
        record.validate()?;
    }
    Ok(())
}

/// Validates an update/delete batch and returns the ids in order.
pub(crate) fn check_id_batch<T: SObject>(
    records: &[T],
    validate: bool,
) -> StoreResult<Vec<RecordId>> {
    records
        .iter()
        .map(|record| {
            let id = record.id().ok_or(StoreError::MissingId(T::OBJECT))?;
            if validate {
                record.validate()?;
            }
            Ok(id)
        })
        .collect()
}

/// Resolves an upsert key field, rejecting non-text keys.
pub(crate) fn resolve_key_field<T: SObject>(key_field: &str) -> StoreResult<usize> {
    let index = resolve_field::<T>(key_field)?;
    match T::FIELDS[index].kind {
        FieldKind::Text => Ok(index),
        _ => Err(StoreError::InvalidFilter(format!(
            "upsert key {}.{key_field} must be a text field",
            T::OBJECT
        ))),
    }
}

/// Yields `(field, target, id)` for every populated reference value.
pub(crate) fn references<'a>(
    fields: &'static [FieldDef],
    values: &'a [FieldValue],
) -> impl Iterator<Item = (&'static FieldDef, SObjectType, RecordId)> + 'a {
    fields
        .iter()
        .zip(values)
        .filter_map(|(field, value)| match (field.kind, value) {
            (FieldKind::Reference(target), FieldValue::Id(id)) => Some((field, target, *id)),
            _ => None,
        })
}
