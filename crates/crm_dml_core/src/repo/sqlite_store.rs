//! SQLite-backed record store.
//!
//! # Responsibility
//! - Persist CRM records in the per-object tables created by migrations.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Every batch runs inside one savepoint, so it stays atomic inside a
//!   transaction the caller already opened on the same connection.
//! - `Id`/`In` lists bind as one JSON array, independent of their length.
//! - Read paths reject malformed persisted values instead of masking them.

use crate::db::ensure_record_tables;
use crate::model::{FieldDef, FieldKind, FieldValue, RecordId, SObject, SObjectType};
use crate::repo::record_store::{
    check_create_batch, check_id_batch, references, resolve_key_field, resolve_query,
    RecordQuery, RecordStore, ResolvedFilter, StoreError, StoreResult,
};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::Value as JsonValue;
use std::ops::Deref;
use std::time::Instant;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Membership subquery over one JSON array bind.
const JSON_LIST: &str = "(SELECT value FROM json_each(?))";

/// Record store over a migrated SQLite connection.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
}

/// Savepoint around one write batch; rolled back unless committed.
struct BatchScope<'conn> {
    conn: &'conn Connection,
    released: bool,
}

impl<'conn> BatchScope<'conn> {
    fn begin(conn: &'conn Connection) -> StoreResult<Self> {
        conn.execute_batch("SAVEPOINT record_batch;")?;
        Ok(Self {
            conn,
            released: false,
        })
    }

    fn commit(mut self) -> StoreResult<()> {
        self.conn.execute_batch("RELEASE record_batch;")?;
        self.released = true;
        Ok(())
    }
}

impl Deref for BatchScope<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self
            .conn
            .execute_batch("ROLLBACK TO record_batch; RELEASE record_batch;")
        {
            warn!("event=store_batch_rollback module=repo status=error backend=sqlite error={err}");
        }
    }
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Constructs a store, failing when record tables are missing.
    ///
    /// Batches nest under any transaction the caller holds on `conn`; they
    /// become durable when that transaction commits.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_record_tables(conn)?;
        Ok(Self { conn })
    }

    fn upsert_matching<T: SObject>(
        &self,
        records: &mut [T],
        key: Option<usize>,
    ) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records.iter() {
            record.validate()?;
        }

        let started_at = Instant::now();
        let tx = BatchScope::begin(self.conn)?;
        let mut assigned = Vec::new();

        for (position, record) in records.iter().enumerate() {
            let values = record.to_values();
            ensure_references_exist(&tx, T::FIELDS, &values)?;

            if let Some(id) = record.id() {
                if update_row(&tx, T::OBJECT, T::FIELDS, id, &values)? == 0 {
                    return Err(StoreError::NotFound(id));
                }
                continue;
            }

            let matched = match key {
                Some(index) => find_by_key::<T>(&tx, index, &values[index])?,
                None => None,
            };
            let id = match matched {
                Some(id) => {
                    update_row(&tx, T::OBJECT, T::FIELDS, id, &values)?;
                    id
                }
                None => {
                    let id = Uuid::new_v4();
                    insert_row(&tx, T::OBJECT, T::FIELDS, id, &values)?;
                    id
                }
            };
            assigned.push((position, id));
        }

        tx.commit()?;
        let created = assigned.len();
        for (position, id) in assigned {
            records[position].set_id(id);
        }

        info!(
            "event=store_upsert module=repo status=ok backend=sqlite object={} count={} assigned={} duration_ms={}",
            T::OBJECT,
            records.len(),
            created,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn create<T: SObject>(&self, records: &mut [T]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        check_create_batch(records)?;

        let started_at = Instant::now();
        let tx = BatchScope::begin(self.conn)?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records.iter() {
            let values = record.to_values();
            ensure_references_exist(&tx, T::FIELDS, &values)?;
            let id = Uuid::new_v4();
            insert_row(&tx, T::OBJECT, T::FIELDS, id, &values)?;
            ids.push(id);
        }
        tx.commit()?;

        for (record, id) in records.iter_mut().zip(ids) {
            record.set_id(id);
        }

        info!(
            "event=store_create module=repo status=ok backend=sqlite object={} count={} duration_ms={}",
            T::OBJECT,
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn update<T: SObject>(&self, records: &[T]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let ids = check_id_batch(records, true)?;

        let started_at = Instant::now();
        let tx = BatchScope::begin(self.conn)?;
        for (record, id) in records.iter().zip(ids) {
            let values = record.to_values();
            ensure_references_exist(&tx, T::FIELDS, &values)?;
            if update_row(&tx, T::OBJECT, T::FIELDS, id, &values)? == 0 {
                return Err(StoreError::NotFound(id));
            }
        }
        tx.commit()?;

        info!(
            "event=store_update module=repo status=ok backend=sqlite object={} count={} duration_ms={}",
            T::OBJECT,
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn upsert<T: SObject>(&self, records: &mut [T]) -> StoreResult<()> {
        self.upsert_matching(records, None)
    }

    fn upsert_on<T: SObject>(&self, records: &mut [T], key_field: &str) -> StoreResult<()> {
        let key = resolve_key_field::<T>(key_field)?;
        self.upsert_matching(records, Some(key))
    }

    fn delete<T: SObject>(&self, records: &[T]) -> StoreResult<()> {
        if records.is_empty() {
            debug!(
                "event=store_delete module=repo status=skipped backend=sqlite object={} count=0",
                T::OBJECT
            );
            return Ok(());
        }
        let ids = check_id_batch(records, false)?;

        let started_at = Instant::now();
        let tx = BatchScope::begin(self.conn)?;
        let sql = format!("DELETE FROM {} WHERE id = ?1;", T::OBJECT.table_name());
        for id in ids {
            if tx.execute(&sql, [id.to_string()])? == 0 {
                return Err(StoreError::NotFound(id));
            }
        }
        tx.commit()?;

        info!(
            "event=store_delete module=repo status=ok backend=sqlite object={} count={} duration_ms={}",
            T::OBJECT,
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn read<T: SObject>(&self, query: &RecordQuery) -> StoreResult<Vec<T>> {
        let resolved = resolve_query::<T>(query)?;
        let mut binds: Vec<Value> = Vec::new();
        let where_clause = render_filter(&resolved.filter, T::FIELDS, &mut binds);

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {where_clause} ORDER BY rowid ASC",
            select_columns(T::FIELDS),
            T::OBJECT.table_name()
        );
        if let Some(limit) = resolved.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let (id, values) = parse_record_row(row, T::FIELDS)?;
            records.push(T::from_values(id, resolved.project(values))?);
        }

        debug!(
            "event=store_read module=repo status=ok backend=sqlite object={} rows={}",
            T::OBJECT,
            records.len()
        );
        Ok(records)
    }
}

fn select_columns(fields: &[FieldDef]) -> String {
    std::iter::once("id")
        .chain(fields.iter().map(|field| field.column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_row(
    conn: &Connection,
    object: SObjectType,
    fields: &[FieldDef],
    id: RecordId,
    values: &[FieldValue],
) -> StoreResult<()> {
    let placeholders = (1..=fields.len() + 1)
        .map(|position| format!("?{position}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders});",
        object.table_name(),
        select_columns(fields)
    );

    let binds = std::iter::once(Value::Text(id.to_string())).chain(values.iter().map(to_sql_value));
    conn.execute(&sql, params_from_iter(binds))?;
    Ok(())
}

fn update_row(
    conn: &Connection,
    object: SObjectType,
    fields: &[FieldDef],
    id: RecordId,
    values: &[FieldValue],
) -> StoreResult<usize> {
    let assignments = fields
        .iter()
        .enumerate()
        .map(|(index, field)| format!("{} = ?{}", field.column, index + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {}
         SET {assignments}, updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?{};",
        object.table_name(),
        fields.len() + 1
    );

    let binds = values
        .iter()
        .map(to_sql_value)
        .chain(std::iter::once(Value::Text(id.to_string())));
    Ok(conn.execute(&sql, params_from_iter(binds))?)
}

fn find_by_key<T: SObject>(
    conn: &Connection,
    index: usize,
    key: &FieldValue,
) -> StoreResult<Option<RecordId>> {
    let field = &T::FIELDS[index];
    if key.is_null() {
        return Err(StoreError::MissingKey {
            object: T::OBJECT,
            field: field.name,
        });
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE {} = ?1 ORDER BY rowid ASC;",
        T::OBJECT.table_name(),
        field.column
    ))?;
    let mut rows = stmt.query([to_sql_value(key)])?;
    let mut matches = Vec::new();
    while let Some(row) = rows.next()? {
        matches.push(parse_id(&row.get::<_, String>(0)?)?);
    }

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(StoreError::DuplicateKey {
            object: T::OBJECT,
            field: field.name,
            matches: count,
        }),
    }
}

fn ensure_references_exist(
    conn: &Connection,
    fields: &'static [FieldDef],
    values: &[FieldValue],
) -> StoreResult<()> {
    for (field, target, id) in references(fields, values) {
        let exists: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1);",
                target.table_name()
            ),
            [id.to_string()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::InvalidReference {
                field: field.name,
                id,
            });
        }
    }
    Ok(())
}

fn render_filter(filter: &ResolvedFilter, fields: &[FieldDef], binds: &mut Vec<Value>) -> String {
    match filter {
        ResolvedFilter::All => "1 = 1".to_string(),
        ResolvedFilter::Ids(ids) => {
            if ids.is_empty() {
                return "0 = 1".to_string();
            }
            let ids = ids.iter().map(|id| JsonValue::String(id.to_string()));
            binds.push(json_array(ids));
            format!("id IN {JSON_LIST}")
        }
        ResolvedFilter::Eq(index, value) => {
            if value.is_null() {
                return "0 = 1".to_string();
            }
            binds.push(to_sql_value(value));
            format!("{} = ?", fields[*index].column)
        }
        ResolvedFilter::In(index, values) => {
            let present: Vec<JsonValue> = values
                .iter()
                .filter(|value| !value.is_null())
                .map(to_json_value)
                .collect();
            if present.is_empty() {
                return "0 = 1".to_string();
            }
            binds.push(json_array(present));
            format!("{} IN {JSON_LIST}", fields[*index].column)
        }
        ResolvedFilter::And(filters) => {
            if filters.is_empty() {
                return "1 = 1".to_string();
            }
            filters
                .iter()
                .map(|part| format!("({})", render_filter(part, fields, binds)))
                .collect::<Vec<_>>()
                .join(" AND ")
        }
    }
}

fn json_array(values: impl IntoIterator<Item = JsonValue>) -> Value {
    Value::Text(JsonValue::Array(values.into_iter().collect()).to_string())
}

fn to_json_value(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::Null => JsonValue::Null,
        FieldValue::Text(text) => JsonValue::String(text.clone()),
        FieldValue::Number(number) => JsonValue::from(*number),
        FieldValue::Date(date) => JsonValue::String(date.format(DATE_FORMAT).to_string()),
        FieldValue::Id(id) => JsonValue::String(id.to_string()),
    }
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(text) => Value::Text(text.clone()),
        FieldValue::Number(number) => Value::Real(*number),
        FieldValue::Date(date) => Value::Text(date.format(DATE_FORMAT).to_string()),
        FieldValue::Id(id) => Value::Text(id.to_string()),
    }
}

fn parse_record_row(
    row: &Row<'_>,
    fields: &[FieldDef],
) -> StoreResult<(RecordId, Vec<FieldValue>)> {
    let id = parse_id(&row.get::<_, String>(0)?)?;
    let mut values = Vec::with_capacity(fields.len());

    for (offset, field) in fields.iter().enumerate() {
        let column = offset + 1;
        let value = match field.kind {
            FieldKind::Text => row
                .get::<_, Option<String>>(column)?
                .map_or(FieldValue::Null, FieldValue::Text),
            FieldKind::Number => row
                .get::<_, Option<f64>>(column)?
                .map_or(FieldValue::Null, FieldValue::Number),
            FieldKind::Date => match row.get::<_, Option<String>>(column)? {
                Some(text) => FieldValue::Date(NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(
                    |_| {
                        StoreError::InvalidData(format!(
                            "invalid date `{text}` in {}",
                            field.column
                        ))
                    },
                )?),
                None => FieldValue::Null,
            },
            FieldKind::Reference(_) => match row.get::<_, Option<String>>(column)? {
                Some(text) => FieldValue::Id(parse_id(&text)?),
                None => FieldValue::Null,
            },
        };
        values.push(value);
    }

    Ok((id, values))
}

fn parse_id(text: &str) -> StoreResult<RecordId> {
    Uuid::parse_str(text)
        .map_err(|_| StoreError::InvalidData(format!("invalid record id `{text}`")))
}
