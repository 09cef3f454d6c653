//! In-memory record store used as a test fake.
//!
//! Mirrors `SqliteRecordStore` semantics: atomic batches, insertion-ordered
//! reads, reference checks and `SET NULL` on delete of a referenced record.

use crate::model::{FieldKind, FieldValue, RecordId, SObject, SObjectType};
use crate::repo::record_store::{
    check_create_batch, check_id_batch, references, resolve_key_field, resolve_query,
    RecordQuery, RecordStore, ResolvedFilter, StoreError, StoreResult,
};
use log::{debug, info};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredRow {
    object: SObjectType,
    id: RecordId,
    values: Vec<FieldValue>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_seq: u64,
    rows: BTreeMap<u64, StoredRow>,
    by_id: HashMap<RecordId, u64>,
}

impl MemoryState {
    fn seq_of(&self, object: SObjectType, id: RecordId) -> Option<u64> {
        self.by_id
            .get(&id)
            .copied()
            .filter(|seq| self.rows.get(seq).is_some_and(|row| row.object == object))
    }

    fn insert(&mut self, object: SObjectType, id: RecordId, values: Vec<FieldValue>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.rows.insert(seq, StoredRow { object, id, values });
        self.by_id.insert(id, seq);
    }

    fn replace(&mut self, object: SObjectType, id: RecordId, values: Vec<FieldValue>) -> bool {
        match self.seq_of(object, id).and_then(|seq| self.rows.get_mut(&seq)) {
            Some(row) => {
                row.values = values;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, object: SObjectType, id: RecordId) -> bool {
        let Some(seq) = self.seq_of(object, id) else {
            return false;
        };
        self.rows.remove(&seq);
        self.by_id.remove(&id);

        for row in self.rows.values_mut() {
            for (field, value) in row.object.fields().iter().zip(row.values.iter_mut()) {
                if field.kind == FieldKind::Reference(object) && *value == FieldValue::Id(id) {
                    *value = FieldValue::Null;
                }
            }
        }
        true
    }

    fn rows_of(&self, object: SObjectType) -> impl Iterator<Item = &StoredRow> {
        self.rows.values().filter(move |row| row.object == object)
    }

    fn ensure_references_exist<T: SObject>(&self, values: &[FieldValue]) -> StoreResult<()> {
        for (field, target, id) in references(T::FIELDS, values) {
            if self.seq_of(target, id).is_none() {
                return Err(StoreError::InvalidReference {
                    field: field.name,
                    id,
                });
            }
        }
        Ok(())
    }

    fn find_by_key<T: SObject>(&self, index: usize, key: &FieldValue) -> StoreResult<Option<RecordId>> {
        let field = &T::FIELDS[index];
        if key.is_null() {
            return Err(StoreError::MissingKey {
                object: T::OBJECT,
                field: field.name,
            });
        }

        let mut matches: Vec<RecordId> = self
            .rows_of(T::OBJECT)
            .filter(|row| row.values[index] == *key)
            .map(|row| row.id)
            .collect();
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
}

/// Process-local record store with no persistence.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RefCell<MemoryState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records of one type.
    pub fn count(&self, object: SObjectType) -> usize {
        self.state.borrow().rows_of(object).count()
    }

    /// Runs `op` on a working copy and keeps it only when `op` succeeds.
    fn transact<R>(&self, op: impl FnOnce(&mut MemoryState) -> StoreResult<R>) -> StoreResult<R> {
        let mut working = self.state.borrow().clone();
        let result = op(&mut working)?;
        *self.state.borrow_mut() = working;
        Ok(result)
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

        let assigned = self.transact(|state| {
            let mut assigned = Vec::new();
            for (position, record) in records.iter().enumerate() {
                let values = record.to_values();
                state.ensure_references_exist::<T>(&values)?;

                if let Some(id) = record.id() {
                    if !state.replace(T::OBJECT, id, values) {
                        return Err(StoreError::NotFound(id));
                    }
                    continue;
                }

                let matched = match key {
                    Some(index) => state.find_by_key::<T>(index, &values[index])?,
                    None => None,
                };
                let id = match matched {
                    Some(id) => {
                        state.replace(T::OBJECT, id, values);
                        id
                    }
                    None => {
                        let id = Uuid::new_v4();
                        state.insert(T::OBJECT, id, values);
                        id
                    }
                };
                assigned.push((position, id));
            }
            Ok(assigned)
        })?;

        let created = assigned.len();
        for (position, id) in assigned {
            records[position].set_id(id);
        }
        info!(
            "event=store_upsert module=repo status=ok backend=memory object={} count={} assigned={created}",
            T::OBJECT,
            records.len()
        );
        Ok(())
    }
}

impl RecordStore for InMemoryRecordStore {
    fn create<T: SObject>(&self, records: &mut [T]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        check_create_batch(records)?;

        let ids = self.transact(|state| {
            let mut ids = Vec::with_capacity(records.len());
            for record in records.iter() {
                let values = record.to_values();
                state.ensure_references_exist::<T>(&values)?;
                let id = Uuid::new_v4();
                state.insert(T::OBJECT, id, values);
                ids.push(id);
            }
            Ok(ids)
        })?;

        for (record, id) in records.iter_mut().zip(ids) {
            record.set_id(id);
        }
        info!(
            "event=store_create module=repo status=ok backend=memory object={} count={}",
            T::OBJECT,
            records.len()
        );
        Ok(())
    }

    fn update<T: SObject>(&self, records: &[T]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let ids = check_id_batch(records, true)?;

        self.transact(|state| {
            for (record, id) in records.iter().zip(ids) {
                let values = record.to_values();
                state.ensure_references_exist::<T>(&values)?;
                if !state.replace(T::OBJECT, id, values) {
                    return Err(StoreError::NotFound(id));
                }
            }
            Ok(())
        })?;

        info!(
            "event=store_update module=repo status=ok backend=memory object={} count={}",
            T::OBJECT,
            records.len()
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
                "event=store_delete module=repo status=skipped backend=memory object={} count=0",
                T::OBJECT
            );
            return Ok(());
        }
        let ids = check_id_batch(records, false)?;

        self.transact(|state| {
            for id in ids {
                if !state.remove(T::OBJECT, id) {
                    return Err(StoreError::NotFound(id));
                }
            }
            Ok(())
        })?;

        info!(
            "event=store_delete module=repo status=ok backend=memory object={} count={}",
            T::OBJECT,
            records.len()
        );
        Ok(())
    }

    fn read<T: SObject>(&self, query: &RecordQuery) -> StoreResult<Vec<T>> {
        let resolved = resolve_query::<T>(query)?;
        let limit = resolved
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        let state = self.state.borrow();
        let records = state
            .rows_of(T::OBJECT)
            .filter(|row| matches_filter(&resolved.filter, row))
            .take(limit)
            .map(|row| T::from_values(row.id, resolved.project(row.values.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "event=store_read module=repo status=ok backend=memory object={} rows={}",
            T::OBJECT,
            records.len()
        );
        Ok(records)
    }
}

fn matches_filter(filter: &ResolvedFilter, row: &StoredRow) -> bool {
    match filter {
        ResolvedFilter::All => true,
        ResolvedFilter::Ids(ids) => ids.contains(&row.id),
        ResolvedFilter::Eq(index, value) => !value.is_null() && row.values[*index] == *value,
        ResolvedFilter::In(index, values) => values
            .iter()
            .any(|value| !value.is_null() && row.values[*index] == *value),
        ResolvedFilter::And(filters) => filters.iter().all(|part| matches_filter(part, row)),
    }
}
