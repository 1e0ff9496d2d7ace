//! # Record Store
//!
//! Thread-safe, cloneable in-memory store of stateful records. Callers work
//! on their own clones: `load` hands out a copy with every state cell's
//! load-time snapshot captured, transitions run on that copy in memory, and
//! `save` writes it back.
//!
//! ## Conditional save
//!
//! For every field a record type lists in [`Record::OPTIMISTIC_FIELDS`],
//! `save` compares the stored value with the record's load-time snapshot.
//! Any difference means another writer committed a transition in between:
//! the save raises `ConcurrentTransition` and writes nothing. The store
//! never reconciles; the caller discards its copy and reloads.
//!
//! ## Transactions
//!
//! `transaction` holds the write lock for the whole closure and keeps an
//! undo log. If the closure returns `Err`, every write it made is rolled
//! back. The lock is not reentrant: inside the closure, use the
//! [`Transaction`] handle, never the store itself.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use statefield_core::{ConcurrentTransition, FieldId};
use statefield_machine::Stateful;

use crate::error::StoreError;

/// A record type the store can persist.
pub trait Record: Stateful + Clone + Send + Sync {
    /// Primary key.
    type Key: Clone + Eq + Hash + Display + Send + Sync;

    /// State fields guarded by the conditional save.
    const OPTIMISTIC_FIELDS: &'static [FieldId] = &[];

    /// This record's key.
    fn key(&self) -> Self::Key;

    /// Copy every non-state column from `stored`. State cells are written
    /// by the store itself through a sanctioned refresh.
    fn refresh_from(&mut self, stored: &Self);

    /// Record type name, used in errors and logs.
    fn model() -> &'static str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }
}

type Rows<R> = HashMap<<R as Record>::Key, R>;

/// Thread-safe, cloneable in-memory record store.
pub struct Store<R: Record> {
    data: Arc<RwLock<Rows<R>>>,
}

impl<R: Record> Clone for Store<R> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<R: Record> Store<R> {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a new record and capture its snapshot.
    pub fn insert(&self, record: &mut R) -> Result<(), StoreError> {
        insert_row(&mut self.data.write(), record).map(|_| ())
    }

    /// A copy of the stored record with its snapshot captured.
    pub fn load(&self, key: &R::Key) -> Result<R, StoreError> {
        load_row(&self.data.read(), key)
    }

    /// Conditionally write `record` back. On success the record's snapshot
    /// is reset to the persisted values.
    ///
    /// # Errors
    ///
    /// `StoreError::Concurrent` if a guarded field changed in storage since
    /// the record was loaded. Nothing is written in that case.
    pub fn save(&self, record: &mut R) -> Result<(), StoreError> {
        save_row(&mut self.data.write(), record).map(|_| ())
    }

    /// Overwrite `record` with the stored row, including protected state
    /// fields, and reset its snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `UnknownField` when the stored row has a state field
    /// the record lacks. The record is untouched on error.
    pub fn refresh(&self, record: &mut R) -> Result<(), StoreError> {
        let stored = self
            .data
            .read()
            .get(&record.key())
            .cloned()
            .ok_or_else(|| not_found::<R>(&record.key()))?;
        let mut values = Vec::new();
        for field in stored.state_fields() {
            if record.state_cell(field).is_none() {
                return Err(StoreError::UnknownField { field });
            }
            values.push((field, cell_value(&stored, field)?));
        }

        record.refresh_from(&stored);
        for (field, value) in values {
            let cell = record
                .state_cell_mut(field)
                .ok_or(StoreError::UnknownField { field })?;
            cell.refresh().assign(value)?;
        }
        tracing::debug!(model = R::model(), key = %record.key(), "record refreshed");
        Ok(())
    }

    /// Run `f` atomically. If it returns `Err`, every write made through
    /// the transaction handle is undone.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut Transaction<'_, R>) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut tx = Transaction {
            rows: self.data.write(),
            undo: Vec::new(),
        };
        match f(&mut tx) {
            Ok(value) => Ok(value),
            Err(err) => {
                let undone = tx.rollback();
                tracing::warn!(model = R::model(), undone, "transaction rolled back");
                Err(err)
            }
        }
    }

    /// Whether a record with `key` is stored.
    pub fn contains(&self, key: &R::Key) -> bool {
        self.data.read().contains_key(key)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Record> std::fmt::Debug for Store<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("model", &R::model())
            .field("len", &self.len())
            .finish()
    }
}

impl<R: Record> Default for Store<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to a store for the duration of a transaction.
pub struct Transaction<'s, R: Record> {
    rows: RwLockWriteGuard<'s, Rows<R>>,
    undo: Vec<(R::Key, Option<R>)>,
}

impl<R: Record> Transaction<'_, R> {
    /// See [`Store::insert`].
    pub fn insert(&mut self, record: &mut R) -> Result<(), StoreError> {
        let previous = insert_row(&mut self.rows, record)?;
        self.undo.push((record.key(), previous));
        Ok(())
    }

    /// See [`Store::load`].
    pub fn load(&self, key: &R::Key) -> Result<R, StoreError> {
        load_row(&self.rows, key)
    }

    /// See [`Store::save`].
    pub fn save(&mut self, record: &mut R) -> Result<(), StoreError> {
        let previous = save_row(&mut self.rows, record)?;
        self.undo.push((record.key(), previous));
        Ok(())
    }

    fn rollback(mut self) -> usize {
        let undone = self.undo.len();
        while let Some((key, previous)) = self.undo.pop() {
            match previous {
                Some(row) => {
                    self.rows.insert(key, row);
                }
                None => {
                    self.rows.remove(&key);
                }
            }
        }
        undone
    }
}

fn insert_row<R: Record>(rows: &mut Rows<R>, record: &mut R) -> Result<Option<R>, StoreError> {
    let key = record.key();
    if rows.contains_key(&key) {
        return Err(StoreError::Duplicate {
            model: R::model().to_string(),
            key: key.to_string(),
        });
    }
    mark_loaded(record);
    tracing::debug!(model = R::model(), key = %key, "record inserted");
    Ok(rows.insert(key, record.clone()))
}

fn load_row<R: Record>(rows: &Rows<R>, key: &R::Key) -> Result<R, StoreError> {
    let mut record = rows.get(key).cloned().ok_or_else(|| not_found::<R>(key))?;
    mark_loaded(&mut record);
    tracing::debug!(model = R::model(), key = %key, "record loaded");
    Ok(record)
}

fn save_row<R: Record>(rows: &mut Rows<R>, record: &mut R) -> Result<Option<R>, StoreError> {
    let key = record.key();
    let stored = rows.get(&key).ok_or_else(|| not_found::<R>(&key))?;
    for &field in R::OPTIMISTIC_FIELDS {
        let expected = record
            .state_cell(field)
            .ok_or(StoreError::UnknownField { field })?
            .loaded();
        let found = cell_value(stored, field)?;
        if *expected != found {
            tracing::warn!(
                model = R::model(),
                key = %key,
                field = %field,
                expected = %expected,
                found = %found,
                "concurrent transition detected"
            );
            return Err(ConcurrentTransition {
                model: R::model().to_string(),
                key: key.to_string(),
                field,
                expected: expected.clone(),
                found,
            }
            .into());
        }
    }
    mark_loaded(record);
    tracing::debug!(model = R::model(), key = %key, "record saved");
    Ok(rows.insert(key, record.clone()))
}

fn cell_value<R: Record>(record: &R, field: FieldId) -> Result<statefield_core::StateValue, StoreError> {
    record
        .state_cell(field)
        .map(|cell| cell.get().clone())
        .ok_or(StoreError::UnknownField { field })
}

fn mark_loaded<R: Record>(record: &mut R) {
    for field in record.state_fields() {
        if let Some(cell) = record.state_cell_mut(field) {
            cell.mark_loaded();
        }
    }
}

fn not_found<R: Record>(key: &R::Key) -> StoreError {
    StoreError::NotFound {
        model: R::model().to_string(),
        key: key.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
