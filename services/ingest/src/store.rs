//! In-memory columnar table with stable slots
//!
//! Each row occupies a slot index assigned on insert and never reused.
//! Deletes tombstone the slot (column 0 nulled, key unindexed) rather than
//! reclaiming it, which keeps slot addresses stable for consumers that
//! virtualize rows. Re-inserting a deleted key allocates a fresh slot.
//!
//! Concurrency follows a reader-writer discipline: point lookups, cell
//! fetches, and search take shared access; the applier holds exclusive
//! access once per batch. `row_count` is an atomic observable without the
//! lock and never exceeds the true slot count.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use types::cell::CellValue;
use types::errors::StoreError;
use types::schema::{TableSchema, COLUMN_COUNT, KEY_COLUMN};

/// Hard cap on slots per table.
pub const MAX_SLOTS: usize = 2_000_000;

/// One row: exactly [`COLUMN_COUNT`] tagged cells.
pub type Row = Vec<CellValue>;

/// Outcome of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new slot was appended.
    Inserted,
    /// An existing slot's row vector was replaced wholesale.
    Updated,
}

/// Counters for one batch of upserts applied under a single lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub updated: u64,
    /// Rows refused for capacity or contract violations (the shortfall).
    pub rejected: u64,
}

struct TableInner {
    slots: Vec<Row>,
    key_index: HashMap<String, usize>,
    /// Running estimate of cell/key heap bytes.
    heap_bytes: usize,
}

/// A fixed-schema columnar table.
pub struct ColumnTable {
    schema: &'static TableSchema,
    inner: RwLock<TableInner>,
    row_count: AtomicU64,
    live_count: AtomicU64,
    capacity: usize,
}

impl ColumnTable {
    /// Create an empty table with the default capacity.
    pub fn new(schema: &'static TableSchema) -> Self {
        Self::with_capacity(schema, MAX_SLOTS)
    }

    /// Create an empty table with an explicit slot cap.
    pub fn with_capacity(schema: &'static TableSchema, capacity: usize) -> Self {
        Self {
            schema,
            inner: RwLock::new(TableInner {
                slots: Vec::new(),
                key_index: HashMap::new(),
                heap_bytes: 0,
            }),
            row_count: AtomicU64::new(0),
            live_count: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    /// Insert or replace the row addressed by its column-0 key.
    pub fn upsert(&self, row: Row) -> Result<UpsertOutcome, StoreError> {
        let mut guard = self.write();
        self.upsert_locked(&mut guard, row)
    }

    /// Apply many upserts under one exclusive lock acquisition.
    ///
    /// Rows beyond capacity (and rows violating the row contract) are
    /// counted as rejected; the rest of the batch still applies. Updates
    /// never consume a slot, so they keep succeeding at the cap.
    pub fn batch_upsert(&self, rows: Vec<Row>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut guard = self.write();
        for row in rows {
            match self.upsert_locked(&mut guard, row) {
                Ok(UpsertOutcome::Inserted) => outcome.inserted += 1,
                Ok(UpsertOutcome::Updated) => outcome.updated += 1,
                Err(_) => outcome.rejected += 1,
            }
        }
        outcome
    }

    /// Tombstone the slot holding `key`. Returns whether a live row existed.
    ///
    /// The slot stays allocated; its column 0 becomes null and the key
    /// leaves the index. A later insert with the same key gets a new slot.
    pub fn delete(&self, key: &str) -> bool {
        let mut guard = self.write();
        let inner = &mut *guard;
        match inner.key_index.remove(key) {
            Some(slot) => {
                let old = std::mem::replace(&mut inner.slots[slot][KEY_COLUMN], CellValue::Null);
                inner.heap_bytes = inner.heap_bytes.saturating_sub(old.heap_size() + key.len());
                self.live_count.fetch_sub(1, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Point lookup by business key. `None` for missing or tombstoned keys.
    pub fn row_by_key(&self, key: &str) -> Option<Row> {
        let inner = self.read();
        inner.key_index.get(key).map(|&slot| inner.slots[slot].clone())
    }

    /// Row by slot index. `None` out of range; a zeroed row of the schema's
    /// declared types for a tombstoned slot (consumers address live rows
    /// through the alive projection and do not hit tombstones in steady
    /// state).
    pub fn row_by_slot(&self, slot: usize) -> Option<Row> {
        let inner = self.read();
        let row = inner.slots.get(slot)?;
        if row[KEY_COLUMN].is_null() {
            Some(
                self.schema
                    .columns
                    .iter()
                    .map(|c| CellValue::zero_of(c.ty))
                    .collect(),
            )
        } else {
            Some(row.clone())
        }
    }

    /// Bounds-checked single-cell read; tombstoned slots yield null.
    pub fn cell(&self, slot: usize, col: usize) -> CellValue {
        if col >= COLUMN_COUNT {
            return CellValue::Null;
        }
        let inner = self.read();
        match inner.slots.get(slot) {
            Some(row) if !row[KEY_COLUMN].is_null() => row[col].clone(),
            _ => CellValue::Null,
        }
    }

    /// Bounded case-insensitive substring scan over one column.
    ///
    /// Returns at most `limit` live slot indices in ascending order whose
    /// cell at `col`, rendered as text and lowercased, contains `needle`
    /// lowercased. An empty needle matches nothing.
    pub fn search(&self, needle: &str, col: usize, limit: usize) -> Vec<usize> {
        if needle.is_empty() || col >= COLUMN_COUNT || limit == 0 {
            return Vec::new();
        }
        let needle = needle.to_lowercase();
        let inner = self.read();

        let mut hits = Vec::new();
        for (slot, row) in inner.slots.iter().enumerate() {
            if row[KEY_COLUMN].is_null() {
                continue;
            }
            if row[col].to_string().to_lowercase().contains(&needle) {
                hits.push(slot);
                if hits.len() == limit {
                    break;
                }
            }
        }
        hits
    }

    /// Ascending slot indices of live rows. One pass over all slots.
    pub fn collect_alive(&self) -> Vec<usize> {
        let inner = self.read();
        inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, row)| !row[KEY_COLUMN].is_null())
            .map(|(slot, _)| slot)
            .collect()
    }

    /// Total slots including tombstones; lock-free read.
    pub fn row_count(&self) -> usize {
        self.row_count.load(Ordering::Acquire) as usize
    }

    /// Live (non-tombstoned) rows; lock-free read.
    pub fn live_rows(&self) -> usize {
        self.live_count.load(Ordering::Acquire) as usize
    }

    /// Coarse byte estimate of the table's footprint, for diagnostics.
    pub fn memory_estimate(&self) -> usize {
        let inner = self.read();
        let slot_overhead = inner.slots.capacity() * std::mem::size_of::<Row>()
            + inner.slots.len() * COLUMN_COUNT * std::mem::size_of::<CellValue>();
        let index_overhead =
            inner.key_index.len() * (std::mem::size_of::<usize>() + std::mem::size_of::<String>());
        inner.heap_bytes + slot_overhead + index_overhead
    }

    fn upsert_locked(&self, inner: &mut TableInner, row: Row) -> Result<UpsertOutcome, StoreError> {
        if row.len() != COLUMN_COUNT {
            return Err(StoreError::SchemaWidth {
                expected: COLUMN_COUNT,
                actual: row.len(),
            });
        }
        let key = match row[KEY_COLUMN].as_text() {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => return Err(StoreError::EmptyKey),
        };

        if let Some(&slot) = inner.key_index.get(&key) {
            let replaced = std::mem::replace(&mut inner.slots[slot], row);
            inner.heap_bytes = inner.heap_bytes.saturating_sub(row_heap(&replaced));
            inner.heap_bytes += row_heap(&inner.slots[slot]);
            Ok(UpsertOutcome::Updated)
        } else {
            if inner.slots.len() >= self.capacity {
                return Err(StoreError::CapacityExceeded {
                    capacity: self.capacity,
                });
            }
            let slot = inner.slots.len();
            inner.heap_bytes += row_heap(&row) + key.len();
            inner.slots.push(row);
            inner.key_index.insert(key, slot);
            // Publish the new count only after the slot exists, so an
            // unlocked observer never sees a count above the truth.
            self.row_count.store(inner.slots.len() as u64, Ordering::Release);
            self.live_count.fetch_add(1, Ordering::Release);
            Ok(UpsertOutcome::Inserted)
        }
    }

    // A poisoned lock surrenders its data; the store recovers the inner
    // state rather than propagating another thread's panic.
    fn read(&self) -> RwLockReadGuard<'_, TableInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TableInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn row_heap(row: &Row) -> usize {
    row.iter().map(CellValue::heap_size).sum()
}
