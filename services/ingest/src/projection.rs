//! Alive-row projection
//!
//! The ordered list of live slot indices per table. Consumers enumerate
//! rows `0..len()` through it, so tombstoned slots never surface as grid
//! rows. The applier rebuilds it in one pass after every applied batch;
//! readers see either the previous snapshot or the new one, never a
//! partial rebuild.

use std::sync::RwLock;

use crate::store::ColumnTable;

/// Published mapping from dense row coordinates to stable slot indices.
#[derive(Debug, Default)]
pub struct AliveProjection {
    rows: RwLock<Vec<usize>>,
}

impl AliveProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recollect live slots from the table and publish the fresh vector.
    pub fn rebuild(&self, table: &ColumnTable) {
        let alive = table.collect_alive();
        *self.rows.write().unwrap_or_else(|e| e.into_inner()) = alive;
    }

    /// Number of live rows in the published snapshot.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot behind dense row coordinate `row_index`, if in range.
    pub fn slot_at(&self, row_index: usize) -> Option<usize> {
        self.rows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(row_index)
            .copied()
    }

    /// Copy of the published slot vector.
    pub fn snapshot(&self) -> Vec<usize> {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::cell::CellValue;
    use types::schema::ORDER_BOOK;

    fn row(key: &str) -> Vec<CellValue> {
        let mut cells: Vec<CellValue> = ORDER_BOOK
            .columns
            .iter()
            .map(|c| CellValue::zero_of(c.ty))
            .collect();
        cells[0] = CellValue::Text(key.to_string());
        cells
    }

    #[test]
    fn test_rebuild_tracks_live_slots_in_order() {
        let table = ColumnTable::new(&ORDER_BOOK);
        let projection = AliveProjection::new();

        for key in ["A", "B", "C"] {
            table.upsert(row(key)).unwrap();
        }
        projection.rebuild(&table);
        assert_eq!(projection.snapshot(), vec![0, 1, 2]);

        table.delete("B");
        projection.rebuild(&table);
        assert_eq!(projection.snapshot(), vec![0, 2]);
        assert_eq!(projection.len(), table.live_rows());
    }

    #[test]
    fn test_elements_strictly_increase_after_churn() {
        let table = ColumnTable::new(&ORDER_BOOK);
        let projection = AliveProjection::new();

        for i in 0..20 {
            table.upsert(row(&format!("K{}", i))).unwrap();
        }
        for i in (0..20).step_by(3) {
            table.delete(&format!("K{}", i));
        }
        table.upsert(row("K0")).unwrap(); // fresh slot 20
        projection.rebuild(&table);

        let snapshot = projection.snapshot();
        assert!(snapshot.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(snapshot.len(), table.live_rows());
        assert_eq!(snapshot.last(), Some(&20));
    }

    #[test]
    fn test_slot_at_dense_addressing() {
        let table = ColumnTable::new(&ORDER_BOOK);
        let projection = AliveProjection::new();
        table.upsert(row("A")).unwrap();
        table.upsert(row("B")).unwrap();
        table.delete("A");
        projection.rebuild(&table);

        assert_eq!(projection.slot_at(0), Some(1));
        assert_eq!(projection.slot_at(1), None);
    }

    #[test]
    fn test_empty_projection() {
        let projection = AliveProjection::new();
        assert!(projection.is_empty());
        assert_eq!(projection.slot_at(0), None);
    }
}
