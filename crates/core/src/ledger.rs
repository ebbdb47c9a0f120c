//! Selection ledger: the row collection plus the set of rows included for
//! sending, with single-level undo of removals.
//!
//! Invariants, re-established by every operation:
//!
//! 1. `imported == ready + excluded`
//! 2. `included <= ready`
//! 3. every included id names a `Ready` row still in the collection
//!
//! Counts are derived by scanning the collection on each read rather than
//! maintained incrementally. Operations on unknown or excluded ids are
//! silent no-ops.

use std::collections::HashSet;

use serde::Serialize;

use crate::classifier::{Row, RowStatus};
use crate::notice::Notice;
use crate::types::RowId;
use crate::undo::UndoSnapshot;

/// Counts derived from the current collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LedgerCounts {
    pub imported: usize,
    pub ready: usize,
    pub excluded: usize,
    pub included: usize,
}

/// Result of a removal: how many rows went and the notice to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: usize,
    pub notice: Notice,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionLedger {
    rows: Vec<Row>,
    included: HashSet<RowId>,
    undo: Option<UndoSnapshot>,
}

impl SelectionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // -- reads --

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn is_included(&self, id: RowId) -> bool {
        self.included.contains(&id)
    }

    pub fn included_ids(&self) -> &HashSet<RowId> {
        &self.included
    }

    /// Included rows in collection order.
    pub fn included_rows(&self) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|r| self.included.contains(&r.id))
            .collect()
    }

    pub fn pending_undo(&self) -> Option<&UndoSnapshot> {
        self.undo.as_ref()
    }

    pub fn counts(&self) -> LedgerCounts {
        let ready = self.rows.iter().filter(|r| r.status == RowStatus::Ready).count();
        let excluded = self
            .rows
            .iter()
            .filter(|r| r.status == RowStatus::Excluded)
            .count();
        let included = self
            .rows
            .iter()
            .filter(|r| self.included.contains(&r.id))
            .count();

        LedgerCounts {
            imported: self.rows.len(),
            ready,
            excluded,
            included,
        }
    }

    // -- mutations --

    /// Replace the collection, starting a fresh session: inclusion and any
    /// pending undo are cleared.
    pub fn set_rows(&mut self, rows: Vec<Row>) {
        self.rows = rows;
        self.included.clear();
        self.undo = None;
        self.debug_check();
    }

    pub fn clear(&mut self) {
        self.set_rows(Vec::new());
    }

    pub fn include_all(&mut self) {
        self.included = self
            .rows
            .iter()
            .filter(|r| r.is_ready())
            .map(|r| r.id)
            .collect();
        self.debug_check();
    }

    pub fn include_none(&mut self) {
        self.included.clear();
        self.debug_check();
    }

    /// Flip inclusion of a ready row. Returns `false` for unknown or
    /// excluded ids, which are left alone.
    pub fn toggle(&mut self, id: RowId) -> bool {
        let Some(row) = self.row(id) else {
            return false;
        };
        if !row.is_ready() {
            return false;
        }

        if !self.included.remove(&id) {
            self.included.insert(id);
        }
        self.debug_check();
        true
    }

    /// Remove one row. `None` if no row has this id.
    pub fn remove(&mut self, id: RowId) -> Option<Removal> {
        self.remove_where(|r| r.id == id)
    }

    /// Remove every included row in one batch. `None` if nothing is included.
    pub fn remove_included(&mut self) -> Option<Removal> {
        if self.included.is_empty() {
            return None;
        }
        let included = self.included.clone();
        self.remove_where(|r| included.contains(&r.id))
    }

    fn remove_where<F>(&mut self, predicate: F) -> Option<Removal>
    where
        F: FnMut(&Row) -> bool,
    {
        let snapshot = UndoSnapshot::capture(&mut self.rows, &self.included, predicate)?;
        for row in snapshot.rows() {
            self.included.remove(&row.id);
        }

        let removed = snapshot.len();
        self.undo = Some(snapshot);
        self.debug_check();

        Some(Removal {
            removed,
            notice: Notice::removed(removed),
        })
    }

    /// Put back the most recent removal and restore its inclusion
    /// membership. Returns the number of rows restored; a second call
    /// without an intervening removal restores nothing.
    pub fn undo(&mut self) -> usize {
        let Some(snapshot) = self.undo.take() else {
            return 0;
        };
        let restored = snapshot.len();
        let reinclude = snapshot.restore(&mut self.rows);
        self.included.extend(reinclude);
        self.debug_check();
        restored
    }

    /// Drop the pending undo without applying it.
    pub fn dismiss_undo(&mut self) -> bool {
        self.undo.take().is_some()
    }

    // -- invariants --

    /// Verify the ledger invariants, describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let counts = self.counts();
        if counts.imported != counts.ready + counts.excluded {
            return Err(format!(
                "imported ({}) != ready ({}) + excluded ({})",
                counts.imported, counts.ready, counts.excluded
            ));
        }
        if counts.included > counts.ready {
            return Err(format!(
                "included ({}) > ready ({})",
                counts.included, counts.ready
            ));
        }
        for id in &self.included {
            match self.row(*id) {
                Some(row) if row.is_ready() => {}
                Some(_) => return Err(format!("included row {id} is excluded")),
                None => return Err(format!("included row {id} does not exist")),
            }
        }
        for row in &self.rows {
            if row.errors.is_empty() != row.is_ready() {
                return Err(format!("row {} errors disagree with its status", row.id));
            }
        }
        let unique: HashSet<RowId> = self.rows.iter().map(|r| r.id).collect();
        if unique.len() != self.rows.len() {
            return Err("duplicate row ids".to_string());
        }
        Ok(())
    }

    fn debug_check(&self) {
        debug_assert!(
            self.check_invariants().is_ok(),
            "selection ledger invariant violated: {:?}",
            self.check_invariants()
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
