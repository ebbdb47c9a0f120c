//! Single-level undo for row removal.
//!
//! A snapshot holds full copies of the removed rows, the index each one
//! occupied in the collection before the removal, and which of them were
//! included for sending at that moment.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::classifier::Row;
use crate::types::RowId;

/// The most recent removal, ready to be put back.
///
/// `rows` and `positions` are parallel and ordered by ascending position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoSnapshot {
    rows: Vec<Row>,
    included_ids: BTreeSet<RowId>,
    positions: Vec<usize>,
}

impl UndoSnapshot {
    /// Remove every row matching `predicate` from `rows` and capture it.
    ///
    /// Positions are indices into the collection as it was before this call,
    /// not offsets within the removed batch. Returns `None` (and leaves
    /// `rows` untouched) when nothing matches.
    pub fn capture<F>(rows: &mut Vec<Row>, included: &HashSet<RowId>, mut predicate: F) -> Option<Self>
    where
        F: FnMut(&Row) -> bool,
    {
        if !rows.iter().any(&mut predicate) {
            return None;
        }

        let mut snapshot = Self {
            rows: Vec::new(),
            included_ids: BTreeSet::new(),
            positions: Vec::new(),
        };
        let mut kept = Vec::with_capacity(rows.len());

        for (position, row) in std::mem::take(rows).into_iter().enumerate() {
            if predicate(&row) {
                if included.contains(&row.id) {
                    snapshot.included_ids.insert(row.id);
                }
                snapshot.positions.push(position);
                snapshot.rows.push(row);
            } else {
                kept.push(row);
            }
        }

        *rows = kept;
        Some(snapshot)
    }

    /// Reinsert the captured rows one at a time at
    /// `min(original position, current length)`, in snapshot order.
    ///
    /// Returns the ids that were included when the rows were removed.
    pub fn restore(self, rows: &mut Vec<Row>) -> BTreeSet<RowId> {
        let Self {
            rows: removed,
            included_ids,
            positions,
        } = self;

        for (row, position) in removed.into_iter().zip(positions) {
            let at = position.min(rows.len());
            rows.insert(at, row);
        }

        included_ids
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn included_ids(&self) -> &BTreeSet<RowId> {
        &self.included_ids
    }
}
