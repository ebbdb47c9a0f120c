//! Row classification for imported contact lists.
//!
//! Turns the parser's output (accepted contacts plus positional error
//! strings) into one ordered collection of typed rows, each either
//! `Ready` to send or `Excluded` with the reasons why.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::contacts::{Contact, ContactImport};
use crate::types::RowId;

/// Name and phone shown for rows that never produced a contact.
pub const EXCLUDED_PLACEHOLDER: &str = "-";

static ROW_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brow\s+(\d+)").expect("valid regex"));

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Ready,
    Excluded,
}

/// One imported recipient candidate.
///
/// `errors` is non-empty exactly when `status` is `Excluded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    /// 1-based position in the source file.
    pub row_index: usize,
    pub name: String,
    pub phone: String,
    pub status: RowStatus,
    pub errors: Vec<String>,
}

impl Row {
    pub fn ready(id: RowId, row_index: usize, contact: &Contact) -> Self {
        Self {
            id,
            row_index,
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            status: RowStatus::Ready,
            errors: Vec::new(),
        }
    }

    pub fn excluded(id: RowId, row_index: usize, message: impl Into<String>) -> Self {
        Self {
            id,
            row_index,
            name: EXCLUDED_PLACEHOLDER.to_string(),
            phone: EXCLUDED_PLACEHOLDER.to_string(),
            status: RowStatus::Excluded,
            errors: vec![message.into()],
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == RowStatus::Ready
    }

    pub fn contact(&self) -> Contact {
        Contact::new(self.name.clone(), self.phone.clone()).at_row(self.row_index)
    }
}

// ---------------------------------------------------------------------------
// Id allocation
// ---------------------------------------------------------------------------

/// Monotonic row id source. Ids handed out by one sequence are never reused.
#[derive(Debug, Clone)]
pub struct RowIdSequence {
    next: RowId,
}

impl RowIdSequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> RowId {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for RowIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Extract the 1-based row number from a parser message such as
/// `"Row 7: Missing name"`.
pub fn parse_row_number(message: &str) -> Option<usize> {
    ROW_NUMBER_RE
        .captures(message)
        .and_then(|caps| caps[1].parse::<usize>().ok())
        .filter(|n| *n >= 1)
}

/// Classify parsed contacts and parse errors into rows sorted by source
/// position.
///
/// Contacts without a known source row take their 1-based position in
/// `contacts`. Errors without a parseable `Row <n>` are placed after every
/// known row, in the order given.
pub fn classify(contacts: &[Contact], parse_errors: &[String], ids: &mut RowIdSequence) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::with_capacity(contacts.len() + parse_errors.len());

    for (i, contact) in contacts.iter().enumerate() {
        let row_index = contact.row.unwrap_or(i + 1);
        rows.push(Row::ready(ids.next_id(), row_index, contact));
    }

    let parsed: Vec<Option<usize>> = parse_errors.iter().map(|m| parse_row_number(m)).collect();

    let known_max = rows
        .iter()
        .map(|r| r.row_index)
        .chain(parsed.iter().flatten().copied())
        .max()
        .unwrap_or(0);
    let mut synthetic = known_max.max(contacts.len());

    for (message, row_number) in parse_errors.iter().zip(parsed) {
        let row_index = row_number.unwrap_or_else(|| {
            synthetic = synthetic.saturating_add(1);
            synthetic
        });
        rows.push(Row::excluded(ids.next_id(), row_index, message.clone()));
    }

    // Stable: ties keep contacts ahead of errors.
    rows.sort_by_key(|r| r.row_index);
    rows
}

/// Classify a whole parser result.
pub fn classify_import(import: &ContactImport, ids: &mut RowIdSequence) -> Vec<Row> {
    classify(&import.contacts, &import.errors, ids)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
