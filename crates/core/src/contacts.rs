//! Contact list import: CSV parsing, phone normalisation, and message
//! personalisation.
//!
//! The parser is lenient about the file (BOM, Latin-1, optional header row,
//! ragged rows) and strict about each row. Rows that fail validation are not
//! dropped silently: they are reported as positional `"Row <n>: ..."`
//! messages that the [`crate::classifier`] turns into excluded rows.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── Constants ────────────────────────────────────────────────────────

/// Cell fragments that mark the first row as a header row.
pub const HEADER_KEYWORDS: &[&str] = &[
    "name", "phone", "number", "customer", "contact", "mobile", "cell",
];

/// Placeholder replaced by each recipient's name.
pub const NAME_PLACEHOLDER: &str = "[name]";

/// Minimum / maximum digits accepted for a number with an explicit `+` prefix.
pub const MIN_INTL_DIGITS: usize = 10;
pub const MAX_INTL_DIGITS: usize = 15;

/// Digits in a national (NANP) number without country code.
pub const NATIONAL_DIGITS: usize = 10;

// ── Types ────────────────────────────────────────────────────────────

/// A name/phone pair accepted by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    /// 1-based line in the source file, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            row: None,
        }
    }

    pub fn at_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }
}

/// Outcome of parsing one contact file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactImport {
    pub contacts: Vec<Contact>,
    pub errors: Vec<String>,
    /// Data rows seen, excluding any header row.
    pub total_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
}

/// Why a phone number was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneNumberError {
    #[error("Phone number cannot be empty")]
    Empty,

    #[error("Invalid phone number length: {0}")]
    InvalidLength(String),

    #[error("Invalid phone number format: {0}. Expected 10 digits for US numbers.")]
    InvalidFormat(String),
}

impl From<PhoneNumberError> for CoreError {
    fn from(err: PhoneNumberError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

// ── Phone numbers ────────────────────────────────────────────────────

/// Normalise a phone number to E.164.
///
/// Everything except digits and `+` is stripped. Numbers with a leading `+`
/// are kept as-is if they carry 10 to 15 digits; anything else is treated
/// as a US number, with an optional leading country code `1`.
pub fn clean_phone_number(phone: &str) -> Result<String, PhoneNumberError> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return Err(PhoneNumberError::Empty);
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if trimmed.starts_with('+') {
        if !(MIN_INTL_DIGITS..=MAX_INTL_DIGITS).contains(&digits.len()) {
            return Err(PhoneNumberError::InvalidLength(phone.to_string()));
        }
        return Ok(format!("+{digits}"));
    }

    let national = match digits.strip_prefix('1') {
        Some(rest) if digits.len() == NATIONAL_DIGITS + 1 => rest,
        _ => digits.as_str(),
    };

    if national.len() != NATIONAL_DIGITS {
        return Err(PhoneNumberError::InvalidFormat(phone.to_string()));
    }

    Ok(format!("+1{national}"))
}

/// Substitute every `[name]` placeholder in `template`.
pub fn personalize_message(template: &str, name: &str) -> String {
    template.replace(NAME_PLACEHOLDER, name)
}

// ── CSV ──────────────────────────────────────────────────────────────

/// Decode raw file bytes: UTF-8 (BOM stripped) with a Latin-1 fallback.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.strip_prefix('\u{FEFF}').unwrap_or(text).to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

fn looks_like_header(record: &csv::StringRecord) -> bool {
    record.iter().take(2).any(|cell| {
        let cell = cell.to_lowercase();
        HEADER_KEYWORDS.iter().any(|keyword| cell.contains(keyword))
    })
}

/// Parse a two-column (name, phone) contact file.
///
/// Fails only on file-level problems (empty file, fewer than two columns,
/// malformed CSV). Row-level problems are collected into
/// [`ContactImport::errors`] with the 1-based source line.
pub fn parse_contacts_csv(bytes: &[u8]) -> Result<ContactImport, CoreError> {
    let text = decode_text(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| CoreError::Validation(format!("Failed to parse CSV: {e}")))?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(i + 1);
        records.push((line, record));
    }

    if records.is_empty() {
        return Err(CoreError::Validation("CSV file is empty".to_string()));
    }

    let columns = records.iter().map(|(_, r)| r.len()).max().unwrap_or(0);
    if columns < 2 {
        return Err(CoreError::Validation(
            "CSV must have at least 2 columns (Name, Phone)".to_string(),
        ));
    }

    let skip = usize::from(looks_like_header(&records[0].1));

    let mut import = ContactImport::default();
    for (line, record) in records.iter().skip(skip) {
        import.total_count += 1;

        let name = record.get(0).unwrap_or("");
        let phone = record.get(1).unwrap_or("");

        if name.is_empty() && phone.is_empty() {
            continue;
        }
        if name.is_empty() {
            import.errors.push(format!("Row {line}: Missing name"));
            continue;
        }
        if phone.is_empty() {
            import
                .errors
                .push(format!("Row {line}: Missing phone number for '{name}'"));
            continue;
        }

        match clean_phone_number(phone) {
            Ok(cleaned) => import.contacts.push(Contact::new(name, cleaned).at_row(*line)),
            Err(e) => import
                .errors
                .push(format!("Row {line}: {e} (name: {name})")),
        }
    }

    import.valid_count = import.contacts.len();
    import.invalid_count = import.errors.len();
    Ok(import)
}

// ── Tests ────────────────────────────────────────────────────────────
