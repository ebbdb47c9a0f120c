/// Row identifiers are allocated per controller and never reused within it.
pub type RowId = u64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
