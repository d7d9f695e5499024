//! Import defaults shared by config, CLI and tests.

/// Rows scanned when looking for the header row of an invoice sheet.
pub const DEFAULT_HEADER_SCAN_ROWS: usize = 50;

/// Progress is reported every N records (and always on the last one).
pub const DEFAULT_PROGRESS_EVERY: usize = 10;

/// Two invoices with the same due date whose amounts differ by less than this
/// are the same invoice.
pub const DUPLICATE_AMOUNT_TOLERANCE: f64 = 0.01;

/// Days between 1899-12-30 (Excel day zero) and 1970-01-01.
pub const EXCEL_EPOCH_OFFSET_DAYS: f64 = 25569.0;

pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Number of issues listed in a human-readable report before truncating.
pub const REPORT_MAX_ISSUES: usize = 20;

/// Number of import runs kept by the in-memory history.
pub const MAX_HISTORY_SIZE: usize = 100;
