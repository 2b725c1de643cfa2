//! Timestamp formats used by the report.
//!
//! Two fixed formats: the human-readable one for file freshness lines and
//! the dashed one embedded in the report filename. Both are rendered in
//! the local system timezone.

use chrono::{DateTime, Local};
use std::time::SystemTime;

/// Freshness lines: `2026-08-05 14:03:27`.
pub const HUMAN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Report filename stamp: `2026-08-05-14-03-27`.
pub const STAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Formats a filesystem timestamp for display in the report.
pub fn human_local(t: SystemTime) -> String {
    let dt: DateTime<Local> = t.into();
    dt.format(HUMAN_FORMAT).to_string()
}

/// Formats a generation instant for embedding in a filename.
pub fn file_stamp(dt: &DateTime<Local>) -> String {
    dt.format(STAMP_FORMAT).to_string()
}
