//! Shared helpers for storage paths and timestamps.
//!
//! These functions are reused across the library, the CLI and the TUI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::{Duration, OffsetDateTime};

/// Gets the cross-platform default database path.
///
/// Returns the path as `{data_dir}/marginalia/marginalia.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
///
/// # Errors
///
/// Returns an error if the data directory cannot be determined.
pub fn get_database_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("marginalia").join("marginalia.db"))
}

/// Ensures the parent directory of the database file exists.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

/// Storage form of a timestamp: Unix nanoseconds.
///
/// Saturates outside the `i64` range (roughly years 1677 to 2262).
pub fn to_timestamp(t: OffsetDateTime) -> i64 {
    let nanos = t.unix_timestamp_nanos();
    i64::try_from(nanos).unwrap_or(if nanos < 0 { i64::MIN } else { i64::MAX })
}

/// Reads a stored timestamp back.
pub fn from_timestamp(nanos: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Current time, truncated to what storage can represent.
pub fn now() -> OffsetDateTime {
    from_timestamp(to_timestamp(OffsetDateTime::now_utc()))
}

/// Formats a timestamp relative to `now`: "just now", "5m ago", "3h ago",
/// "2d ago", and the calendar date beyond a week.
pub fn format_relative_time(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let elapsed = now - then;

    if elapsed < Duration::minutes(1) {
        "just now".to_string()
    } else if elapsed < Duration::hours(1) {
        format!("{}m ago", elapsed.whole_minutes())
    } else if elapsed < Duration::days(1) {
        format!("{}h ago", elapsed.whole_hours())
    } else if elapsed < Duration::weeks(1) {
        format!("{}d ago", elapsed.whole_days())
    } else {
        format_date(then)
    }
}

/// `YYYY-MM-DD` in UTC.
pub fn format_date(t: OffsetDateTime) -> String {
    let date = t.date();
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
