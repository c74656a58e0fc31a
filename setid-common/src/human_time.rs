//! Human-readable time formatting
//!
//! Recordings are long (a DJ set is typically one to four hours), so every
//! timestamp shown to the user uses the long `H:MM:SS` form regardless of
//! magnitude. That keeps columns aligned in reports and console tables.

const MS_PER_SECOND: i64 = 1000;
const SECONDS_PER_HOUR: i64 = 3600;

/// Format a millisecond offset as `H:MM:SS`.
///
/// Sub-second precision is truncated. Negative offsets are rendered with a
/// leading `-`, which only happens for invalid input.
///
/// # Examples
///
/// ```
/// use setid_common::human_time::format_timestamp_ms;
///
/// assert_eq!(format_timestamp_ms(0), "0:00:00");
/// assert_eq!(format_timestamp_ms(97_000), "0:01:37");
/// assert_eq!(format_timestamp_ms(3_661_500), "1:01:01");
/// ```
pub fn format_timestamp_ms(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let total_secs = ms.abs() / MS_PER_SECOND;
    let hours = total_secs / SECONDS_PER_HOUR;
    let mins = (total_secs % SECONDS_PER_HOUR) / 60;
    let secs = total_secs % 60;
    format!("{}{}:{:02}:{:02}", sign, hours, mins, secs)
}

/// Format a millisecond duration for log lines, e.g. `2h 03m 07s` or `45s`.
pub fn format_duration_ms(ms: i64) -> String {
    let total_secs = ms.max(0) / MS_PER_SECOND;
    let hours = total_secs / SECONDS_PER_HOUR;
    let mins = (total_secs % SECONDS_PER_HOUR) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
