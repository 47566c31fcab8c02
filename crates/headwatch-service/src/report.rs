//! Text rendering of stored history.

use std::fmt::Write as _;

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use headwatch_types::{ConnectionRecord, DeviceCategory, DeviceSummary};

/// Format a duration in milliseconds as `1h 02m 03s`, `2m 03s` or `45s`.
/// Negative values format as `0s`.
pub fn format_duration(millis: i64) -> String {
    let secs = millis.max(0) / 1000;
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Wall-clock time of a millisecond timestamp at `offset`, as `HH:MM:SS`.
pub fn format_clock(timestamp_ms: i64, offset: UtcOffset) -> String {
    let format = format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_ms) * 1_000_000)
        .ok()
        .and_then(|t| t.to_offset(offset).format(&format).ok())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// One day's sessions as an aligned table.
pub fn render_history(date: &str, records: &[ConnectionRecord], offset: UtcOffset) -> String {
    if records.is_empty() {
        return format!("No connections on {}\n", date);
    }

    let rows: Vec<[String; 5]> = records
        .iter()
        .map(|r| {
            [
                r.device_name.clone(),
                r.category().to_string(),
                format_clock(r.connected_time, offset),
                r.disconnected_time
                    .map(|t| format_clock(t, offset))
                    .unwrap_or_else(|| "active".to_string()),
                r.duration.map(format_duration).unwrap_or_default(),
            ]
        })
        .collect();

    let total: i64 = records.iter().filter_map(|r| r.duration).sum();
    let mut out = format!("Connections on {}\n", date);
    out.push_str(&table(
        ["Device", "Type", "Connected", "Disconnected", "Duration"],
        &rows,
    ));
    let _ = writeln!(
        out,
        "{} sessions, {} total",
        records.len(),
        format_duration(total)
    );
    out
}

/// Per-device totals as an aligned table.
pub fn render_summary(date: &str, summaries: &[DeviceSummary]) -> String {
    if summaries.is_empty() {
        return format!("No connections on {}\n", date);
    }

    let rows: Vec<[String; 4]> = summaries
        .iter()
        .map(|s| {
            [
                s.device_name.clone(),
                DeviceCategory::from_code(s.device_type).to_string(),
                s.count.to_string(),
                format_duration(s.total_duration),
            ]
        })
        .collect();

    let mut out = format!("Summary for {}\n", date);
    out.push_str(&table(["Device", "Type", "Sessions", "Total"], &rows));
    out
}

/// Dates with stored sessions, one per line.
pub fn render_dates(dates: &[String]) -> String {
    if dates.is_empty() {
        return "No connections recorded\n".to_string();
    }
    let mut out = String::new();
    for date in dates {
        out.push_str(date);
        out.push('\n');
    }
    out
}

fn table<const N: usize>(headers: [&str; N], rows: &[[String; N]]) -> String {
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &widths, headers.iter().copied());
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &widths, rule.iter().map(String::as_str));
    for row in rows {
        push_row(&mut out, &widths, row.iter().map(String::as_str));
    }
    out
}

fn push_row<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}
