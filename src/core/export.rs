// NodeSleuth - core/export.rs
//
// CSV and JSON export of event intervals and report records.
// Core layer: writes to any Write trait object; the caller opens files.

use crate::core::model::{format_instant, EventInterval};
use crate::core::report::ReportRecord;
use crate::util::error::ExportError;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Export intervals to CSV.
///
/// Writes: from, to, level, source, locator, reason, message
pub fn export_csv<W: Write>(
    intervals: &[EventInterval],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let csv_err = |e| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(["from", "to", "level", "source", "locator", "reason", "message"])
        .map_err(csv_err)?;

    let mut count = 0;
    for interval in intervals {
        csv_writer
            .write_record([
                &format_instant(interval.from),
                &format_instant(interval.to),
                interval.level.label(),
                interval.source.label(),
                &interval.locator.to_string(),
                &interval.message.reason,
                &interval.message.to_string(),
            ])
            .map_err(csv_err)?;
        count += 1;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(count)
}

/// Top-level shape of a JSON export.
#[derive(Serialize)]
struct JsonExport<'a> {
    intervals: &'a [EventInterval],
    reports: &'a [ReportRecord],
}

/// Export intervals and report records as one pretty-printed JSON object.
/// Returns the number of intervals written.
pub fn export_json<W: Write>(
    intervals: &[EventInterval],
    reports: &[ReportRecord],
    mut writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(&mut writer, &JsonExport { intervals, reports }).map_err(
        |e| ExportError::Json {
            path: export_path.to_path_buf(),
            source: e,
        },
    )?;
    writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(intervals.len())
}
