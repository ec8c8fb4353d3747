//! Export — history as CSV and cycle reports as JSON.
//!
//! CSV columns: `symbol, date, source, window_len`, the 24 indicator fields in
//! schema order, then `window_hash`. A field that was not computed is an empty
//! cell, never a zero.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use screenlab_core::domain::{FieldId, IndicatorSet};

use crate::cycle::CycleReport;

// ─── CSV export ─────────────────────────────────────────────────────

fn header() -> Vec<&'static str> {
    let mut cols = vec!["symbol", "date", "source", "window_len"];
    cols.extend(FieldId::ALL.iter().map(|f| f.name()));
    cols.push("window_hash");
    cols
}

/// Write history records as CSV to any writer.
pub fn write_history_csv<W: Write>(writer: W, records: &[IndicatorSet]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header())?;

    for set in records {
        let mut row = vec![
            set.symbol.clone(),
            set.calculated_date.to_string(),
            set.source.clone(),
            set.window_len.to_string(),
        ];
        row.extend(FieldId::ALL.iter().map(|f| {
            set.get(*f).decimal().map(|d| d.to_string()).unwrap_or_default()
        }));
        row.push(set.window_hash.clone());
        wtr.write_record(&row)?;
    }

    wtr.flush().context("failed to flush CSV writer")?;
    Ok(())
}

/// History records as a CSV string.
pub fn history_csv_string(records: &[IndicatorSet]) -> Result<String> {
    let mut buf = Vec::new();
    write_history_csv(&mut buf, records)?;
    String::from_utf8(buf).context("CSV output is not valid UTF-8")
}

/// Write history records to `path`, creating parent directories.
pub fn export_history_csv(path: &Path, records: &[IndicatorSet]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export dir: {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_history_csv(std::io::BufWriter::new(file), records)
        .with_context(|| format!("failed to write {}", path.display()))
}

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a cycle report to pretty JSON.
pub fn export_report_json(report: &CycleReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize CycleReport to JSON")
}
