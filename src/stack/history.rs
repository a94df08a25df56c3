//! `logs/last-run.json` holds the latest report; `logs/history.jsonl` gets
//! one summary line per run and is never rewritten.
use super::{HistoryEntry, ProjectPaths, RunReport, HISTORY_SCHEMA_VERSION};
use crate::artifacts::write_atomic;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;

const REPORT_MODE: u32 = 0o644;

impl HistoryEntry {
    pub fn summarize(report: &RunReport) -> Self {
        Self {
            schema_version: HISTORY_SCHEMA_VERSION,
            run_stamp: report.run_stamp.clone(),
            fresh: report.fresh,
            outcome: report.outcome,
            final_state: report.states.last().copied(),
        }
    }
}

/// Save `report` as the latest snapshot and append its summary line.
///
/// The summary is appended even when the snapshot cannot be written; the
/// first error is returned.
pub fn record_run(paths: &ProjectPaths, report: &RunReport) -> Result<()> {
    let snapshot = serde_json::to_string_pretty(report)
        .context("serialize run report")
        .and_then(|text| write_atomic(&paths.report_path(), text.as_bytes(), REPORT_MODE));
    let appended = append_line(paths, &HistoryEntry::summarize(report));
    snapshot.and(appended)
}

fn append_line(paths: &ProjectPaths, entry: &HistoryEntry) -> Result<()> {
    let path = paths.history_path();
    fs::create_dir_all(paths.logs_dir())
        .with_context(|| format!("create {}", paths.logs_dir().display()))?;
    let mut line = serde_json::to_string(entry).context("serialize history entry")?;
    line.push('\n');
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| file.write_all(line.as_bytes()))
        .with_context(|| format!("append to {}", path.display()))
}
