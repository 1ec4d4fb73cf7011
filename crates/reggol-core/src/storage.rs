//! Read-back of log directories: listing runs, loading tabular data and
//! variants, finding snapshot files.

use std::fs;
use std::path::Path;

use crate::error::{ReggolError, Result};
use crate::value::{ParamValue, Variant};

// ─── Directory helpers ────────────────────────────────────────────────────────

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| ReggolError::file_access(path, e))
}

/// Names of the sub-directories of `dir`, sorted. A missing directory has
/// none.
pub fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut names = vec![];
    for entry in fs::read_dir(dir).map_err(|e| ReggolError::file_access(dir, e))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Runs under one prefix directory, newest first. Run names embed a
/// `YYYY_MM_DD_HH_MM_SS` stamp after the host, so for a single prefix and
/// host the reverse name order is the reverse creation order.
pub fn list_runs(prefix_dir: &Path) -> Result<Vec<String>> {
    let mut runs = list_subdirs(prefix_dir)?;
    runs.reverse();
    Ok(runs)
}

/// Snapshot files (`itr_<n>.*`, `params.*`) in a run directory, sorted by
/// iteration with `params.*` last.
pub fn list_snapshots(run_dir: &Path) -> Result<Vec<String>> {
    let mut snapshots: Vec<(Option<u64>, String)> = vec![];
    for entry in fs::read_dir(run_dir).map_err(|e| ReggolError::file_access(run_dir, e))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let stem = name.split('.').next().unwrap_or("");
        if stem == "params" {
            snapshots.push((None, name));
        } else if let Some(itr) = stem.strip_prefix("itr_").and_then(|n| n.parse().ok()) {
            snapshots.push((Some(itr), name));
        }
    }
    snapshots.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
    Ok(snapshots.into_iter().map(|(_, name)| name).collect())
}

// ─── Tabular data ─────────────────────────────────────────────────────────────

/// A tabular file read back from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularData {
    pub fn last_row(&self) -> Option<Vec<(&str, &str)>> {
        self.rows.last().map(|row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }

    /// Rows as JSON objects keyed by column, numbers parsed where possible.
    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(col, cell)| (col.clone(), cell_to_json(cell)))
                    .collect()
            })
            .collect()
    }
}

fn cell_to_json(cell: &str) -> serde_json::Value {
    if cell.is_empty() {
        return serde_json::Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return i.into();
    }
    if let Some(n) = cell
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return serde_json::Value::Number(n);
    }
    match cell {
        "true" => true.into(),
        "false" => false.into(),
        _ => cell.into(),
    }
}

/// Read a tabular file written by the logger. A missing or empty file reads
/// as no columns and no rows.
pub fn read_tabular(path: &Path, delimiter: u8) -> Result<TabularData> {
    if !path.exists() {
        return Ok(TabularData::default());
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)?;
    let columns = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = vec![];
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(TabularData { columns, rows })
}

// ─── Variant ──────────────────────────────────────────────────────────────────

/// Load a variant file. A missing file is an empty variant.
pub fn load_variant(path: &Path) -> Result<Variant> {
    if !path.exists() {
        return Ok(Variant::new());
    }
    let content = fs::read_to_string(path).map_err(|e| ReggolError::file_access(path, e))?;
    match ParamValue::from_json(serde_json::from_str(&content)?) {
        ParamValue::Map(map) => Ok(map),
        other => Err(ReggolError::InvalidConfig(format!(
            "variant file {} does not hold a mapping: {other}",
            path.display()
        ))),
    }
}
