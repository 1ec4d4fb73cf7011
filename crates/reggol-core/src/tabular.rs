//! Tabular (CSV) metric log.
//!
//! Values recorded during one iteration accumulate in a pending row which
//! `dump_tabular` seals and appends to every tabular output. The first dump
//! locks the column order (insertion order of that row); every later row is
//! checked against it under the active [`SchemaPolicy`].

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use comfy_table::{presets::ASCII_BORDERS_ONLY_CONDENSED, Table};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReggolError, Result};
use crate::value::MetricValue;

/// What to do when a dumped row does not match the locked columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Any difference is a `SchemaMismatch`.
    #[default]
    Reject,
    /// Missing columns are written as empty fields. Unknown keys are still
    /// rejected.
    Fill,
}

/// Where the summary statistic names go relative to the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placement {
    Front,
    #[default]
    Back,
}

struct TabularOutput {
    path: PathBuf,
    writer: csv::Writer<File>,
    header_written: bool,
}

impl TabularOutput {
    fn write_row(&mut self, header: &[String], fields: &[String]) -> io::Result<()> {
        if !self.header_written {
            self.writer.write_record(header)?;
            self.writer.flush()?;
            self.header_written = true;
        }
        self.writer.write_record(fields)?;
        self.writer.flush()
    }
}

pub struct TabularRecorder {
    pending: Vec<(String, MetricValue)>,
    schema: Option<Vec<String>>,
    prefixes: Vec<String>,
    outputs: Vec<TabularOutput>,
    policy: SchemaPolicy,
    delimiter: u8,
}

impl Default for TabularRecorder {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            schema: None,
            prefixes: Vec::new(),
            outputs: Vec::new(),
            policy: SchemaPolicy::default(),
            delimiter: b',',
        }
    }
}

impl TabularRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: SchemaPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn policy(&self) -> SchemaPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SchemaPolicy) {
        self.policy = policy;
    }

    /// Columns locked by the first dump, if any.
    pub fn schema(&self) -> Option<&[String]> {
        self.schema.as_deref()
    }

    // ─── Outputs ─────────────────────────────────────────────────────────────

    /// Append rows to `path` from now on. A file that is still empty gets the
    /// header with its first row. A non-empty file keeps its header: it locks
    /// the columns if none are locked yet, and must match them otherwise.
    pub fn add_tabular_output(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.has_output(path) {
            return Ok(());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ReggolError::file_access(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ReggolError::file_access(path, e))?;
        let non_empty = file
            .metadata()
            .map(|m| m.len() > 0)
            .map_err(|e| ReggolError::file_access(path, e))?;
        if non_empty {
            let existing = self.read_header(path)?;
            match self.schema.clone() {
                Some(schema) if schema != existing => {
                    return Err(ReggolError::SchemaMismatch {
                        expected: schema,
                        found: existing,
                    });
                }
                Some(_) => {}
                None => {
                    debug!(
                        path = %path.display(),
                        columns = ?existing,
                        "tabular columns taken from existing file"
                    );
                    self.schema = Some(existing);
                }
            }
        }
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .from_writer(file);
        self.outputs.push(TabularOutput {
            path: path.to_path_buf(),
            writer,
            header_written: non_empty,
        });
        Ok(())
    }

    fn read_header(&self, path: &Path) -> Result<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_path(path)?;
        Ok(reader.headers()?.iter().map(str::to_string).collect())
    }

    pub fn remove_tabular_output(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let Some(idx) = self.outputs.iter().position(|o| o.path == path) else {
            return Ok(false);
        };
        let mut output = self.outputs.remove(idx);
        output
            .writer
            .flush()
            .map_err(|e| ReggolError::file_access(&output.path, e))?;
        Ok(true)
    }

    pub fn has_output(&self, path: &Path) -> bool {
        self.outputs.iter().any(|o| o.path == path)
    }

    pub fn output_paths(&self) -> Vec<&Path> {
        self.outputs.iter().map(|o| o.path.as_path()).collect()
    }

    // ─── Prefixes ────────────────────────────────────────────────────────────

    pub fn push_tabular_prefix(&mut self, prefix: impl Into<String>) {
        self.prefixes.push(prefix.into());
    }

    pub fn pop_tabular_prefix(&mut self) -> Option<String> {
        self.prefixes.pop()
    }

    pub fn tabular_prefix(&self) -> String {
        self.prefixes.concat()
    }

    // ─── Recording ───────────────────────────────────────────────────────────

    /// Set `key` in the pending row; a repeated key keeps its position and
    /// takes the new value.
    pub fn record_value(&mut self, key: &str, value: impl Into<MetricValue>) {
        let key = format!("{}{}", self.tabular_prefix(), key);
        let value = value.into();
        match self.pending.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pending.push((key, value)),
        }
    }

    pub fn record_dict<K, V, I>(&mut self, entries: I)
    where
        K: AsRef<str>,
        V: Into<MetricValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in entries {
            self.record_value(k.as_ref(), v);
        }
    }

    /// `record_dict` under a temporary tabular prefix.
    pub fn record_dict_with_prefix<K, V, I>(&mut self, prefix: &str, entries: I)
    where
        K: AsRef<str>,
        V: Into<MetricValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.push_tabular_prefix(prefix);
        self.record_dict(entries);
        self.pop_tabular_prefix();
    }

    /// Record Average, Std, Median, Min and Max of `values` under `key`.
    /// An empty slice records NaN for all five.
    pub fn record_misc_stat(&mut self, key: &str, values: &[f64], placement: Placement) {
        let stats = summarize(values);
        for (stat, value) in [
            ("Average", stats.mean),
            ("Std", stats.std),
            ("Median", stats.median),
            ("Min", stats.min),
            ("Max", stats.max),
        ] {
            let name = match placement {
                Placement::Front => format!("{key}{stat}"),
                Placement::Back => format!("{stat}{key}"),
            };
            self.record_value(&name, value);
        }
    }

    /// The pending row in recording order.
    pub fn table_dict(&self) -> &[(String, MetricValue)] {
        &self.pending
    }

    pub fn key_set(&self) -> Vec<&str> {
        self.pending.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The pending row as a two-column text table.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(ASCII_BORDERS_ONLY_CONDENSED);
        for (key, value) in &self.pending {
            table.add_row([key.clone(), value.to_string()]);
        }
        table.to_string()
    }

    // ─── Dumping ─────────────────────────────────────────────────────────────

    /// Check the pending row against the locked columns and return the fields
    /// that `dump_tabular` would write. `None` means there is nothing to dump.
    pub fn validate(&self) -> Result<Option<Vec<String>>> {
        let Some(schema) = self.schema.as_ref() else {
            if self.pending.is_empty() {
                return Ok(None);
            }
            return Ok(Some(self.pending.iter().map(|(_, v)| v.to_string()).collect()));
        };

        let unknown = self
            .pending
            .iter()
            .any(|(k, _)| !schema.iter().any(|col| col == k));
        let missing = schema
            .iter()
            .any(|col| !self.pending.iter().any(|(k, _)| k == col));
        if unknown || (missing && self.policy == SchemaPolicy::Reject) {
            return Err(ReggolError::SchemaMismatch {
                expected: schema.clone(),
                found: self.pending.iter().map(|(k, _)| k.clone()).collect(),
            });
        }

        let fields = schema
            .iter()
            .map(|col| {
                self.pending
                    .iter()
                    .find(|(k, _)| k == col)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        Ok(Some(fields))
    }

    /// Append the pending row to every output and start a new one.
    ///
    /// Returns `false` when nothing was written (no columns locked yet and an
    /// empty row). On a schema mismatch nothing is written and the pending
    /// row is left as it was. Every output is attempted; if any of them took
    /// the row, the row counts as dumped and the first failure is returned,
    /// so dumping again never repeats a row in the outputs that succeeded.
    pub fn dump_tabular(&mut self) -> Result<bool> {
        let Some(fields) = self.validate()? else {
            return Ok(false);
        };
        if self.schema.is_none() {
            let columns: Vec<String> = self.pending.iter().map(|(k, _)| k.clone()).collect();
            debug!(columns = ?columns, "tabular columns locked");
            self.schema = Some(columns);
        }
        let header = self.schema.as_deref().unwrap_or_default();

        let mut written = 0;
        let mut first_error = None;
        for output in &mut self.outputs {
            match output.write_row(header, &fields) {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(path = %output.path.display(), error = %e, "tabular row not written");
                    first_error.get_or_insert(ReggolError::file_access(&output.path, e));
                }
            }
        }
        if written > 0 || self.outputs.is_empty() {
            self.pending.clear();
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    /// Discard the pending row without writing it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn flush(&mut self) -> Result<()> {
        for output in &mut self.outputs {
            output
                .writer
                .flush()
                .map_err(|e| ReggolError::file_access(&output.path, e))?;
        }
        Ok(())
    }

    /// Flush and drop every output. Locked columns and the pending row stay.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.outputs.clear();
        Ok(())
    }
}

struct Summary {
    mean: f64,
    std: f64,
    median: f64,
    min: f64,
    max: f64,
}

fn summarize(values: &[f64]) -> Summary {
    if values.is_empty() {
        return Summary {
            mean: f64::NAN,
            std: f64::NAN,
            median: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
        };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    Summary {
        mean,
        std: var.sqrt(),
        median,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
    }
}
