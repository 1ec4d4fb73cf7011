//! The experiment logger: one context object tying together the run
//! directory, the text log, the tabular log and parameter snapshots.
//!
//! `Logger::setup()` creates the run directory, records git state, writes the
//! variant and opens the default outputs. There is no global instance; pass
//! the returned `Logger` to whatever needs it. All calls do blocking file I/O
//! on the calling thread and mutating calls take `&mut self`, so sharing a
//! logger across threads needs an external lock.

use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::LoggerConfig;
use crate::error::{ReggolError, Result};
use crate::git::{self, GitInfoProvider, NoGit};
use crate::paths;
use crate::snapshot::{SnapshotFormat, SnapshotMode, SnapshotWriter};
use crate::tabular::{Placement, SchemaPolicy, TabularRecorder};
use crate::text::{self, TextLogger};
use crate::value::{variant_to_json, MetricValue, ParamValue, Variant};

pub struct Logger {
    text: TextLogger,
    tabular: TabularRecorder,
    snapshots: SnapshotWriter,
    log_tabular_only: bool,
    exp_name: Option<String>,
    log_dir: Option<PathBuf>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// An unconfigured logger that only echoes text to stdout.
    pub fn new() -> Self {
        let mut text = TextLogger::new();
        text.add_stdout_output();
        Self {
            text,
            tabular: TabularRecorder::new(),
            snapshots: SnapshotWriter::default(),
            log_tabular_only: false,
            exp_name: None,
            log_dir: None,
        }
    }

    /// Create a run directory and a logger writing into it, without git
    /// capture.
    pub fn setup(config: LoggerConfig) -> Result<Self> {
        Self::setup_with_git(config, &NoGit)
    }

    pub fn setup_with_git(config: LoggerConfig, git: &dyn GitInfoProvider) -> Result<Self> {
        config.validate()?;
        let base_dir = config.resolved_base_dir();
        let (exp_name, log_dir) = paths::create_log_dir(
            &config.exp_prefix,
            config.exp_id,
            config.seed,
            Some(&base_dir),
            config.include_exp_prefix_sub_dir,
        )?;
        git::log_git(&log_dir, git)?;

        let mut logger = Logger::new();
        logger.tabular = TabularRecorder::new()
            .with_policy(config.schema_policy)
            .with_delimiter(config.delimiter_byte()?);
        logger.snapshots = SnapshotWriter::new(&log_dir, config.snapshot_mode, config.snapshot_gap)?
            .with_format(config.snapshot_format);
        logger.set_log_tabular_only(config.log_tabular_only);
        logger.add_text_output(log_dir.join(&config.text_log_file))?;
        logger.add_tabular_output(log_dir.join(&config.tabular_log_file))?;
        logger.exp_name = Some(exp_name.clone());
        logger.log_dir = Some(log_dir.clone());
        logger.log(&format!("log directory: {}", log_dir.display()))?;

        if let Some(mut variant) = config.variant {
            variant.insert("exp_prefix".to_string(), config.exp_prefix.clone().into());
            variant.insert("exp_name".to_string(), exp_name.clone().into());
            logger.log("Variant:")?;
            logger.log(&serde_json::to_string_pretty(&variant_to_json(&variant))?)?;
            logger.log_variant(log_dir.join(&config.variant_log_file), &variant)?;
        }

        info!(
            experiment = %config.exp_prefix,
            run = %exp_name,
            dir = %log_dir.display(),
            "logger initialized"
        );
        Ok(logger)
    }

    /// Flush and drop every output and return to the state of
    /// [`Logger::new`]. Used to start an independent session.
    pub fn reset(&mut self) -> Result<()> {
        self.close()?;
        *self = Logger::new();
        Ok(())
    }

    pub fn exp_name(&self) -> Option<&str> {
        self.exp_name.as_deref()
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    // ─── Text log ────────────────────────────────────────────────────────────

    pub fn log(&mut self, message: &str) -> Result<()> {
        self.text.log(message)
    }

    pub fn log_with(&mut self, message: &str, with_prefix: bool, with_timestamp: bool) -> Result<()> {
        self.text.log_with(message, with_prefix, with_timestamp)
    }

    pub fn add_text_output(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.text.add_text_output(path)
    }

    pub fn remove_text_output(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        self.text.remove_text_output(path)
    }

    pub fn push_prefix(&mut self, prefix: impl Into<String>) {
        self.text.push_prefix(prefix);
    }

    pub fn pop_prefix(&mut self) -> Option<String> {
        self.text.pop_prefix()
    }

    /// Run `f` with `prefix` pushed onto the text prefix stack.
    pub fn with_prefix<R>(&mut self, prefix: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.text.push_prefix(prefix);
        let out = f(self);
        self.text.pop_prefix();
        out
    }

    /// When set, stdout only receives the metrics table from `dump_tabular`
    /// and text lines go to the file outputs alone.
    pub fn set_log_tabular_only(&mut self, log_tabular_only: bool) {
        self.log_tabular_only = log_tabular_only;
        if log_tabular_only {
            self.text.remove_stdout_output();
        } else {
            self.text.add_stdout_output();
        }
    }

    pub fn log_tabular_only(&self) -> bool {
        self.log_tabular_only
    }

    // ─── Tabular log ─────────────────────────────────────────────────────────

    pub fn add_tabular_output(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.tabular.add_tabular_output(path)
    }

    pub fn remove_tabular_output(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        self.tabular.remove_tabular_output(path)
    }

    pub fn record_value(&mut self, key: &str, value: impl Into<MetricValue>) {
        self.tabular.record_value(key, value);
    }

    pub fn record_dict<K, V, I>(&mut self, entries: I)
    where
        K: AsRef<str>,
        V: Into<MetricValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.tabular.record_dict(entries);
    }

    pub fn record_dict_with_prefix<K, V, I>(&mut self, prefix: &str, entries: I)
    where
        K: AsRef<str>,
        V: Into<MetricValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.tabular.record_dict_with_prefix(prefix, entries);
    }

    pub fn record_misc_stat(&mut self, key: &str, values: &[f64], placement: Placement) {
        self.tabular.record_misc_stat(key, values, placement);
    }

    pub fn push_tabular_prefix(&mut self, prefix: impl Into<String>) {
        self.tabular.push_tabular_prefix(prefix);
    }

    pub fn pop_tabular_prefix(&mut self) -> Option<String> {
        self.tabular.pop_tabular_prefix()
    }

    pub fn with_tabular_prefix<R>(&mut self, prefix: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.tabular.push_tabular_prefix(prefix);
        let out = f(self);
        self.tabular.pop_tabular_prefix();
        out
    }

    pub fn table_dict(&self) -> &[(String, MetricValue)] {
        self.tabular.table_dict()
    }

    pub fn key_set(&self) -> Vec<&str> {
        self.tabular.key_set()
    }

    pub fn tabular_schema(&self) -> Option<&[String]> {
        self.tabular.schema()
    }

    pub fn set_schema_policy(&mut self, policy: SchemaPolicy) {
        self.tabular.set_policy(policy);
    }

    /// Echo the pending row as a table, append it to the tabular outputs and
    /// start a new row. See [`TabularRecorder::dump_tabular`].
    pub fn dump_tabular(&mut self) -> Result<bool> {
        if self.tabular.validate()?.is_none() {
            return Ok(false);
        }
        let table = self.tabular.render_table();
        if self.log_tabular_only {
            text::write_console(&mut io::stdout().lock(), &table)?;
        } else {
            for line in table.lines() {
                self.text.log(line)?;
            }
        }
        self.tabular.dump_tabular()
    }

    // ─── Snapshots ───────────────────────────────────────────────────────────

    pub fn set_snapshot_dir(&mut self, dir: impl Into<PathBuf>) {
        self.snapshots.set_dir(dir);
    }

    pub fn snapshot_dir(&self) -> Option<&Path> {
        self.snapshots.dir()
    }

    pub fn set_snapshot_mode(&mut self, mode: SnapshotMode) {
        self.snapshots.set_mode(mode);
    }

    pub fn snapshot_mode(&self) -> SnapshotMode {
        self.snapshots.mode()
    }

    pub fn set_snapshot_gap(&mut self, gap: u64) -> Result<()> {
        self.snapshots.set_gap(gap)
    }

    pub fn snapshot_gap(&self) -> u64 {
        self.snapshots.gap()
    }

    pub fn set_snapshot_format(&mut self, format: SnapshotFormat) {
        self.snapshots.set_format(format);
    }

    pub fn snapshot_format(&self) -> SnapshotFormat {
        self.snapshots.format()
    }

    pub fn save_itr_params(&self, itr: u64, params: &ParamValue) -> Result<Vec<PathBuf>> {
        self.snapshots.save_itr_params(itr, params)
    }

    pub fn save_itr_params_as(
        &self,
        itr: u64,
        params: &ParamValue,
        format: SnapshotFormat,
    ) -> Result<Vec<PathBuf>> {
        self.snapshots.save_itr_params_as(itr, params, format)
    }

    pub fn save_extra_data(
        &self,
        data: &ParamValue,
        file_name: &str,
        format: SnapshotFormat,
    ) -> Result<PathBuf> {
        self.snapshots.save_extra_data(data, file_name, format)
    }

    /// Write `variant` to `path` as pretty JSON with sorted keys.
    pub fn log_variant(&self, path: impl AsRef<Path>, variant: &Variant) -> Result<()> {
        let path = path.as_ref();
        let mut content = serde_json::to_string_pretty(&variant_to_json(variant))?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| ReggolError::file_access(path, e))
    }

    // ─── Shutdown ────────────────────────────────────────────────────────────

    pub fn flush(&mut self) -> Result<()> {
        self.text.flush()?;
        self.tabular.flush()
    }

    /// Flush and drop every text and tabular output.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.text.close()?;
        self.tabular.close()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
