//! Logger configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReggolError, Result};
use crate::paths;
use crate::snapshot::{SnapshotFormat, SnapshotMode};
use crate::tabular::SchemaPolicy;
use crate::value::{ParamValue, Variant};

/// Everything `Logger::setup` needs to create and wire a run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Experiment prefix; runs sharing it are grouped in one directory.
    pub exp_prefix: String,
    /// Hyperparameters of this run, written to `variant_log_file`.
    #[serde(with = "crate::value::plain_variant")]
    pub variant: Option<Variant>,
    /// Number of this run within the experiment (default: 0)
    pub exp_id: u32,
    pub seed: Option<u64>,
    pub variant_log_file: String,
    pub tabular_log_file: String,
    pub text_log_file: String,
    /// Root for all runs (default: `<project root>/<data_dir_name>`)
    pub base_log_dir: Option<PathBuf>,
    pub data_dir_name: String,
    pub include_exp_prefix_sub_dir: bool,
    pub snapshot_mode: SnapshotMode,
    /// Write an iteration snapshot every N iterations (default: 100)
    pub snapshot_gap: u64,
    pub snapshot_format: SnapshotFormat,
    /// Keep stdout for the metrics table only (default: false)
    pub log_tabular_only: bool,
    pub schema_policy: SchemaPolicy,
    pub tabular_delimiter: char,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            exp_prefix: String::new(),
            variant: None,
            exp_id: 0,
            seed: None,
            variant_log_file: "variant.json".to_string(),
            tabular_log_file: "progress.csv".to_string(),
            text_log_file: "debug.log".to_string(),
            base_log_dir: None,
            data_dir_name: paths::DEFAULT_DATA_DIR.to_string(),
            include_exp_prefix_sub_dir: true,
            snapshot_mode: SnapshotMode::GapAndLast,
            snapshot_gap: 100,
            snapshot_format: SnapshotFormat::Binary,
            log_tabular_only: false,
            schema_policy: SchemaPolicy::Reject,
            tabular_delimiter: ',',
        }
    }
}

impl LoggerConfig {
    pub fn new(exp_prefix: impl Into<String>) -> Self {
        Self {
            exp_prefix: exp_prefix.into(),
            ..Default::default()
        }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ReggolError::file_access(path, e))?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Add one entry to the variant, creating it if needed.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.variant
            .get_or_insert_with(Variant::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_exp_id(mut self, exp_id: u32) -> Self {
        self.exp_id = exp_id;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_base_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_log_dir = Some(dir.into());
        self
    }

    pub fn with_file_names(
        mut self,
        variant_log_file: impl Into<String>,
        tabular_log_file: impl Into<String>,
        text_log_file: impl Into<String>,
    ) -> Self {
        self.variant_log_file = variant_log_file.into();
        self.tabular_log_file = tabular_log_file.into();
        self.text_log_file = text_log_file.into();
        self
    }

    pub fn with_snapshot(mut self, mode: SnapshotMode, gap: u64) -> Self {
        self.snapshot_mode = mode;
        self.snapshot_gap = gap;
        self
    }

    pub fn with_snapshot_format(mut self, format: SnapshotFormat) -> Self {
        self.snapshot_format = format;
        self
    }

    pub fn with_log_tabular_only(mut self, log_tabular_only: bool) -> Self {
        self.log_tabular_only = log_tabular_only;
        self
    }

    pub fn with_schema_policy(mut self, policy: SchemaPolicy) -> Self {
        self.schema_policy = policy;
        self
    }

    pub fn with_tabular_delimiter(mut self, delimiter: char) -> Self {
        self.tabular_delimiter = delimiter;
        self
    }

    /// Directory under which run directories are created.
    pub fn resolved_base_dir(&self) -> PathBuf {
        match &self.base_log_dir {
            Some(dir) => dir.clone(),
            None => paths::project_root().join(&self.data_dir_name),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.exp_prefix.trim().is_empty() {
            return Err(ReggolError::InvalidConfig(
                "exp_prefix must not be empty".to_string(),
            ));
        }
        if self.snapshot_gap == 0 {
            return Err(ReggolError::InvalidConfig(
                "snapshot_gap must be at least 1".to_string(),
            ));
        }
        self.delimiter_byte()?;
        Ok(())
    }

    pub(crate) fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.tabular_delimiter)
            .ok()
            .filter(|b| b.is_ascii() && !matches!(*b, b'"' | b'\n' | b'\r'))
            .ok_or_else(|| {
                ReggolError::InvalidConfig(format!(
                    "tabular_delimiter must be a single ASCII character, got {:?}",
                    self.tabular_delimiter
                ))
            })
    }
}
