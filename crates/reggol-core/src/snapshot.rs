//! Parameter snapshots: which iterations get persisted, and how.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ReggolError, Result};
use crate::value::ParamValue;

/// Which calls to `save_itr_params` are written to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    /// Every iteration, as `itr_<n>`.
    All,
    /// Only the latest call, as `params`, overwritten each time.
    Last,
    /// Iterations divisible by the gap, as `itr_<n>`.
    Gap,
    /// `Gap` plus `Last`.
    #[default]
    GapAndLast,
    None,
}

impl fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SnapshotMode::All => "all",
            SnapshotMode::Last => "last",
            SnapshotMode::Gap => "gap",
            SnapshotMode::GapAndLast => "gap_and_last",
            SnapshotMode::None => "none",
        })
    }
}

impl FromStr for SnapshotMode {
    type Err = ReggolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(SnapshotMode::All),
            "last" => Ok(SnapshotMode::Last),
            "gap" => Ok(SnapshotMode::Gap),
            "gap_and_last" => Ok(SnapshotMode::GapAndLast),
            "none" => Ok(SnapshotMode::None),
            other => Err(ReggolError::UnsupportedSnapshotMode(other.to_string())),
        }
    }
}

/// Serialization used for snapshot files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    Json,
    Yaml,
    #[default]
    Binary,
}

impl SnapshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Yaml => "yaml",
            SnapshotFormat::Binary => "bin",
        }
    }

    pub fn encode(self, value: &ParamValue) -> Result<Vec<u8>> {
        match self {
            SnapshotFormat::Json => {
                let mut bytes = serde_json::to_vec_pretty(&value.to_json())?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            SnapshotFormat::Yaml => Ok(serde_yaml::to_string(&value.to_json())?.into_bytes()),
            SnapshotFormat::Binary => Ok(bincode::serialize(value)?),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<ParamValue> {
        match self {
            SnapshotFormat::Json => Ok(ParamValue::from_json(serde_json::from_slice(bytes)?)),
            SnapshotFormat::Yaml => Ok(ParamValue::from_json(serde_yaml::from_slice(bytes)?)),
            SnapshotFormat::Binary => Ok(bincode::deserialize(bytes)?),
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Yaml => "yaml",
            SnapshotFormat::Binary => "binary",
        })
    }
}

impl FromStr for SnapshotFormat {
    type Err = ReggolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(SnapshotFormat::Json),
            "yaml" | "yml" => Ok(SnapshotFormat::Yaml),
            "binary" | "bin" => Ok(SnapshotFormat::Binary),
            _ => Err(ReggolError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Writes parameter snapshots into one directory under a [`SnapshotMode`].
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: Option<PathBuf>,
    mode: SnapshotMode,
    gap: u64,
    format: SnapshotFormat,
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self {
            dir: None,
            mode: SnapshotMode::default(),
            gap: 1,
            format: SnapshotFormat::default(),
        }
    }
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, mode: SnapshotMode, gap: u64) -> Result<Self> {
        let mut writer = Self::default();
        writer.set_dir(dir);
        writer.set_mode(mode);
        writer.set_gap(gap)?;
        Ok(writer)
    }

    pub fn with_format(mut self, format: SnapshotFormat) -> Self {
        self.format = format;
        self
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn set_dir(&mut self, dir: impl Into<PathBuf>) {
        self.dir = Some(dir.into());
    }

    pub fn mode(&self) -> SnapshotMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SnapshotMode) {
        self.mode = mode;
    }

    pub fn gap(&self) -> u64 {
        self.gap
    }

    pub fn set_gap(&mut self, gap: u64) -> Result<()> {
        if gap == 0 {
            return Err(ReggolError::InvalidConfig(
                "snapshot gap must be at least 1".to_string(),
            ));
        }
        self.gap = gap;
        Ok(())
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    pub fn set_format(&mut self, format: SnapshotFormat) {
        self.format = format;
    }

    /// File names (without directory) that `save_itr_params` would write for
    /// iteration `itr`.
    pub fn planned_files(&self, itr: u64, format: SnapshotFormat) -> Vec<String> {
        let ext = format.extension();
        let itr_file = || format!("itr_{itr}.{ext}");
        let last_file = || format!("params.{ext}");
        let on_gap = itr % self.gap == 0;
        match self.mode {
            SnapshotMode::All => vec![itr_file()],
            SnapshotMode::Last => vec![last_file()],
            SnapshotMode::Gap if on_gap => vec![itr_file()],
            SnapshotMode::Gap => vec![],
            SnapshotMode::GapAndLast if on_gap => vec![itr_file(), last_file()],
            SnapshotMode::GapAndLast => vec![last_file()],
            SnapshotMode::None => vec![],
        }
    }

    /// Persist `params` for iteration `itr` as the mode dictates, in the
    /// writer's format. Returns the files written.
    pub fn save_itr_params(&self, itr: u64, params: &ParamValue) -> Result<Vec<PathBuf>> {
        self.save_itr_params_as(itr, params, self.format)
    }

    pub fn save_itr_params_as(
        &self,
        itr: u64,
        params: &ParamValue,
        format: SnapshotFormat,
    ) -> Result<Vec<PathBuf>> {
        let names = self.planned_files(itr, format);
        if names.is_empty() {
            trace!(itr, mode = %self.mode, "snapshot skipped");
            return Ok(vec![]);
        }
        let dir = self.require_dir()?;
        let bytes = format.encode(params)?;
        let mut written = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(name);
            write_file(&path, &bytes)?;
            debug!(itr, path = %path.display(), "snapshot written");
            written.push(path);
        }
        Ok(written)
    }

    /// Write `data` to `<dir>/<file_name>` regardless of the snapshot mode.
    pub fn save_extra_data(
        &self,
        data: &ParamValue,
        file_name: &str,
        format: SnapshotFormat,
    ) -> Result<PathBuf> {
        let path = self.require_dir()?.join(file_name);
        write_file(&path, &format.encode(data)?)?;
        debug!(path = %path.display(), "extra data written");
        Ok(path)
    }

    fn require_dir(&self) -> Result<&Path> {
        self.dir
            .as_deref()
            .ok_or_else(|| ReggolError::InvalidConfig("snapshot directory is not set".to_string()))
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| ReggolError::file_access(path, e))
}

/// Read back a file written by [`SnapshotWriter`].
pub fn load_snapshot(path: impl AsRef<Path>, format: SnapshotFormat) -> Result<ParamValue> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| ReggolError::file_access(path, e))?;
    format.decode(&bytes)
}
