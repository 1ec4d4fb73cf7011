//! Experiment naming and log directory creation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use tracing::warn;

use crate::error::{ReggolError, Result};

/// Environment variable overriding the project root.
pub const PROJECT_ROOT_ENV: &str = "PROJECT_ROOT_DIR";

/// Directory under the project root used when no base log dir is given.
pub const DEFAULT_DATA_DIR: &str = "data";

pub fn project_root() -> PathBuf {
    match env::var_os(PROJECT_ROOT_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Short host name: the first dot-separated label of the machine name.
pub fn hostname() -> String {
    let raw = env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .unwrap_or_default();
    match raw.trim().split('.').next() {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => "localhost".to_string(),
    }
}

/// `<prefix>_<host>_<YYYY_MM_DD_HH_MM_SS>_<id:04>_<seed or 0>`
pub fn format_exp_name<Tz: TimeZone>(
    exp_prefix: &str,
    host: &str,
    timestamp: &DateTime<Tz>,
    exp_id: u32,
    seed: Option<u64>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{}_{}_{:04}_{}",
        exp_prefix,
        host,
        timestamp.format("%Y_%m_%d_%H_%M_%S"),
        exp_id,
        seed.unwrap_or(0)
    )
}

/// Semi-unique experiment name stamped with the local time.
pub fn create_exp_name(exp_prefix: &str, exp_id: u32, seed: Option<u64>) -> String {
    format_exp_name(exp_prefix, &hostname(), &Local::now(), exp_id, seed)
}

/// Create the log directory for a run and return `(exp_name, log_dir)`.
///
/// With `include_exp_prefix_sub_dir` the run lands in
/// `<base>/<prefix with '_' -> '-'>/<exp_name>`, otherwise `<base>/<exp_name>`.
/// `base_log_dir` defaults to `<project root>/data`. An existing directory is
/// reused with a warning.
pub fn create_log_dir(
    exp_prefix: &str,
    exp_id: u32,
    seed: Option<u64>,
    base_log_dir: Option<&Path>,
    include_exp_prefix_sub_dir: bool,
) -> Result<(String, PathBuf)> {
    let exp_name = create_exp_name(exp_prefix, exp_id, seed);
    let base = match base_log_dir {
        Some(dir) => dir.to_path_buf(),
        None => project_root().join(DEFAULT_DATA_DIR),
    };
    let log_dir = if include_exp_prefix_sub_dir {
        base.join(exp_prefix.replace('_', "-")).join(&exp_name)
    } else {
        base.join(&exp_name)
    };
    if log_dir.exists() {
        warn!(path = %log_dir.display(), "log directory already exists");
    }
    fs::create_dir_all(&log_dir).map_err(|e| ReggolError::file_access(&log_dir, e))?;
    Ok((exp_name, log_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn exp_name_layout() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            format_exp_name("ppo_cartpole", "node7", &ts, 42, Some(3)),
            "ppo_cartpole_node7_2024_03_09_07_05_01_0042_3"
        );
        assert_eq!(
            format_exp_name("x", "h", &ts, 12345, None),
            "x_h_2024_03_09_07_05_01_12345_0"
        );
    }

    #[test]
    fn hostname_is_a_single_label() {
        let host = hostname();
        assert!(!host.is_empty());
        assert!(!host.contains('.'));
    }

    #[test]
    fn prefix_subdir_uses_dashes() {
        let tmp = TempDir::new().unwrap();
        let (name, dir) = create_log_dir("my_exp", 1, None, Some(tmp.path()), true).unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir, tmp.path().join("my-exp").join(&name));
        assert!(name.starts_with("my_exp_"));
        assert!(name.ends_with("_0001_0"));
    }

    #[test]
    fn without_prefix_subdir() {
        let tmp = TempDir::new().unwrap();
        let (name, dir) = create_log_dir("flat", 0, Some(9), Some(tmp.path()), false).unwrap();
        assert_eq!(dir, tmp.path().join(&name));
        assert!(name.ends_with("_0000_9"));
    }

    #[test]
    fn repeated_creation_reuses_directory() {
        let tmp = TempDir::new().unwrap();
        // names carry a one-second stamp; retry if the pair straddled a tick
        for _ in 0..3 {
            let first = create_log_dir("dup", 7, Some(1), Some(tmp.path()), true).unwrap();
            let second = create_log_dir("dup", 7, Some(1), Some(tmp.path()), true).unwrap();
            if first.0 != second.0 {
                continue;
            }
            assert_eq!(first, second);
            assert!(second.1.is_dir());
            fs::write(second.1.join("marker.txt"), "ok").unwrap();
            return;
        }
        panic!("could not create two runs within the same second");
    }

    #[test]
    fn unwritable_base_is_file_access_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, "file").unwrap();
        let err = create_log_dir("e", 0, None, Some(&blocker), true).unwrap_err();
        assert!(matches!(err, ReggolError::FileAccess { .. }));
    }
}
