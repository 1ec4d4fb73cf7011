//! reggol-core: experiment logging for research scripts.
//!
//! A run gets a timestamped directory holding a text log, a CSV tabular log,
//! the run's variant and optional parameter snapshots. [`Logger::setup`]
//! wires all of it from a [`LoggerConfig`].

pub mod config;
pub mod error;
pub mod git;
pub mod logger;
pub mod paths;
pub mod snapshot;
pub mod storage;
pub mod tabular;
pub mod text;
pub mod value;

pub use config::LoggerConfig;
pub use error::{ReggolError, Result};
pub use git::{GitCli, GitInfoProvider, NoGit, RepoInfo};
pub use logger::Logger;
pub use snapshot::{load_snapshot, SnapshotFormat, SnapshotMode, SnapshotWriter};
pub use tabular::{Placement, SchemaPolicy, TabularRecorder};
pub use text::TextLogger;
pub use value::{MetricValue, ParamValue, Variant};
