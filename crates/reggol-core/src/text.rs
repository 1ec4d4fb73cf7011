//! Timestamped, append-only text log fanned out to files and stdout.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::{ReggolError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f %:z";

enum Destination {
    Stdout,
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

/// Text log destinations plus the message prefix stack.
#[derive(Default)]
pub struct TextLogger {
    outputs: Vec<Destination>,
    prefixes: Vec<String>,
}

impl TextLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` in append mode and write every subsequent line to it.
    pub fn add_text_output(&mut self, path: impl AsRef<Path>) -> Result<()> {
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
        self.outputs.push(Destination::File {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        });
        Ok(())
    }

    pub fn add_stdout_output(&mut self) {
        if !self.outputs.iter().any(|d| matches!(d, Destination::Stdout)) {
            self.outputs.push(Destination::Stdout);
        }
    }

    pub fn remove_stdout_output(&mut self) {
        self.outputs.retain(|d| !matches!(d, Destination::Stdout));
    }

    /// Flush and drop the output for `path`. Returns whether it was registered.
    pub fn remove_text_output(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let Some(idx) = self
            .outputs
            .iter()
            .position(|d| matches!(d, Destination::File { path: p, .. } if p == path))
        else {
            return Ok(false);
        };
        if let Destination::File { path, mut writer } = self.outputs.remove(idx) {
            writer.flush().map_err(|e| ReggolError::file_access(path, e))?;
        }
        Ok(true)
    }

    pub fn has_output(&self, path: &Path) -> bool {
        self.outputs
            .iter()
            .any(|d| matches!(d, Destination::File { path: p, .. } if p == path))
    }

    pub fn output_paths(&self) -> Vec<&Path> {
        self.outputs
            .iter()
            .filter_map(|d| match d {
                Destination::File { path, .. } => Some(path.as_path()),
                Destination::Stdout => None,
            })
            .collect()
    }

    pub fn push_prefix(&mut self, prefix: impl Into<String>) {
        self.prefixes.push(prefix.into());
    }

    pub fn pop_prefix(&mut self) -> Option<String> {
        self.prefixes.pop()
    }

    pub fn prefix(&self) -> String {
        self.prefixes.concat()
    }

    /// Log `message` with the current prefix and a timestamp.
    pub fn log(&mut self, message: &str) -> Result<()> {
        self.log_with(message, true, true)
    }

    pub fn log_with(&mut self, message: &str, with_prefix: bool, with_timestamp: bool) -> Result<()> {
        let mut line = if with_prefix {
            format!("{}{}", self.prefix(), message)
        } else {
            message.to_string()
        };
        if with_timestamp {
            line = format!("{} | {}", Local::now().format(TIMESTAMP_FORMAT), line);
        }
        self.write_line(&line)
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        for output in &mut self.outputs {
            match output {
                Destination::Stdout => write_console(&mut io::stdout().lock(), line)?,
                Destination::File { path, writer } => {
                    writeln!(writer, "{line}")
                        .and_then(|_| writer.flush())
                        .map_err(|e| ReggolError::file_access(path.clone(), e))?;
                }
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for output in &mut self.outputs {
            if let Destination::File { path, writer } = output {
                writer
                    .flush()
                    .map_err(|e| ReggolError::file_access(path.clone(), e))?;
            }
        }
        Ok(())
    }

    /// Flush and drop every output. The prefix stack is kept.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.outputs.clear();
        Ok(())
    }
}

/// Write one line to a console stream. A closed stream is an error, not a
/// panic.
pub(crate) fn write_console(out: &mut impl Write, text: &str) -> Result<()> {
    writeln!(out, "{text}").and_then(|_| out.flush())?;
    Ok(())
}
