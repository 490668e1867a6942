//! Learning-rate trace log
//!
//! One line per training step: `<step> <lr> <loss>`. Steps are strictly
//! increasing within the file.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the trace inside the model directory
pub const TRACE_FILE: &str = "learning_rate_tuning";

/// One parsed trace line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub step: usize,
    pub lr: f32,
    pub loss: f32,
}

/// Append-only writer for the trace
#[derive(Debug)]
pub struct LrTrace {
    path: PathBuf,
    writer: BufWriter<File>,
    last_step: Option<usize>,
}

impl LrTrace {
    /// Start a new trace, discarding any previous content
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(|e| Error::io(format!("creating trace {}", path.display()), e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            last_step: None,
        })
    }

    /// Continue a trace at `step`
    ///
    /// Rows at or after `step` are dropped so the appended rows keep the
    /// step ordering.
    pub fn resume<P: AsRef<Path>>(path: P, step: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Self::create(path);
        }

        let kept: Vec<TraceRow> = read_trace(&path)?
            .into_iter()
            .filter(|row| row.step < step)
            .collect();
        let last_kept = kept.last().map(|row| row.step);

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let mut content = String::new();
        for row in &kept {
            content.push_str(&format_row(row.step, row.lr, row.loss));
        }
        fs::write(&tmp, content)
            .map_err(|e| Error::io(format!("rewriting trace {}", path.display()), e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| Error::io(format!("replacing trace {}", path.display()), e))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(format!("opening trace {}", path.display()), e))?;
        tracing::debug!(rows = kept.len(), "trace truncated for resume at step {step}");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            last_step: last_kept,
        })
    }

    /// Path of the trace file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row
    pub fn append(&mut self, step: usize, lr: f32, loss: f32) -> Result<()> {
        if self.last_step.is_some_and(|last| step <= last) {
            return Err(Error::State(format!(
                "trace step {step} does not follow step {}",
                self.last_step.unwrap_or_default()
            )));
        }
        self.writer
            .write_all(format_row(step, lr, loss).as_bytes())
            .map_err(|e| Error::io(format!("appending to trace {}", self.path.display()), e))?;
        self.last_step = Some(step);
        Ok(())
    }

    /// Flush buffered rows to disk
    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::io(format!("flushing trace {}", self.path.display()), e))
    }
}

impl Drop for LrTrace {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

fn format_row(step: usize, lr: f32, loss: f32) -> String {
    format!("{step} {lr:e} {loss}\n")
}

/// Parse a trace file
pub fn read_trace<P: AsRef<Path>>(path: P) -> Result<Vec<TraceRow>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading trace {}", path.display()), e))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let bad = || Error::Data(format!("{}:{}: malformed trace row '{line}'", path.display(), i + 1));
            let mut fields = line.split_whitespace();
            let step = fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
            let lr = fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
            let loss = fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
            Ok(TraceRow { step, lr, loss })
        })
        .collect()
}
