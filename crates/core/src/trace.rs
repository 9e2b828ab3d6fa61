//! Durable inference trace recording.
//!
//! One append-only CSV per generation mode, with a fixed header
//! written when the file is first created and never rewritten. Every
//! dispatched request appends exactly one row, including requests the
//! engine failed.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::CoreError;
use crate::request::GenerationMode;

/// Fixed header row; the schema is stable and must not change once
/// trace files exist.
pub const TRACE_HEADER: &str =
    "timestamp,total_time_s,images_generated,time_per_image_s,gpu_name,driver_version,ckpt_name";

/// Seconds per generated image, or `None` when nothing was generated.
pub fn time_per_image(total_time_s: f64, images_generated: usize) -> Option<f64> {
    if images_generated == 0 {
        None
    } else {
        Some(total_time_s / images_generated as f64)
    }
}

/// One trace row.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceTraceRecord {
    /// Unix timestamp in seconds.
    pub timestamp: f64,
    pub total_time_s: f64,
    pub images_generated: usize,
    pub time_per_image_s: Option<f64>,
    pub gpu_name: String,
    pub driver_version: String,
    pub ckpt_name: String,
}

impl InferenceTraceRecord {
    /// Build a row stamped with the current time.
    pub fn new(
        total_time_s: f64,
        images_generated: usize,
        gpu_name: impl Into<String>,
        driver_version: impl Into<String>,
        ckpt_name: impl Into<String>,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        Self {
            timestamp,
            total_time_s,
            images_generated,
            time_per_image_s: time_per_image(total_time_s, images_generated),
            gpu_name: gpu_name.into(),
            driver_version: driver_version.into(),
            ckpt_name: ckpt_name.into(),
        }
    }

    fn to_csv_row(&self) -> String {
        let time_per_image = self
            .time_per_image_s
            .map(|t| format!("{t:.4}"))
            .unwrap_or_default();
        format!(
            "{:.6},{:.4},{},{},{},{},{}",
            self.timestamp,
            self.total_time_s,
            self.images_generated,
            time_per_image,
            csv_field(&self.gpu_name),
            csv_field(&self.driver_version),
            csv_field(&self.ckpt_name),
        )
    }
}

/// Quote a field when it would break the row format.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Appends trace rows to per-mode CSV files under a single directory.
///
/// Appends are serialized with an internal mutex so concurrent
/// requests cannot interleave partial rows.
#[derive(Debug)]
pub struct TraceWriter {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl TraceWriter {
    /// Create a writer rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| CoreError::Storage(format!("Failed to create trace directory: {e}")))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Path of the trace file for `mode`.
    pub fn trace_path(&self, mode: GenerationMode) -> PathBuf {
        self.dir
            .join(format!("inference_trace_{}.csv", mode.as_str()))
    }

    /// Append one row, writing the header first if the file is new.
    pub fn append(
        &self,
        mode: GenerationMode,
        record: &InferenceTraceRecord,
    ) -> Result<(), CoreError> {
        let _guard = self.lock.lock().expect("trace lock poisoned");

        let path = self.trace_path(mode);
        let is_new = !path.exists();

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| storage_error(&path, "open", e))?;

        if is_new {
            writeln!(file, "{TRACE_HEADER}").map_err(|e| storage_error(&path, "write", e))?;
        }
        writeln!(file, "{}", record.to_csv_row()).map_err(|e| storage_error(&path, "write", e))?;

        tracing::info!(
            mode = mode.as_str(),
            total_time_s = record.total_time_s,
            images_generated = record.images_generated,
            gpu = %record.gpu_name,
            "Recorded inference trace",
        );
        Ok(())
    }
}

fn storage_error(path: &Path, action: &str, e: std::io::Error) -> CoreError {
    CoreError::Storage(format!(
        "Failed to {action} trace file {}: {e}",
        path.display()
    ))
}
