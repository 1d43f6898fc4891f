//! Pipeline configuration.
//!
//! [`PipelineConfig`] can be loaded from a JSON file; every field has a default, so a partial
//! file (or none at all) is fine. The binary applies command-line overrides on top.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// How long to wait for a freshly created file to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of open attempts before giving up.
    pub max_attempts: u32,
    /// Pause between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Upper bound on time spent sleeping for one file.
    pub fn max_wait(&self) -> Duration {
        self.delay() * self.max_attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_ms: 1_000,
        }
    }
}

/// Everything a [`crate::execution::Pipeline`] needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory producers drop files into. Watched recursively.
    pub input_dir: PathBuf,
    /// Directory receiving one artifact per converted sheet.
    pub output_dir: PathBuf,
    /// Manual-review directory for files that cannot be converted.
    pub quarantine_dir: PathBuf,
    /// Append-only decision log. `None` disables the file log.
    pub log_file: Option<PathBuf>,
    /// Accepted input extensions, without the dot. Matching is case-sensitive.
    pub accepted_extensions: Vec<String>,
    /// Extension given to artifacts, without the dot.
    pub artifact_extension: String,
    /// Field separator written into artifacts. Must be ASCII.
    pub delimiter: char,
    pub retry: RetryPolicy,
    /// Window in which duplicate watcher notifications are merged, in milliseconds.
    pub debounce_ms: u64,
    /// Worker threads handling events. `None` uses the available parallelism.
    pub workers: Option<usize>,
    /// Feed files already sitting in the input directory through the pipeline at startup.
    pub scan_existing: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            quarantine_dir: PathBuf::from("manrev"),
            log_file: Some(PathBuf::from("vert_log.log")),
            accepted_extensions: vec!["xlsx".to_string(), "xls".to_string(), "csv".to_string()],
            artifact_extension: "csv".to_string(),
            delimiter: '\t',
            retry: RetryPolicy::default(),
            debounce_ms: 500,
            workers: None,
            scan_existing: true,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.accepted_extensions.is_empty() {
            return Err(invalid("accepted_extensions must not be empty"));
        }
        if let Some(ext) = self
            .accepted_extensions
            .iter()
            .find(|e| e.is_empty() || e.starts_with('.'))
        {
            return Err(invalid(format!(
                "accepted extension '{ext}' must be non-empty and given without the leading dot"
            )));
        }
        if self.artifact_extension.is_empty() || self.artifact_extension.starts_with('.') {
            return Err(invalid(
                "artifact_extension must be non-empty and given without the leading dot",
            ));
        }
        if !self.delimiter.is_ascii() {
            return Err(invalid(format!(
                "delimiter {:?} is not a single-byte ASCII character",
                self.delimiter
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be > 0"));
        }
        if self.debounce_ms == 0 {
            return Err(invalid("debounce_ms must be > 0"));
        }
        if self.workers == Some(0) {
            return Err(invalid("workers must be > 0 when set"));
        }

        let dirs = [&self.input_dir, &self.output_dir, &self.quarantine_dir];
        let distinct: BTreeSet<&PathBuf> = dirs.iter().copied().collect();
        if distinct.len() != dirs.len() {
            return Err(invalid(
                "input_dir, output_dir and quarantine_dir must be distinct",
            ));
        }
        Ok(())
    }

    /// The delimiter as a byte. Only meaningful after [`Self::validate`].
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b'\t'
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Worker count, falling back to the platform's available parallelism.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }

    /// True if `ext` (without the dot) is in the accepted set.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.accepted_extensions.iter().any(|e| e == ext)
    }
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfig {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{PipelineConfig, RetryPolicy};

    #[test]
    fn defaults_match_deployment_layout() {
        let c = PipelineConfig::default();
        assert_eq!(c.input_dir, PathBuf::from("input"));
        assert_eq!(c.output_dir, PathBuf::from("output"));
        assert_eq!(c.quarantine_dir, PathBuf::from("manrev"));
        assert_eq!(c.retry.max_attempts, 10);
        assert_eq!(c.retry.delay(), Duration::from_secs(1));
        assert_eq!(c.delimiter_byte(), b'\t');
        assert!(c.validate().is_ok());
    }

    #[test]
    fn extensions_match_case_sensitively() {
        let c = PipelineConfig::default();
        assert!(c.accepts_extension("xlsx"));
        assert!(c.accepts_extension("csv"));
        assert!(!c.accepts_extension("XLSX"));
        assert!(!c.accepts_extension("txt"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{ "input_dir": "/srv/drop", "retry": { "delay_ms": 250 } }"#,
        )
        .unwrap();

        let c = PipelineConfig::from_json_path(&path).unwrap();
        assert_eq!(c.input_dir, PathBuf::from("/srv/drop"));
        assert_eq!(c.retry, RetryPolicy::new(10, Duration::from_millis(250)));
        assert_eq!(c.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = PipelineConfig::default();
        c.delimiter = '→';
        assert!(c.validate().unwrap_err().to_string().contains("delimiter"));

        let mut c = PipelineConfig::default();
        c.output_dir = c.input_dir.clone();
        assert!(c.validate().unwrap_err().to_string().contains("distinct"));

        let mut c = PipelineConfig::default();
        c.accepted_extensions = vec![".xlsx".to_string()];
        assert!(c.validate().is_err());

        let mut c = PipelineConfig::default();
        c.workers = Some(0);
        assert!(c.validate().is_err());

        let mut c = PipelineConfig::default();
        c.debounce_ms = 0;
        assert!(c.validate().unwrap_err().to_string().contains("debounce_ms"));
    }

    #[test]
    fn max_wait_excludes_final_sleep() {
        let p = RetryPolicy::new(10, Duration::from_secs(1));
        assert_eq!(p.max_wait(), Duration::from_secs(9));
    }
}
