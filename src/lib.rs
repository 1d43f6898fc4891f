//! `sheet-drain` watches a drop directory for spreadsheets and drains it: every accepted workbook
//! is split into one delimited text artifact per sheet, then removed from the input directory.
//! Anything that cannot be converted is moved aside into a quarantine directory for manual review,
//! so the input directory only ever holds files that have not been looked at yet.
//!
//! ## Flow of one file
//!
//! 1. The [`watcher`] reports that a path appeared (created, or moved in).
//! 2. The [`router`] classifies it by what is on disk: regular file, accepted extension.
//! 3. Accepted files wait until they can be opened ([`ingestion::retry`]), are extracted with
//!    [`ingestion::SheetExtractor`] and written by [`output::ArtifactWriter`] as
//!    `<output>/<basename>-<sanitized sheet>.<ext>`. The original is deleted only after every
//!    artifact is committed.
//! 4. Rejected or unparseable files go to the [`quarantine`] directory under their original name.
//!
//! Every decision is reported as an [`ingestion::PipelineEvent`] to a
//! [`ingestion::PipelineObserver`].
//!
//! ## Library example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sheet_drain::config::PipelineConfig;
//! use sheet_drain::execution::Pipeline;
//! use sheet_drain::ingestion::TracingObserver;
//!
//! # fn main() -> Result<(), sheet_drain::PipelineError> {
//! let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(TracingObserver))?;
//!
//! let shutdown = pipeline.shutdown_signal();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(60));
//!     shutdown.request();
//! });
//!
//! let summary = pipeline.run()?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: directories, accepted extensions, retry policy
//! - [`watcher`]: recursive, debounced directory watching and the startup scan
//! - [`router`]: per-event classification and dispatch
//! - [`ingestion`]: readiness retry, workbook extraction, pipeline events and observers
//! - [`output`]: sheet-name sanitization and staged artifact writes
//! - [`quarantine`]: moving rejected files aside
//! - [`execution`]: the long-running [`execution::Pipeline`], worker pool and shutdown
//! - [`types`]: in-memory workbook/sheet/value types
//! - [`error`]: the shared error type

pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod output;
pub mod quarantine;
pub mod router;
pub mod types;
pub mod watcher;

pub use error::{PipelineError, PipelineResult};
