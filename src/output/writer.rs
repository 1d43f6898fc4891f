//! Delimited-text artifact writer.

use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::ingestion::observability::{PipelineEvent, PipelineObserver};
use crate::types::{Sheet, Workbook};

use super::sanitize::sanitize;

/// A fully serialized artifact waiting under a temporary name in the output directory.
///
/// Dropping it without [`ArtifactWriter::commit`] deletes the temporary file.
#[derive(Debug)]
pub struct StagedArtifact {
    sheet: String,
    file: NamedTempFile,
    destination: PathBuf,
}

impl StagedArtifact {
    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// Serializes sheets into `{basename}-{sanitized sheet}.{extension}` files.
///
/// Writes are staged: each table is written to a temporary file in the output directory and
/// renamed over the destination. An existing artifact with the same name is replaced.
pub struct ArtifactWriter {
    output_dir: PathBuf,
    extension: String,
    delimiter: u8,
    observer: Arc<dyn PipelineObserver>,
}

impl ArtifactWriter {
    pub fn new(
        output_dir: impl AsRef<Path>,
        extension: impl Into<String>,
        delimiter: u8,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            extension: extension.into(),
            delimiter,
            observer,
        }
    }

    /// Build a writer from the output section of a [`PipelineConfig`].
    ///
    /// The config is expected to have passed [`PipelineConfig::validate`].
    pub fn from_config(config: &PipelineConfig, observer: Arc<dyn PipelineObserver>) -> Self {
        Self::new(
            &config.output_dir,
            config.artifact_extension.clone(),
            config.delimiter_byte(),
            observer,
        )
    }

    /// Destination path for one sheet of `basename`.
    pub fn artifact_path(&self, basename: &str, sheet_name: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{basename}-{}.{}",
            sanitize(sheet_name),
            self.extension
        ))
    }

    /// Write a single sheet and return the artifact path.
    pub fn write(&self, basename: &str, sheet: &Sheet) -> PipelineResult<PathBuf> {
        let staged = self.stage(basename, sheet)?;
        self.commit(staged)
    }

    /// Write every sheet of `workbook`, in order.
    ///
    /// All sheets are serialized before any artifact is renamed into place, so a failure while
    /// serializing leaves no artifacts behind.
    pub fn write_workbook(&self, basename: &str, workbook: &Workbook) -> PipelineResult<Vec<PathBuf>> {
        let staged = workbook
            .sheets
            .iter()
            .map(|sheet| self.stage(basename, sheet))
            .collect::<PipelineResult<Vec<_>>>()?;

        let mut written = Vec::with_capacity(staged.len());
        for artifact in staged {
            written.push(self.commit(artifact)?);
        }
        Ok(written)
    }

    /// Serialize `sheet` into a temporary file next to its destination.
    pub fn stage(&self, basename: &str, sheet: &Sheet) -> PipelineResult<StagedArtifact> {
        let destination = self.artifact_path(basename, &sheet.name);
        let file = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(".part")
            .tempfile_in(&self.output_dir)?;

        {
            let mut wtr = csv::WriterBuilder::new()
                .delimiter(self.delimiter)
                .has_headers(false)
                .flexible(true)
                .from_writer(BufWriter::new(file.as_file()));
            for row in &sheet.rows {
                wtr.write_record(row.iter().map(|v| v.render()))?;
            }
            wtr.flush()?;
        }
        file.as_file().sync_all()?;

        Ok(StagedArtifact {
            sheet: sheet.name.clone(),
            file,
            destination,
        })
    }

    /// Rename a staged artifact over its destination.
    pub fn commit(&self, staged: StagedArtifact) -> PipelineResult<PathBuf> {
        let StagedArtifact {
            sheet,
            file,
            destination,
        } = staged;
        file.persist(&destination)?;

        self.observer.on_event(&PipelineEvent::SheetConverted {
            sheet,
            destination: destination.clone(),
        });
        Ok(destination)
    }
}
