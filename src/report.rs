//! Per-document run reports.

use tokio::io::AsyncWriteExt as _;

use crate::{
    extract::{DocumentExtraction, probe::StopReason},
    prelude::*,
};

/// Outcome of processing one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Every page was read.
    Ok,
    /// A text file was written, but some pages are missing.
    Incomplete,
    /// Every page was read, but none had any text.
    Empty,
    /// Skipped because the text file already existed.
    Skipped,
    /// Nothing usable came out of this document.
    Failed,
}

/// A report line for one document.
#[derive(Clone, Debug, Serialize)]
pub struct DocumentReport {
    /// The input PDF.
    pub path: PathBuf,

    /// What happened.
    pub status: DocumentStatus,

    /// The text file, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// How many pages went into the text file.
    pub pages_written: usize,

    /// Pages skipped because of errors.
    pub skipped_pages: Vec<u32>,

    /// Pages that were read but had no text.
    pub blank_pages: usize,

    /// How many pages the document has, as far as we know.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_probed: Option<u32>,

    /// Any document-level errors.
    pub errors: Vec<String>,
}

impl DocumentReport {
    /// Build a report from a finished extraction.
    pub fn from_extraction(path: &Path, extraction: &DocumentExtraction) -> Self {
        let complete = extraction.skipped_pages.is_empty()
            && extraction.stop_reason == StopReason::EndOfDocument;
        let status = match (&extraction.output_path, complete) {
            (Some(_), true) => DocumentStatus::Ok,
            (Some(_), false) => DocumentStatus::Incomplete,
            (None, true) => DocumentStatus::Empty,
            (None, false) => DocumentStatus::Failed,
        };
        Self {
            path: path.to_owned(),
            status,
            output_path: extraction.output_path.clone(),
            pages_written: extraction.pages_written,
            skipped_pages: extraction.skipped_pages.clone(),
            blank_pages: extraction.blank_pages,
            pages_probed: Some(extraction.pages_probed),
            errors: vec![],
        }
    }

    /// Build a report for a document that failed outright.
    pub fn failed(path: &Path, err: &anyhow::Error) -> Self {
        Self {
            path: path.to_owned(),
            status: DocumentStatus::Failed,
            output_path: None,
            pages_written: 0,
            skipped_pages: vec![],
            blank_pages: 0,
            pages_probed: None,
            errors: vec![format!("{:?}", err)],
        }
    }

    /// Build a report for a document we didn't need to process.
    pub fn skipped(path: &Path, output_path: PathBuf) -> Self {
        Self {
            path: path.to_owned(),
            status: DocumentStatus::Skipped,
            output_path: Some(output_path),
            pages_written: 0,
            skipped_pages: vec![],
            blank_pages: 0,
            pages_probed: None,
            errors: vec![],
        }
    }
}

/// Write reports as JSON Lines.
pub async fn write_reports(path: &Path, reports: &[DocumentReport]) -> Result<()> {
    let mut out = String::new();
    for report in reports {
        out.push_str(&serde_json::to_string(report).context("failed to serialize report")?);
        out.push('\n');
    }
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("failed to create report {:?}", path.display()))?;
    file.write_all(out.as_bytes())
        .await
        .context("failed to write report")?;
    file.flush().await.context("failed to flush report")?;
    Ok(())
}
