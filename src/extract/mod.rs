//! Extracting the text of one document, one page at a time.

use std::{io::Write as _, sync::Arc, time::Duration};

use tempfile::NamedTempFile;
use tokio::time;

use crate::{
    backend::{ErrorSignal, PageBackend, TaskType, classify_error},
    prelude::*,
    throttle::{Pacer, ThrottleConfig, WorkerId},
};

use self::probe::{PageOutcome, PageProber, ProbeResult, StopReason, Transition};

pub mod probe;

/// Separator between pages in our output files.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// What happened to one document.
#[derive(Debug, Clone)]
pub struct DocumentExtraction {
    /// The text file we wrote, if any page had text.
    pub output_path: Option<PathBuf>,
    /// How many pages were written to the text file.
    pub pages_written: usize,
    /// Pages skipped because of errors.
    pub skipped_pages: Vec<u32>,
    /// Pages that were read but blank.
    pub blank_pages: usize,
    /// How many pages the document has, as far as we know.
    pub pages_probed: u32,
    /// Why we stopped asking for pages.
    pub stop_reason: StopReason,
}

/// Extracts documents into text files using a [`PageBackend`].
pub struct Extractor {
    backend: Arc<dyn PageBackend>,
    task_type: TaskType,
    output_dir: PathBuf,
    worker: WorkerId,
    pacer: Pacer,
}

impl Extractor {
    /// Create a new extractor writing into `output_dir`.
    pub fn new(
        backend: Arc<dyn PageBackend>,
        task_type: TaskType,
        output_dir: PathBuf,
        worker: WorkerId,
        pacer: Pacer,
    ) -> Self {
        Self {
            backend,
            task_type,
            output_dir,
            worker,
            pacer,
        }
    }

    /// Our pacing settings.
    pub fn throttle_config(&self) -> &ThrottleConfig {
        self.pacer.config()
    }

    /// Our output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The task type we pass to the backend.
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// How long to wait between documents.
    pub fn file_delay(&self) -> Duration {
        self.pacer.file_delay()
    }

    /// Where the text for `document` goes.
    pub fn output_path_for(&self, document: &Path) -> Result<PathBuf> {
        let stem = document
            .file_stem()
            .ok_or_else(|| anyhow!("no file name in {:?}", document.display()))?;
        let mut file_name = stem.to_owned();
        file_name.push(".txt");
        Ok(self.output_dir.join(file_name))
    }

    /// OCR every page of `document`, and write the non-blank pages to a text
    /// file.
    ///
    /// Page-level failures are logged and skipped. Errors returned from here
    /// concern the whole document, such as being unable to write the output.
    #[instrument(
        level = "info",
        skip_all,
        fields(worker = %self.worker, document = %display_name(document))
    )]
    pub async fn extract_document(&mut self, document: &Path) -> Result<DocumentExtraction> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create output directory {:?}",
                    self.output_dir.display()
                )
            })?;
        let out_path = self.output_path_for(document)?;
        info!("Processing {}", display_name(document));

        let config = self.pacer.config().clone();
        let mut prober = PageProber::new(config.max_retries, config.max_pages)
            .with_failure_limit(config.max_consecutive_failures);
        while let Some(page) = prober.current_page() {
            if page > 1 {
                time::sleep(self.pacer.page_delay()).await;
            }
            trace!(state = ?prober.state(), "Requesting page");
            let outcome = self.attempt_page(document, page).await?;
            match prober.record(outcome)? {
                Transition::PageRead { page, kept: true } => info!(page, "Page OK"),
                Transition::PageRead { page, kept: false } => {
                    debug!(page, "Page is blank")
                }
                Transition::Skipped { .. } => {}
                Transition::Backoff { page, attempt } => {
                    let delay = self.pacer.backoff_delay(attempt);
                    warn!(
                        page,
                        "Rate limit hit. Retrying in {:.1}s... (attempt {}/{})",
                        delay.as_secs_f64(),
                        attempt,
                        config.max_retries,
                    );
                    time::sleep(delay).await;
                }
                Transition::GaveUp { page, attempts } => {
                    warn!(page, "Failed after {} attempts, skipping", attempts)
                }
                Transition::EndOfDocument { page } => {
                    info!("Reached end of PDF after {} pages", page - 1)
                }
            }
        }

        let ProbeResult {
            pages,
            skipped_pages,
            blank_pages,
            pages_probed,
            stop_reason,
        } = prober.finish()?;
        match stop_reason {
            StopReason::EndOfDocument => {}
            StopReason::PageLimit => {
                warn!("Stopped after the page limit of {} pages", pages_probed)
            }
            StopReason::FailureLimit => warn!(
                "Giving up after {} failed pages in a row",
                config.max_consecutive_failures
            ),
        }

        let output_path = if pages.is_empty() {
            info!("No text extracted from {}", display_name(document));
            None
        } else {
            write_pages(&self.output_dir, &out_path, &pages)?;
            info!(
                "Wrote {} pages to {}",
                pages.len(),
                display_name(&out_path)
            );
            Some(out_path)
        };
        Ok(DocumentExtraction {
            output_path,
            pages_written: pages.len(),
            skipped_pages,
            blank_pages,
            pages_probed,
            stop_reason,
        })
    }

    /// Make one backend call and classify the result. Errors affecting the
    /// whole document are returned as `Err`.
    async fn attempt_page(&self, document: &Path, page: u32) -> Result<PageOutcome> {
        match self.backend.ocr_page(document, self.task_type, page).await {
            Ok(response) => Ok(PageOutcome::Text(page_text(&response))),
            Err(err) if err.is_document_level() => Err(err)
                .with_context(|| format!("cannot read {}", display_name(document))),
            Err(err) => {
                let signal = classify_error(&err);
                match signal {
                    ErrorSignal::EndOfDocument => {
                        debug!(page, error = %err, "Backend reported end of document")
                    }
                    ErrorSignal::RateLimited => {
                        debug!(page, error = %err, "Backend reported rate limit")
                    }
                    ErrorSignal::Other => warn!(page, "Page failed, skipping: {}", err),
                }
                Ok(PageOutcome::Failed(signal))
            }
        }
    }
}

/// Get the page text from a backend response.
///
/// Some models answer with a JSON object holding the text in `natural_text`,
/// sometimes wrapped in a Markdown code fence. Anything else is used as-is.
pub fn page_text(response: &str) -> String {
    let trimmed = response.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    match serde_json::from_str::<Value>(unfenced) {
        Ok(Value::Object(obj)) => match obj.get("natural_text") {
            Some(Value::String(text)) => text.trim().to_owned(),
            Some(Value::Null) => String::new(),
            _ => trimmed.to_owned(),
        },
        _ => trimmed.to_owned(),
    }
}

/// Write all pages to `out_path` in one go.
///
/// We write to a temporary file in the same directory and then rename it, so
/// nobody ever sees a partial text file.
fn write_pages(output_dir: &Path, out_path: &Path, pages: &[String]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(output_dir).with_context(|| {
        format!("failed to create temporary file in {:?}", output_dir.display())
    })?;
    tmp.write_all(pages.join(PAGE_SEPARATOR).as_bytes())
        .context("failed to write page text")?;
    tmp.persist(out_path)
        .with_context(|| format!("failed to write {:?}", out_path.display()))?;
    Ok(())
}

/// A short name for log messages.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
