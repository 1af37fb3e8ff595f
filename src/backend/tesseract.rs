//! Local OCR using the `tesseract` CLI tool.

use tokio::process::Command;

use crate::{command::check_for_command_failure, prelude::*};

use super::{
    BackendError, PageBackend, TaskType,
    render::{RenderOpts, render_page},
};

/// Default language packs: Thai and English.
pub const DEFAULT_LANGUAGES: &str = "tha+eng";

/// OCR backend wrapping the `tesseract` CLI tool.
pub struct TesseractBackend {
    /// Language packs, in `tesseract -l` syntax.
    languages: String,
    /// How to render pages before OCRing them.
    render_opts: RenderOpts,
}

impl TesseractBackend {
    /// Create a new `tesseract` backend.
    pub fn new(languages: String, render_opts: RenderOpts) -> Self {
        Self {
            languages,
            render_opts,
        }
    }
}

#[async_trait]
impl PageBackend for TesseractBackend {
    #[instrument(level = "debug", skip_all, fields(page = page))]
    async fn ocr_page(
        &self,
        document: &Path,
        task_type: TaskType,
        page: u32,
    ) -> Result<String, BackendError> {
        if task_type != TaskType::Default {
            debug!(%task_type, "tesseract ignores the task type");
        }
        let rendered = render_page(document, page, &self.render_opts).await?;

        let output = Command::new("tesseract")
            .arg(rendered.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .output()
            .await
            .context("cannot run tesseract")
            .map_err(BackendError::document)?;
        check_for_command_failure("tesseract", &output)?;

        let text = String::from_utf8(output.stdout)
            .context("tesseract output was not valid UTF-8")?;
        Ok(text)
    }
}
