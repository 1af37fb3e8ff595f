//! Rendering a single PDF page to PNG, using Poppler's `pdftocairo` CLI tool.

use tempfile::TempDir;
use tokio::process::Command;

use super::BackendError;
use crate::{command::check_for_command_failure, prelude::*};

/// Options for rendering pages.
#[derive(Clone, Debug)]
pub struct RenderOpts {
    /// Size in pixels of the longest side of the output image.
    pub longest_side: u32,
}

/// A rendered page, stored in a temporary directory that is removed when
/// this is dropped.
pub struct RenderedPage {
    /// Keeps the directory alive.
    _tmpdir: TempDir,
    /// Path to the PNG file.
    path: PathBuf,
}

impl RenderedPage {
    /// Path to the PNG file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the PNG data.
    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read rendered page {:?}", self.path))
    }
}

/// `pdftocairo`'s exit code for "other errors", which includes asking for a
/// page past the end. Any other failure means the file itself is unusable.
const PDFTOCAIRO_OTHER_ERROR: i32 = 99;

/// Render page `page` (1-based) of `document` as a PNG.
///
/// Asking for a page past the end fails with `pdftocairo`'s "Wrong page range
/// given" message, which is how we discover the end of a document. Failing to
/// run `pdftocairo` at all, or failing to open the file, is a document-level
/// [`BackendError`].
#[instrument(level = "debug", skip_all, fields(document = %document.display(), page = page))]
pub async fn render_page(
    document: &Path,
    page: u32,
    opts: &RenderOpts,
) -> Result<RenderedPage, BackendError> {
    let tmpdir = TempDir::with_prefix("page").context("failed to create temporary directory")?;
    let out_prefix = tmpdir.path().join("page");

    // With `-singlefile`, pdftocairo writes exactly `<prefix>.png` instead of
    // adding page-number digits.
    let page = page.to_string();
    let output = Command::new("pdftocairo")
        .arg("-png")
        .arg("-singlefile")
        .args(["-f", &page, "-l", &page])
        .arg("-scale-to")
        .arg(opts.longest_side.to_string())
        .arg(document)
        .arg(&out_prefix)
        .output()
        .await
        .with_context(|| format!("failed to run pdftocairo on {:?}", document.display()))
        .map_err(BackendError::document)?;
    check_for_command_failure("pdftocairo", &output).map_err(|err| {
        match output.status.code() {
            Some(PDFTOCAIRO_OTHER_ERROR) => BackendError::new(err),
            _ => BackendError::document(err),
        }
    })?;

    let path = out_prefix.with_extension("png");
    if !path.exists() {
        return Err(BackendError::new(anyhow!(
            "pdftocairo did not create {:?}",
            path.display()
        )));
    }
    Ok(RenderedPage {
        _tmpdir: tmpdir,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_PDF_PATH: &str = "tests/fixtures/two_pages.pdf";

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn renders_existing_page() -> Result<()> {
        let page = render_page(
            Path::new(TEST_PDF_PATH),
            2,
            &RenderOpts { longest_side: 200 },
        )
        .await?;
        assert!(!page.read().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn page_past_end_is_end_of_document() {
        let err = render_page(
            Path::new(TEST_PDF_PATH),
            3,
            &RenderOpts { longest_side: 200 },
        )
        .await
        .err()
        .expect("page 3 of a two-page PDF should fail");
        assert!(!err.is_document_level());
        assert_eq!(
            crate::backend::classify_error(&err),
            crate::backend::ErrorSignal::EndOfDocument
        );
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn unreadable_file_is_a_document_error() -> Result<()> {
        let tmp = TempDir::new()?;
        let corrupt = tmp.path().join("corrupt.pdf");
        std::fs::write(&corrupt, b"not a pdf")?;
        let err = render_page(&corrupt, 1, &RenderOpts { longest_side: 200 })
            .await
            .err()
            .expect("a garbage PDF should fail");
        assert!(err.is_document_level());
        Ok(())
    }
}
