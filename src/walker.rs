//! Running the extractor over a directory of PDFs.

use tokio::time;

use crate::{
    extract::{Extractor, display_name},
    prelude::*,
    report::DocumentReport,
    ui::{ProgressConfig, Ui},
};

/// The result of processing a directory.
#[derive(Debug, Default)]
pub struct WalkSummary {
    /// Text files written during this run.
    pub produced: Vec<PathBuf>,
    /// One report per PDF found.
    pub reports: Vec<DocumentReport>,
}

/// Make sure `dir` exists and is a directory.
pub fn check_input_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        bail!("Input directory does not exist: {}", dir.display());
    }
    if !dir.is_dir() {
        bail!("Input path is not a directory: {}", dir.display());
    }
    Ok(())
}

/// List the PDFs directly inside `dir`, sorted by file name.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = dir
        .read_dir()
        .with_context(|| format!("failed to read directory {:?}", dir.display()))?
        .map(|entry| {
            let entry = entry.with_context(|| {
                format!("failed to read entry in directory {:?}", dir.display())
            })?;
            Ok(entry.path())
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect::<Vec<_>>();
    pdfs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(pdfs)
}

/// Extract every PDF in `input_dir`, one at a time.
///
/// A document that fails is logged and reported, and we carry on with the
/// next one. Only problems with `input_dir` itself are returned as errors.
#[instrument(level = "debug", skip_all, fields(input_dir = %input_dir.display()))]
pub async fn process_directory(
    ui: &Ui,
    extractor: &mut Extractor,
    input_dir: &Path,
    skip_existing: bool,
) -> Result<WalkSummary> {
    check_input_dir(input_dir)?;
    let pdfs = list_pdfs(input_dir)?;
    let mut summary = WalkSummary::default();
    if pdfs.is_empty() {
        info!("No PDFs in {}", input_dir.display());
        return Ok(summary);
    }

    info!(
        "Processing {} PDFs in {} (task_type={})",
        pdfs.len(),
        input_dir.display(),
        extractor.task_type()
    );
    info!("Output directory: {}", extractor.output_dir().display());
    info!("Rate limit: {}", extractor.throttle_config());

    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "📄",
            msg: "OCRing PDFs",
            done_msg: "OCRed PDFs",
        },
        pdfs.len() as u64,
    );
    let total = pdfs.len();
    for (idx, pdf) in pdfs.iter().enumerate() {
        let position = idx + 1;
        let name = display_name(pdf);

        let existing = extractor.output_path_for(pdf)?;
        if skip_existing && existing.exists() {
            info!("[{}/{}] Skipping {}: {} exists", position, total, name, display_name(&existing));
            summary.reports.push(DocumentReport::skipped(pdf, existing));
            pb.inc(1);
            continue;
        }

        match extractor.extract_document(pdf).await {
            Ok(extraction) => {
                if let Some(out) = &extraction.output_path {
                    summary.produced.push(out.clone());
                }
                summary
                    .reports
                    .push(DocumentReport::from_extraction(pdf, &extraction));
                info!("[{}/{}] Completed: {}", position, total, name);
            }
            Err(err) => {
                error!("[{}/{}] {}: FATAL ERROR - {:?}", position, total, name, err);
                summary.reports.push(DocumentReport::failed(pdf, &err));
            }
        }
        pb.inc(1);

        if position < total {
            time::sleep(extractor.file_delay()).await;
        }
    }
    pb.finish();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        backend::{
            TaskType,
            scripted::{Scripted, ScriptedBackend},
        },
        report::DocumentStatus,
        throttle::{Pacer, ThrottleConfig, WorkerId},
    };

    fn extractor(backend: Arc<ScriptedBackend>, output_dir: &Path) -> Extractor {
        extractor_with_config(backend, output_dir, ThrottleConfig::default())
    }

    fn extractor_with_config(
        backend: Arc<ScriptedBackend>,
        output_dir: &Path,
        config: ThrottleConfig,
    ) -> Extractor {
        let worker = WorkerId::new("walker-test");
        Extractor::new(
            backend,
            TaskType::Default,
            output_dir.to_owned(),
            worker.clone(),
            Pacer::with_rng(config, &worker, fastrand::Rng::with_seed(3)),
        )
    }

    /// Create empty files with these names.
    fn touch(dir: &Path, names: &[&str]) -> Result<()> {
        for name in names {
            fs::write(dir.join(name), b"")?;
        }
        Ok(())
    }

    #[test]
    fn lists_only_pdfs_in_name_order() -> Result<()> {
        let tmp = TempDir::new()?;
        touch(tmp.path(), &["b.pdf", "a.PDF", "c.txt", "10.pdf", "2.pdf"])?;
        fs::create_dir(tmp.path().join("sub.pdf"))?;
        let names = list_pdfs(tmp.path())?
            .iter()
            .map(|p| display_name(p))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["10.pdf", "2.pdf", "a.PDF", "b.pdf"]);
        Ok(())
    }

    #[test]
    fn rejects_missing_or_non_directory_input() -> Result<()> {
        let tmp = TempDir::new()?;
        assert!(check_input_dir(&tmp.path().join("missing")).is_err());
        touch(tmp.path(), &["file.pdf"])?;
        assert!(check_input_dir(&tmp.path().join("file.pdf")).is_err());
        assert!(check_input_dir(tmp.path()).is_ok());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn processes_in_order_and_survives_failures() -> Result<()> {
        let input = TempDir::new()?;
        let output = TempDir::new()?;
        touch(input.path(), &["c.pdf", "a.pdf", "b.pdf"])?;
        // Make `b.txt` unwritable, so that `b.pdf` fails as a whole.
        fs::create_dir(output.path().join("b.txt"))?;

        let backend = Arc::new(
            ScriptedBackend::new()
                .with_script("a.pdf", vec![Scripted::Text("alpha")])
                .with_script("b.pdf", vec![Scripted::Text("beta")])
                .with_script("c.pdf", vec![Scripted::Text("gamma")]),
        );
        let mut extractor = extractor(backend.clone(), output.path());

        let summary = process_directory(
            &Ui::init_for_tests(),
            &mut extractor,
            input.path(),
            false,
        )
        .await?;

        let documents = backend
            .calls()
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(
            documents,
            vec!["a.pdf", "a.pdf", "b.pdf", "b.pdf", "c.pdf", "c.pdf"]
        );
        assert_eq!(
            summary.produced,
            vec![output.path().join("a.txt"), output.path().join("c.txt")]
        );
        let statuses = summary
            .reports
            .iter()
            .map(|r| r.status)
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![DocumentStatus::Ok, DocumentStatus::Failed, DocumentStatus::Ok]
        );
        assert_eq!(fs::read_to_string(output.path().join("c.txt"))?, "gamma");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn documents_without_text_are_not_listed() -> Result<()> {
        let input = TempDir::new()?;
        let output = TempDir::new()?;
        touch(input.path(), &["empty.pdf", "full.pdf"])?;
        let backend = Arc::new(
            ScriptedBackend::new().with_script("full.pdf", vec![Scripted::Text("text")]),
        );
        let mut extractor = extractor(backend, output.path());

        let summary = process_directory(
            &Ui::init_for_tests(),
            &mut extractor,
            input.path(),
            false,
        )
        .await?;

        assert_eq!(summary.produced, vec![output.path().join("full.txt")]);
        assert_eq!(summary.reports[0].status, DocumentStatus::Empty);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn skip_existing_leaves_finished_documents_alone() -> Result<()> {
        let input = TempDir::new()?;
        let output = TempDir::new()?;
        touch(input.path(), &["done.pdf", "todo.pdf"])?;
        fs::write(output.path().join("done.txt"), "old")?;
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_script("done.pdf", vec![Scripted::Text("new")])
                .with_script("todo.pdf", vec![Scripted::Text("todo")]),
        );
        let mut extractor = extractor(backend.clone(), output.path());

        let summary = process_directory(
            &Ui::init_for_tests(),
            &mut extractor,
            input.path(),
            true,
        )
        .await?;

        assert!(backend.pages_requested("done.pdf").is_empty());
        assert_eq!(fs::read_to_string(output.path().join("done.txt"))?, "old");
        assert_eq!(summary.produced, vec![output.path().join("todo.txt")]);
        assert_eq!(summary.reports[0].status, DocumentStatus::Skipped);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_document_does_not_stop_the_batch() -> Result<()> {
        let input = TempDir::new()?;
        let output = TempDir::new()?;
        touch(input.path(), &["a.pdf", "b.pdf", "c.pdf"])?;
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_script("a.pdf", vec![Scripted::Text("alpha")])
                .with_repeating("b.pdf", Scripted::Unreadable)
                .with_script("c.pdf", vec![Scripted::Text("gamma")]),
        );
        let mut extractor = extractor(backend.clone(), output.path());

        let summary = process_directory(
            &Ui::init_for_tests(),
            &mut extractor,
            input.path(),
            false,
        )
        .await?;

        assert_eq!(backend.pages_requested("b.pdf"), vec![1]);
        assert_eq!(
            summary.produced,
            vec![output.path().join("a.txt"), output.path().join("c.txt")]
        );
        assert_eq!(summary.reports[1].status, DocumentStatus::Failed);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_documents_but_not_after_the_last() -> Result<()> {
        let input = TempDir::new()?;
        let output = TempDir::new()?;
        touch(input.path(), &["a.pdf", "b.pdf", "c.pdf"])?;
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_script("a.pdf", vec![Scripted::Text("alpha")])
                .with_script("b.pdf", vec![Scripted::Text("beta")])
                .with_script("c.pdf", vec![Scripted::Text("gamma")]),
        );
        // No page delays, so only the delays between documents add up.
        let config = ThrottleConfig {
            min_delay: Duration::ZERO,
            page_jitter: Duration::ZERO,
            ..ThrottleConfig::default()
        };
        let mut extractor = extractor_with_config(backend, output.path(), config);
        let file_delay = extractor.file_delay();

        let start = time::Instant::now();
        let summary = process_directory(
            &Ui::init_for_tests(),
            &mut extractor,
            input.path(),
            false,
        )
        .await?;
        let elapsed = start.elapsed();

        assert_eq!(summary.produced.len(), 3);
        assert!(elapsed >= file_delay * 2, "{elapsed:?}");
        assert!(elapsed < file_delay * 3, "{elapsed:?}");
        Ok(())
    }

    #[tokio::test]
    async fn missing_input_directory_writes_nothing() -> Result<()> {
        let tmp = TempDir::new()?;
        let output_dir = tmp.path().join("out");
        let mut extractor = extractor(Arc::new(ScriptedBackend::new()), &output_dir);

        let result = process_directory(
            &Ui::init_for_tests(),
            &mut extractor,
            &tmp.path().join("missing"),
            false,
        )
        .await;

        assert!(result.is_err());
        assert!(!output_dir.exists());
        Ok(())
    }
}
