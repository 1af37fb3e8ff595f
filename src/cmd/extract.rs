//! The `extract` subcommand.

use clap::Args;

use crate::{
    backend::BackendOpts,
    credentials::{ApiKey, resolve_api_key},
    extract::Extractor,
    prelude::*,
    report::write_reports,
    throttle::{Pacer, ThrottleOpts, WorkerId},
    ui::Ui,
    walker::{check_input_dir, process_directory},
};

/// Options for the `extract` subcommand.
///
/// Paths and the API key may be given positionally or by name. Named options
/// win.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// Directory containing PDF files.
    #[clap(value_name = "DIR")]
    dir_path: Option<PathBuf>,

    /// Output directory for extracted text files.
    #[clap(value_name = "OUTPUT")]
    output_dir: Option<PathBuf>,

    /// OCR server API key (optional if set in the environment).
    #[clap(value_name = "API_KEY")]
    api_key: Option<ApiKey>,

    /// Directory containing PDF files.
    #[clap(short = 'd', long = "dir", value_name = "DIR")]
    dir_named: Option<PathBuf>,

    /// Output directory for extracted text files.
    #[clap(short = 'o', long = "output", value_name = "OUTPUT")]
    output_named: Option<PathBuf>,

    /// OCR server API key.
    #[clap(short = 'k', long = "api-key", value_name = "API_KEY")]
    api_key_named: Option<ApiKey>,

    /// Worker ID, used to tag log output and to spread out retries when
    /// several workers run at once.
    #[clap(short = 'w', long, default_value = "main")]
    worker_id: String,

    /// Skip PDFs which already have a text file in the output directory.
    #[clap(long)]
    skip_existing: bool,

    /// Write a JSON Lines report with one record per PDF to this path.
    #[clap(long, value_name = "PATH")]
    report: Option<PathBuf>,

    #[clap(flatten)]
    backend_opts: BackendOpts,

    #[clap(flatten)]
    throttle_opts: ThrottleOpts,
}

/// The `extract` subcommand.
#[instrument(level = "info", skip_all, fields(worker = %opts.worker_id))]
pub async fn cmd_extract(ui: Ui, opts: &ExtractOpts) -> Result<()> {
    let input_dir = opts
        .dir_named
        .as_deref()
        .or(opts.dir_path.as_deref())
        .ok_or_else(|| anyhow!("Directory path is required"))?;
    let output_dir = opts
        .output_named
        .as_deref()
        .or(opts.output_dir.as_deref())
        .ok_or_else(|| anyhow!("Output directory is required"))?;

    let api_key = if opts.backend_opts.backend.needs_api_key() {
        let provided = opts.api_key_named.as_ref().or(opts.api_key.as_ref());
        Some(resolve_api_key(provided.map(ApiKey::expose))?)
    } else {
        None
    };
    check_input_dir(input_dir)?;
    let throttle = opts.throttle_opts.to_config()?;

    info!("Input directory: {}", input_dir.display());
    info!("Output directory: {}", output_dir.display());
    if let Some(api_key) = &api_key {
        info!("API key: {}", api_key.masked());
    }

    let worker = WorkerId::new(opts.worker_id.clone());
    let backend = opts.backend_opts.create_backend(api_key)?;
    let mut extractor = Extractor::new(
        backend,
        opts.backend_opts.task_type,
        output_dir.to_owned(),
        worker.clone(),
        Pacer::new(throttle, &worker),
    );

    let summary =
        process_directory(&ui, &mut extractor, input_dir, opts.skip_existing).await?;
    if let Some(report_path) = &opts.report {
        write_reports(report_path, &summary.reports).await?;
        info!("Wrote report to {}", report_path.display());
    }

    info!(
        "Completed! Processed {} PDF files successfully.",
        summary.produced.len()
    );
    Ok(())
}
