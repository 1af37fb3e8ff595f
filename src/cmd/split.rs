//! The `split` subcommand.

use clap::Args;
use tokio::io::{AsyncBufReadExt as _, BufReader};

use crate::{
    chunks::{copy_chunks, find_unprocessed, split_into_chunks},
    prelude::*,
};

/// Options for the `split` subcommand.
#[derive(Debug, Args)]
pub struct SplitOpts {
    /// Directory containing the PDFs.
    #[clap(long, value_name = "DIR")]
    pdf_dir: PathBuf,

    /// Directory containing text files that have already been extracted.
    #[clap(long, value_name = "DIR")]
    text_dir: PathBuf,

    /// Number of chunks to create.
    #[clap(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    chunks: u32,

    /// Where to create the chunk folders.
    #[clap(long, default_value = ".")]
    dest: PathBuf,

    /// Prefix for the chunk folder names.
    #[clap(long, default_value = "chunk")]
    prefix: String,

    /// Copy without asking for confirmation.
    #[clap(short = 'y', long)]
    yes: bool,
}

/// The `split` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_split(opts: &SplitOpts) -> Result<()> {
    let unprocessed = find_unprocessed(&opts.pdf_dir, &opts.text_dir)?;
    println!("Found {} unprocessed PDF files", unprocessed.len());
    if unprocessed.is_empty() {
        println!("No unprocessed files found!");
        return Ok(());
    }
    for stem in &unprocessed {
        println!("  {stem}.pdf");
    }

    let chunks = split_into_chunks(&unprocessed, opts.chunks as usize);
    println!("Split into {} chunks:", chunks.len());
    for (idx, chunk) in chunks.iter().enumerate() {
        println!("  {}_{}: {} files", opts.prefix, idx + 1, chunk.len());
    }

    if !opts.yes && !confirm("Copy files to chunk folders? (y/n): ").await? {
        println!("Cancelled.");
        return Ok(());
    }

    let copies = copy_chunks(&opts.pdf_dir, &chunks, &opts.dest, &opts.prefix).await?;
    for copy in &copies {
        println!(
            "{}: copied {}, missing {}",
            copy.folder.display(),
            copy.copied.len(),
            copy.missing.len()
        );
    }
    println!("Done!");
    Ok(())
}

/// Ask a yes/no question on stdout and read the answer from stdin.
async fn confirm(question: &str) -> Result<bool> {
    use std::io::Write as _;

    print!("{question}");
    std::io::stdout().flush().context("failed to flush stdout")?;
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await
        .context("failed to read answer from stdin")?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}
