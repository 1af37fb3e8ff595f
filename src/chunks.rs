//! Splitting a backlog of unprocessed PDFs into chunks, one per worker.

use std::collections::BTreeSet;

use crate::prelude::*;

/// File stems in `dir` with the given extension (case-insensitive).
fn stems_with_extension(dir: &Path, extension: &str) -> Result<BTreeSet<String>> {
    let mut stems = BTreeSet::new();
    let entries = dir
        .read_dir()
        .with_context(|| format!("failed to read directory {:?}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {:?}", dir.display()))?
            .path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            if let Some(stem) = path.file_stem() {
                stems.insert(stem.to_string_lossy().into_owned());
            }
        }
    }
    Ok(stems)
}

/// Stems of PDFs in `pdf_dir` that have no matching `.txt` in `text_dir`,
/// sorted.
pub fn find_unprocessed(pdf_dir: &Path, text_dir: &Path) -> Result<Vec<String>> {
    if !pdf_dir.exists() {
        warn!("{} does not exist!", pdf_dir.display());
        return Ok(vec![]);
    }
    let pdfs = stems_with_extension(pdf_dir, "pdf")?;
    let processed = if text_dir.exists() {
        stems_with_extension(text_dir, "txt")?
    } else {
        warn!("{} does not exist!", text_dir.display());
        BTreeSet::new()
    };
    Ok(pdfs.difference(&processed).cloned().collect())
}

/// Split `items` into exactly `count` contiguous chunks whose sizes differ by
/// at most one. Earlier chunks get the extra items.
pub fn split_into_chunks<T: Clone>(items: &[T], count: usize) -> Vec<Vec<T>> {
    if count == 0 {
        return vec![];
    }
    let base = items.len() / count;
    let extra = items.len() % count;
    let mut chunks = Vec::with_capacity(count);
    let mut start = 0;
    for idx in 0..count {
        let len = base + usize::from(idx < extra);
        chunks.push(items[start..start + len].to_vec());
        start += len;
    }
    chunks
}

/// What happened when copying one chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChunkCopy {
    /// The chunk folder.
    pub folder: PathBuf,
    /// Stems that were copied.
    pub copied: Vec<String>,
    /// Stems whose PDF could not be found.
    pub missing: Vec<String>,
}

/// Copy each non-empty chunk of PDFs into `<dest_dir>/<prefix>_<n>`, counting
/// from 1.
pub async fn copy_chunks(
    pdf_dir: &Path,
    chunks: &[Vec<String>],
    dest_dir: &Path,
    prefix: &str,
) -> Result<Vec<ChunkCopy>> {
    let mut results = vec![];
    for (idx, chunk) in chunks.iter().enumerate() {
        if chunk.is_empty() {
            continue;
        }
        let folder = dest_dir.join(format!("{}_{}", prefix, idx + 1));
        tokio::fs::create_dir_all(&folder)
            .await
            .with_context(|| format!("failed to create {:?}", folder.display()))?;
        info!("Created folder {} for {} files", folder.display(), chunk.len());

        let mut copy = ChunkCopy {
            folder: folder.clone(),
            ..ChunkCopy::default()
        };
        for stem in chunk {
            let file_name = format!("{stem}.pdf");
            let source = pdf_dir.join(&file_name);
            if !source.exists() {
                warn!("Not found: {}", file_name);
                copy.missing.push(stem.clone());
                continue;
            }
            tokio::fs::copy(&source, folder.join(&file_name))
                .await
                .with_context(|| format!("failed to copy {:?}", source.display()))?;
            debug!("Copied {}", file_name);
            copy.copied.push(stem.clone());
        }
        results.push(copy);
    }
    Ok(results)
}
