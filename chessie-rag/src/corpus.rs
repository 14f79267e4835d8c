//! Loading story documents from a corpus directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// File extensions loaded as stories.
pub const CORPUS_EXTENSIONS: &[&str] = &["txt", "md"];

/// A corpus file that could not be loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedSource {
    pub source_id: String,
    pub reason: String,
}

impl SkippedSource {
    pub fn to_error(&self) -> RagError {
        RagError::CorpusLoadError { source_id: self.source_id.clone(), message: self.reason.clone() }
    }
}

/// Every story found under a corpus root.
#[derive(Debug, Clone, Default)]
pub struct LoadedCorpus {
    /// Documents sorted by source id.
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedSource>,
}

/// Source id for `path`: its location relative to `root`, `/`-separated.
fn source_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

fn has_corpus_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CORPUS_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Story files under `root`, sorted, plus every entry the walk could not
/// read (unreadable directories, broken links, link loops).
fn walk_corpus(root: &Path) -> Result<(Vec<PathBuf>, Vec<SkippedSource>)> {
    if !root.is_dir() {
        return Err(RagError::ConfigError(format!(
            "corpus directory '{}' does not exist or is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    let mut unreadable = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_corpus_extension(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                let id = e.path().map_or_else(|| root.display().to_string(), |p| source_id(root, p));
                warn!(source_id = %id, error = %e, "skipping unreadable corpus entry");
                unreadable.push(SkippedSource { source_id: id, reason: e.to_string() });
            }
        }
    }

    files.sort();
    Ok((files, unreadable))
}

/// Paths of every story file under `root`, sorted. Entries the walk cannot
/// read are logged and left out; [`load_corpus`] reports them.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if `root` is not a directory.
pub fn discover_corpus_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    Ok(walk_corpus(root.as_ref())?.0)
}

/// Source ids of every story file under `root`.
pub fn corpus_source_ids(root: impl AsRef<Path>) -> Result<Vec<String>> {
    let root = root.as_ref();
    Ok(discover_corpus_files(root)?.iter().map(|p| source_id(root, p)).collect())
}

/// Load every story under `root` as UTF-8 text.
///
/// Unreadable and non-UTF-8 files, and directory entries the walk cannot
/// read, are skipped and listed in [`LoadedCorpus::skipped`]; they never
/// fail the load.
pub fn load_corpus(root: impl AsRef<Path>) -> Result<LoadedCorpus> {
    let root = root.as_ref();
    let (files, unreadable) = walk_corpus(root)?;
    let mut corpus = LoadedCorpus { documents: Vec::new(), skipped: unreadable };

    for path in files {
        let id = source_id(root, &path);
        match std::fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => corpus.documents.push(Document::new(id, text)),
                Err(e) => {
                    warn!(source_id = %id, error = %e, "skipping non-UTF-8 corpus file");
                    corpus
                        .skipped
                        .push(SkippedSource { source_id: id, reason: format!("not valid UTF-8: {e}") });
                }
            },
            Err(e) => {
                warn!(source_id = %id, error = %e, "skipping unreadable corpus file");
                corpus.skipped.push(SkippedSource { source_id: id, reason: e.to_string() });
            }
        }
    }

    info!(
        root = %root.display(),
        documents = corpus.documents.len(),
        skipped = corpus.skipped.len(),
        "corpus loaded"
    );
    Ok(corpus)
}
