//! Loading the document corpus from disk.
//!
//! The corpus is a flat directory of `.md` and `.txt` files. Files
//! that cannot be read are skipped with a warning; a missing directory
//! yields an empty corpus rather than an error, so the service can
//! start without documents and simply answer from the model alone.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// One source document, before chunking.
#[derive(Debug, Clone)]
pub struct Document {
    /// File name the content came from, kept for logging.
    pub source: String,
    pub content: String,
}

/// Load all `.md` and `.txt` files from `dir`, sorted by file name.
pub fn load_corpus(dir: &Path) -> Vec<Document> {
    let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "md" || ext == "txt")
            })
            .collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read documents directory");
            return Vec::new();
        }
    };

    // Sort for deterministic ordering
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                if content.trim().is_empty() {
                    continue;
                }
                debug!(file = %path.display(), "Loaded document");
                let source = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("document")
                    .to_string();
                documents.push(Document { source, content });
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to read document, skipping");
            }
        }
    }

    documents
}
