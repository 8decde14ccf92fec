//! Retriever trait: the similarity-search boundary.
//!
//! The turn engine only ever sees this trait; the index construction
//! (corpus loading, chunking, embedding) lives in the retrieval crate.

use crate::error::RetrievalError;
use async_trait::async_trait;

/// Nearest-neighbor lookup over the document corpus.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// A human-readable name for logs.
    fn name(&self) -> &str;

    /// Return up to `k` passages relevant to `query`, best match first.
    ///
    /// An index that was never built returns `Ok` with an empty vector;
    /// `Err` is reserved for real query-time failures (the engine
    /// swallows those too and degrades to an empty context).
    async fn search(
        &self,
        query: &str,
        k: usize,
    ) -> std::result::Result<Vec<String>, RetrievalError>;
}
