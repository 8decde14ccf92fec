//! Document retrieval for Nebula.
//!
//! Turns a directory of company documents into a similarity index the
//! turn engine can query for context. The corpus is split into
//! overlapping chunks which are embedded through the provider at build
//! time. The engine only sees the `nebula_core::Retriever` trait that
//! `DocumentIndex` implements.

pub mod chunker;
pub mod corpus;
pub mod index;

pub use chunker::TextChunker;
pub use corpus::{Document, load_corpus};
pub use index::{DocumentIndex, cosine_similarity};
