//! ragent-core
//!
//! Domain types, errors, configuration and the two ingestion building blocks
//! (document loading and chunking) shared by the store, the embedders and the
//! agent.

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use chunker::Chunker;
pub use error::{EmbeddingError, Error, Result};
pub use traits::EmbeddingProvider;
pub use types::{Chunk, Fragment, ScoredChunk, SourceMeta};
