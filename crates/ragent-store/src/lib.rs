//! ragent-store
//!
//! The chunk store (in-memory corpus plus JSON file) and the cosine
//! retriever built on top of it.

pub mod persist;
pub mod retriever;
pub mod similarity;
pub mod store;

pub use retriever::{rank, Retriever};
pub use similarity::cosine;
pub use store::{ChunkStore, Committed, SourceSummary};
