//! Domain types shared by the loader, the chunk store and the retriever.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Where a piece of text came from.
///
/// `source` is the logical file name and the identity used for removal.
/// `page` is only set for paginated formats (PDF), starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl SourceMeta {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), page: None }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// A loaded section of a document prior to chunking (a whole text file or one PDF page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub content: String,
    pub metadata: SourceMeta,
}

/// An embedded span of document text, as held by the chunk store and
/// written to the corpus file.
///
/// - `id`: `<source>#<ordinal>`, ordinal relative to the add batch
/// - `text`: the literal chunk content, never empty
/// - `embedding`: same length for every chunk in one corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: SourceMeta,
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn chunk_id(source: &str, ordinal: usize) -> ChunkId {
        format!("{source}#{ordinal}")
    }
}

/// A retrieval result. Higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
