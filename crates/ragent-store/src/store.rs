//! The authoritative in-memory corpus and its JSON file.
//!
//! Readers take an `Arc` snapshot and never block writers for longer than a
//! pointer swap. Adds and replacements embed first, outside the writer gate,
//! then take the gate to re-check, splice and persist, so the file always
//! holds the last corpus that was fully embedded. Rebuilds hold the gate for
//! their whole run.
//!
//! Documents added from disk are copied into the source directory under
//! their source name, so a rebuild sees the same corpus.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ragent_core::config::Settings;
use ragent_core::error::{EmbeddingError, Error, Result};
use ragent_core::loader::{list_source_files, load_document, source_name, DocumentFormat};
use ragent_core::{Chunk, Chunker, EmbeddingProvider, Fragment, SourceMeta};

use crate::persist;

/// The outcome of a mutation that is already visible in memory.
///
/// `persist_error` is set when writing the corpus file failed afterwards;
/// the mutation is not rolled back.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub persist_error: Option<Error>,
}

impl<T> Committed<T> {
    fn durable(value: T) -> Self {
        Self { value, persist_error: None }
    }

    pub fn is_durable(&self) -> bool {
        self.persist_error.is_none()
    }
}

/// Per-source line of [`ChunkStore::sources`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub chunks: usize,
    pub pages: usize,
}

pub struct ChunkStore {
    corpus_path: PathBuf,
    source_dir: PathBuf,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    corpus: RwLock<Arc<Vec<Chunk>>>,
    writer: Mutex<()>,
}

impl ChunkStore {
    pub fn new(
        corpus_path: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            corpus_path: corpus_path.into(),
            source_dir: source_dir.into(),
            chunker,
            embedder,
            timeout,
            corpus: RwLock::new(Arc::new(Vec::new())),
            writer: Mutex::new(()),
        }
    }

    /// Paths from `settings.data` are resolved against `base`.
    pub fn from_settings(
        settings: &Settings,
        base: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self::new(
            settings.data.corpus_path(base),
            settings.data.source_dir_path(base),
            Chunker::from_settings(&settings.chunking)?,
            embedder,
            settings.embedding.timeout(),
        ))
    }

    pub fn corpus_path(&self) -> &Path {
        &self.corpus_path
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub async fn snapshot(&self) -> Arc<Vec<Chunk>> {
        self.corpus.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.corpus.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.corpus.read().await.is_empty()
    }

    /// Chunk and distinct page counts per source, sorted by source name.
    pub async fn sources(&self) -> Vec<SourceSummary> {
        let snapshot = self.snapshot().await;
        let mut by_source: BTreeMap<&str, (usize, Vec<u32>)> = BTreeMap::new();
        for chunk in snapshot.iter() {
            let entry = by_source.entry(chunk.metadata.source.as_str()).or_default();
            entry.0 += 1;
            if let Some(page) = chunk.metadata.page {
                if !entry.1.contains(&page) {
                    entry.1.push(page);
                }
            }
        }
        by_source
            .into_iter()
            .map(|(source, (chunks, pages))| SourceSummary {
                source: source.to_string(),
                chunks,
                pages: pages.len(),
            })
            .collect()
    }

    /// One provider call bounded by the timeout and `cancel`, returning one
    /// vector per text.
    async fn call_provider(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        let call = tokio::time::timeout(self.timeout, self.embedder.embed_batch(texts));
        let vectors = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            res = call => res.map_err(|_| EmbeddingError::Timeout(self.timeout))??,
        };
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            ))
            .into());
        }
        Ok(vectors)
    }

    /// Embed chunk texts. The result has one non-empty vector per text, all
    /// of the same length.
    async fn embed(&self, texts: &[String], cancel: &CancellationToken) -> Result<Vec<Vec<f32>>> {
        let vectors = self.call_provider(texts, cancel).await?;
        if let Some(first) = vectors.first() {
            let dim = first.len();
            if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
                return Err(EmbeddingError::MalformedResponse(
                    "empty or non-uniform embedding vectors".into(),
                )
                .into());
            }
        }
        Ok(vectors)
    }

    /// Embed a query. Its length is not checked; a vector that does not fit
    /// the corpus scores 0 against every chunk.
    pub(crate) async fn embed_query(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        let mut vectors = self.call_provider(&[query.to_string()], cancel).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::MalformedResponse("no vector for query".into()).into())
    }

    /// Load one file off the runtime threads, bounded by the timeout and `cancel`.
    async fn load_file(
        &self,
        path: PathBuf,
        source: String,
        cancel: &CancellationToken,
    ) -> Result<Vec<Fragment>> {
        let name = source.clone();
        let task = tokio::task::spawn_blocking(move || load_document(&path, &source));
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            res = tokio::time::timeout(self.timeout, task) => match res {
                Err(_) => {
                    Err(Error::document_load(name, format!("timed out after {:?}", self.timeout)))
                }
                Ok(Err(join)) => Err(Error::document_load(name, join)),
                Ok(Ok(loaded)) => loaded,
            },
        }
    }

    fn split_fragments(&self, fragments: &[Fragment]) -> (Vec<String>, Vec<SourceMeta>) {
        let mut texts = Vec::new();
        let mut metas = Vec::new();
        for fragment in fragments {
            for piece in self.chunker.split(&fragment.content) {
                texts.push(piece);
                metas.push(fragment.metadata.clone());
            }
        }
        (texts, metas)
    }

    /// Chunk and embed `fragments` into chunks owned by `source`.
    async fn prepare(
        &self,
        fragments: &[Fragment],
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>> {
        let (texts, metas) = self.split_fragments(fragments);
        if texts.is_empty() {
            debug!(source, "no chunkable text");
            return Ok(Vec::new());
        }
        let vectors = self.embed(&texts, cancel).await?;
        Ok(texts
            .into_iter()
            .zip(metas)
            .zip(vectors)
            .enumerate()
            .map(|(i, ((text, mut metadata), embedding))| {
                metadata.source = source.to_string();
                Chunk { id: Chunk::chunk_id(source, i), text, metadata, embedding }
            })
            .collect())
    }

    /// Chunk, embed and append `fragments` under `source`, then persist.
    ///
    /// Any embedding problem rejects the whole batch with nothing committed.
    /// A source already present (exact match) is rejected with
    /// [`Error::DuplicateSource`].
    pub async fn add_chunks(
        &self,
        fragments: Vec<Fragment>,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<Committed<Vec<Chunk>>> {
        if source.is_empty() {
            return Err(Error::InvalidConfig("source name must not be empty".into()));
        }
        self.reject_duplicate(source).await?;
        let chunks = self.prepare(&fragments, source, cancel).await?;
        if chunks.is_empty() {
            return Ok(Committed::durable(chunks));
        }
        self.splice(source, chunks, Splice::Add, None, cancel).await
    }

    /// Load a file from disk, add it, and keep a copy of it in the source
    /// directory. `source` defaults to the file name.
    pub async fn add_document(
        &self,
        path: &Path,
        source: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Committed<Vec<Chunk>>> {
        let source = stored_name(path, source)?;
        self.reject_duplicate(&source).await?;
        let fragments = self.load_file(path.to_path_buf(), source.clone(), cancel).await?;
        let chunks = self.prepare(&fragments, &source, cancel).await?;
        if chunks.is_empty() {
            return Ok(Committed::durable(chunks));
        }
        self.splice(&source, chunks, Splice::Add, Some(path), cancel).await
    }

    /// Load and embed a file, then swap it in for the chunks of exactly
    /// `source` in one step. On any failure the old chunks stay.
    pub async fn replace_document(
        &self,
        path: &Path,
        source: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Committed<Vec<Chunk>>> {
        let source = stored_name(path, source)?;
        let fragments = self.load_file(path.to_path_buf(), source.clone(), cancel).await?;
        let chunks = self.prepare(&fragments, &source, cancel).await?;
        self.splice(&source, chunks, Splice::Replace, Some(path), cancel).await
    }

    async fn reject_duplicate(&self, source: &str) -> Result<()> {
        if has_source(&self.snapshot().await, source) {
            return Err(Error::DuplicateSource(source.to_string()));
        }
        Ok(())
    }

    /// Install already-embedded chunks under the writer gate.
    async fn splice(
        &self,
        source: &str,
        new_chunks: Vec<Chunk>,
        mode: Splice,
        file: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<Committed<Vec<Chunk>>> {
        let _gate = self.writer.lock().await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let current = self.snapshot().await;
        if mode == Splice::Add && has_source(&current, source) {
            return Err(Error::DuplicateSource(source.to_string()));
        }
        let kept: Vec<&Chunk> = current.iter().filter(|c| c.metadata.source != source).collect();
        if let (Some(existing), Some(added)) = (kept.first(), new_chunks.first()) {
            let (have, got) = (existing.embedding.len(), added.embedding.len());
            if have != got {
                return Err(EmbeddingError::MalformedResponse(format!(
                    "embedding length {got} does not match corpus dimensionality {have}"
                ))
                .into());
            }
        }
        if let Some(file) = file {
            self.store_file(file, source).await?;
        }
        let replaced = current.len() - kept.len();
        let mut next = Vec::with_capacity(kept.len() + new_chunks.len());
        next.extend(kept.into_iter().cloned());
        next.extend(new_chunks.iter().cloned());
        let persist_error = self.install_and_persist(next).await;
        info!(source, chunks = new_chunks.len(), replaced, "added document");
        Ok(Committed { value: new_chunks, persist_error })
    }

    async fn store_file(&self, file: &Path, name: &str) -> Result<()> {
        let (src, dir, name) = (file.to_path_buf(), self.source_dir.clone(), name.to_string());
        let err_path = self.source_dir.clone();
        tokio::task::spawn_blocking(move || persist::store_source_file(&src, &dir, &name))
            .await
            .map_err(|e| Error::persistence(err_path, e))?
    }

    /// Remove every chunk whose source contains `source`, then persist.
    ///
    /// Stored copies of the removed sources are deleted from the source
    /// directory. Zero matches leaves every file untouched.
    pub async fn remove_chunks_by_source(&self, source: &str) -> Result<Committed<usize>> {
        let _gate = self.writer.lock().await;
        let current = self.snapshot().await;
        let (gone, kept): (Vec<&Chunk>, Vec<&Chunk>) =
            current.iter().partition(|c| c.metadata.source.contains(source));
        if gone.is_empty() {
            debug!(source, "nothing to remove");
            return Ok(Committed::durable(0));
        }
        let removed = gone.len();
        let mut names: Vec<String> = gone.iter().map(|c| c.metadata.source.clone()).collect();
        names.sort();
        names.dedup();
        let kept: Vec<Chunk> = kept.into_iter().cloned().collect();
        let mut persist_error = self.install_and_persist(kept).await;

        let dir = self.source_dir.clone();
        let unlinked = tokio::task::spawn_blocking(move || {
            names.iter().try_for_each(|n| persist::remove_source_file(&dir, n))
        })
        .await
        .map_err(|e| Error::persistence(self.source_dir.clone(), e))
        .and_then(|r| r);
        if let Err(e) = unlinked {
            warn!(error = %e, "removed chunks but a stored source file remains");
            persist_error.get_or_insert(e);
        }
        info!(source, removed, "removed chunks");
        Ok(Committed { value: removed, persist_error })
    }

    /// Read and validate the corpus file without installing it.
    pub async fn restore(&self) -> Option<Vec<Chunk>> {
        let path = self.corpus_path.clone();
        match tokio::task::spawn_blocking(move || persist::read_corpus(&path)).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "corpus restore task failed");
                None
            }
        }
    }

    /// Populate an empty store from the corpus file, rebuilding from the
    /// source directory when the file is missing or invalid.
    ///
    /// Returns the corpus size. A populated store is left as is. Mutations
    /// issued meanwhile wait for the load and apply on top of it.
    pub async fn load(&self, cancel: &CancellationToken) -> Result<usize> {
        let len = self.len().await;
        if len > 0 {
            return Ok(len);
        }
        let _gate = self.writer.lock().await;
        let len = self.len().await;
        if len > 0 {
            return Ok(len);
        }
        if let Some(chunks) = self.restore().await {
            info!(path = %self.corpus_path.display(), chunks = chunks.len(), "restored corpus");
            let len = chunks.len();
            *self.corpus.write().await = Arc::new(chunks);
            return Ok(len);
        }
        let committed = self.rebuild_locked(cancel).await?;
        if let Some(e) = &committed.persist_error {
            warn!(error = %e, "rebuilt corpus was not persisted");
        }
        Ok(committed.value)
    }

    /// Replace the corpus with every supported file in the source directory.
    ///
    /// Files that fail to load are skipped; an embedding failure aborts the
    /// rebuild and keeps the previous corpus.
    pub async fn rebuild(&self, cancel: &CancellationToken) -> Result<Committed<usize>> {
        let _gate = self.writer.lock().await;
        self.rebuild_locked(cancel).await
    }

    /// Caller holds the writer gate.
    async fn rebuild_locked(&self, cancel: &CancellationToken) -> Result<Committed<usize>> {
        let files = list_source_files(&self.source_dir, &[self.corpus_path.clone()]);
        info!(dir = %self.source_dir.display(), files = files.len(), "rebuilding corpus");
        let mut next: Vec<Chunk> = Vec::new();
        for path in files {
            let Some(source) = source_name(&path) else { continue };
            let fragments = match self.load_file(path.clone(), source.clone(), cancel).await {
                Ok(f) => f,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping document");
                    continue;
                }
            };
            let (texts, metas) = self.split_fragments(&fragments);
            if texts.is_empty() {
                continue;
            }
            let vectors = self.embed(&texts, cancel).await?;
            if let (Some(have), Some(got)) = (next.first(), vectors.first()) {
                if have.embedding.len() != got.len() {
                    return Err(EmbeddingError::MalformedResponse(format!(
                        "embedding length changed from {} to {} while rebuilding",
                        have.embedding.len(),
                        got.len()
                    ))
                    .into());
                }
            }
            let embedded = texts.into_iter().zip(metas).zip(vectors).enumerate();
            for (i, ((text, metadata), embedding)) in embedded {
                next.push(Chunk { id: Chunk::chunk_id(&source, i), text, metadata, embedding });
            }
            debug!(source = %source, total = next.len(), "indexed document");
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let len = next.len();
        let persist_error = self.install_and_persist(next).await;
        info!(chunks = len, "rebuild complete");
        Ok(Committed { value: len, persist_error })
    }

    /// Write the current corpus to disk.
    pub async fn persist(&self) -> Result<()> {
        let _gate = self.writer.lock().await;
        let snapshot = self.snapshot().await;
        self.write(snapshot).await
    }

    /// Swap in `next` and write it. Caller holds the writer gate.
    async fn install_and_persist(&self, next: Vec<Chunk>) -> Option<Error> {
        let next = Arc::new(next);
        *self.corpus.write().await = next.clone();
        match self.write(next).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "corpus mutation kept in memory but not persisted");
                Some(e)
            }
        }
    }

    async fn write(&self, chunks: Arc<Vec<Chunk>>) -> Result<()> {
        let path = self.corpus_path.clone();
        let err_path = path.clone();
        tokio::task::spawn_blocking(move || persist::write_corpus(&path, &chunks))
            .await
            .map_err(|e| Error::persistence(err_path, e))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Splice {
    /// Reject a source that is already present.
    Add,
    /// Drop the chunks of exactly this source first.
    Replace,
}

fn has_source(chunks: &[Chunk], source: &str) -> bool {
    chunks.iter().any(|c| c.metadata.source == source)
}

/// The name a document is stored and indexed under: a bare file name with
/// the same format as `path`, so a rebuild reads it back unchanged.
fn stored_name(path: &Path, source: Option<&str>) -> Result<String> {
    let format = DocumentFormat::from_path(path)?;
    let name = match source {
        Some(s) => s.to_string(),
        None => source_name(path)
            .ok_or_else(|| Error::document_load(path.display().to_string(), "no file name"))?,
    };
    if !persist::is_plain_file_name(&name) {
        return Err(Error::InvalidConfig(format!("source '{name}' must be a plain file name")));
    }
    if DocumentFormat::from_path(Path::new(&name)).ok() != Some(format) {
        return Err(Error::InvalidConfig(format!(
            "source '{name}' must keep the extension of {}",
            path.display()
        )));
    }
    Ok(name)
}
