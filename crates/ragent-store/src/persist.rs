//! Corpus file I/O: a single JSON array, rewritten in full on every change.
//! Also the stored copies of ingested documents in the source directory.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use ragent_core::error::{Error, Result};
use ragent_core::Chunk;

/// Read the corpus file.
///
/// `None` when the file is absent, empty, unparsable or fails
/// [`is_valid_corpus`]; the reason is logged.
pub fn read_corpus(path: &Path) -> Option<Vec<Chunk>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no corpus file");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corpus file unreadable");
            return None;
        }
    };
    let chunks: Vec<Chunk> = match serde_json::from_slice(&bytes) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corpus file is not a valid chunk array");
            return None;
        }
    };
    if !is_valid_corpus(&chunks) {
        warn!(path = %path.display(), chunks = chunks.len(), "corpus file rejected");
        return None;
    }
    Some(chunks)
}

/// Non-empty, every chunk has text, and all embeddings share one non-zero length.
pub fn is_valid_corpus(chunks: &[Chunk]) -> bool {
    let Some(first) = chunks.first() else {
        return false;
    };
    let dim = first.embedding.len();
    dim > 0 && chunks.iter().all(|c| !c.text.is_empty() && c.embedding.len() == dim)
}

/// Write `chunks` to a sibling temp file, then rename it over `path`.
pub fn write_corpus(path: &Path, chunks: &[Chunk]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| Error::persistence(path, e))?;
    let tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, chunks).map_err(|e| Error::persistence(path, e))?;
        writer.flush().map_err(|e| Error::persistence(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| Error::persistence(path, e))?;
    tmp.persist(path).map_err(|e| Error::persistence(path, e.error))?;
    debug!(path = %path.display(), chunks = chunks.len(), "corpus written");
    Ok(())
}

/// A single path component: no separators, not `.` or `..`.
pub fn is_plain_file_name(name: &str) -> bool {
    Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

/// Copy `src` into `dir` as `name`, replacing any previous copy atomically.
///
/// A `src` that already is that file is left alone.
pub fn store_source_file(src: &Path, dir: &Path, name: &str) -> Result<()> {
    let dest = dir.join(name);
    fs::create_dir_all(dir).map_err(|e| Error::persistence(&dest, e))?;
    if let (Ok(a), Ok(b)) = (src.canonicalize(), dest.canonicalize()) {
        if a == b {
            return Ok(());
        }
    }
    let mut input = fs::File::open(src).map_err(|e| Error::persistence(&dest, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(&dest, e))?;
    io::copy(&mut input, &mut tmp).map_err(|e| Error::persistence(&dest, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::persistence(&dest, e))?;
    tmp.persist(&dest).map_err(|e| Error::persistence(&dest, e.error))?;
    debug!(file = %dest.display(), "stored source file");
    Ok(())
}

/// Delete the stored copy of `name`, if there is one.
pub fn remove_source_file(dir: &Path, name: &str) -> Result<()> {
    if !is_plain_file_name(name) {
        return Ok(());
    }
    let path = dir.join(name);
    match fs::remove_file(&path) {
        Ok(()) => {
            debug!(file = %path.display(), "deleted source file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::persistence(&path, e)),
    }
}
