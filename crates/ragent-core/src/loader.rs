//! Document loading: text, Markdown and PDF files into fragments.
//!
//! The format is decided by file extension before any I/O happens. PDFs are
//! split per page; a parse failure anywhere in the file fails the whole load.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Fragment, SourceMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("txt") => Ok(Self::Text),
            Some("md" | "markdown") => Ok(Self::Markdown),
            Some("pdf") => Ok(Self::Pdf),
            _ => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn is_supported(path: &Path) -> bool {
        Self::from_path(path).is_ok()
    }
}

/// Load `path` into fragments attributed to `file_name`.
pub fn load_document(path: &Path, file_name: &str) -> Result<Vec<Fragment>> {
    match DocumentFormat::from_path(path)? {
        DocumentFormat::Text | DocumentFormat::Markdown => {
            let content = read_file_content(path).map_err(|e| Error::document_load(file_name, e))?;
            Ok(vec![Fragment { content, metadata: SourceMeta::new(file_name) }])
        }
        DocumentFormat::Pdf => load_pdf(path, file_name),
    }
}

fn read_file_content(file_path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(file_path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn load_pdf(path: &Path, file_name: &str) -> Result<Vec<Fragment>> {
    let doc = lopdf::Document::load(path).map_err(|e| Error::document_load(file_name, e))?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(Error::document_load(file_name, "document has no pages"));
    }
    let mut fragments = Vec::with_capacity(pages.len());
    for &page in pages.keys() {
        let content = doc
            .extract_text(&[page])
            .map_err(|e| Error::document_load(file_name, format!("page {page}: {e}")))?;
        fragments.push(Fragment { content, metadata: SourceMeta::new(file_name).with_page(page) });
    }
    debug!(file = file_name, pages = fragments.len(), "loaded pdf");
    Ok(fragments)
}

/// Supported documents directly inside `root`, sorted by path.
///
/// Paths listed in `exclude` (e.g. a co-located corpus file) are skipped.
/// A missing directory yields an empty list.
pub fn list_source_files(root: &Path, exclude: &[PathBuf]) -> Vec<PathBuf> {
    let excluded: Vec<PathBuf> = exclude.iter().map(|p| canonical(p)).collect();
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| DocumentFormat::is_supported(p))
        .filter(|p| !excluded.contains(&canonical(p)))
        .collect();
    files.sort();
    files
}

fn canonical(p: &Path) -> PathBuf {
    p.canonicalize().unwrap_or_else(|_| p.to_path_buf())
}

/// Logical source name for a file: its final path component.
pub fn source_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
