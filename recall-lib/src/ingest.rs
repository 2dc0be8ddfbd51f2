//! Document loading and splitting
//!
//! Splits Markdown and plain-text files into overlapping windows so they can
//! be indexed. Windows prefer to end on a paragraph break, then on a sentence
//! end, inside the last [`BREAK_SEARCH`] characters of the window.
//!
//! Every chunk gets the id `<source>#<index>` and the metadata keys `source`,
//! `chunk_index` and `total_chunks`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::candidate::{Metadata, MetadataValue};
use crate::store::Document;
use crate::{Error, Result};

/// Bytes at the end of a window searched for a natural break
pub const BREAK_SEARCH: usize = 200;

const EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// Fixed-size splitter with overlap and natural break points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splitter {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Splitter {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            overlap: 200,
        }
    }
}

impl Splitter {
    /// Create a splitter. `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into trimmed, non-empty pieces.
    ///
    /// Text no longer than one window comes back whole.
    #[must_use]
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if text.len() <= self.chunk_size {
            let whole = text.trim();
            return if whole.is_empty() { Vec::new() } else { vec![whole] };
        }

        let mut pieces = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let mut end = floor_boundary(text, start + self.chunk_size);
            if end <= start {
                // window narrower than the next character
                end = start + text[start..].chars().next().map_or(1, char::len_utf8);
            }
            let last = end >= text.len();

            if !last {
                let search_start = floor_boundary(text, end.saturating_sub(BREAK_SEARCH).max(start));
                let window = &text[search_start..end];
                // a break at the very start of the search window is ignored
                let brk = window
                    .rfind("\n\n")
                    .filter(|&i| i > 0)
                    .or_else(|| window.rfind(". ").filter(|&i| i > 0));
                if let Some(i) = brk {
                    end = search_start + i + 2;
                }
            }

            let piece = text[start..end].trim();
            if !piece.is_empty() {
                pieces.push(piece);
            }
            if last {
                break;
            }

            let next = floor_boundary(text, end.saturating_sub(self.overlap));
            start = if next > start { next } else { end };
        }

        pieces
    }

    /// Split one source into documents with ids and chunk metadata.
    #[must_use]
    pub fn split(&self, source: &str, text: &str) -> Vec<Document> {
        let pieces = self.split_text(text);
        let total = pieces.len();

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, piece)| {
                let mut metadata = Metadata::new();
                metadata.insert("source".to_string(), MetadataValue::from(source));
                metadata.insert("chunk_index".to_string(), MetadataValue::from(index));
                metadata.insert("total_chunks".to_string(), MetadataValue::from(total));

                Document {
                    id: format!("{source}#{index}"),
                    text: piece.to_string(),
                    metadata,
                }
            })
            .collect()
    }

    /// Load a file, or every Markdown/text file under a directory, as documents.
    ///
    /// Files in a directory are read in path order and named by their path
    /// relative to it, so ids stay stable between runs.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<Vec<Document>> {
        let path = path.as_ref();

        if path.is_file() {
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::Ingest(format!("no file name in {}", path.display())))?;
            return self.load_file(path, &source);
        }
        if !path.is_dir() {
            return Err(Error::Ingest(format!("{} is not a file or directory", path.display())));
        }

        let mut files = Vec::new();
        collect_files(path, &mut files)?;
        files.sort();

        let mut documents = Vec::new();
        for file in &files {
            let relative = file.strip_prefix(path).unwrap_or(file);
            let source = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            documents.extend(self.load_file(file, &source)?);
        }

        tracing::info!(
            path = %path.display(),
            files = files.len(),
            chunks = documents.len(),
            "corpus loaded"
        );
        Ok(documents)
    }

    fn load_file(&self, path: &Path, source: &str) -> Result<Vec<Document>> {
        let text = fs::read_to_string(path)?;
        let documents = self.split(source, &text);
        tracing::debug!(source, chunks = documents.len(), "file split");
        Ok(documents)
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if is_text_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Largest char boundary at or below `index`, clamped to the text length.
fn floor_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
