//! In-memory mirror of the documents the host has open.
//!
//! The flusher asks two questions of the host at flush time: is this file
//! open, and what does line N say right now. [`DocumentSource`] is that
//! boundary. [`OpenDocuments`] is the implementation a host keeps current by
//! forwarding open, change and close notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::tracker::EditEvent;

/// Errors applying a host change to a mirrored document.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Document is not open: {}", .0.display())]
    NotOpen(PathBuf),

    #[error("Position {line}:{character} is outside the document")]
    InvalidPosition { line: usize, character: usize },

    #[error(
        "Range end {end_line}:{end_character} is before its start {start_line}:{start_character}"
    )]
    InvertedRange {
        start_line: usize,
        start_character: usize,
        end_line: usize,
        end_character: usize,
    },
}

/// A zero-based (line, character) position. Characters are Unicode scalar
/// values within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// Point-in-time copy of a document's lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    lines: Vec<String>,
}

impl DocumentSnapshot {
    /// Text of `index` without its line terminator.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }
}

/// What the flusher needs to know about host documents.
pub trait DocumentSource: Send + Sync {
    /// Current content of `path`, or `None` when it is not open.
    fn snapshot(&self, path: &Path) -> Option<DocumentSnapshot>;

    fn is_open(&self, path: &Path) -> bool {
        self.snapshot(path).is_some()
    }
}

/// Lines of one open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    lines: Vec<String>,
}

impl TextDocument {
    /// Splits `text` on `\n`; a trailing `\r` on each line is dropped.
    ///
    /// An empty text is one empty line, and a trailing newline opens a final
    /// empty line, matching how editors count lines.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: split_lines(text),
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Replaces the text between `start` and `end` with `text`.
    pub fn replace(
        &mut self,
        start: Position,
        end: Position,
        text: &str,
    ) -> Result<(), DocumentError> {
        if end < start {
            return Err(DocumentError::InvertedRange {
                start_line: start.line,
                start_character: start.character,
                end_line: end.line,
                end_character: end.character,
            });
        }
        let start_byte = self.byte_offset(start)?;
        let end_byte = self.byte_offset(end)?;

        let prefix = &self.lines[start.line][..start_byte];
        let suffix = &self.lines[end.line][end_byte..];
        let replacement = split_lines(&format!("{prefix}{text}{suffix}"));

        self.lines.splice(start.line..=end.line, replacement);
        Ok(())
    }

    fn byte_offset(&self, position: Position) -> Result<usize, DocumentError> {
        let invalid = DocumentError::InvalidPosition {
            line: position.line,
            character: position.character,
        };
        let line = self.lines.get(position.line).ok_or(invalid.clone())?;
        if position.character == line.chars().count() {
            return Ok(line.len());
        }
        line.char_indices()
            .nth(position.character)
            .map(|(byte, _)| byte)
            .ok_or(invalid)
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Open documents keyed by absolute path.
#[derive(Debug, Default)]
pub struct OpenDocuments {
    documents: RwLock<HashMap<PathBuf, TextDocument>>,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` as open with `text`, replacing any previous content.
    pub fn open(&self, path: impl Into<PathBuf>, text: &str) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), TextDocument::from_text(text));
    }

    /// Forgets `path`. Returns whether it was open.
    pub fn close(&self, path: &Path) -> bool {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some()
    }

    pub fn line(&self, path: &Path, index: usize) -> Option<String> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .and_then(|doc| doc.line(index).map(str::to_string))
    }

    /// Applies one contiguous change and describes it for the tracker.
    ///
    /// The returned event carries the pre-edit line range, the number of line
    /// breaks inserted, and the post-edit line count.
    pub fn apply_change(
        &self,
        path: &Path,
        start: Position,
        end: Position,
        text: &str,
    ) -> Result<EditEvent, DocumentError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let document = documents
            .get_mut(path)
            .ok_or_else(|| DocumentError::NotOpen(path.to_path_buf()))?;
        document.replace(start, end, text)?;

        Ok(EditEvent::from_inserted_text(
            path,
            start.line,
            end.line,
            text,
            document.line_count(),
        ))
    }
}

impl DocumentSource for OpenDocuments {
    fn snapshot(&self, path: &Path) -> Option<DocumentSnapshot> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|doc| DocumentSnapshot {
                lines: doc.lines.clone(),
            })
    }

    fn is_open(&self, path: &Path) -> bool {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_lines() -> String {
        (0..10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_line_counting() {
        assert_eq!(TextDocument::from_text("").line_count(), 1);
        assert_eq!(TextDocument::from_text("a").line_count(), 1);
        assert_eq!(TextDocument::from_text("a\n").line_count(), 2);
        assert_eq!(TextDocument::from_text("a\r\nb").line(0), Some("a"));
    }

    #[test]
    fn test_insert_two_line_breaks() {
        let docs = OpenDocuments::new();
        let path = Path::new("/work/A1.py");
        docs.open(path, &ten_lines());

        let edit = docs
            .apply_change(path, Position::new(5, 6), Position::new(5, 6), "\nfoo\nbar")
            .unwrap();

        assert_eq!(edit.start_line, 5);
        assert_eq!(edit.end_line, 5);
        assert_eq!(edit.inserted_line_count, 2);
        assert_eq!(edit.document_line_count, 12);
        assert_eq!(edit.dirty_range(), Some(5..=7));
        assert_eq!(docs.line(path, 5).as_deref(), Some("line 5"));
        assert_eq!(docs.line(path, 6).as_deref(), Some("foo"));
        assert_eq!(docs.line(path, 7).as_deref(), Some("bar"));
        assert_eq!(docs.line(path, 8).as_deref(), Some("line 6"));
    }

    #[test]
    fn test_delete_across_lines() {
        let docs = OpenDocuments::new();
        let path = Path::new("/work/A1.py");
        docs.open(path, &ten_lines());

        let edit = docs
            .apply_change(path, Position::new(2, 4), Position::new(6, 4), "")
            .unwrap();

        assert_eq!(edit.document_line_count, 6);
        assert_eq!(docs.line(path, 2).as_deref(), Some("line 6"));
        assert_eq!(edit.dirty_range(), Some(2..=5));
    }

    #[test]
    fn test_multibyte_characters() {
        let mut doc = TextDocument::from_text("héllo wörld");
        doc.replace(Position::new(0, 6), Position::new(0, 11), "rust")
            .unwrap();
        assert_eq!(doc.line(0), Some("héllo rust"));
    }

    #[test]
    fn test_invalid_positions_are_errors() {
        let mut doc = TextDocument::from_text("abc\ndef");
        assert_eq!(
            doc.replace(Position::new(5, 0), Position::new(5, 0), "x"),
            Err(DocumentError::InvalidPosition {
                line: 5,
                character: 0
            })
        );
        assert!(doc
            .replace(Position::new(0, 9), Position::new(0, 9), "x")
            .is_err());
        assert!(matches!(
            doc.replace(Position::new(1, 0), Position::new(0, 0), "x"),
            Err(DocumentError::InvertedRange { .. })
        ));
        assert_eq!(doc.line(0), Some("abc"));
    }

    #[test]
    fn test_change_to_closed_document_is_error() {
        let docs = OpenDocuments::new();
        let path = Path::new("/work/closed.py");
        docs.open(path, "x");
        assert!(docs.close(path));
        assert!(!docs.is_open(path));
        assert_eq!(
            docs.apply_change(path, Position::new(0, 0), Position::new(0, 0), "y"),
            Err(DocumentError::NotOpen(path.to_path_buf()))
        );
    }

    #[test]
    fn test_snapshot_is_detached_from_later_edits() {
        let docs = OpenDocuments::new();
        let path = Path::new("/work/a.py");
        docs.open(path, "one\ntwo");

        let snapshot = docs.snapshot(path).unwrap();
        docs.apply_change(path, Position::new(0, 0), Position::new(0, 3), "uno")
            .unwrap();

        assert_eq!(snapshot.line(0), Some("one"));
        assert_eq!(docs.line(path, 0).as_deref(), Some("uno"));
    }
}
