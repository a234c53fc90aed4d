//! Dirty-line tracking for edited documents.
//!
//! [`ChangeTracker::on_edit`] runs inside the host's edit notification and
//! must stay cheap: it only computes a line range and unions it into an
//! in-memory set. Nothing here blocks or touches the filesystem.

use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A single contiguous replacement reported by the host.
///
/// Line numbers are zero-based and refer to the document before the edit;
/// `document_line_count` is the line count after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEvent {
    /// Absolute path of the edited document.
    pub path: PathBuf,

    /// First line of the replaced range.
    pub start_line: usize,

    /// Last line of the replaced range.
    pub end_line: usize,

    /// Number of line breaks in the inserted text.
    pub inserted_line_count: usize,

    /// Lines in the document once the edit is applied.
    pub document_line_count: usize,
}

impl EditEvent {
    /// Builds an event from the inserted text, counting its line breaks.
    pub fn from_inserted_text(
        path: impl Into<PathBuf>,
        start_line: usize,
        end_line: usize,
        inserted_text: &str,
        document_line_count: usize,
    ) -> Self {
        Self {
            path: path.into(),
            start_line,
            end_line,
            inserted_line_count: inserted_text.matches('\n').count(),
            document_line_count,
        }
    }

    /// Lines this edit leaves dirty:
    /// `[start, min(last_line, max(end + inserted, start))]`.
    ///
    /// `None` when the range is empty, which happens for an empty document or
    /// when the edit starts past the document's last line.
    pub fn dirty_range(&self) -> Option<RangeInclusive<usize>> {
        let last_line = self.document_line_count.checked_sub(1)?;
        let reach = (self.end_line + self.inserted_line_count).max(self.start_line);
        let last = last_line.min(reach);
        (self.start_line <= last).then_some(self.start_line..=last)
    }
}

/// Dirty line indices per file, in the order files were first edited.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirtyFileState {
    order: Vec<PathBuf>,
    lines: HashMap<PathBuf, BTreeSet<usize>>,
}

impl DirtyFileState {
    /// Marks one line. Marking a line twice has no further effect.
    pub fn mark(&mut self, path: &Path, line: usize) {
        if let Some(lines) = self.lines.get_mut(path) {
            lines.insert(line);
            return;
        }
        self.order.push(path.to_path_buf());
        self.lines.insert(path.to_path_buf(), BTreeSet::from([line]));
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of files with at least one dirty line.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Dirty lines of `path`, ascending.
    pub fn lines_for(&self, path: &Path) -> Option<&BTreeSet<usize>> {
        self.lines.get(path)
    }

    /// Files and their dirty lines, in first-edit order.
    #[cfg(test)]
    pub fn files(&self) -> impl Iterator<Item = (&Path, &BTreeSet<usize>)> {
        self.order
            .iter()
            .filter_map(|path| self.lines.get(path).map(|lines| (path.as_path(), lines)))
    }

    /// Consumes the state into `(file, lines)` pairs in first-edit order.
    pub fn into_entries(mut self) -> Vec<(PathBuf, BTreeSet<usize>)> {
        self.order
            .into_iter()
            .filter_map(|path| {
                let lines = self.lines.remove(&path)?;
                Some((path, lines))
            })
            .collect()
    }
}

/// Owns the dirty state between flushes.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    state: DirtyFileState,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one edit and returns how many lines it touched.
    pub fn on_edit(&mut self, edit: &EditEvent) -> usize {
        let Some(range) = edit.dirty_range() else {
            return 0;
        };
        let touched = range.clone().count();
        for line in range {
            self.state.mark(&edit.path, line);
        }
        touched
    }

    pub fn state(&self) -> &DirtyFileState {
        &self.state
    }

    /// Takes every dirty entry, leaving the tracker clean.
    pub fn drain(&mut self) -> DirtyFileState {
        std::mem::take(&mut self.state)
    }
}

/// Tracker shared between the edit path and the flusher.
///
/// The lock is held only for a set union or for the drain swap.
#[derive(Debug, Clone, Default)]
pub struct SharedTracker {
    inner: Arc<Mutex<ChangeTracker>>,
}

impl SharedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, edit: &EditEvent) -> usize {
        self.lock().on_edit(edit)
    }

    pub fn drain(&self) -> DirtyFileState {
        self.lock().drain()
    }

    /// Copy of the current dirty state.
    pub fn snapshot(&self) -> DirtyFileState {
        self.lock().state().clone()
    }

    pub fn is_clean(&self) -> bool {
        self.lock().state().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, ChangeTracker> {
        // A panic mid-union leaves a valid set behind, so poisoning is ignored.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(start: usize, end: usize, inserted: usize, line_count: usize) -> EditEvent {
        EditEvent {
            path: PathBuf::from("/work/A1.py"),
            start_line: start,
            end_line: end,
            inserted_line_count: inserted,
            document_line_count: line_count,
        }
    }

    fn dirty_lines(tracker: &ChangeTracker, path: &str) -> Vec<usize> {
        tracker
            .state()
            .lines_for(Path::new(path))
            .map(|lines| lines.iter().copied().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_single_line_insert_with_two_new_lines() {
        let mut tracker = ChangeTracker::new();
        tracker.on_edit(&edit(5, 5, 2, 10));
        assert_eq!(dirty_lines(&tracker, "/work/A1.py"), vec![5, 6, 7]);
    }

    #[test]
    fn test_plain_typing_marks_one_line() {
        let mut tracker = ChangeTracker::new();
        assert_eq!(tracker.on_edit(&edit(3, 3, 0, 10)), 1);
        assert_eq!(dirty_lines(&tracker, "/work/A1.py"), vec![3]);
    }

    #[test]
    fn test_multi_line_replacement_collapsing_to_one_line() {
        // Lines 2..=6 replaced by a single line: document shrank from 10 to 6.
        let mut tracker = ChangeTracker::new();
        tracker.on_edit(&edit(2, 6, 0, 6));
        assert_eq!(dirty_lines(&tracker, "/work/A1.py"), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_range_is_clamped_to_last_line() {
        let mut tracker = ChangeTracker::new();
        tracker.on_edit(&edit(8, 9, 5, 10));
        assert_eq!(dirty_lines(&tracker, "/work/A1.py"), vec![8, 9]);
    }

    #[test]
    fn test_edit_past_document_end_marks_nothing() {
        let mut tracker = ChangeTracker::new();
        assert_eq!(tracker.on_edit(&edit(12, 12, 0, 10)), 0);
        assert!(tracker.state().is_empty());
    }

    #[test]
    fn test_empty_document_marks_nothing() {
        assert!(edit(0, 0, 0, 0).dirty_range().is_none());
    }

    #[test]
    fn test_dirty_range_formula_holds_exhaustively() {
        for line_count in 0..8usize {
            for start in 0..8usize {
                for end in start..8usize {
                    for inserted in 0..4usize {
                        let expected: Vec<usize> = match line_count.checked_sub(1) {
                            Some(last_line) => {
                                let last = last_line.min((end + inserted).max(start));
                                (start..=last).collect()
                            }
                            None => Vec::new(),
                        };
                        let actual: Vec<usize> = edit(start, end, inserted, line_count)
                            .dirty_range()
                            .map(|range| range.collect())
                            .unwrap_or_default();
                        assert_eq!(
                            actual, expected,
                            "start={start} end={end} inserted={inserted} lines={line_count}"
                        );
                        assert!(actual.iter().all(|line| *line < line_count));
                    }
                }
            }
        }
    }

    #[test]
    fn test_marking_is_idempotent() {
        let mut tracker = ChangeTracker::new();
        tracker.on_edit(&edit(4, 4, 0, 10));
        tracker.on_edit(&edit(4, 4, 0, 10));
        tracker.on_edit(&edit(3, 5, 0, 10));
        assert_eq!(dirty_lines(&tracker, "/work/A1.py"), vec![3, 4, 5]);
    }

    #[test]
    fn test_from_inserted_text_counts_line_breaks() {
        let event = EditEvent::from_inserted_text("/work/a.py", 1, 1, "x\ny\nz", 10);
        assert_eq!(event.inserted_line_count, 2);
        let event = EditEvent::from_inserted_text("/work/a.py", 1, 1, "abc", 10);
        assert_eq!(event.inserted_line_count, 0);
    }

    #[test]
    fn test_files_iterate_in_first_edit_order() {
        let mut state = DirtyFileState::default();
        state.mark(Path::new("/b.py"), 1);
        state.mark(Path::new("/a.py"), 7);
        state.mark(Path::new("/b.py"), 0);
        state.mark(Path::new("/c.py"), 2);

        let files: Vec<&Path> = state.files().map(|(path, _)| path).collect();
        assert_eq!(
            files,
            vec![Path::new("/b.py"), Path::new("/a.py"), Path::new("/c.py")]
        );

        let entries = state.into_entries();
        assert_eq!(entries[0].1.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_drain_leaves_tracker_clean() {
        let shared = SharedTracker::new();
        shared.record(&edit(1, 1, 0, 5));
        assert!(!shared.is_clean());

        let drained = shared.drain();
        assert_eq!(drained.len(), 1);
        assert!(shared.is_clean());
        assert!(shared.drain().is_empty());
    }
}
