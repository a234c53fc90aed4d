//! Matching dirty files against assignment bindings.
//!
//! Matching compares base names only: a binding of `src/A1.py` matches any
//! edited `A1.py`, whatever directory it lives in. Several bindings may share
//! a base name, in which case a file matches all of them.

use std::path::Path;

use crate::assignments::Assignment;
use crate::bindings::{BindingStore, NOT_SET};

/// An assignment together with the file the user bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentBinding {
    pub assignment: Assignment,
    pub file: String,
}

impl AssignmentBinding {
    pub fn new(assignment: Assignment, file: impl Into<String>) -> Self {
        Self {
            assignment,
            file: file.into(),
        }
    }

    pub fn is_set(&self) -> bool {
        let file = self.file.trim();
        !file.is_empty() && file != NOT_SET
    }
}

/// A binding hit for one dirty file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentMatch {
    pub assignment_id: String,
    pub assignment_name: String,
}

/// Reads the current binding of every assignment.
pub fn bindings_for(
    assignments: &[Assignment],
    store: &dyn BindingStore,
) -> Vec<AssignmentBinding> {
    assignments
        .iter()
        .map(|assignment| {
            let file = store.get(&assignment.name);
            AssignmentBinding::new(assignment.clone(), file)
        })
        .collect()
}

/// Every binding whose base name equals the base name of `path`.
pub fn match_file(path: &Path, bindings: &[AssignmentBinding]) -> Vec<AssignmentMatch> {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return Vec::new();
    };

    bindings
        .iter()
        .filter(|binding| binding.is_set() && base_name(&binding.file) == name)
        .map(|binding| AssignmentMatch {
            assignment_id: binding.assignment.id.clone(),
            assignment_name: binding.assignment.name.clone(),
        })
        .collect()
}

/// Final component of a user-entered path; both separators are accepted.
pub fn base_name(stored: &str) -> &str {
    let stored = stored.trim().trim_end_matches(['/', '\\']);
    stored.rsplit(['/', '\\']).next().unwrap_or(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::MemoryBindingStore;

    fn binding(id: &str, name: &str, file: &str) -> AssignmentBinding {
        AssignmentBinding::new(Assignment::new(id, name), file)
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("A1.py"), "A1.py");
        assert_eq!(base_name("src/hw/A1.py"), "A1.py");
        assert_eq!(base_name("src\\hw\\A1.py"), "A1.py");
        assert_eq!(base_name(" ./A1.py "), "A1.py");
        assert_eq!(base_name("src/"), "src");
    }

    #[test]
    fn test_matches_by_base_name() {
        let bindings = vec![binding("112", "HW1", "A1.py"), binding("113", "HW2", "A2.py")];
        let hits = match_file(Path::new("/home/alice/course/A1.py"), &bindings);
        assert_eq!(
            hits,
            vec![AssignmentMatch {
                assignment_id: "112".to_string(),
                assignment_name: "HW1".to_string(),
            }]
        );
    }

    #[test]
    fn test_directory_is_ignored() {
        let bindings = vec![binding("112", "HW1", "week1/A1.py")];
        assert_eq!(match_file(Path::new("/elsewhere/A1.py"), &bindings).len(), 1);
    }

    #[test]
    fn test_two_bindings_with_same_base_name_both_match() {
        let bindings = vec![
            binding("112", "HW1", "A1.py"),
            binding("221", "Lab 1", "labs/A1.py"),
        ];
        let hits = match_file(Path::new("/work/A1.py"), &bindings);
        let ids: Vec<&str> = hits.iter().map(|hit| hit.assignment_id.as_str()).collect();
        assert_eq!(ids, vec!["112", "221"]);
    }

    #[test]
    fn test_unset_bindings_never_match() {
        let bindings = vec![binding("1", "HW1", NOT_SET), binding("2", "HW2", "  ")];
        assert!(match_file(Path::new("/work/not set"), &bindings).is_empty());
        assert!(match_file(Path::new("/work/A1.py"), &bindings).is_empty());
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let bindings = vec![binding("1", "HW1", "a1.py")];
        assert!(match_file(Path::new("/work/A1.py"), &bindings).is_empty());
    }

    #[test]
    fn test_bindings_for_reads_store() {
        let store = MemoryBindingStore::new();
        store.set("HW1", "A1.py").unwrap();
        let assignments = vec![Assignment::new("112", "HW1"), Assignment::new("113", "HW2")];

        let bindings = bindings_for(&assignments, &store);

        assert_eq!(bindings[0].file, "A1.py");
        assert!(bindings[0].is_set());
        assert_eq!(bindings[1].file, NOT_SET);
        assert!(!bindings[1].is_set());
    }
}
