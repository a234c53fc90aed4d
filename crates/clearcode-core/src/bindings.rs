//! Assignment file bindings.
//!
//! A binding maps an assignment name to the file the student says holds that
//! assignment, as typed by them (`A1.py` or `src/A1.py`). The engine only
//! reads bindings; the host writes them when the user picks a file.
//!
//! Values are stored under `assignmentFile:<name>`. An unconfigured binding
//! reads as [`NOT_SET`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};

/// Value of a binding that was never configured or was cleared.
pub const NOT_SET: &str = "not set";

/// Storage key for `assignment_name`.
pub fn binding_key(assignment_name: &str) -> String {
    format!("assignmentFile:{assignment_name}")
}

/// Errors persisting bindings.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed bindings file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Key-value store of assignment bindings.
pub trait BindingStore: Send + Sync {
    /// The bound file for `assignment_name`, or [`NOT_SET`].
    fn get(&self, assignment_name: &str) -> String;

    /// Binds `assignment_name` to `file` and returns the stored value.
    ///
    /// `file` is trimmed; an empty value stores [`NOT_SET`].
    fn set(&self, assignment_name: &str, file: &str) -> Result<String, BindingError>;
}

fn normalize_value(file: &str) -> String {
    let trimmed = file.trim();
    if trimmed.is_empty() {
        NOT_SET.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Bindings held in memory only.
#[derive(Debug, Default)]
pub struct MemoryBindingStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BindingStore for MemoryBindingStore {
    fn get(&self, assignment_name: &str) -> String {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&binding_key(assignment_name))
            .cloned()
            .unwrap_or_else(|| NOT_SET.to_string())
    }

    fn set(&self, assignment_name: &str, file: &str) -> Result<String, BindingError> {
        let value = normalize_value(file);
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(binding_key(assignment_name), value.clone());
        Ok(value)
    }
}

/// Bindings persisted as a flat JSON object.
///
/// The file is re-read on every lookup so changes made by another process
/// (or by hand) are picked up on the next flush.
#[derive(Debug, Clone)]
pub struct JsonBindingStore {
    path: PathBuf,
}

impl JsonBindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, BindingError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(BindingError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|source| BindingError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), BindingError> {
        let io_error = |source: io::Error| BindingError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let json = serde_json::to_string_pretty(values).map_err(|source| BindingError::Json {
            path: self.path.clone(),
            source,
        })?;

        // Write-then-rename so a reader never sees a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)?;
        Ok(())
    }
}

impl BindingStore for JsonBindingStore {
    fn get(&self, assignment_name: &str) -> String {
        match self.load() {
            Ok(values) => values
                .get(&binding_key(assignment_name))
                .cloned()
                .unwrap_or_else(|| NOT_SET.to_string()),
            Err(e) => {
                warn!(error = %e, "Failed to read assignment bindings");
                NOT_SET.to_string()
            }
        }
    }

    fn set(&self, assignment_name: &str, file: &str) -> Result<String, BindingError> {
        let mut values = self.load()?;
        let value = normalize_value(file);
        values.insert(binding_key(assignment_name), value.clone());
        self.save(&values)?;
        debug!(
            assignment = assignment_name,
            file = %value,
            path = %self.path.display(),
            "Saved binding"
        );
        Ok(value)
    }
}
