//! # clearcode-core
//!
//! Live code-activity attribution engine for Clearcode.
//!
//! This crate provides:
//! - Dirty-line tracking on the host's edit path
//! - Identity resolution through a chain of `git`/`gh` queries
//! - Repository link resolution with a per-root cache
//! - Assignment lookup and base-name matching against user bindings
//! - A timer-driven flusher that queues one report per changed line
//! - Background delivery of reports to the collector

pub mod assignments;
pub mod bindings;
mod config;
pub mod documents;
pub mod flusher;
pub mod identity;
pub mod matcher;
mod process;
pub mod remote;
pub mod repo;
pub mod report;
pub mod session;
pub mod tracker;

pub use assignments::{
    Assignment, AssignmentDirectory, AssignmentSource, FetchError, NO_ASSIGNMENTS_LABEL,
    StaticAssignments,
};
pub use bindings::{BindingError, BindingStore, JsonBindingStore, MemoryBindingStore, NOT_SET};
pub use config::{
    BindingsConfig, ClearcodeConfig, CommandsConfig, ConfigError, DEFAULT_CONFIG_FILE,
    DeliveryConfig, FlushConfig, SERVER_URL_ENV, ServerConfig,
};
pub use documents::{DocumentError, DocumentSource, OpenDocuments, Position};
pub use flusher::{FlushSummary, SessionFlusher};
pub use identity::{Identity, IdentityResolver, IdentitySource, UNKNOWN_USER};
pub use matcher::{AssignmentBinding, AssignmentMatch};
pub use process::DEFAULT_COMMAND_TIMEOUT;
pub use remote::{NO_REPO_LINK, RepoLink};
pub use repo::{GitRemoteResolver, RemoteResolver, RepoLocator};
pub use report::{
    DeliveryError, DeliveryStats, HttpReportClient, ReportClient, ReportPayload, ReportSender,
    RetryPolicy,
};
pub use session::{Collaborators, Session};
pub use tracker::{ChangeTracker, DirtyFileState, EditEvent, SharedTracker};
