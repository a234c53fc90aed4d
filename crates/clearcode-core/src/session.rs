//! Session lifecycle.
//!
//! A [`Session`] owns every piece of per-process state: the resolved
//! identity, the repository link cache, the dirty-line tracker, the flush
//! timer and the delivery worker. The host creates one when it activates and
//! drops or deactivates it when it shuts down.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::assignments::{Assignment, AssignmentDirectory, AssignmentSource};
use crate::bindings::{BindingStore, JsonBindingStore};
use crate::config::ClearcodeConfig;
use crate::documents::DocumentSource;
use crate::flusher::{FlushSummary, SessionFlusher, spawn_flush_timer};
use crate::identity::{Identity, IdentityResolver};
use crate::remote::RepoLink;
use crate::repo::{GitRemoteResolver, RemoteResolver, RepoLocator};
use crate::report::{
    DeliveryStats, HttpReportClient, ReportClient, http_client, spawn_delivery_worker,
};
use crate::tracker::{DirtyFileState, EditEvent, SharedTracker};

/// The external pieces a session talks to.
pub struct Collaborators {
    pub documents: Arc<dyn DocumentSource>,
    pub bindings: Arc<dyn BindingStore>,
    pub identity: IdentityResolver,
    pub remote_resolver: Arc<dyn RemoteResolver>,
    pub assignments: Arc<dyn AssignmentSource>,
    pub report_client: Arc<dyn ReportClient>,
}

impl Collaborators {
    /// Git-, HTTP- and file-backed collaborators built from `config`.
    pub fn from_config(
        config: &ClearcodeConfig,
        workspace_root: &Path,
        documents: Arc<dyn DocumentSource>,
    ) -> Self {
        let client = http_client(config.request_timeout());
        let command_timeout = config.command_timeout();
        Self {
            documents,
            bindings: Arc::new(JsonBindingStore::new(config.bindings_path(workspace_root))),
            identity: IdentityResolver::with_default_sources(command_timeout),
            remote_resolver: Arc::new(GitRemoteResolver::new(command_timeout)),
            assignments: Arc::new(AssignmentDirectory::new(
                client.clone(),
                &config.server.base_url,
            )),
            report_client: Arc::new(HttpReportClient::new(client, &config.server.base_url)),
        }
    }
}

/// An activated engine instance.
pub struct Session {
    workspace_root: PathBuf,
    identity: Identity,
    assignments: Vec<Assignment>,
    tracker: SharedTracker,
    repo: Arc<RepoLocator>,
    flusher: Arc<SessionFlusher>,
    timer: JoinHandle<()>,
    worker: JoinHandle<DeliveryStats>,
}

impl Session {
    /// Resolves the identity, fetches the assignment list once, and starts
    /// the delivery worker and the flush timer.
    ///
    /// Never fails: an unresolved identity becomes `unknown-user` and a failed
    /// fetch an empty assignment list.
    pub async fn activate(
        config: &ClearcodeConfig,
        workspace_root: impl Into<PathBuf>,
        collaborators: Collaborators,
    ) -> Self {
        let workspace_root = workspace_root.into();
        let Collaborators {
            documents,
            bindings,
            identity,
            remote_resolver,
            assignments,
            report_client,
        } = collaborators;

        let identity = identity.resolve(&workspace_root).await;
        info!(identity = %identity, workspace = %workspace_root.display(), "Session activated");

        let assignments = assignments.fetch(&identity).await;
        let tracker = SharedTracker::new();
        let repo = Arc::new(RepoLocator::new(remote_resolver));
        let (reports, worker) = spawn_delivery_worker(
            report_client,
            config.retry_policy(),
            config.delivery.queue_capacity,
        );

        let flusher = Arc::new(SessionFlusher::new(
            tracker.clone(),
            documents,
            repo.clone(),
            bindings,
            assignments.clone(),
            identity.clone(),
            reports,
        ));
        let timer = spawn_flush_timer(flusher.clone(), config.flush_interval());

        Self {
            workspace_root,
            identity,
            assignments,
            tracker,
            repo,
            flusher,
            timer,
            worker,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Assignments fetched at activation.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Records an edit. Safe to call from the host's edit callback.
    pub fn record_edit(&self, edit: &EditEvent) -> usize {
        self.tracker.record(edit)
    }

    /// Dirty lines waiting for the next flush.
    pub fn pending(&self) -> DirtyFileState {
        self.tracker.snapshot()
    }

    /// Runs a flush cycle now, independently of the timer.
    pub async fn flush_now(&self) -> FlushSummary {
        self.flusher.flush().await
    }

    pub async fn repo_link(&self, file_path: &Path) -> RepoLink {
        self.repo.resolve_link(file_path).await
    }

    /// Stops the timer and the delivery worker. Queued and in-flight reports
    /// are abandoned.
    pub fn deactivate(self) {
        let pending = self.tracker.snapshot().len();
        info!(pending_files = pending, "Session deactivated");
        // Drop aborts both tasks.
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.timer.abort();
        self.worker.abort();
    }
}
