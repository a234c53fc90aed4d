//! Periodic flush of dirty lines into report payloads.
//!
//! A cycle drains the tracker first and works on the drained copy, so the
//! edit path is never blocked behind repository lookups. Edits recorded while
//! a cycle is running belong to the next one. Everything drained is gone once
//! the cycle ends, whether or not its payloads were delivered.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::assignments::Assignment;
use crate::bindings::BindingStore;
use crate::documents::DocumentSource;
use crate::identity::Identity;
use crate::matcher::{bindings_for, match_file};
use crate::repo::RepoLocator;
use crate::report::{ReportPayload, ReportSender, timestamp_now};
use crate::tracker::SharedTracker;

/// Counts from one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Files drained from the tracker.
    pub files: usize,
    pub files_not_open: usize,
    pub lines_examined: usize,
    /// Dirty lines past the end of the document at flush time.
    pub lines_out_of_range: usize,
    pub reports_submitted: usize,
    pub reports_dropped: usize,
}

/// Drains dirty state and turns it into report payloads.
pub struct SessionFlusher {
    tracker: SharedTracker,
    documents: Arc<dyn DocumentSource>,
    repo: Arc<RepoLocator>,
    bindings: Arc<dyn BindingStore>,
    assignments: Vec<Assignment>,
    identity: Identity,
    reports: ReportSender,
}

impl SessionFlusher {
    pub fn new(
        tracker: SharedTracker,
        documents: Arc<dyn DocumentSource>,
        repo: Arc<RepoLocator>,
        bindings: Arc<dyn BindingStore>,
        assignments: Vec<Assignment>,
        identity: Identity,
        reports: ReportSender,
    ) -> Self {
        Self {
            tracker,
            documents,
            repo,
            bindings,
            assignments,
            identity,
            reports,
        }
    }

    /// Runs one cycle.
    pub async fn flush(&self) -> FlushSummary {
        let dirty = self.tracker.drain();
        if dirty.is_empty() {
            return FlushSummary::default();
        }

        // Bindings are re-read every cycle; the user may have changed them.
        let bindings = bindings_for(&self.assignments, self.bindings.as_ref());
        let mut summary = FlushSummary {
            files: dirty.len(),
            ..FlushSummary::default()
        };

        for (path, lines) in dirty.into_entries() {
            let Some(document) = self.documents.snapshot(&path) else {
                info!(file = %path.display(), "Skipping dirty file (not open)");
                summary.files_not_open += 1;
                continue;
            };

            let link = self.repo.resolve_link(&path).await;
            let matches = match_file(&path, &bindings);
            let file_name = file_name(&path);

            for line in lines {
                summary.lines_examined += 1;
                let Some(content) = document.line(line) else {
                    debug!(file = %path.display(), line, "Dirty line no longer exists");
                    summary.lines_out_of_range += 1;
                    continue;
                };

                for hit in &matches {
                    let payload = ReportPayload {
                        assignment_id: hit.assignment_id.clone(),
                        identity: self.identity.to_string(),
                        repo_link: link.to_string(),
                        file_name: file_name.clone(),
                        line_number: line + 1,
                        line_content: content.to_string(),
                        updated_at: timestamp_now(),
                    };
                    debug!(
                        assignment = %hit.assignment_name,
                        file = %file_name,
                        line = line + 1,
                        "Submitting line change"
                    );
                    if self.reports.submit(payload).await {
                        summary.reports_submitted += 1;
                    } else {
                        summary.reports_dropped += 1;
                    }
                }
            }
        }

        info!(
            files = summary.files,
            not_open = summary.files_not_open,
            lines = summary.lines_examined,
            submitted = summary.reports_submitted,
            dropped = summary.reports_dropped,
            "Flush complete"
        );
        summary
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Runs [`SessionFlusher::flush`] every `period`, first one `period` from now.
pub fn spawn_flush_timer(flusher: Arc<SessionFlusher>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            flusher.flush().await;
        }
    })
}
