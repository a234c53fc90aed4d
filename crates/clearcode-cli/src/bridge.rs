//! Host event bridge.
//!
//! A host (editor plugin, test harness) drives `clearcode run` by writing one
//! JSON object per line to stdin:
//!
//! ```text
//! {"type":"open","path":"src/A1.py","text":"..."}
//! {"type":"change","path":"src/A1.py","start":{"line":3,"character":0},"end":{"line":3,"character":4},"text":"..."}
//! {"type":"close","path":"src/A1.py"}
//! {"type":"flush"}
//! ```
//!
//! Relative paths resolve against the workspace root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clearcode_core::{
    ClearcodeConfig, Collaborators, NO_ASSIGNMENTS_LABEL, OpenDocuments, Position, Session,
};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// One host notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostMessage {
    Open {
        path: PathBuf,
        #[serde(default)]
        text: String,
    },
    Change {
        path: PathBuf,
        start: Position,
        end: Position,
        #[serde(default)]
        text: String,
    },
    Close {
        path: PathBuf,
    },
    Flush,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_message(line: &str) -> Result<Option<HostMessage>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Applies host messages to a session and its document mirror.
pub struct Bridge {
    session: Session,
    documents: Arc<OpenDocuments>,
}

impl Bridge {
    pub fn new(session: Session, documents: Arc<OpenDocuments>) -> Self {
        Self { session, documents }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.session.workspace_root().join(path)
    }

    pub async fn handle(&self, message: HostMessage) {
        match message {
            HostMessage::Open { path, text } => {
                let path = self.resolve(&path);
                debug!(file = %path.display(), "Document opened");
                self.documents.open(path, &text);
            }
            HostMessage::Change {
                path,
                start,
                end,
                text,
            } => {
                let path = self.resolve(&path);
                match self.documents.apply_change(&path, start, end, &text) {
                    Ok(edit) => {
                        self.session.record_edit(&edit);
                    }
                    Err(e) => warn!(file = %path.display(), error = %e, "Ignoring change"),
                }
            }
            HostMessage::Close { path } => {
                let path = self.resolve(&path);
                if !self.documents.close(&path) {
                    debug!(file = %path.display(), "Close for a document that was not open");
                }
            }
            HostMessage::Flush => {
                self.session.flush_now().await;
            }
        }
    }

    /// Parses and handles one input line; malformed lines are logged and skipped.
    pub async fn handle_line(&self, line: &str) {
        match parse_message(line) {
            Ok(Some(message)) => self.handle(message).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Skipping malformed host message"),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

/// Activates a session and feeds it stdin until EOF or Ctrl-C.
pub async fn run(config: &ClearcodeConfig, workspace: &Path) -> Result<()> {
    let documents = Arc::new(OpenDocuments::new());
    let collaborators = Collaborators::from_config(config, workspace, documents.clone());
    let session = Session::activate(config, workspace, collaborators).await;
    let bridge = Bridge::new(session, documents);

    let assignments = bridge.session().assignments();
    if assignments.is_empty() {
        info!("{}", NO_ASSIGNMENTS_LABEL);
    }
    for assignment in assignments {
        info!(id = %assignment.id, name = %assignment.name, "Assignment");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => bridge.handle_line(&line).await,
                Ok(None) => {
                    debug!("Host input closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read host input");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    bridge.into_session().deactivate();
    Ok(())
}
