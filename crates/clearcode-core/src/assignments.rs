//! Assignment list lookup.
//!
//! At startup the engine asks the collector which assignments the current
//! identity has. A failed lookup is never fatal: it degrades to an empty list
//! and the host shows [`NO_ASSIGNMENTS_LABEL`] instead.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::identity::Identity;

/// Placeholder the host lists when the identity has no assignments.
pub const NO_ASSIGNMENTS_LABEL: &str = "No Assignments Found";

/// Path of the assignment lookup endpoint, relative to the collector base URL.
pub const BY_IDENTITY_PATH: &str = "/api/v1/assignments/by-github-id";

/// An assignment the identity participates in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub name: String,
}

impl Assignment {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Accepts ids sent either as JSON strings or numbers.
fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleId {
        String(String),
        Number(serde_json::Number),
    }

    Ok(match FlexibleId::deserialize(deserializer)? {
        FlexibleId::String(s) => s,
        FlexibleId::Number(n) => n.to_string(),
    })
}

/// Accepts the `assignments` field as a list of `{id, name}` objects or as
/// the older `{name: id}` object.
fn deserialize_assignment_list<'de, D>(deserializer: D) -> Result<Vec<Assignment>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct FlexibleEntry(#[serde(deserialize_with = "deserialize_flexible_id")] String);

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AssignmentList {
        List(Vec<Assignment>),
        ByName(BTreeMap<String, FlexibleEntry>),
    }

    let list = Option::<AssignmentList>::deserialize(deserializer)?;
    Ok(match list {
        Some(AssignmentList::List(list)) => list,
        Some(AssignmentList::ByName(map)) => map
            .into_iter()
            .map(|(name, FlexibleEntry(id))| Assignment { id, name })
            .collect(),
        None => Vec::new(),
    })
}

#[derive(Debug, Deserialize)]
struct AssignmentsResponse {
    #[serde(default, deserialize_with = "deserialize_assignment_list")]
    assignments: Vec<Assignment>,
}

/// Errors fetching the assignment list. Callers of [`AssignmentSource::fetch`]
/// never see these; they are logged and replaced by an empty list.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),
}

/// Where the assignment list comes from.
#[async_trait]
pub trait AssignmentSource: Send + Sync {
    /// Assignments for `identity`; empty when unavailable.
    async fn fetch(&self, identity: &Identity) -> Vec<Assignment>;
}

/// Fetches assignments from the collector's HTTP API.
#[derive(Debug, Clone)]
pub struct AssignmentDirectory {
    client: reqwest::Client,
    url: String,
}

impl AssignmentDirectory {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), BY_IDENTITY_PATH),
        }
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self::new(crate::report::http_client(timeout), base_url)
    }

    async fn try_fetch(&self, identity: &Identity) -> Result<Vec<Assignment>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("identity", identity.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: AssignmentsResponse = response.json().await?;
        Ok(body.assignments)
    }
}

#[async_trait]
impl AssignmentSource for AssignmentDirectory {
    async fn fetch(&self, identity: &Identity) -> Vec<Assignment> {
        match self.try_fetch(identity).await {
            Ok(assignments) => {
                info!(
                    identity = %identity,
                    count = assignments.len(),
                    "Fetched assignments"
                );
                debug!(?assignments, "Assignment list");
                assignments
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Failed to fetch assignments");
                Vec::new()
            }
        }
    }
}

/// A fixed assignment list.
#[derive(Debug, Clone, Default)]
pub struct StaticAssignments(pub Vec<Assignment>);

#[async_trait]
impl AssignmentSource for StaticAssignments {
    async fn fetch(&self, _identity: &Identity) -> Vec<Assignment> {
        self.0.clone()
    }
}
