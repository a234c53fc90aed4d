//! Zero-input identity resolution.
//!
//! The identity names whoever is editing in this workspace. It is derived from
//! the first source in the chain that answers:
//!
//! 1. the owner of an SSH GitHub `origin` remote (`git@github.com:OWNER/...`)
//! 2. the login of an authenticated GitHub CLI session (`gh api user`)
//! 3. `git config user.name`, then `git config user.email`
//!
//! When every source is silent the identity is [`UNKNOWN_USER`]. The result
//! is memoized by [`IdentityResolver`] for the lifetime of the resolver:
//! a remote or git config changed afterwards is not observed.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::process::{self, DEFAULT_COMMAND_TIMEOUT};
use crate::remote::ssh_remote_owner;

/// Identity used when no source yields a name.
pub const UNKNOWN_USER: &str = "unknown-user";

/// A whitespace-free user name, usable as a key by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Strips every whitespace character from `raw`.
    ///
    /// Returns `None` if nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if stripped.is_empty() {
            None
        } else {
            Some(Self(stripped))
        }
    }

    /// The [`UNKNOWN_USER`] sentinel.
    pub fn unknown() -> Self {
        Self(UNKNOWN_USER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_USER
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One link in the identity fallback chain.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Returns a raw candidate name, or `None` if this source has nothing.
    async fn probe(&self, workspace_root: &Path) -> Option<String>;
}

/// Owner of the workspace's SSH `origin` remote.
#[derive(Debug, Clone)]
pub struct SshRemoteIdentity {
    timeout: Duration,
}

impl SshRemoteIdentity {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl IdentitySource for SshRemoteIdentity {
    fn name(&self) -> &'static str {
        "ssh-remote"
    }

    async fn probe(&self, workspace_root: &Path) -> Option<String> {
        let remote = process::query(
            "git",
            &["remote", "get-url", "origin"],
            workspace_root,
            self.timeout,
        )
        .await?;
        ssh_remote_owner(&remote).map(str::to_string)
    }
}

/// Login of the authenticated GitHub CLI user.
#[derive(Debug, Clone)]
pub struct GhCliIdentity {
    timeout: Duration,
}

impl GhCliIdentity {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl IdentitySource for GhCliIdentity {
    fn name(&self) -> &'static str {
        "gh-cli"
    }

    async fn probe(&self, workspace_root: &Path) -> Option<String> {
        process::query(
            "gh",
            &["api", "user", "-q", ".login"],
            workspace_root,
            self.timeout,
        )
        .await
    }
}

/// A single `git config` value such as `user.name`.
#[derive(Debug, Clone)]
pub struct GitConfigIdentity {
    key: &'static str,
    timeout: Duration,
}

impl GitConfigIdentity {
    pub fn user_name(timeout: Duration) -> Self {
        Self {
            key: "user.name",
            timeout,
        }
    }

    pub fn user_email(timeout: Duration) -> Self {
        Self {
            key: "user.email",
            timeout,
        }
    }
}

#[async_trait]
impl IdentitySource for GitConfigIdentity {
    fn name(&self) -> &'static str {
        self.key
    }

    async fn probe(&self, workspace_root: &Path) -> Option<String> {
        process::query("git", &["config", self.key], workspace_root, self.timeout).await
    }
}

/// The standard chain: SSH remote owner, `gh` login, `user.name`, `user.email`.
pub fn default_sources(timeout: Duration) -> Vec<Box<dyn IdentitySource>> {
    vec![
        Box::new(SshRemoteIdentity::new(timeout)),
        Box::new(GhCliIdentity::new(timeout)),
        Box::new(GitConfigIdentity::user_name(timeout)),
        Box::new(GitConfigIdentity::user_email(timeout)),
    ]
}

/// Walks the source chain once and remembers the answer.
pub struct IdentityResolver {
    sources: Vec<Box<dyn IdentitySource>>,
    resolved: OnceCell<Identity>,
}

impl IdentityResolver {
    pub fn new(sources: Vec<Box<dyn IdentitySource>>) -> Self {
        Self {
            sources,
            resolved: OnceCell::new(),
        }
    }

    /// Resolver over [`default_sources`].
    pub fn with_default_sources(timeout: Duration) -> Self {
        Self::new(default_sources(timeout))
    }

    /// Returns the identity for `workspace_root`, resolving it on first use.
    ///
    /// Later calls return the memoized value without consulting any source,
    /// whatever `workspace_root` they pass.
    pub async fn resolve(&self, workspace_root: &Path) -> Identity {
        self.resolved
            .get_or_init(|| self.resolve_uncached(workspace_root))
            .await
            .clone()
    }

    /// The memoized identity, if resolution already happened.
    pub fn cached(&self) -> Option<&Identity> {
        self.resolved.get()
    }

    async fn resolve_uncached(&self, workspace_root: &Path) -> Identity {
        for source in &self.sources {
            if let Some(identity) = source
                .probe(workspace_root)
                .await
                .as_deref()
                .and_then(Identity::new)
            {
                info!(source = source.name(), identity = %identity, "Resolved identity");
                return identity;
            }
            debug!(source = source.name(), "Identity source had no answer");
        }

        info!(identity = UNKNOWN_USER, "No identity source answered");
        Identity::unknown()
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::with_default_sources(DEFAULT_COMMAND_TIMEOUT)
    }
}
