//! GitHub remote URL parsing.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// `git@github.com:OWNER/REPO(.git)?`
static SSH_REMOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^git@github\.com:([^/]+)/(.+?)(?:\.git)*$").unwrap());

/// `https://github.com/OWNER/REPO(.git)?`
static HTTPS_REMOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://github\.com/([^/]+)/(.+?)(?:\.git)*$").unwrap());

/// Text used on the wire when no recognizable remote exists.
pub const NO_REPO_LINK: &str = "none";

/// Canonical link to the remote repository a file belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RepoLink {
    /// A GitHub repository, rendered as `https://github.com/OWNER/REPO`.
    GitHub { owner: String, repo: String },

    /// No repository root, no `origin` remote, or a remote that is not GitHub.
    None,
}

impl RepoLink {
    /// Normalizes a raw remote URL. Never fails: anything unrecognized is
    /// [`RepoLink::None`].
    pub fn from_remote(remote_url: &str) -> Self {
        parse_github_remote(remote_url).map_or(RepoLink::None, |(owner, repo)| RepoLink::GitHub {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RepoLink::None)
    }
}

impl fmt::Display for RepoLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoLink::GitHub { owner, repo } => write!(f, "https://github.com/{owner}/{repo}"),
            RepoLink::None => f.write_str(NO_REPO_LINK),
        }
    }
}

/// Splits a GitHub SSH or HTTPS remote into `(owner, repo)`.
///
/// Trailing `.git` suffixes are dropped, so feeding the rendered HTTPS link
/// back in yields the same pair.
pub fn parse_github_remote(remote_url: &str) -> Option<(&str, &str)> {
    let remote_url = remote_url.trim();
    SSH_REMOTE_RE
        .captures(remote_url)
        .or_else(|| HTTPS_REMOTE_RE.captures(remote_url))
        .and_then(|caps| {
            let owner = caps.get(1)?.as_str();
            let repo = caps.get(2)?.as_str();
            Some((owner, repo))
        })
}

/// Owner of an SSH-style GitHub remote, used as an identity hint.
///
/// Only the `git@github.com:OWNER/...` form counts; HTTPS remotes carry no
/// authentication identity.
pub fn ssh_remote_owner(remote_url: &str) -> Option<&str> {
    SSH_REMOTE_RE
        .captures(remote_url.trim())
        .and_then(|caps| caps.get(1))
        .map(|owner| owner.as_str())
}
