//! Repository link resolution for edited files.
//!
//! A file's link is found by asking git for the repository root containing
//! the file, then for that root's `origin` URL. Links are cached per root for
//! the lifetime of the [`RepoLocator`]; once a root is cached its remote URL
//! is never queried again. The cache lock is not held while git runs, so a
//! slow remote in one repository does not stall lookups in another. Files
//! outside any repository are not cached: the same path may belong to a
//! repository later.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::process;
use crate::remote::RepoLink;

/// Answers the two git questions the locator needs.
#[async_trait]
pub trait RemoteResolver: Send + Sync {
    /// Top-level directory of the repository containing `dir`.
    async fn repository_root(&self, dir: &Path) -> Option<PathBuf>;

    /// URL of the `origin` remote of the repository at `root`.
    async fn origin_url(&self, root: &Path) -> Option<String>;
}

/// [`RemoteResolver`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRemoteResolver {
    timeout: Duration,
}

impl GitRemoteResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RemoteResolver for GitRemoteResolver {
    async fn repository_root(&self, dir: &Path) -> Option<PathBuf> {
        process::query("git", &["rev-parse", "--show-toplevel"], dir, self.timeout)
            .await
            .map(PathBuf::from)
    }

    async fn origin_url(&self, root: &Path) -> Option<String> {
        process::query("git", &["remote", "get-url", "origin"], root, self.timeout).await
    }
}

/// Resolves [`RepoLink`]s, caching one link per repository root.
pub struct RepoLocator {
    resolver: Arc<dyn RemoteResolver>,
    links_by_root: Mutex<HashMap<PathBuf, RepoLink>>,
}

impl RepoLocator {
    pub fn new(resolver: Arc<dyn RemoteResolver>) -> Self {
        Self {
            resolver,
            links_by_root: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the link for the repository containing `file_path`.
    pub async fn resolve_link(&self, file_path: &Path) -> RepoLink {
        let dir = containing_dir(file_path);
        let Some(root) = self.resolver.repository_root(dir).await else {
            debug!(file = %file_path.display(), "File is not inside a git repository");
            return RepoLink::None;
        };

        if let Some(link) = self.links_by_root.lock().await.get(&root) {
            return link.clone();
        }

        // The lock is not held across the query; if two lookups race on one
        // root, the first result stored wins.
        let link = match self.resolver.origin_url(&root).await {
            Some(url) => RepoLink::from_remote(&url),
            None => RepoLink::None,
        };
        debug!(root = %root.display(), link = %link, "Resolved repository link");
        let mut links = self.links_by_root.lock().await;
        links.entry(root).or_insert(link).clone()
    }

    /// Number of repository roots with a cached link.
    #[cfg(test)]
    pub async fn cached_roots(&self) -> usize {
        self.links_by_root.lock().await.len()
    }
}

fn containing_dir(file_path: &Path) -> &Path {
    match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::DEFAULT_COMMAND_TIMEOUT;
    use std::fs;
    use std::process::Command;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Every directory directly under `/repos` is a repository root.
    struct FakeResolver {
        remotes: HashMap<PathBuf, String>,
        root_queries: AtomicUsize,
        url_queries: AtomicUsize,
    }

    impl FakeResolver {
        fn new(remotes: &[(&str, &str)]) -> Self {
            Self {
                remotes: remotes
                    .iter()
                    .map(|(root, url)| (PathBuf::from(root), (*url).to_string()))
                    .collect(),
                root_queries: AtomicUsize::new(0),
                url_queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteResolver for FakeResolver {
        async fn repository_root(&self, dir: &Path) -> Option<PathBuf> {
            self.root_queries.fetch_add(1, Ordering::SeqCst);
            dir.ancestors()
                .find(|candidate| candidate.parent() == Some(Path::new("/repos")))
                .map(Path::to_path_buf)
        }

        async fn origin_url(&self, root: &Path) -> Option<String> {
            self.url_queries.fetch_add(1, Ordering::SeqCst);
            self.remotes.get(root).cloned()
        }
    }

    #[tokio::test]
    async fn test_one_remote_query_per_root() {
        let resolver = Arc::new(FakeResolver::new(&[(
            "/repos/library-api",
            "git@github.com:alice-dev/library-api.git",
        )]));
        let locator = RepoLocator::new(resolver.clone());

        for file in [
            "/repos/library-api/src/main.py",
            "/repos/library-api/src/models/book.py",
            "/repos/library-api/README.md",
        ] {
            let link = locator.resolve_link(Path::new(file)).await;
            assert_eq!(link.to_string(), "https://github.com/alice-dev/library-api");
        }

        assert_eq!(resolver.url_queries.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.root_queries.load(Ordering::SeqCst), 3);
        assert_eq!(locator.cached_roots().await, 1);
    }

    #[tokio::test]
    async fn test_missing_remote_is_cached_as_none() {
        let resolver = Arc::new(FakeResolver::new(&[]));
        let locator = RepoLocator::new(resolver.clone());

        assert!(locator.resolve_link(Path::new("/repos/local/a.py")).await.is_none());
        assert!(locator.resolve_link(Path::new("/repos/local/b.py")).await.is_none());

        assert_eq!(resolver.url_queries.load(Ordering::SeqCst), 1);
        assert_eq!(locator.cached_roots().await, 1);
    }

    #[tokio::test]
    async fn test_file_outside_repository_is_not_cached() {
        let resolver = Arc::new(FakeResolver::new(&[]));
        let locator = RepoLocator::new(resolver.clone());

        assert!(locator.resolve_link(Path::new("/tmp/scratch.py")).await.is_none());
        assert!(locator.resolve_link(Path::new("/tmp/scratch.py")).await.is_none());

        assert_eq!(resolver.url_queries.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.root_queries.load(Ordering::SeqCst), 2);
        assert_eq!(locator.cached_roots().await, 0);
    }

    #[tokio::test]
    async fn test_distinct_roots_cached_separately() {
        let resolver = Arc::new(FakeResolver::new(&[
            ("/repos/one", "https://github.com/octo/one.git"),
            ("/repos/two", "git@gitlab.com:octo/two.git"),
        ]));
        let locator = RepoLocator::new(resolver.clone());

        let one = locator.resolve_link(Path::new("/repos/one/x.rs")).await;
        let two = locator.resolve_link(Path::new("/repos/two/y.rs")).await;

        assert_eq!(one.to_string(), "https://github.com/octo/one");
        assert!(two.is_none());
        assert_eq!(resolver.url_queries.load(Ordering::SeqCst), 2);
    }

    /// `/repos/slow` blocks its origin query until released.
    #[derive(Default)]
    struct SlowRootResolver {
        slow_entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl RemoteResolver for SlowRootResolver {
        async fn repository_root(&self, dir: &Path) -> Option<PathBuf> {
            dir.ancestors()
                .find(|candidate| candidate.parent() == Some(Path::new("/repos")))
                .map(Path::to_path_buf)
        }

        async fn origin_url(&self, root: &Path) -> Option<String> {
            if root == Path::new("/repos/slow") {
                self.slow_entered.notify_one();
                self.release.notified().await;
                return Some("https://github.com/octo/slow.git".to_string());
            }
            Some("https://github.com/octo/fast.git".to_string())
        }
    }

    #[tokio::test]
    async fn test_slow_remote_does_not_block_other_roots() {
        let resolver = Arc::new(SlowRootResolver::default());
        let locator = Arc::new(RepoLocator::new(resolver.clone()));

        let slow = tokio::spawn({
            let locator = locator.clone();
            async move { locator.resolve_link(Path::new("/repos/slow/a.py")).await }
        });
        resolver.slow_entered.notified().await;

        let fast = locator.resolve_link(Path::new("/repos/fast/b.py")).await;
        assert_eq!(fast.to_string(), "https://github.com/octo/fast");
        assert_eq!(locator.cached_roots().await, 1);

        resolver.release.notify_one();
        assert_eq!(slow.await.unwrap().to_string(), "https://github.com/octo/slow");
        assert_eq!(locator.cached_roots().await, 2);
    }

    #[tokio::test]
    async fn test_git_resolver_against_real_repo() {
        let temp = TempDir::new().unwrap();
        Command::new("git")
            .args(["init", "--initial-branch=main"])
            .current_dir(temp.path())
            .output()
            .unwrap();
        Command::new("git")
            .args([
                "remote",
                "add",
                "origin",
                "git@github.com:alice-dev/library-api.git",
            ])
            .current_dir(temp.path())
            .output()
            .unwrap();
        let nested = temp.path().join("src");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("app.py");
        fs::write(&file, "print('hi')\n").unwrap();

        let locator = RepoLocator::new(Arc::new(GitRemoteResolver::new(DEFAULT_COMMAND_TIMEOUT)));
        let link = locator.resolve_link(&file).await;

        assert_eq!(link.to_string(), "https://github.com/alice-dev/library-api");
    }

    #[tokio::test]
    async fn test_git_resolver_outside_repository() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("loose.py");
        fs::write(&file, "x = 1\n").unwrap();

        let locator = RepoLocator::new(Arc::new(GitRemoteResolver::new(DEFAULT_COMMAND_TIMEOUT)));
        assert!(locator.resolve_link(&file).await.is_none());
        assert_eq!(locator.cached_roots().await, 0);
    }
}
