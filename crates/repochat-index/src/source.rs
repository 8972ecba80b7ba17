//! File source contract: a hosted repository's tree and blob contents.

use std::future::Future;

use crate::error::FetchError;
use crate::repo::RepoId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the listed tree.
    pub path: String,
    pub kind: EntryKind,
    pub sha: String,
    /// Blob size as reported by the listing, when known.
    pub size: Option<u64>,
}

/// One listing call. `truncated` is distinct from failure: the entries are
/// valid but incomplete.
#[derive(Debug, Clone, Default)]
pub struct TreeListing {
    pub entries: Vec<TreeEntry>,
    pub truncated: bool,
}

pub trait FileSource: Send + Sync {
    /// Resolve the branch to index.
    fn default_branch(
        &self,
        repo: &RepoId,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;

    /// List a tree by branch name or tree sha.
    fn tree(
        &self,
        repo: &RepoId,
        tree_ish: &str,
        recursive: bool,
    ) -> impl Future<Output = Result<TreeListing, FetchError>> + Send;

    /// Raw bytes of a blob.
    fn blob(
        &self,
        repo: &RepoId,
        sha: &str,
    ) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

#[cfg(any(test, feature = "mock"))]
pub use memory::InMemorySource;

#[cfg(any(test, feature = "mock"))]
mod memory {
    use std::collections::{BTreeMap, BTreeSet, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{EntryKind, FileSource, TreeEntry, TreeListing};
    use crate::error::FetchError;
    use crate::repo::RepoId;

    /// File source backed by a path → bytes map.
    ///
    /// Tree shas are `tree:<dir>` and blob shas `blob:<path>`.
    #[derive(Debug, Default)]
    pub struct InMemorySource {
        files: BTreeMap<String, Vec<u8>>,
        /// Recursive listings return only the first `n` entries, flagged truncated.
        pub truncate_recursive_at: Option<usize>,
        /// Non-recursive listings of these directories fail.
        pub failing_trees: HashSet<String>,
        pub failing_blobs: HashSet<String>,
        pub missing: bool,
        tree_calls: AtomicUsize,
        blob_calls: Mutex<Vec<String>>,
    }

    impl InMemorySource {
        #[must_use]
        pub fn new<I, P, C>(files: I) -> Self
        where
            I: IntoIterator<Item = (P, C)>,
            P: Into<String>,
            C: Into<Vec<u8>>,
        {
            Self {
                files: files
                    .into_iter()
                    .map(|(p, c)| (p.into(), c.into()))
                    .collect(),
                ..Self::default()
            }
        }

        #[must_use]
        pub fn tree_calls(&self) -> usize {
            self.tree_calls.load(Ordering::Relaxed)
        }

        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        #[must_use]
        pub fn blob_calls(&self) -> Vec<String> {
            self.blob_calls.lock().unwrap().clone()
        }

        fn directories(&self) -> BTreeSet<String> {
            let mut dirs = BTreeSet::new();
            for path in self.files.keys() {
                let mut current = path.as_str();
                while let Some((parent, _)) = current.rsplit_once('/') {
                    dirs.insert(parent.to_owned());
                    current = parent;
                }
            }
            dirs
        }

        fn list(&self, dir: &str, recursive: bool) -> Vec<TreeEntry> {
            let prefix = if dir.is_empty() {
                String::new()
            } else {
                format!("{dir}/")
            };
            let in_scope = |path: &str| {
                path.strip_prefix(&prefix)
                    .filter(|rest| recursive || !rest.contains('/'))
                    .map(str::to_owned)
            };

            let mut entries: Vec<TreeEntry> = self
                .directories()
                .into_iter()
                .filter_map(|d| {
                    in_scope(&d).map(|rel| TreeEntry {
                        path: rel,
                        kind: EntryKind::Tree,
                        sha: format!("tree:{d}"),
                        size: None,
                    })
                })
                .collect();
            entries.extend(self.files.iter().filter_map(|(p, content)| {
                in_scope(p).map(|rel| TreeEntry {
                    path: rel,
                    kind: EntryKind::Blob,
                    sha: format!("blob:{p}"),
                    size: Some(content.len() as u64),
                })
            }));
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            entries
        }
    }

    impl FileSource for InMemorySource {
        async fn default_branch(&self, repo: &RepoId) -> Result<String, FetchError> {
            if self.missing {
                return Err(FetchError::NotFound {
                    repo: repo.to_string(),
                });
            }
            Ok("main".into())
        }

        async fn tree(
            &self,
            _repo: &RepoId,
            tree_ish: &str,
            recursive: bool,
        ) -> Result<TreeListing, FetchError> {
            self.tree_calls.fetch_add(1, Ordering::Relaxed);
            let dir = tree_ish.strip_prefix("tree:").unwrap_or("");
            if !recursive && self.failing_trees.contains(dir) {
                return Err(FetchError::Status {
                    status: 500,
                    url: tree_ish.to_owned(),
                });
            }
            let mut entries = self.list(dir, recursive);
            let mut truncated = false;
            if recursive
                && let Some(limit) = self.truncate_recursive_at
                && entries.len() > limit
            {
                entries.truncate(limit);
                truncated = true;
            }
            Ok(TreeListing { entries, truncated })
        }

        async fn blob(&self, _repo: &RepoId, sha: &str) -> Result<Vec<u8>, FetchError> {
            let path = sha.strip_prefix("blob:").unwrap_or(sha);
            self.blob_calls.lock().unwrap().push(path.to_owned());
            if self.failing_blobs.contains(path) {
                return Err(FetchError::Status {
                    status: 500,
                    url: path.to_owned(),
                });
            }
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| FetchError::Decode(format!("no blob {sha}")))
        }
    }
}
