//! Repository walk: resolve branch, list tree, filter, fetch blob contents.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use futures::StreamExt;

use crate::error::FetchError;
use crate::repo::RepoId;
use crate::source::{EntryKind, FileSource, TreeEntry};

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Concurrent blob requests.
    pub concurrency: usize,
    pub allowed_extensions: Vec<String>,
    /// Directory names skipped wherever they occur in a path.
    pub excluded_dirs: Vec<String>,
    pub max_file_bytes: u64,
    pub max_depth: usize,
    /// Cap on non-recursive listing calls when expanding a truncated tree.
    pub max_tree_requests: usize,
    pub expand_truncated: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            allowed_extensions: [".ts", ".js", ".tsx", ".md", ".json"]
                .into_iter()
                .map(String::from)
                .collect(),
            excluded_dirs: vec!["node_modules".into()],
            max_file_bytes: 1024 * 1024,
            max_depth: 32,
            max_tree_requests: 200,
            expand_truncated: true,
        }
    }
}

/// A fetched text file. Lives only for the duration of an ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryFile {
    pub path: String,
    pub content: String,
    pub size_bytes: usize,
}

#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Ordered by path.
    pub files: Vec<RepositoryFile>,
    /// The tree listing could not be completed.
    pub partial: bool,
    /// Blob entries that passed the filters.
    pub files_listed: usize,
    /// Listed files dropped by a fetch or decode failure.
    pub files_skipped: usize,
}

pub struct RepoFetcher<S: FileSource> {
    source: Arc<S>,
    config: FetcherConfig,
}

impl<S: FileSource> RepoFetcher<S> {
    #[must_use]
    pub fn new(source: Arc<S>, config: FetcherConfig) -> Self {
        Self { source, config }
    }

    /// Fetch every matching text file of the repository's default branch.
    ///
    /// # Errors
    ///
    /// Returns an error only if the branch or root tree lookup fails. Single-file
    /// failures are logged and counted in `files_skipped`.
    pub async fn fetch(&self, repo: &RepoId) -> Result<FetchOutcome, FetchError> {
        let branch = self.source.default_branch(repo).await?;
        tracing::info!(%repo, %branch, "listing repository tree");

        let listing = self.source.tree(repo, &branch, true).await?;
        let mut partial = false;
        let mut blobs: BTreeMap<String, TreeEntry> = listing
            .entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::Blob)
            .map(|e| (e.path.clone(), e))
            .collect();

        if listing.truncated {
            tracing::warn!(%repo, listed = blobs.len(), "tree listing truncated");
            if self.config.expand_truncated {
                let (expanded, complete) = self.walk_tree(repo, &branch).await;
                for entry in expanded {
                    blobs.entry(entry.path.clone()).or_insert(entry);
                }
                partial = !complete;
            } else {
                partial = true;
            }
        }

        let candidates: Vec<TreeEntry> = blobs
            .into_values()
            .filter(|e| self.accepts(e))
            .collect();
        let files_listed = candidates.len();
        tracing::info!(%repo, files = files_listed, partial, "found relevant files");

        let fetched: Vec<Option<RepositoryFile>> = futures::stream::iter(candidates)
            .map(|entry| self.fetch_file(repo, entry))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;
        let files: Vec<RepositoryFile> = fetched.into_iter().flatten().collect();
        let files_skipped = files_listed - files.len();

        tracing::info!(%repo, fetched = files.len(), skipped = files_skipped, "fetch finished");
        Ok(FetchOutcome {
            files,
            partial,
            files_listed,
            files_skipped,
        })
    }

    /// Breadth-first walk with non-recursive listings, bounded by depth and
    /// request count. Returns blob entries and whether the walk completed.
    async fn walk_tree(&self, repo: &RepoId, root: &str) -> (Vec<TreeEntry>, bool) {
        let mut queue: VecDeque<(String, String, usize)> = VecDeque::new();
        queue.push_back((String::new(), root.to_owned(), 0));
        let mut blobs = Vec::new();
        let mut requests = 0usize;
        let mut complete = true;

        while let Some((prefix, sha, depth)) = queue.pop_front() {
            if requests >= self.config.max_tree_requests {
                tracing::warn!(
                    %repo,
                    pending = queue.len() + 1,
                    max = self.config.max_tree_requests,
                    "tree request budget exhausted"
                );
                complete = false;
                break;
            }
            requests += 1;

            let listing = match self.source.tree(repo, &sha, false).await {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::warn!(%repo, dir = %prefix, error = %e, "subtree listing failed");
                    complete = false;
                    continue;
                }
            };
            if listing.truncated {
                tracing::warn!(%repo, dir = %prefix, "subtree listing truncated");
                complete = false;
            }

            for entry in listing.entries {
                let path = if prefix.is_empty() {
                    entry.path
                } else {
                    format!("{prefix}/{}", entry.path)
                };
                match entry.kind {
                    EntryKind::Blob => blobs.push(TreeEntry { path, ..entry }),
                    EntryKind::Tree => {
                        let name = path.rsplit('/').next().unwrap_or(&path);
                        if self.is_excluded_dir(name) {
                            continue;
                        }
                        if depth + 1 > self.config.max_depth {
                            tracing::debug!(%repo, dir = %path, "max depth reached");
                            continue;
                        }
                        queue.push_back((path, entry.sha, depth + 1));
                    }
                    EntryKind::Other => {}
                }
            }
        }

        tracing::debug!(%repo, requests, blobs = blobs.len(), complete, "tree walk finished");
        (blobs, complete)
    }

    fn is_excluded_dir(&self, name: &str) -> bool {
        self.config.excluded_dirs.iter().any(|d| d == name)
    }

    fn accepts(&self, entry: &TreeEntry) -> bool {
        let components: Vec<&str> = entry.path.split('/').collect();
        if components.len() - 1 > self.config.max_depth {
            return false;
        }
        if components[..components.len() - 1]
            .iter()
            .any(|c| self.is_excluded_dir(c))
        {
            return false;
        }
        if !self
            .config
            .allowed_extensions
            .iter()
            .any(|ext| entry.path.ends_with(ext.as_str()))
        {
            return false;
        }
        if let Some(size) = entry.size
            && size > self.config.max_file_bytes
        {
            tracing::debug!(path = %entry.path, size, "skipping oversized file");
            return false;
        }
        true
    }

    async fn fetch_file(&self, repo: &RepoId, entry: TreeEntry) -> Option<RepositoryFile> {
        let bytes = match self.source.blob(repo, &entry.sha).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%repo, path = %entry.path, error = %e, "error fetching file");
                return None;
            }
        };
        let size_bytes = bytes.len();
        match String::from_utf8(bytes) {
            Ok(content) => Some(RepositoryFile {
                path: entry.path,
                content,
                size_bytes,
            }),
            Err(_) => {
                tracing::warn!(%repo, path = %entry.path, "skipping non UTF-8 file");
                None
            }
        }
    }
}
