//! GitHub REST API file source.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use url::Url;

use crate::error::FetchError;
use crate::repo::RepoId;
use crate::source::{EntryKind, FileSource, TreeEntry, TreeListing};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

#[derive(Clone)]
pub struct GitHubSource {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl fmt::Debug for GitHubSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubSource")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl GitHubSource {
    #[must_use]
    pub fn new(mut api_url: String, token: Option<String>) -> Self {
        while api_url.ends_with('/') {
            api_url.pop();
        }
        Self {
            client: repochat_llm::http::default_client(),
            api_url,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// `{api_url}/repos/{owner}/{name}/{segments..}` with every segment
    /// percent-encoded, so branch names containing `/` stay one segment.
    fn endpoint(&self, repo: &RepoId, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidUrl(self.api_url.clone()))?
            .pop_if_empty()
            .extend(["repos", repo.owner(), repo.name()])
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        repo: &RepoId,
        url: Url,
    ) -> Result<T, FetchError> {
        let mut request = self
            .client
            .get(url.clone())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let rate_exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "0");
            tracing::debug!(status = status.as_u16(), %url, "GitHub request failed");
            return Err(classify_status(
                status.as_u16(),
                rate_exhausted,
                repo,
                url.into(),
            ));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn classify_status(status: u16, rate_exhausted: bool, repo: &RepoId, url: String) -> FetchError {
    match status {
        429 => FetchError::RateLimited,
        403 if rate_exhausted => FetchError::RateLimited,
        401 | 403 => FetchError::Unauthorized { status },
        404 => FetchError::NotFound {
            repo: repo.to_string(),
        },
        _ => FetchError::Status { status, url },
    }
}

/// Decode a blob payload, tolerating the line breaks GitHub inserts in base64.
fn decode_blob(content: &str, encoding: &str) -> Result<Vec<u8>, FetchError> {
    match encoding {
        "base64" => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map_err(|e| FetchError::Decode(e.to_string()))
        }
        "utf-8" | "utf8" => Ok(content.as_bytes().to_vec()),
        other => Err(FetchError::Decode(format!("unsupported encoding {other}"))),
    }
}

impl FileSource for GitHubSource {
    async fn default_branch(&self, repo: &RepoId) -> Result<String, FetchError> {
        let info: RepoResponse = self.get_json(repo, self.endpoint(repo, &[])?).await?;
        Ok(info.default_branch)
    }

    async fn tree(
        &self,
        repo: &RepoId,
        tree_ish: &str,
        recursive: bool,
    ) -> Result<TreeListing, FetchError> {
        let mut url = self.endpoint(repo, &["git", "trees", tree_ish])?;
        if recursive {
            url.query_pairs_mut().append_pair("recursive", "1");
        }
        let tree: TreeResponse = self.get_json(repo, url).await?;
        let entries = tree
            .tree
            .into_iter()
            .map(|item| TreeEntry {
                path: item.path,
                kind: match item.kind.as_str() {
                    "blob" => EntryKind::Blob,
                    "tree" => EntryKind::Tree,
                    _ => EntryKind::Other,
                },
                sha: item.sha,
                size: item.size,
            })
            .collect();
        Ok(TreeListing {
            entries,
            truncated: tree.truncated,
        })
    }

    async fn blob(&self, repo: &RepoId, sha: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.endpoint(repo, &["git", "blobs", sha])?;
        let blob: BlobResponse = self.get_json(repo, url).await?;
        decode_blob(&blob.content, &blob.encoding)
    }
}

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}
