//! Repository ingestion: fetch → chunk → embed → store.

use std::fmt;
use std::time::Instant;

use repochat_llm::LlmProvider;

use crate::chunker::{ChunkerConfig, FileChunk, chunk_file};
use crate::embedder::BatchEmbedder;
use crate::error::{IndexError, Result};
use crate::fetcher::RepoFetcher;
use crate::repo::RepoId;
use crate::source::FileSource;
use crate::store::ChunkStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Fetching,
    Chunking,
    Embedding,
    Storing,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Storing => "storing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub repo_id: String,
    pub status: JobStatus,
    pub chunk_count: usize,
    pub failure_detail: Option<String>,
    /// Every status the job passed through, in order.
    pub trail: Vec<JobStatus>,
}

impl IngestionJob {
    #[must_use]
    pub fn new(repo_id: &RepoId) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            status: JobStatus::Pending,
            chunk_count: 0,
            failure_detail: None,
            trail: vec![JobStatus::Pending],
        }
    }

    fn advance(&mut self, status: JobStatus) {
        tracing::debug!(repo = %self.repo_id, from = %self.status, to = %status, "ingestion job");
        self.status = status;
        self.trail.push(status);
    }

    fn fail(&mut self, err: &IndexError) {
        self.failure_detail = Some(err.to_string());
        self.advance(JobStatus::Failed);
    }
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub job: IngestionJob,
    pub files_listed: usize,
    pub files_fetched: usize,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub rows_stored: usize,
    pub partial: bool,
    pub duration_ms: u64,
}

/// Failed ingestion: the job as it stood plus the cause.
#[derive(Debug, thiserror::Error)]
#[error("ingestion of {} failed: {}", .job.repo_id, .source)]
pub struct IngestFailure {
    pub job: IngestionJob,
    #[source]
    pub source: IndexError,
}

pub struct RepoIndexer<S: FileSource, P: LlmProvider> {
    fetcher: RepoFetcher<S>,
    chunker: ChunkerConfig,
    embedder: BatchEmbedder<P>,
    store: ChunkStore,
}

impl<S: FileSource, P: LlmProvider> RepoIndexer<S, P> {
    #[must_use]
    pub fn new(
        fetcher: RepoFetcher<S>,
        chunker: ChunkerConfig,
        embedder: BatchEmbedder<P>,
        store: ChunkStore,
    ) -> Self {
        Self {
            fetcher,
            chunker,
            embedder,
            store,
        }
    }

    /// Ingest the default branch of `repo`.
    ///
    /// # Errors
    ///
    /// Returns `IngestFailure` when the tree lookup, embedding or storage fails.
    /// The failure carries the job with its status trail and detail.
    pub async fn ingest(&self, repo: &RepoId) -> std::result::Result<IngestReport, IngestFailure> {
        let start = Instant::now();
        let mut job = IngestionJob::new(repo);
        tracing::info!(%repo, "ingestion started");

        match self.run(repo, &mut job).await {
            Ok(mut report) => {
                job.chunk_count = report.rows_stored;
                job.advance(JobStatus::Completed);
                report.job = job;
                report.duration_ms =
                    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(
                    %repo,
                    files = report.files_fetched,
                    chunks = report.chunks_created,
                    stored = report.rows_stored,
                    partial = report.partial,
                    duration_ms = report.duration_ms,
                    "ingestion finished"
                );
                Ok(report)
            }
            Err(source) => {
                job.fail(&source);
                tracing::error!(%repo, error = %source, "ingestion failed");
                Err(IngestFailure { job, source })
            }
        }
    }

    async fn run(&self, repo: &RepoId, job: &mut IngestionJob) -> Result<IngestReport> {
        job.advance(JobStatus::Fetching);
        let fetched = self.fetcher.fetch(repo).await?;

        job.advance(JobStatus::Chunking);
        let chunks: Vec<FileChunk> = fetched
            .files
            .iter()
            .flat_map(|file| chunk_file(repo, file, &self.chunker))
            .collect();
        tracing::info!(%repo, files = fetched.files.len(), chunks = chunks.len(), "chunked files");

        let mut report = IngestReport {
            job: job.clone(),
            files_listed: fetched.files_listed,
            files_fetched: fetched.files.len(),
            files_skipped: fetched.files_skipped,
            chunks_created: chunks.len(),
            rows_stored: 0,
            partial: fetched.partial,
            duration_ms: 0,
        };
        if chunks.is_empty() {
            tracing::warn!(%repo, "no indexable content");
            return Ok(report);
        }

        job.advance(JobStatus::Embedding);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_all(&texts).await?;
        let dimension = vectors.first().map_or(0, Vec::len);

        job.advance(JobStatus::Storing);
        self.store.ensure_collection(u64::try_from(dimension)?).await?;
        let records = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| self.store.record(chunk, vector))
            .collect();
        report.rows_stored = self.store.insert(records).await?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedderConfig;
    use crate::fetcher::FetcherConfig;
    use crate::source::InMemorySource;
    use repochat_llm::mock::MockProvider;
    use repochat_memory::InMemoryVectorStore;
    use std::sync::Arc;

    fn indexer(
        source: InMemorySource,
        provider: MockProvider,
        store: ChunkStore,
    ) -> RepoIndexer<InMemorySource, MockProvider> {
        RepoIndexer::new(
            RepoFetcher::new(Arc::new(source), FetcherConfig::default()),
            ChunkerConfig {
                chunk_size: 40,
                chunk_overlap: 10,
            },
            BatchEmbedder::new(Arc::new(provider), EmbedderConfig::default()),
            store,
        )
    }

    fn repo() -> RepoId {
        RepoId::new("octo", "widgets").unwrap()
    }

    #[test]
    fn job_starts_pending() {
        let job = IngestionJob::new(&repo());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.repo_id, "octo/widgets");
        assert_eq!(job.trail, vec![JobStatus::Pending]);
    }

    #[tokio::test]
    async fn successful_ingestion_walks_every_stage() {
        let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "c");
        let source = InMemorySource::new([
            ("README.md", "Widgets are small.\n\nThey render quickly."),
            ("src/a.ts", "export const a = 1;"),
        ]);
        let ix = indexer(
            source,
            MockProvider::default().with_hashed_embeddings(16),
            store.clone(),
        );

        let report = ix.ingest(&repo()).await.unwrap();

        assert_eq!(report.job.status, JobStatus::Completed);
        assert_eq!(
            report.job.trail,
            vec![
                JobStatus::Pending,
                JobStatus::Fetching,
                JobStatus::Chunking,
                JobStatus::Embedding,
                JobStatus::Storing,
                JobStatus::Completed
            ]
        );
        assert_eq!(report.files_fetched, 2);
        assert!(report.chunks_created >= 2);
        assert_eq!(report.rows_stored, report.chunks_created);
        assert_eq!(report.job.chunk_count, report.rows_stored);
        assert_eq!(
            store.count_repo("octo/widgets").await.unwrap(),
            report.rows_stored as u64
        );
    }

    #[tokio::test]
    async fn empty_repository_completes_with_zero_chunks() {
        let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "c");
        let source = InMemorySource::new([("logo.png", vec![1u8, 2, 3])]);
        let ix = indexer(source, MockProvider::default().with_hashed_embeddings(16), store);

        let report = ix.ingest(&repo()).await.unwrap();
        assert_eq!(report.rows_stored, 0);
        assert_eq!(report.job.status, JobStatus::Completed);
        assert!(!report.job.trail.contains(&JobStatus::Embedding));
    }

    #[tokio::test]
    async fn embedding_failure_fails_job() {
        let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "c");
        let source = InMemorySource::new([("README.md", "hello")]);
        let mut provider = MockProvider::default().with_hashed_embeddings(16);
        provider.fail_embed = true;
        let ix = indexer(source, provider, store);

        let failure = ix.ingest(&repo()).await.unwrap_err();
        assert!(matches!(failure.source, IndexError::Embedding(_)));
        assert_eq!(failure.job.status, JobStatus::Failed);
        assert!(failure.job.failure_detail.is_some());
        assert_eq!(
            failure.job.trail[failure.job.trail.len() - 2],
            JobStatus::Embedding
        );
    }

    #[tokio::test]
    async fn missing_repository_fails_during_fetch() {
        let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "c");
        let mut source = InMemorySource::new([("README.md", "hello")]);
        source.missing = true;
        let ix = indexer(source, MockProvider::default().with_hashed_embeddings(16), store);

        let failure = ix.ingest(&repo()).await.unwrap_err();
        assert!(matches!(failure.source, IndexError::Fetch(_)));
        assert!(failure.to_string().contains("octo/widgets"));
    }
}
