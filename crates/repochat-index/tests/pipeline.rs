use std::sync::Arc;

use repochat_index::chunker::ChunkerConfig;
use repochat_index::embedder::{BatchEmbedder, EmbedderConfig};
use repochat_index::fetcher::{FetcherConfig, RepoFetcher};
use repochat_index::retriever::FilterMode;
use repochat_index::source::InMemorySource;
use repochat_index::store::{ChunkStore, ReingestPolicy};
use repochat_index::{IndexError, RepoId, RepoIndexer, RepoRetriever, RetrievalConfig};
use repochat_llm::mock::MockProvider;
use repochat_memory::InMemoryVectorStore;

const DIM: usize = 256;

fn provider() -> Arc<MockProvider> {
    Arc::new(MockProvider::default().with_hashed_embeddings(DIM))
}

fn indexer(
    source: InMemorySource,
    provider: Arc<MockProvider>,
    store: ChunkStore,
) -> RepoIndexer<InMemorySource, MockProvider> {
    RepoIndexer::new(
        RepoFetcher::new(Arc::new(source), FetcherConfig::default()),
        ChunkerConfig::default(),
        BatchEmbedder::new(provider, EmbedderConfig::default()),
        store,
    )
}

fn three_files() -> InMemorySource {
    InMemorySource::new([
        (
            "README.md",
            "# Widgets\n\nA toolkit for rendering widgets in the browser.",
        ),
        ("src/constants.ts", "The zorblax constant is defined as 42."),
        (
            "package.json",
            "{\"name\": \"widgets\", \"version\": \"1.0.0\"}",
        ),
    ])
}

#[tokio::test]
async fn ingest_then_retrieve_finds_answer_file() {
    let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "chunks");
    let provider = provider();
    let repo = RepoId::parse("https://github.com/octo/widgets.git").unwrap();

    let report = indexer(three_files(), Arc::clone(&provider), store.clone())
        .ingest(&repo)
        .await
        .unwrap();
    assert_eq!(report.files_fetched, 3);
    assert!(report.rows_stored > 0);
    assert!(!report.partial);

    let retriever = RepoRetriever::new(store, provider, RetrievalConfig::default());
    let window = retriever
        .retrieve("What is the zorblax constant?", &repo)
        .await;

    let hit = window
        .chunks
        .iter()
        .find(|c| c.file_path == "src/constants.ts")
        .expect("chunk from the answer file");
    assert!(hit.score >= 0.5);
    assert!(window.text.contains("zorblax constant is defined as 42"));
}

#[tokio::test]
async fn unknown_repository_gets_empty_context() {
    let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "chunks");
    let provider = provider();
    let indexed = RepoId::new("octo", "widgets").unwrap();
    indexer(three_files(), Arc::clone(&provider), store.clone())
        .ingest(&indexed)
        .await
        .unwrap();

    let retriever = RepoRetriever::new(store, provider, RetrievalConfig::default());
    let window = retriever
        .retrieve(
            "What is the zorblax constant?",
            &RepoId::new("octo", "gadgets").unwrap(),
        )
        .await;
    assert!(window.is_empty());
    assert!(window.text.is_empty());
}

#[tokio::test]
async fn pre_filter_isolates_repositories() {
    let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "chunks");
    let provider = provider();
    let a = RepoId::new("octo", "alpha").unwrap();
    let b = RepoId::new("octo", "beta").unwrap();

    // Same text in both repositories: without a pre-filter the two tie.
    for repo in [&a, &b] {
        let source = InMemorySource::new([(
            "notes.md",
            "Deployment uses the blue green strategy.",
        )]);
        indexer(source, Arc::clone(&provider), store.clone())
            .ingest(repo)
            .await
            .unwrap();
    }

    let retriever = RepoRetriever::new(
        store,
        provider,
        RetrievalConfig {
            top_k: 1,
            ..RetrievalConfig::default()
        },
    );
    for repo in [&a, &b] {
        let window = retriever
            .retrieve("Deployment uses which strategy?", repo)
            .await;
        assert_eq!(window.chunks.len(), 1);
        assert!(window.chunks.iter().all(|c| c.repo == repo.to_string()));
    }
}

#[tokio::test]
async fn post_filter_fallback_only_returns_requested_repository() {
    let store = ChunkStore::new(
        Arc::new(InMemoryVectorStore::without_filter_support()),
        "chunks",
    );
    let provider = provider();
    let a = RepoId::new("octo", "alpha").unwrap();
    let b = RepoId::new("octo", "beta").unwrap();
    indexer(
        InMemorySource::new([("a.md", "alpha handles billing invoices")]),
        Arc::clone(&provider),
        store.clone(),
    )
    .ingest(&a)
    .await
    .unwrap();
    indexer(
        InMemorySource::new([("b.md", "beta handles billing invoices too")]),
        Arc::clone(&provider),
        store.clone(),
    )
    .ingest(&b)
    .await
    .unwrap();

    let retriever = RepoRetriever::new(
        store,
        provider,
        RetrievalConfig {
            filter: FilterMode::Post,
            ..RetrievalConfig::default()
        },
    );
    let window = retriever.retrieve("who handles billing invoices", &b).await;
    assert!(!window.is_empty());
    assert!(window.chunks.iter().all(|c| c.repo == "octo/beta"));
}

#[tokio::test]
async fn reingest_with_upsert_replaces_rows() {
    let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "chunks");
    let provider = provider();
    let repo = RepoId::new("octo", "widgets").unwrap();

    let first = indexer(three_files(), Arc::clone(&provider), store.clone())
        .ingest(&repo)
        .await
        .unwrap();
    indexer(three_files(), Arc::clone(&provider), store.clone())
        .ingest(&repo)
        .await
        .unwrap();

    assert_eq!(
        store.count_repo("octo/widgets").await.unwrap(),
        first.rows_stored as u64
    );
}

#[tokio::test]
async fn reingest_with_append_accumulates_rows() {
    let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "chunks")
        .with_policy(ReingestPolicy::Append);
    let provider = provider();
    let repo = RepoId::new("octo", "widgets").unwrap();

    let first = indexer(three_files(), Arc::clone(&provider), store.clone())
        .ingest(&repo)
        .await
        .unwrap();
    indexer(three_files(), Arc::clone(&provider), store.clone())
        .ingest(&repo)
        .await
        .unwrap();

    assert_eq!(
        store.count_repo("octo/widgets").await.unwrap(),
        2 * first.rows_stored as u64
    );
}

#[tokio::test]
async fn truncated_tree_is_reported_as_partial() {
    let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "chunks");
    let mut source = three_files();
    source.truncate_recursive_at = Some(1);
    let fetcher = RepoFetcher::new(
        Arc::new(source),
        FetcherConfig {
            expand_truncated: false,
            ..FetcherConfig::default()
        },
    );
    let indexer = RepoIndexer::new(
        fetcher,
        ChunkerConfig::default(),
        BatchEmbedder::new(provider(), EmbedderConfig::default()),
        store,
    );

    let report = indexer
        .ingest(&RepoId::new("octo", "widgets").unwrap())
        .await
        .unwrap();
    assert!(report.partial);
    assert!(report.files_fetched < 3);
}

#[tokio::test]
async fn embedding_failure_surfaces_as_job_error() {
    let store = ChunkStore::new(Arc::new(InMemoryVectorStore::new()), "chunks");
    let mut provider = MockProvider::default().with_hashed_embeddings(DIM);
    provider.fail_embed = true;

    let failure = indexer(three_files(), Arc::new(provider), store.clone())
        .ingest(&RepoId::new("octo", "widgets").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(failure.source, IndexError::Embedding(_)));
    assert_eq!(store.count_repo("octo/widgets").await.unwrap(), 0);
}
