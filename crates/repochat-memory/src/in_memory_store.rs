use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

#[derive(Default)]
struct InMemoryCollection {
    points: HashMap<String, StoredPoint>,
}

/// Process-local store scoring points by cosine similarity.
///
/// [`InMemoryVectorStore::without_filter_support`] builds a store that refuses
/// payload filters, standing in for engines that can only search the whole
/// collection.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
    filter_support: bool,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            filter_support: true,
        }
    }

    #[must_use]
    pub fn without_filter_support() -> Self {
        Self {
            filter_support: false,
            ..Self::new()
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("filter_support", &self.filter_support)
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        _vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.entry(collection).or_default();
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            for p in points {
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: Option<f32>,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if filter.is_some() && !self.filter_support {
                return Err(VectorStoreError::FilterUnsupported);
            }
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;

            let empty_filter = VectorFilter::default();
            let f = filter.as_ref().unwrap_or(&empty_filter);
            let threshold = score_threshold.unwrap_or(f32::NEG_INFINITY);

            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| f.matches(&sp.payload))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .filter(|p| p.score >= threshold)
                .collect();

            scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            #[expect(clippy::cast_possible_truncation)]
            scored.truncate(limit as usize);
            Ok(scored)
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Delete(format!("collection {collection} not found"))
            })?;
            col.points.retain(|_, sp| !filter.matches(&sp.payload));
            Ok(())
        })
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Count(e.to_string()))?;
            let Some(col) = cols.get(&collection) else {
                return Ok(0);
            };
            let n = match &filter {
                Some(f) => col.points.values().filter(|sp| f.matches(&sp.payload)).count(),
                None => col.points.len(),
            };
            Ok(n as u64)
        })
    }

    fn supports_filter(&self) -> bool {
        self.filter_support
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, repo: &str) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::from([("repo".into(), serde_json::json!(repo))]),
        }
    }

    async fn seeded() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], "o/one"),
                    point("b", vec![0.9, 0.1, 0.0], "o/two"),
                    point("c", vec![0.0, 1.0, 0.0], "o/one"),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn ensure_collection_and_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("test").await.unwrap());
        store.ensure_collection("test", 3).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let store = seeded().await;
        store.ensure_collection("test", 3).await.unwrap();
        assert_eq!(store.count("test", None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_collection_removes() {
        let store = seeded().await;
        store.delete_collection("test").await.unwrap();
        assert!(!store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_into_missing_collection_fails() {
        let store = InMemoryVectorStore::new();
        let err = store
            .upsert("nope", vec![point("a", vec![1.0], "o/r")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Upsert(_)));
    }

    #[tokio::test]
    async fn upsert_same_id_replaces() {
        let store = seeded().await;
        store
            .upsert("test", vec![point("a", vec![0.0, 0.0, 1.0], "o/one")])
            .await
            .unwrap();
        assert_eq!(store.count("test", None).await.unwrap(), 3);
        let results = store
            .search("test", vec![0.0, 0.0, 1.0], 1, None, None)
            .await
            .unwrap();
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn search_orders_by_descending_similarity() {
        let store = seeded().await;
        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 3, None, None)
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn search_applies_threshold() {
        let store = seeded().await;
        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 10, Some(0.5), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score >= 0.5));
    }

    #[tokio::test]
    async fn filter_applies_before_limit() {
        let store = seeded().await;
        let results = store
            .search(
                "test",
                vec![1.0, 0.0, 0.0],
                1,
                None,
                Some(VectorFilter::text_eq("repo", "o/two")),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn filterless_store_rejects_filters() {
        let store = InMemoryVectorStore::without_filter_support();
        store.ensure_collection("test", 3).await.unwrap();
        assert!(!store.supports_filter());
        let err = store
            .search(
                "test",
                vec![1.0, 0.0, 0.0],
                1,
                None,
                Some(VectorFilter::text_eq("repo", "o/two")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::FilterUnsupported));
    }

    #[tokio::test]
    async fn delete_by_filter_removes_matching() {
        let store = seeded().await;
        store
            .delete_by_filter("test", VectorFilter::text_eq("repo", "o/one"))
            .await
            .unwrap();
        assert_eq!(store.count("test", None).await.unwrap(), 1);
        assert_eq!(
            store
                .count("test", Some(VectorFilter::text_eq("repo", "o/two")))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn count_missing_collection_is_zero() {
        let store = InMemoryVectorStore::new();
        assert_eq!(store.count("missing", None).await.unwrap(), 0);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b)).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryVectorStore::new();
        let dbg = format!("{store:?}");
        assert!(dbg.contains("InMemoryVectorStore"));
    }
}
