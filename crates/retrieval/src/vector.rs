//! Dense vector search using Qdrant
//!
//! The searcher embeds the query through the remote embedding backend
//! (which owns the retry policy), then queries the ANN index. Cosine
//! scores come back in [-1, 1] and are mapped to [0, 1] to satisfy the
//! contract that vector scores are cosine-derived and non-negative.

use qdrant_client::{
    qdrant::{
        value::Kind, Condition, CreateCollectionBuilder, Distance, FieldCondition, Filter, Match,
        PointStruct, SearchParams, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;

use casekb_core::{
    Candidate, EmbeddingBackend, Item, RemoteUsage, SearchFilters, SourceTag, VectorIndexWriter,
};

use crate::RetrievalError;

/// Vector search configuration
#[derive(Debug, Clone)]
pub struct VectorSearchConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Vector dimension enforced on upserts
    pub vector_dim: usize,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl Default for VectorSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: casekb_config::constants::endpoints::QDRANT_DEFAULT.to_string(),
            collection: "healthcare_testcases".to_string(),
            vector_dim: casekb_config::constants::embedding::DIMENSION,
            api_key: None,
        }
    }
}

/// ANN searcher backed by Qdrant
pub struct QdrantVectorSearcher {
    client: Qdrant,
    config: VectorSearchConfig,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl QdrantVectorSearcher {
    pub fn new(
        config: VectorSearchConfig,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Result<Self, RetrievalError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RetrievalError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config,
            embedder,
        })
    }

    /// Create the collection when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), RetrievalError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RetrievalError::Connection(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RetrievalError::Connection(e.to_string()))?;
            tracing::info!(
                collection = %self.config.collection,
                dim = self.config.vector_dim,
                "Created vector collection"
            );
        }

        Ok(())
    }

    fn filters_to_qdrant(filters: &SearchFilters) -> Option<Filter> {
        let pairs = filters.as_pairs();
        if pairs.is_empty() {
            return None;
        }

        let conditions: Vec<Condition> = pairs
            .into_iter()
            .map(|(key, value)| Condition {
                condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(
                    FieldCondition {
                        key,
                        r#match: Some(Match {
                            match_value: Some(
                                qdrant_client::qdrant::r#match::MatchValue::Keyword(value),
                            ),
                        }),
                        ..Default::default()
                    },
                )),
            })
            .collect();

        Some(Filter {
            must: conditions,
            ..Default::default()
        })
    }

    /// Map Qdrant's cosine score from [-1, 1] into [0, 1].
    fn normalise_cosine(score: f32) -> f32 {
        ((score + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

#[async_trait::async_trait]
impl casekb_core::VectorSearcher for QdrantVectorSearcher {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
        num_candidates: usize,
    ) -> casekb_core::Result<(Vec<Candidate>, RemoteUsage)> {
        let embedding = self.embedder.embed(query).await?;

        let mut search_builder = SearchPointsBuilder::new(
            &self.config.collection,
            embedding.vector,
            top_k as u64,
        )
        .with_payload(true)
        .params(SearchParams {
            hnsw_ef: Some(num_candidates as u64),
            ..Default::default()
        });

        if let Some(filter) = Self::filters_to_qdrant(filters) {
            search_builder = search_builder.filter(filter);
        }

        let response = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| casekb_core::Error::BackendUnavailable(e.to_string()))?;

        let mut candidates = Vec::with_capacity(response.result.len());
        for point in response.result {
            let payload = point
                .payload
                .get("item_json")
                .and_then(|v| match &v.kind {
                    Some(Kind::StringValue(s)) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_default();

            let item: Item = serde_json::from_str(&payload).map_err(|e| {
                casekb_core::Error::BackendUnavailable(format!("stored item decode: {}", e))
            })?;

            candidates.push(Candidate {
                item,
                raw_score: Self::normalise_cosine(point.score),
                source: SourceTag::Vector,
            });
        }

        Ok((candidates, embedding.usage))
    }
}

#[async_trait::async_trait]
impl VectorIndexWriter for QdrantVectorSearcher {
    async fn upsert(&self, items: &[Item]) -> casekb_core::Result<()> {
        let mut points = Vec::with_capacity(items.len());

        for item in items {
            let Some(ref vector) = item.embedding else {
                continue;
            };
            if vector.len() != self.config.vector_dim {
                return Err(RetrievalError::Dimension {
                    id: item.id.clone(),
                    expected: self.config.vector_dim,
                    actual: vector.len(),
                }
                .into());
            }

            let payload_json = serde_json::to_string(item)
                .map_err(|e| casekb_core::Error::Internal(e.to_string()))?;

            let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
            payload.insert("item_json".to_string(), payload_json.into());
            payload.insert("module".to_string(), item.module.clone().into());
            payload.insert("priority".to_string(), item.priority.clone().into());
            payload.insert("risk".to_string(), item.risk.clone().into());
            if let Some(item_type) = item.item_type() {
                payload.insert("type".to_string(), item_type.to_string().into());
            }

            points.push(PointStruct::new(
                uuid_from_id(&item.id),
                vector.clone(),
                payload,
            ));
        }

        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(|e| casekb_core::Error::BackendUnavailable(e.to_string()))?;

        tracing::debug!(count, "Upserted vectors");
        Ok(())
    }
}

/// Qdrant point ids must be uuids or integers; derive a stable uuid
/// from the item id so repeated upserts overwrite in place.
fn uuid_from_id(id: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, id.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_mapping_bounds() {
        assert!((QdrantVectorSearcher::normalise_cosine(1.0) - 1.0).abs() < f32::EPSILON);
        assert!((QdrantVectorSearcher::normalise_cosine(-1.0)).abs() < f32::EPSILON);
        assert!((QdrantVectorSearcher::normalise_cosine(0.0) - 0.5).abs() < f32::EPSILON);
        // Out-of-range input clamps rather than escaping [0, 1]
        assert!(QdrantVectorSearcher::normalise_cosine(1.5) <= 1.0);
    }

    #[test]
    fn test_filters_to_qdrant() {
        let filters = SearchFilters::new().module("Consent").priority("High");
        let qdrant_filter = QdrantVectorSearcher::filters_to_qdrant(&filters).unwrap();
        assert_eq!(qdrant_filter.must.len(), 2);

        assert!(QdrantVectorSearcher::filters_to_qdrant(&SearchFilters::new()).is_none());
    }

    #[test]
    fn test_stable_uuid_derivation() {
        let a = uuid_from_id("TC_1001");
        let b = uuid_from_id("TC_1001");
        let c = uuid_from_id("TC_1002");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 36);
    }
}
