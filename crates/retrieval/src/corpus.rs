//! Corpus loading
//!
//! Reads a JSON corpus file (a bare array of items or `{"items": [..]}`)
//! and populates both halves of the search backend: text fields into the
//! lexical index, stored embeddings into the vector index. Embedding
//! generation itself belongs to the bulk build jobs, not the loader.

use serde::Deserialize;
use std::path::Path;

use casekb_core::{Item, VectorIndexWriter};

use crate::lexical::LexicalIndex;
use crate::RetrievalError;

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Wrapped { items: Vec<Item> },
    Bare(Vec<Item>),
}

/// Loads JSON corpora into the search backend
pub struct CorpusLoader {
    expected_dim: usize,
}

impl CorpusLoader {
    pub fn new(expected_dim: usize) -> Self {
        Self { expected_dim }
    }

    /// Parse and validate a corpus file.
    ///
    /// Items carrying an embedding of the wrong dimension are a hard
    /// error: a silently mis-sized vector would poison the ANN index.
    pub fn load_file(&self, path: &Path) -> Result<Vec<Item>, RetrievalError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RetrievalError::Corpus(format!("{}: {}", path.display(), e)))?;

        let parsed: CorpusFile = serde_json::from_str(&raw)
            .map_err(|e| RetrievalError::Corpus(format!("{}: {}", path.display(), e)))?;

        let items = match parsed {
            CorpusFile::Wrapped { items } => items,
            CorpusFile::Bare(items) => items,
        };

        for item in &items {
            if item.id.is_empty() {
                return Err(RetrievalError::Corpus("item with empty id".to_string()));
            }
            if let Some(ref embedding) = item.embedding {
                if embedding.len() != self.expected_dim {
                    return Err(RetrievalError::Dimension {
                        id: item.id.clone(),
                        expected: self.expected_dim,
                        actual: embedding.len(),
                    });
                }
            }
        }

        Ok(items)
    }

    /// Load a corpus file into both indexes. Returns the number of
    /// items indexed.
    pub async fn load_into(
        &self,
        path: &Path,
        lexical: &LexicalIndex,
        vector: &dyn VectorIndexWriter,
    ) -> Result<usize, RetrievalError> {
        let items = self.load_file(path)?;

        lexical.index_items(&items)?;

        let with_vectors: Vec<Item> = items
            .iter()
            .filter(|i| i.embedding.is_some())
            .cloned()
            .collect();
        if !with_vectors.is_empty() {
            vector
                .upsert(&with_vectors)
                .await
                .map_err(|e| RetrievalError::Corpus(e.to_string()))?;
        }

        tracing::info!(
            file = %path.display(),
            items = items.len(),
            vectors = with_vectors.len(),
            "Corpus loaded"
        );

        Ok(items.len())
    }
}
