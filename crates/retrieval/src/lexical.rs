//! Lexical search using Tantivy (BM25)
//!
//! Builds a compound "any field matches" query: per weighted field, per
//! token, an exact term query plus a single-edit fuzzy term query, each
//! boosted by the field weight. Tokens shorter than three characters
//! stay exact-match only, which keeps their two-character prefix fixed.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery},
    schema::{
        Field, IndexRecordOption, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED,
        STRING,
    },
    tokenizer::{LowerCaser, RawTokenizer, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument, Term,
};

use casekb_core::{Candidate, FieldWeights, Item, SearchFilters, SourceTag};

use crate::RetrievalError;

/// Minimum token length for fuzzy matching; shorter tokens are exact
const FUZZY_MIN_TOKEN_LEN: usize = 3;

/// Lexical index configuration
#[derive(Debug, Clone, Default)]
pub struct LexicalIndexConfig {
    /// Index directory (RAM when `None`)
    pub index_path: Option<String>,
}

struct Fields {
    id: Field,
    id_text: Field,
    title: Field,
    module: Field,
    description: Field,
    steps: Field,
    expected_results: Field,
    pre_requisites: Field,
    module_kw: Field,
    priority_kw: Field,
    risk_kw: Field,
    type_kw: Field,
    item_json: Field,
}

/// BM25 index over the item text fields
#[allow(dead_code)]
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

impl LexicalIndex {
    pub fn new(config: LexicalIndexConfig) -> Result<Self, RetrievalError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("casekb_text")
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("keyword_lower")
                .set_index_option(IndexRecordOption::Basic),
        );

        let fields = Fields {
            id: schema_builder.add_text_field("id", STRING | STORED),
            id_text: schema_builder.add_text_field("id_text", id_text_options),
            title: schema_builder.add_text_field("title", text_options.clone()),
            module: schema_builder.add_text_field("module", text_options.clone()),
            description: schema_builder.add_text_field("description", text_options.clone()),
            steps: schema_builder.add_text_field("steps", text_options.clone()),
            expected_results: schema_builder
                .add_text_field("expected_results", text_options.clone()),
            pre_requisites: schema_builder.add_text_field("pre_requisites", text_options),
            module_kw: schema_builder.add_text_field("module_kw", STRING | STORED),
            priority_kw: schema_builder.add_text_field("priority_kw", STRING | STORED),
            risk_kw: schema_builder.add_text_field("risk_kw", STRING | STORED),
            type_kw: schema_builder.add_text_field("type_kw", STRING | STORED),
            item_json: schema_builder
                .add_text_field("item_json", TextOptions::default().set_stored()),
        };

        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            std::fs::create_dir_all(path)
                .map_err(|e| RetrievalError::Index(e.to_string()))?;
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| RetrievalError::Index(e.to_string()))?;
            Index::open_or_create(dir, schema)
                .map_err(|e| RetrievalError::Index(e.to_string()))?
        } else {
            Index::create_in_ram(schema)
        };

        // No stemmer: the compound query builds terms directly, so
        // indexed tokens must match the raw lower-cased query tokens.
        // Single-edit fuzziness covers inflection drift instead.
        let text_analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser)
            .build();
        index.tokenizers().register("casekb_text", text_analyzer);

        let keyword_lower = TextAnalyzer::builder(RawTokenizer::default())
            .filter(LowerCaser)
            .build();
        index.tokenizers().register("keyword_lower", keyword_lower);

        let reader = index
            .reader()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        let writer = index
            .writer(50_000_000)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    /// Index a batch of items and make them visible to searches.
    pub fn index_items(&self, items: &[Item]) -> Result<(), RetrievalError> {
        let mut writer = self.writer.lock();

        for item in items {
            let payload = serde_json::to_string(item)
                .map_err(|e| RetrievalError::Index(e.to_string()))?;

            let mut doc = TantivyDocument::default();
            doc.add_text(self.fields.id, &item.id);
            doc.add_text(self.fields.id_text, &item.id);
            doc.add_text(self.fields.title, &item.title);
            doc.add_text(self.fields.module, &item.module);
            doc.add_text(self.fields.description, &item.description);
            doc.add_text(self.fields.steps, &item.steps);
            doc.add_text(self.fields.expected_results, &item.expected_results);
            doc.add_text(self.fields.pre_requisites, &item.pre_requisites);
            doc.add_text(self.fields.module_kw, &item.module);
            doc.add_text(self.fields.priority_kw, &item.priority);
            doc.add_text(self.fields.risk_kw, &item.risk);
            if let Some(item_type) = item.item_type() {
                doc.add_text(self.fields.type_kw, item_type);
            }
            doc.add_text(self.fields.item_json, &payload);

            writer
                .add_document(doc)
                .map_err(|e| RetrievalError::Index(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        tracing::debug!(count = items.len(), "Indexed items into lexical index");
        Ok(())
    }

    fn searchable_field(&self, name: &str) -> Option<Field> {
        match name {
            "id" => Some(self.fields.id_text),
            "title" => Some(self.fields.title),
            "module" => Some(self.fields.module),
            "description" => Some(self.fields.description),
            "steps" => Some(self.fields.steps),
            "expected_results" => Some(self.fields.expected_results),
            "pre_requisites" => Some(self.fields.pre_requisites),
            _ => None,
        }
    }

    fn keyword_field(&self, name: &str) -> Option<Field> {
        match name {
            "module" => Some(self.fields.module_kw),
            "priority" => Some(self.fields.priority_kw),
            "risk" => Some(self.fields.risk_kw),
            "type" => Some(self.fields.type_kw),
            _ => None,
        }
    }

    /// BM25 search with per-field boosts and AND-composed filters.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
        weights: &FieldWeights,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut should: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field_name, weight) in weights.iter() {
            let Some(field) = self.searchable_field(field_name) else {
                continue;
            };
            for token in &tokens {
                let term = Term::from_field_text(field, token);
                let exact = TermQuery::new(term.clone(), IndexRecordOption::WithFreqs);
                should.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(Box::new(exact), weight)),
                ));

                if token.chars().count() >= FUZZY_MIN_TOKEN_LEN {
                    let fuzzy = FuzzyTermQuery::new(term, 1, true);
                    should.push((
                        Occur::Should,
                        Box::new(BoostQuery::new(Box::new(fuzzy), weight)),
                    ));
                }
            }
        }
        if should.is_empty() {
            return Ok(Vec::new());
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        let mut extra_filters = Vec::new();
        for (field_name, value) in filters.as_pairs() {
            match self.keyword_field(&field_name) {
                Some(field) => {
                    let term = Term::from_field_text(field, &value);
                    clauses.push((
                        Occur::Must,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                    ));
                }
                // Opaque metadata keys have no schema field; applied to
                // the decoded items below
                None => extra_filters.push((field_name, value)),
            }
        }
        clauses.push((Occur::Must, Box::new(BooleanQuery::new(should))));
        let compound = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&compound, &TopDocs::with_limit(top_k))
            .map_err(|e| RetrievalError::Search(e.to_string()))?;

        let mut candidates = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| RetrievalError::Search(e.to_string()))?;

            let payload = doc
                .get_first(self.fields.item_json)
                .and_then(|v| match v {
                    OwnedValue::Str(s) => Some(s.as_str()),
                    _ => None,
                })
                .unwrap_or("");

            let item: Item = serde_json::from_str(payload)
                .map_err(|e| RetrievalError::Search(format!("stored item decode: {}", e)))?;

            let matches_extra = extra_filters.iter().all(|(key, value)| {
                item.metadata
                    .get(key)
                    .and_then(|v| v.as_str())
                    .map(|v| v == value)
                    .unwrap_or(false)
            });
            if !matches_extra {
                continue;
            }

            candidates.push(Candidate {
                item,
                raw_score: score,
                source: SourceTag::Lexical,
            });
        }

        Ok(candidates)
    }

    /// Distinct values of a keyword metadata field, via the term
    /// dictionaries of every segment.
    pub fn distinct(&self, field_name: &str) -> Result<Vec<String>, RetrievalError> {
        let field = self
            .keyword_field(field_name)
            .ok_or_else(|| RetrievalError::Search(format!("unknown field: {}", field_name)))?;

        let searcher = self.reader.searcher();
        let mut values = BTreeSet::new();

        for segment in searcher.segment_readers() {
            let inverted = segment
                .inverted_index(field)
                .map_err(|e| RetrievalError::Search(e.to_string()))?;
            let mut stream = inverted
                .terms()
                .stream()
                .map_err(|e| RetrievalError::Search(e.to_string()))?;
            while stream.advance() {
                let value = String::from_utf8_lossy(stream.key()).into_owned();
                if !value.is_empty() {
                    values.insert(value);
                }
            }
        }

        Ok(values.into_iter().collect())
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

/// Async adapter over the index.
///
/// Tantivy searches are CPU-bound, so they run on the blocking pool
/// rather than a tokio worker thread.
pub struct TantivyLexicalSearcher {
    index: std::sync::Arc<LexicalIndex>,
}

impl TantivyLexicalSearcher {
    pub fn new(index: std::sync::Arc<LexicalIndex>) -> Self {
        Self { index }
    }
}

#[async_trait::async_trait]
impl casekb_core::LexicalSearcher for TantivyLexicalSearcher {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
        weights: &FieldWeights,
    ) -> casekb_core::Result<Vec<Candidate>> {
        let index = std::sync::Arc::clone(&self.index);
        let query = query.to_string();
        let filters = filters.clone();
        let weights = weights.clone();

        tokio::task::spawn_blocking(move || index.search(&query, top_k, &filters, &weights))
            .await
            .map_err(|e| casekb_core::Error::Internal(format!("search task failed: {}", e)))?
            .map_err(Into::into)
    }

    async fn distinct(&self, field: &str) -> casekb_core::Result<Vec<String>> {
        let index = std::sync::Arc::clone(&self.index);
        let field = field.to_string();

        tokio::task::spawn_blocking(move || index.distinct(&field))
            .await
            .map_err(|e| casekb_core::Error::Internal(format!("distinct task failed: {}", e)))?
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn item(id: &str, module: &str, title: &str, description: &str) -> Item {
        let mut metadata = HashMap::new();
        metadata.insert(
            "type".to_string(),
            serde_json::Value::String("testcase".to_string()),
        );
        Item {
            id: id.to_string(),
            module: module.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            steps: String::new(),
            expected_results: String::new(),
            pre_requisites: String::new(),
            priority: "High".to_string(),
            risk: "Medium".to_string(),
            embedding: None,
            metadata,
        }
    }

    fn populated_index() -> LexicalIndex {
        let index = LexicalIndex::new(LexicalIndexConfig::default()).unwrap();
        index
            .index_items(&[
                item(
                    "TC_1001",
                    "Consent",
                    "Patient Consent Verification - WhatsApp Communication",
                    "Verify consent is captured before WhatsApp messages are sent",
                ),
                item(
                    "TC_1002",
                    "Billing",
                    "Claim rejection flow",
                    "Rejected claims are flagged for manual review",
                ),
                item(
                    "TC_1003",
                    "Consent",
                    "Consent withdrawal",
                    "Patients can withdraw previously granted consent",
                ),
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_index_and_count() {
        let index = populated_index();
        assert_eq!(index.doc_count(), 3);
    }

    #[test]
    fn test_search_ranks_title_match_first() {
        let index = populated_index();
        let results = index
            .search(
                "patient consent whatsapp",
                10,
                &SearchFilters::new(),
                &FieldWeights::default(),
            )
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].item.id, "TC_1001");
        assert_eq!(results[0].source, SourceTag::Lexical);
        assert!(results[0].raw_score > 0.0);
    }

    #[test]
    fn test_search_by_identifier() {
        let index = populated_index();
        let results = index
            .search(
                "tc_1002",
                10,
                &SearchFilters::new(),
                &FieldWeights::default(),
            )
            .unwrap();
        assert_eq!(results[0].item.id, "TC_1002");
    }

    #[test]
    fn test_filters_restrict_results() {
        let index = populated_index();
        let results = index
            .search(
                "consent",
                10,
                &SearchFilters::new().module("Billing"),
                &FieldWeights::default(),
            )
            .unwrap();
        assert!(results.is_empty());

        let results = index
            .search(
                "consent",
                10,
                &SearchFilters::new().module("Consent"),
                &FieldWeights::default(),
            )
            .unwrap();
        assert!(results.iter().all(|c| c.item.module == "Consent"));
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let index = populated_index();
        let results = index
            .search(
                "zzzzzzz qqqqqqq",
                10,
                &SearchFilters::new(),
                &FieldWeights::default(),
            )
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_fuzzy_single_edit_matches() {
        let index = populated_index();
        // "consnt" is one edit away from "consent"
        let results = index
            .search(
                "consnt",
                10,
                &SearchFilters::new(),
                &FieldWeights::default(),
            )
            .unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn test_distinct_modules() {
        let index = populated_index();
        let modules = index.distinct("module").unwrap();
        assert_eq!(modules, vec!["Billing".to_string(), "Consent".to_string()]);
    }

    #[test]
    fn test_top_k_truncation() {
        let index = populated_index();
        let results = index
            .search(
                "consent",
                1,
                &SearchFilters::new(),
                &FieldWeights::default(),
            )
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
