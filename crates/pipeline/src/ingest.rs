//! Bulk embedding builds
//!
//! Walks a corpus in fixed-size batches, embeds item text through the
//! remote backend and upserts the vectors. At most `max_in_flight`
//! batches run concurrently and consecutive batch groups are separated
//! by a delay, which keeps the embedding service inside its rate
//! limits. Progress and per-batch results go through the job registry.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use casekb_config::constants::ingest as defaults;
use casekb_core::{EmbeddingBackend, Item, Result, VectorIndexWriter};

use crate::jobs::{FileResult, JobRegistry, JobStatus};

/// Batching and concurrency limits for one build
#[derive(Debug, Clone)]
pub struct IngestLimits {
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub inter_batch_delay: Duration,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            max_in_flight: defaults::MAX_IN_FLIGHT,
            inter_batch_delay: Duration::from_millis(defaults::INTER_BATCH_DELAY_MS),
        }
    }
}

/// Runs embedding builds against the vector index
pub struct EmbeddingBuildRunner {
    embedder: Arc<dyn EmbeddingBackend>,
    writer: Arc<dyn VectorIndexWriter>,
    registry: Arc<JobRegistry>,
    limits: IngestLimits,
}

impl EmbeddingBuildRunner {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        writer: Arc<dyn VectorIndexWriter>,
        registry: Arc<JobRegistry>,
        limits: IngestLimits,
    ) -> Self {
        Self {
            embedder,
            writer,
            registry,
            limits,
        }
    }

    /// Embed and upsert every item, tracking progress under a new job.
    /// Returns the job id; the job record carries the final status.
    pub async fn run(&self, source: &str, items: Vec<Item>) -> Result<String> {
        let job = self.registry.create(items.len());
        let job_id = job.id.clone();

        let batches: Vec<Vec<Item>> = items
            .chunks(self.limits.batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        let batch_count = batches.len();
        let limiter = Arc::new(Semaphore::new(self.limits.max_in_flight.max(1)));

        let mut failed_batches = 0usize;

        for (group_idx, group) in batches
            .chunks(self.limits.max_in_flight.max(1))
            .enumerate()
        {
            if group_idx > 0 {
                tokio::time::sleep(self.limits.inter_batch_delay).await;
            }

            let tasks = group.iter().enumerate().map(|(offset, batch)| {
                let batch = batch.clone();
                let batch_idx = group_idx * self.limits.max_in_flight.max(1) + offset;
                let limiter = Arc::clone(&limiter);
                async move {
                    let _permit = limiter.acquire().await;
                    (batch_idx, self.process_batch(batch).await)
                }
            });

            for (batch_idx, outcome) in join_all(tasks).await {
                let name = format!("{}#batch-{}", source, batch_idx);
                let (processed, result) = match outcome {
                    Ok(count) => (
                        count,
                        FileResult {
                            name,
                            success: true,
                            message: None,
                        },
                    ),
                    Err(ref e) => {
                        failed_batches += 1;
                        (
                            0,
                            FileResult {
                                name,
                                success: false,
                                message: Some(e.to_string()),
                            },
                        )
                    }
                };

                self.registry.update(&job_id, |job| {
                    job.progress += processed;
                    job.file_results.push(result);
                })?;
            }
        }

        let status = if failed_batches == batch_count && batch_count > 0 {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.registry.update(&job_id, |job| {
            job.status = status;
            job.finished_at = Some(chrono::Utc::now());
        })?;

        tracing::info!(
            job_id = %job_id,
            batches = batch_count,
            failed = failed_batches,
            "Embedding build finished"
        );

        Ok(job_id)
    }

    async fn process_batch(&self, mut batch: Vec<Item>) -> Result<usize> {
        for item in &mut batch {
            let text = item.full_text();
            let embedding = self.embedder.embed(&text).await?;
            item.embedding = Some(embedding.vector);
        }
        self.writer.upsert(&batch).await?;
        Ok(batch.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use casekb_core::{EmbeddingVector, Error, RemoteUsage};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingBackend for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<EmbeddingVector> {
            if self.fail {
                return Err(Error::EmbeddingFailure("down".to_string()));
            }
            Ok(EmbeddingVector {
                vector: vec![0.0; 4],
                usage: RemoteUsage::default(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        upserted: Mutex<usize>,
    }

    #[async_trait]
    impl VectorIndexWriter for RecordingWriter {
        async fn upsert(&self, items: &[Item]) -> Result<()> {
            *self.upserted.lock() += items.len();
            Ok(())
        }
    }

    fn items(count: usize) -> Vec<Item> {
        (0..count)
            .map(|i| Item {
                id: format!("TC_{}", i),
                module: String::new(),
                title: format!("case {}", i),
                description: String::new(),
                steps: String::new(),
                expected_results: String::new(),
                pre_requisites: String::new(),
                priority: String::new(),
                risk: String::new(),
                embedding: None,
                metadata: HashMap::new(),
            })
            .collect()
    }

    fn limits() -> IngestLimits {
        IngestLimits {
            batch_size: 2,
            max_in_flight: 2,
            inter_batch_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_successful_build_completes_job() {
        let registry = Arc::new(JobRegistry::new(Duration::from_secs(3600)));
        let writer = Arc::new(RecordingWriter::default());
        let runner = EmbeddingBuildRunner::new(
            Arc::new(FixedEmbedder { fail: false }),
            writer.clone(),
            Arc::clone(&registry),
            limits(),
        );

        let job_id = runner.run("corpus.json", items(5)).await.unwrap();
        let job = registry.get(&job_id).unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 5);
        assert_eq!(job.total, 5);
        assert_eq!(job.file_results.len(), 3); // ceil(5 / 2) batches
        assert!(job.file_results.iter().all(|r| r.success));
        assert!(job.finished_at.is_some());
        assert_eq!(*writer.upserted.lock(), 5);
    }

    #[tokio::test]
    async fn test_all_batches_failing_fails_job() {
        let registry = Arc::new(JobRegistry::new(Duration::from_secs(3600)));
        let runner = EmbeddingBuildRunner::new(
            Arc::new(FixedEmbedder { fail: true }),
            Arc::new(RecordingWriter::default()),
            Arc::clone(&registry),
            limits(),
        );

        let job_id = runner.run("corpus.json", items(4)).await.unwrap();
        let job = registry.get(&job_id).unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0);
        assert!(job.file_results.iter().all(|r| !r.success));
    }

    #[tokio::test]
    async fn test_empty_corpus_completes_immediately() {
        let registry = Arc::new(JobRegistry::new(Duration::from_secs(3600)));
        let runner = EmbeddingBuildRunner::new(
            Arc::new(FixedEmbedder { fail: false }),
            Arc::new(RecordingWriter::default()),
            Arc::clone(&registry),
            limits(),
        );

        let job_id = runner.run("empty.json", Vec::new()).await.unwrap();
        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total, 0);
    }
}
