//! Per-request execution records

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing, counts and spend for one pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub duration_ms: u64,
    pub candidates_in: usize,
    pub candidates_out: usize,
    pub tokens: u64,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn timed(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn counts(mut self, candidates_in: usize, candidates_out: usize) -> Self {
        self.candidates_in = candidates_in;
        self.candidates_out = candidates_out;
        self
    }

    pub fn spend(mut self, tokens: u64, cost: f64) -> Self {
        self.tokens = tokens;
        self.cost = cost;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Roll-up over all stages of one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub stages: Vec<StageRecord>,
    pub total_duration_ms: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

impl ExecutionRecord {
    pub fn record(&mut self, stage: StageRecord) {
        self.total_duration_ms += stage.duration_ms;
        self.total_tokens += stage.tokens;
        self.total_cost += stage.cost;
        self.stages.push(stage);
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup_accumulates() {
        let mut record = ExecutionRecord::default();
        record.record(
            StageRecord::new("retrieve_vector")
                .timed(Duration::from_millis(120))
                .counts(0, 40)
                .spend(12, 0.0002),
        );
        record.record(
            StageRecord::new("summarise")
                .timed(Duration::from_millis(900))
                .counts(5, 5)
                .spend(160, 0.004),
        );

        assert_eq!(record.total_duration_ms, 1020);
        assert_eq!(record.total_tokens, 172);
        assert!((record.total_cost - 0.0042).abs() < 1e-12);
        assert_eq!(record.stage("summarise").unwrap().candidates_in, 5);
    }
}
