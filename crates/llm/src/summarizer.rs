//! Candidate summarisation
//!
//! Assembles a bounded prompt from the surviving candidates and asks
//! the completion service for a digest. The payload guards are strict:
//! per-field character caps and a hard item cap, both independent of
//! the retrieval `limit`, so a fat corpus cannot blow up the prompt.

use std::sync::Arc;

use casekb_core::{
    CompletionBackend, Error, ItemProjection, Message, Result, TokenUsage,
};

use casekb_config::constants::summary as defaults;

/// Digest style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStyle {
    Concise,
    Detailed,
}

impl std::str::FromStr for SummaryStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concise" => Ok(SummaryStyle::Concise),
            "detailed" => Ok(SummaryStyle::Detailed),
            other => Err(Error::InvalidArgument(format!(
                "unknown summary type: {}",
                other
            ))),
        }
    }
}

/// Summariser configuration
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Items included in the prompt regardless of input size
    pub max_items: usize,
    pub description_chars: usize,
    pub business_value_chars: usize,
    pub acceptance_chars: usize,
    /// Completion budget
    pub max_tokens: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_items: defaults::MAX_ITEMS,
            description_chars: defaults::DESCRIPTION_CHARS,
            business_value_chars: defaults::BUSINESS_VALUE_CHARS,
            acceptance_chars: defaults::ACCEPTANCE_CHARS,
            max_tokens: 512,
        }
    }
}

/// Result of one summarisation call
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeOutcome {
    pub summary: String,
    pub usage: TokenUsage,
    pub cost: f64,
    pub model: String,
    /// Non-fatal anomalies (e.g. a truncated fenced payload)
    pub warnings: Vec<String>,
}

/// Summariser over a pluggable completion backend
pub struct Summarizer {
    backend: Arc<dyn CompletionBackend>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: SummarizerConfig) -> Self {
        Self { backend, config }
    }

    /// Summarise the given items.
    ///
    /// One retry on failure; the second failure surfaces as
    /// `SummariserFailure`, which the orchestrator treats as non-fatal.
    pub async fn summarize(
        &self,
        items: &[ItemProjection],
        style: SummaryStyle,
    ) -> Result<SummarizeOutcome> {
        if items.is_empty() {
            return Err(Error::InvalidArgument("no items to summarise".to_string()));
        }

        let messages = self.build_messages(items, style);

        let outcome = match self.backend.complete(&messages, self.config.max_tokens).await {
            Ok(outcome) => outcome,
            Err(first) => {
                tracing::warn!(error = %first, "Summariser call failed, retrying once");
                self.backend
                    .complete(&messages, self.config.max_tokens)
                    .await
                    .map_err(|e| Error::SummariserFailure(e.to_string()))?
            }
        };

        let mut warnings = Vec::new();
        let text = strip_markdown_fence(&outcome.text);
        if looks_truncated_json(text) {
            warnings.push("summariser returned a truncated payload".to_string());
        }

        Ok(SummarizeOutcome {
            summary: text.to_string(),
            usage: outcome.usage,
            cost: outcome.cost,
            model: outcome.model,
            warnings,
        })
    }

    fn build_messages(&self, items: &[ItemProjection], style: SummaryStyle) -> Vec<Message> {
        let instruction = match style {
            SummaryStyle::Concise => {
                "Summarise the following healthcare test cases and user stories in a short \
                 paragraph. Focus on the common theme and coverage."
            }
            SummaryStyle::Detailed => {
                "Summarise the following healthcare test cases and user stories. For each item \
                 give one sentence on intent and note gaps or overlaps across the set."
            }
        };

        let mut body = String::new();
        for (idx, item) in items.iter().take(self.config.max_items).enumerate() {
            body.push_str(&format!("{}. [{}] {}\n", idx + 1, item.id, item.title));
            if !item.module.is_empty() {
                body.push_str(&format!("   Module: {}\n", item.module));
            }
            if !item.priority.is_empty() {
                body.push_str(&format!("   Priority: {}\n", item.priority));
            }
            if !item.description.is_empty() {
                body.push_str(&format!(
                    "   Description: {}\n",
                    truncate_chars(&item.description, self.config.description_chars)
                ));
            }
            if !item.business_value.is_empty() {
                body.push_str(&format!(
                    "   Business value: {}\n",
                    truncate_chars(&item.business_value, self.config.business_value_chars)
                ));
            }
            if !item.acceptance_criteria.is_empty() {
                body.push_str(&format!(
                    "   Acceptance criteria: {}\n",
                    truncate_chars(&item.acceptance_criteria, self.config.acceptance_chars)
                ));
            }
        }

        vec![
            Message::system(
                "You are a QA analyst summarising retrieved healthcare test artefacts.",
            ),
            Message::user(format!("{}\n\n{}", instruction, body)),
        ]
    }
}

/// Character-boundary-safe truncation with an ellipsis marker.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

/// Strip a markdown code fence from a completion response.
///
/// The completion service sometimes wraps JSON payloads in
/// ```` ```json ... ``` ```` fences; strip them before parsing.
pub fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the optional language tag on the fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or_else(|| rest.trim())
}

/// A fenced JSON object that does not end with `}` was probably cut off
/// by the token budget; that is reported as a warning, not a failure.
fn looks_truncated_json(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('{') && !trimmed.ends_with('}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use casekb_core::CompletionOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        /// Number of calls that fail before one succeeds
        failures: usize,
        calls: AtomicUsize,
        response: String,
    }

    #[async_trait::async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            _messages: &[Message],
            _max_tokens: u32,
        ) -> Result<CompletionOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(Error::SummariserFailure("upstream 503".to_string()));
            }
            Ok(CompletionOutcome {
                text: self.response.clone(),
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 30,
                    total_tokens: 130,
                },
                cost: 0.001,
                model: "gpt-4o-mini".to_string(),
            })
        }
    }

    fn projection(id: &str, title: &str) -> ItemProjection {
        ItemProjection {
            id: id.to_string(),
            title: title.to_string(),
            module: "Consent".to_string(),
            priority: "High".to_string(),
            description: "d".repeat(500),
            business_value: "v".repeat(300),
            acceptance_criteria: "a".repeat(400),
        }
    }

    #[tokio::test]
    async fn test_summarize_success() {
        let backend = Arc::new(ScriptedBackend {
            failures: 0,
            calls: AtomicUsize::new(0),
            response: "A digest.".to_string(),
        });
        let summarizer = Summarizer::new(backend, SummarizerConfig::default());
        let outcome = summarizer
            .summarize(&[projection("TC_1", "Consent capture")], SummaryStyle::Concise)
            .await
            .unwrap();
        assert_eq!(outcome.summary, "A digest.");
        assert_eq!(outcome.usage.total_tokens, 130);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_single_retry_then_success() {
        let backend = Arc::new(ScriptedBackend {
            failures: 1,
            calls: AtomicUsize::new(0),
            response: "Recovered digest.".to_string(),
        });
        let summarizer = Summarizer::new(backend.clone(), SummarizerConfig::default());
        let outcome = summarizer
            .summarize(&[projection("TC_1", "Consent capture")], SummaryStyle::Concise)
            .await
            .unwrap();
        assert_eq!(outcome.summary, "Recovered digest.");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_failure_is_summariser_failure() {
        let backend = Arc::new(ScriptedBackend {
            failures: 2,
            calls: AtomicUsize::new(0),
            response: String::new(),
        });
        let summarizer = Summarizer::new(backend.clone(), SummarizerConfig::default());
        let err = summarizer
            .summarize(&[projection("TC_1", "Consent capture")], SummaryStyle::Concise)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SummariserFailure(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let backend = Arc::new(ScriptedBackend {
            failures: 0,
            calls: AtomicUsize::new(0),
            response: String::new(),
        });
        let summarizer = Summarizer::new(backend, SummarizerConfig::default());
        let err = summarizer.summarize(&[], SummaryStyle::Concise).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_prompt_respects_item_cap_and_field_limits() {
        let backend = Arc::new(ScriptedBackend {
            failures: 0,
            calls: AtomicUsize::new(0),
            response: String::new(),
        });
        let summarizer = Summarizer::new(backend, SummarizerConfig::default());
        let items: Vec<ItemProjection> = (0..10)
            .map(|i| projection(&format!("TC_{}", i), &format!("Title {}", i)))
            .collect();
        let messages = summarizer.build_messages(&items, SummaryStyle::Detailed);
        let prompt = &messages[1].content;

        // Only the first five items appear
        assert!(prompt.contains("[TC_4]"));
        assert!(!prompt.contains("[TC_5]"));
        // The 500-char description was cut to 200 (+ ellipsis)
        assert!(!prompt.contains(&"d".repeat(300)));
        assert!(prompt.contains(&format!("{}...", "d".repeat(200))));
    }

    #[test]
    fn test_strip_markdown_fence() {
        assert_eq!(
            strip_markdown_fence("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
        assert_eq!(strip_markdown_fence("```\nplain\n```"), "plain");
        assert_eq!(strip_markdown_fence("no fences"), "no fences");
    }

    #[test]
    fn test_truncation_detection() {
        assert!(looks_truncated_json("{\"summary\": \"cut of"));
        assert!(!looks_truncated_json("{\"summary\": \"done\"}"));
        assert!(!looks_truncated_json("plain text"));
    }

    #[tokio::test]
    async fn test_truncated_fenced_payload_warns() {
        let backend = Arc::new(ScriptedBackend {
            failures: 0,
            calls: AtomicUsize::new(0),
            response: "```json\n{\"summary\": \"cut".to_string(),
        });
        let summarizer = Summarizer::new(backend, SummarizerConfig::default());
        let outcome = summarizer
            .summarize(&[projection("TC_1", "Consent capture")], SummaryStyle::Concise)
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
    }
}
