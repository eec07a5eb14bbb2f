// Pattern discovery engine
//
// One narrow interface over interchangeable LLM backends: the engine submits
// a prompt and gets back validated candidate patterns. Backend output is
// strictly schema-checked before any downstream use; nothing downstream ever
// sees an unvalidated field.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{BackendKind, Settings};
use crate::errors::RunError;

pub mod claude;
pub mod openai;
pub mod prompt;
pub mod retry;

pub use claude::ClaudeBackend;
pub use openai::OpenAiBackend;

/// A candidate theme proposed by the backend, post-validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub description: String,
    pub examples: Vec<String>,
    /// Lowercase keywords for matching the pattern against session text.
    pub keywords: Vec<String>,
    pub novelty: Option<u8>,
}

/// Backend-level failure. `retryable` marks transient conditions (rate
/// limits, 5xx, transport errors); auth and malformed-request failures are
/// never retried.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub retryable: bool,
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Raw-completion interface implemented by each provider.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Send the prompt and return the model's raw text output.
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;

    /// Provider name (e.g. "claude", "openai").
    fn name(&self) -> &str;
}

/// The engine pairs a backend with validation and retry.
pub struct DiscoveryEngine {
    backend: Box<dyn DiscoveryBackend>,
    capacity: usize,
    dynamic: bool,
}

impl DiscoveryEngine {
    pub fn new(backend: Box<dyn DiscoveryBackend>, capacity: usize, dynamic: bool) -> Self {
        Self {
            backend,
            capacity,
            dynamic,
        }
    }

    /// Submit a prompt; returns up to `capacity` validated candidates.
    pub async fn submit(&self, prompt: &str) -> Result<Vec<Candidate>, RunError> {
        tracing::debug!("submitting discovery prompt to {}", self.backend.name());
        let raw = retry::with_retry(|| self.backend.complete(prompt))
            .await
            .map_err(|e| RunError::BackendUnavailable(e.message))?;
        parse_candidates(&raw, self.capacity, self.dynamic)
    }
}

/// Build the configured backend. No credential is a `BackendUnavailable`
/// hard stop, not a silent skip.
pub fn create_backend(settings: &Settings) -> Result<Box<dyn DiscoveryBackend>, RunError> {
    let api_key = settings.api_key.clone().ok_or_else(|| {
        RunError::BackendUnavailable(
            "no API credential configured (set ANTHROPIC_API_KEY or OPENAI_API_KEY)".to_string(),
        )
    })?;
    let backend: Box<dyn DiscoveryBackend> = match settings.backend {
        BackendKind::Claude => Box::new(ClaudeBackend::new(
            api_key,
            settings.model.clone(),
            settings.max_tokens,
            settings.temperature,
        )?),
        BackendKind::Openai => Box::new(OpenAiBackend::new(
            api_key,
            settings.model.clone(),
            settings.max_tokens,
            settings.temperature,
        )?),
    };
    Ok(backend)
}

#[derive(Debug, Deserialize)]
struct CandidateWire {
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    novelty: Option<i64>,
}

const MAX_KEYWORDS: usize = 6;
const MAX_KEYWORD_LEN: usize = 40;

/// Lowercase and bound the keyword list. Keywords are advisory, so a sloppy
/// list is cleaned up rather than rejected.
fn normalize_keywords(raw: Vec<String>) -> Vec<String> {
    let mut keywords = Vec::new();
    for keyword in raw {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        let keyword: String = keyword.chars().take(MAX_KEYWORD_LEN).collect();
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// Validate the backend's raw output against the candidate schema. Models
/// often wrap JSON in a markdown fence; that wrapper is tolerated, nothing
/// else is.
pub fn parse_candidates(
    raw: &str,
    capacity: usize,
    dynamic: bool,
) -> Result<Vec<Candidate>, RunError> {
    let body = strip_code_fence(raw);

    let wires: Vec<CandidateWire> = serde_json::from_str(body)
        .map_err(|e| RunError::malformed(format!("expected a JSON array of candidates: {}", e), raw))?;

    let mut candidates = Vec::new();
    for wire in wires.into_iter().take(capacity) {
        let title = match wire.title {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => return Err(RunError::malformed("candidate missing title", raw)),
        };
        let description = wire.description.unwrap_or_default().trim().to_string();

        if wire.examples.is_empty() || wire.examples.len() > 3 {
            return Err(RunError::malformed(
                format!("candidate '{}' must carry 1-3 examples", title),
                raw,
            ));
        }

        let novelty = match wire.novelty {
            Some(n) if (1..=10).contains(&n) => Some(n as u8),
            Some(n) => {
                return Err(RunError::malformed(
                    format!("candidate '{}' novelty {} outside 1-10", title, n),
                    raw,
                ))
            }
            None if dynamic => {
                return Err(RunError::malformed(
                    format!("candidate '{}' missing novelty score", title),
                    raw,
                ))
            }
            None => None,
        };

        candidates.push(Candidate {
            title,
            description,
            examples: wire.examples,
            keywords: normalize_keywords(wire.keywords),
            novelty,
        });
    }

    Ok(candidates)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        response: Result<String, String>,
    }

    #[async_trait]
    impl DiscoveryBackend for Scripted {
        async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
            match &self.response {
                Ok(raw) => Ok(raw.clone()),
                Err(message) => Err(BackendError::fatal(message.clone())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_engine_submit_returns_validated_candidates() {
        let backend = Scripted {
            response: Ok(
                r#"[{"title": "Retry Loops", "description": "d", "examples": ["q"], "novelty": 6}]"#
                    .to_string(),
            ),
        };
        let engine = DiscoveryEngine::new(Box::new(backend), 5, true);
        let candidates = engine.submit("prompt").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Retry Loops");
    }

    #[tokio::test]
    async fn test_engine_maps_backend_failure_to_unavailable() {
        let backend = Scripted {
            response: Err("invalid api key".to_string()),
        };
        let engine = DiscoveryEngine::new(Box::new(backend), 5, true);
        match engine.submit("prompt").await {
            Err(RunError::BackendUnavailable(message)) => {
                assert!(message.contains("invalid api key"));
            }
            other => panic!("expected BackendUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_engine_flags_malformed_output() {
        let backend = Scripted {
            response: Ok("sorry, I cannot help with that".to_string()),
        };
        let engine = DiscoveryEngine::new(Box::new(backend), 5, true);
        assert!(matches!(
            engine.submit("prompt").await,
            Err(RunError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_parse_valid_candidates() {
        let raw = r#"[
            {"title": "Premature Completion", "description": "Declares done before tests pass", "examples": ["said done, build was red"], "novelty": 7},
            {"title": "Over-broad Edits", "description": "Touches unrelated files", "examples": ["reformatted whole module"], "novelty": 4}
        ]"#;
        let candidates = parse_candidates(raw, 5, true).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Premature Completion");
        assert_eq!(candidates[0].novelty, Some(7));
    }

    #[test]
    fn test_parse_respects_capacity() {
        let raw = r#"[
            {"title": "A", "examples": ["a"], "novelty": 5},
            {"title": "B", "examples": ["b"], "novelty": 5},
            {"title": "C", "examples": ["c"], "novelty": 5}
        ]"#;
        let candidates = parse_candidates(raw, 2, true).unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_parse_strips_markdown_fence() {
        let raw = "```json\n[{\"title\": \"A\", \"examples\": [\"a\"], \"novelty\": 5}]\n```";
        let candidates = parse_candidates(raw, 5, true).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let err = parse_candidates("I could not find any patterns.", 5, true).unwrap_err();
        match err {
            RunError::MalformedResponse { snippet, .. } => {
                assert!(snippet.contains("could not find"));
            }
            _ => panic!("expected MalformedResponse"),
        }
    }

    #[test]
    fn test_parse_rejects_missing_novelty_in_dynamic_mode() {
        let raw = r#"[{"title": "A", "examples": ["a"]}]"#;
        assert!(parse_candidates(raw, 5, true).is_err());
        // Static mode accepts the same payload
        assert!(parse_candidates(raw, 5, false).is_ok());
    }

    #[test]
    fn test_parse_rejects_out_of_range_novelty() {
        let raw = r#"[{"title": "A", "examples": ["a"], "novelty": 11}]"#;
        assert!(parse_candidates(raw, 5, true).is_err());
    }

    #[test]
    fn test_parse_normalizes_keywords() {
        let raw = r#"[{"title": "A", "examples": ["a"], "novelty": 5,
            "keywords": [" Test ", "VERIFY", "test", "", "b", "c", "d", "e"]}]"#;
        let candidates = parse_candidates(raw, 5, true).unwrap();
        assert_eq!(
            candidates[0].keywords,
            vec!["test", "verify", "b", "c", "d", "e"]
        );
    }

    #[test]
    fn test_parse_tolerates_missing_keywords() {
        let raw = r#"[{"title": "A", "examples": ["a"], "novelty": 5}]"#;
        let candidates = parse_candidates(raw, 5, true).unwrap();
        assert!(candidates[0].keywords.is_empty());
    }

    #[test]
    fn test_parse_rejects_too_many_examples() {
        let raw = r#"[{"title": "A", "examples": ["a", "b", "c", "d"], "novelty": 5}]"#;
        assert!(parse_candidates(raw, 5, true).is_err());
    }
}
