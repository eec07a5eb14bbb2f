// Settings
//
// Defaults here, overridden by ~/.magpie/config.toml, overridden by
// environment variables. The novelty threshold and excerpt budget are
// deliberately configuration, not constants.

use serde::Deserialize;

use crate::errors::RunError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Claude,
    Openai,
}

impl std::str::FromStr for BackendKind {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(BackendKind::Claude),
            "openai" => Ok(BackendKind::Openai),
            other => Err(RunError::Config(format!(
                "unknown backend '{}' (expected claude or openai)",
                other
            ))),
        }
    }
}

/// A fixed guidance category for static-discovery mode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StaticCategory {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub guidance: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendKind,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Maximum candidate patterns requested per run.
    pub capacity: usize,
    /// Minimum novelty score (1-10) a dynamic candidate must reach.
    pub novelty_threshold: u8,
    /// Per-session character budget for prompt excerpts.
    pub excerpt_budget: usize,
    /// Force dynamic-discovery mode.
    pub dynamic: bool,
    /// Disable LLM calls entirely; progress still advances, no discovery.
    pub no_llm: bool,
    /// Similarity floor for static-mode category folding.
    pub match_threshold: f64,
    pub static_categories: Vec<StaticCategory>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Claude,
            api_key: None,
            model: None,
            max_tokens: 1024,
            temperature: 0.2,
            capacity: 5,
            novelty_threshold: 3,
            excerpt_budget: 4000,
            dynamic: false,
            no_llm: false,
            match_threshold: 0.2,
            static_categories: default_static_categories(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), RunError> {
        if !(1..=10).contains(&self.novelty_threshold) {
            return Err(RunError::Config(format!(
                "novelty threshold {} outside 1-10",
                self.novelty_threshold
            )));
        }
        if self.excerpt_budget == 0 {
            return Err(RunError::Config("excerpt budget must be positive".into()));
        }
        if self.capacity == 0 {
            return Err(RunError::Config("capacity must be positive".into()));
        }
        if !self.dynamic && self.static_categories.is_empty() {
            return Err(RunError::Config(
                "static mode requires at least one static category".into(),
            ));
        }
        Ok(())
    }

    /// Declared ordering of the fixed categories, used by the writer.
    pub fn static_order(&self) -> Vec<String> {
        self.static_categories.iter().map(|c| c.id.clone()).collect()
    }
}

fn default_static_categories() -> Vec<StaticCategory> {
    vec![
        StaticCategory {
            id: "verify-before-done".to_string(),
            title: "Verification Before Completion".to_string(),
            guidance: "Run the relevant tests or build before declaring a task done.\nReport failures honestly instead of hedging.".to_string(),
            keywords: ["test", "verify", "check", "build", "confirm", "done"]
                .map(String::from)
                .to_vec(),
        },
        StaticCategory {
            id: "context-first".to_string(),
            title: "Context Gathering".to_string(),
            guidance: "Read surrounding code and configuration before editing.\nPrefer searching the repository over guessing at structure.".to_string(),
            keywords: ["read", "search", "explore", "context", "file", "grep"]
                .map(String::from)
                .to_vec(),
        },
        StaticCategory {
            id: "scope-discipline".to_string(),
            title: "Scope Discipline".to_string(),
            guidance: "Keep changes minimal and on-task.\nLeave unrelated refactors out of the diff.".to_string(),
            keywords: ["scope", "minimal", "unrelated", "refactor", "diff"]
                .map(String::from)
                .to_vec(),
        },
    ]
}
