// Configuration loader
// Defaults <- ~/.magpie/config.toml <- environment variables

use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::settings::{Settings, StaticCategory};
use crate::errors::RunError;

/// Optional config file shape. Every field falls back to the built-in
/// default when absent.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    backend: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    capacity: Option<usize>,
    #[serde(default)]
    novelty_threshold: Option<u8>,
    #[serde(default)]
    excerpt_budget: Option<usize>,
    #[serde(default)]
    dynamic: Option<bool>,
    #[serde(default)]
    match_threshold: Option<f64>,
    #[serde(default)]
    static_categories: Vec<StaticCategory>,
}

/// Load settings from config file and environment. Validation failures are
/// fatal before any I/O side effect.
pub fn load_settings() -> Result<Settings, RunError> {
    let mut settings = Settings::default();

    if let Some(home) = dirs::home_dir() {
        let config_path = home.join(".magpie/config.toml");
        if config_path.exists() {
            apply_file(&mut settings, &config_path)?;
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, path: &Path) -> Result<(), RunError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| RunError::Config(format!("reading {}: {}", path.display(), e)))?;
    let toml_config: TomlConfig = toml::from_str(&contents)
        .map_err(|e| RunError::Config(format!("parsing {}: {}", path.display(), e)))?;

    if let Some(backend) = toml_config.backend {
        settings.backend = backend.parse()?;
    }
    if toml_config.api_key.is_some() {
        settings.api_key = toml_config.api_key;
    }
    if toml_config.model.is_some() {
        settings.model = toml_config.model;
    }
    if let Some(v) = toml_config.max_tokens {
        settings.max_tokens = v;
    }
    if let Some(v) = toml_config.temperature {
        settings.temperature = v;
    }
    if let Some(v) = toml_config.capacity {
        settings.capacity = v;
    }
    if let Some(v) = toml_config.novelty_threshold {
        settings.novelty_threshold = v;
    }
    if let Some(v) = toml_config.excerpt_budget {
        settings.excerpt_budget = v;
    }
    if let Some(v) = toml_config.dynamic {
        settings.dynamic = v;
    }
    if let Some(v) = toml_config.match_threshold {
        settings.match_threshold = v;
    }
    if !toml_config.static_categories.is_empty() {
        settings.static_categories = toml_config.static_categories;
    }
    Ok(())
}

/// Environment overrides. `lookup` is injected so tests don't touch
/// process-global state.
fn apply_env<F>(settings: &mut Settings, lookup: F) -> Result<(), RunError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(backend) = lookup("MAGPIE_BACKEND") {
        settings.backend = backend.parse()?;
    }

    let key_var = match settings.backend {
        super::BackendKind::Claude => "ANTHROPIC_API_KEY",
        super::BackendKind::Openai => "OPENAI_API_KEY",
    };
    if let Some(key) = lookup(key_var).filter(|k| !k.is_empty()) {
        settings.api_key = Some(key);
    }

    if let Some(model) = lookup("MAGPIE_MODEL") {
        settings.model = Some(model);
    }
    if let Some(v) = lookup("MAGPIE_MAX_TOKENS") {
        settings.max_tokens = parse_env("MAGPIE_MAX_TOKENS", &v)?;
    }
    if let Some(v) = lookup("MAGPIE_TEMPERATURE") {
        settings.temperature = parse_env("MAGPIE_TEMPERATURE", &v)?;
    }
    if let Some(v) = lookup("MAGPIE_NOVELTY_THRESHOLD") {
        settings.novelty_threshold = parse_env("MAGPIE_NOVELTY_THRESHOLD", &v)?;
    }
    if let Some(v) = lookup("MAGPIE_EXCERPT_BUDGET") {
        settings.excerpt_budget = parse_env("MAGPIE_EXCERPT_BUDGET", &v)?;
    }
    if let Some(v) = lookup("MAGPIE_NO_LLM") {
        settings.no_llm = parse_bool(&v);
    }
    if let Some(v) = lookup("MAGPIE_DYNAMIC") {
        settings.dynamic = parse_bool(&v);
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, RunError> {
    value
        .parse()
        .map_err(|_| RunError::Config(format!("invalid value '{}' for {}", value, name)))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
