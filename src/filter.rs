// Novelty filtering, candidate merging, and occurrence counting
//
// Dynamic mode: candidates below the novelty threshold are dropped, the rest
// become `dynamic-<slug>` patterns. Static mode: candidates are folded into
// the fixed category with the best title/keyword overlap and never create
// new top-level categories. In every mode, counts come from keyword matches
// against changed session text, not from the LLM.

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;

use crate::config::StaticCategory;
use crate::detect::ChangeSet;
use crate::discovery::Candidate;
use crate::state::{AutomationState, Pattern, PatternOrigin};

/// Bound on stored example snippet length.
const SNIPPET_MAX: usize = 160;

/// Lowercase, collapse non-alphanumeric runs to single hyphens, trim.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Seed fixed categories into the state as static patterns. Existing counts
/// and examples are kept; title, guidance, and keywords follow the
/// declaration.
pub fn ensure_static_categories(state: &mut AutomationState, categories: &[StaticCategory]) {
    for category in categories {
        let pattern = state
            .patterns
            .entry(category.id.clone())
            .or_insert_with(|| Pattern {
                id: category.id.clone(),
                title: category.title.clone(),
                description: category.guidance.clone(),
                examples: Vec::new(),
                keywords: Vec::new(),
                count: 0,
                novelty: None,
                origin: PatternOrigin::Static,
            });
        pattern.title = category.title.clone();
        pattern.description = category.guidance.clone();
        pattern.keywords = category
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
    }
}

/// Dynamic-mode merge. Returns the titles of patterns created this run.
pub fn apply_dynamic(
    state: &mut AutomationState,
    candidates: Vec<Candidate>,
    threshold: u8,
) -> Vec<String> {
    let mut created = Vec::new();
    for candidate in candidates {
        let novelty = candidate.novelty.unwrap_or(0);
        if novelty < threshold {
            tracing::debug!(
                "dropping candidate '{}' (novelty {} < threshold {})",
                candidate.title,
                novelty,
                threshold
            );
            continue;
        }

        let base = format!("dynamic-{}", slugify(&candidate.title));

        // Re-proposal of an existing pattern refreshes it; the count is left
        // to occurrence counting. A different title landing on the same slug
        // gets a suffix.
        if let Some(existing) = state.patterns.get_mut(&base) {
            if existing.title == candidate.title {
                existing.novelty = candidate.novelty;
                existing.refresh_examples(&candidate.examples);
                if !candidate.keywords.is_empty() {
                    existing.keywords = candidate.keywords;
                }
                continue;
            }
        }

        let keywords = if candidate.keywords.is_empty() {
            title_keywords(&candidate.title)
        } else {
            candidate.keywords
        };

        let id = disambiguate(&base, state);
        created.push(candidate.title.clone());
        state.patterns.insert(
            id.clone(),
            Pattern {
                id,
                title: candidate.title,
                description: candidate.description,
                examples: candidate.examples.into_iter().take(3).collect(),
                keywords,
                count: 0,
                novelty: candidate.novelty,
                origin: PatternOrigin::Dynamic,
            },
        );
    }
    created
}

/// Fallback keyword set for a candidate that arrived without one.
fn title_keywords(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| word.len() >= 4)
        .collect()
}

fn disambiguate(base: &str, state: &AutomationState) -> String {
    if !state.patterns.contains_key(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !state.patterns.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Static-mode merge: fold each candidate into its best-matching fixed
/// category, or drop it when nothing matches well enough.
pub fn apply_static(
    state: &mut AutomationState,
    candidates: Vec<Candidate>,
    categories: &[StaticCategory],
    similarity_threshold: f64,
) {
    let matcher = CategoryMatcher::new(similarity_threshold);
    for candidate in candidates {
        let query = format!("{} {}", candidate.title, candidate.description);
        match matcher.find_match(&query, categories) {
            Some((category_id, similarity)) => {
                tracing::debug!(
                    "folding candidate '{}' into '{}' (similarity {:.3})",
                    candidate.title,
                    category_id,
                    similarity
                );
                if let Some(pattern) = state.patterns.get_mut(&category_id) {
                    pattern.fill_examples(&candidate.examples);
                }
            }
            None => {
                tracing::debug!("no category matched candidate '{}', dropping", candidate.title);
            }
        }
    }
}

/// Keyword-match every pattern against the changed sessions and bump counts
/// by the number of matching sessions. Runs on every pass, LLM or not, so
/// counts always reflect observed sessions. Counts only ever grow.
pub fn count_occurrences(state: &mut AutomationState, changes: &ChangeSet<'_>) {
    let sessions: Vec<(String, &crate::sessions::Session)> = changes
        .all()
        .map(|s| (s.excerpts.join("\n").to_lowercase(), *s))
        .collect();

    for pattern in state.patterns.values_mut() {
        if pattern.keywords.is_empty() {
            continue;
        }
        let mut matched = 0u64;
        let mut snippets = Vec::new();
        for (blob, session) in &sessions {
            let Some(keyword) = pattern.keywords.iter().find(|k| blob.contains(k.as_str()))
            else {
                continue;
            };
            matched += 1;
            if snippets.len() < crate::state::MAX_EXAMPLES {
                if let Some(line) = session
                    .excerpts
                    .iter()
                    .find(|e| e.to_lowercase().contains(keyword.as_str()))
                {
                    snippets.push(snippet(line));
                }
            }
        }
        if matched > 0 {
            tracing::debug!("pattern '{}' matched {} session(s)", pattern.id, matched);
            pattern.count += matched;
            pattern.fill_examples(&snippets);
        }
    }
}

fn snippet(line: &str) -> String {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SNIPPET_MAX {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(SNIPPET_MAX).collect();
    format!("{}…", truncated)
}

/// Stemmed bag-of-words matcher over category titles and keywords.
struct CategoryMatcher {
    stemmer: Stemmer,
    similarity_threshold: f64,
}

impl CategoryMatcher {
    fn new(similarity_threshold: f64) -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            similarity_threshold,
        }
    }

    fn find_match(&self, query: &str, categories: &[StaticCategory]) -> Option<(String, f64)> {
        let query_vec = self.create_bow(&self.tokenize_and_stem(query));

        let mut best: Option<(String, f64)> = None;
        for category in categories {
            let tokens: Vec<String> = std::iter::once(category.title.as_str())
                .chain(category.keywords.iter().map(|k| k.as_str()))
                .flat_map(|text| self.tokenize_and_stem(text))
                .collect();
            let category_vec = self.create_bow(&tokens);
            let similarity = cosine_similarity(&query_vec, &category_vec);

            if similarity >= self.similarity_threshold
                && best.as_ref().map_or(true, |(_, s)| similarity > *s)
            {
                best = Some((category.id.clone(), similarity));
            }
        }
        best
    }

    fn tokenize_and_stem(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|word| {
                let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
                self.stemmer.stem(&clean).to_string()
            })
            .filter(|word| !word.is_empty())
            .collect()
    }

    fn create_bow(&self, tokens: &[String]) -> HashMap<String, f64> {
        let mut bow: HashMap<String, f64> = HashMap::new();
        for token in tokens {
            *bow.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        let total: f64 = bow.values().sum();
        if total > 0.0 {
            for value in bow.values_mut() {
                *value /= total;
            }
        }
        bow
    }
}

fn cosine_similarity(vec1: &HashMap<String, f64>, vec2: &HashMap<String, f64>) -> f64 {
    let mut dot_product = 0.0;
    let mut mag1 = 0.0;
    let mut mag2 = 0.0;

    let all_words: std::collections::HashSet<_> = vec1.keys().chain(vec2.keys()).collect();
    for word in all_words {
        let v1 = vec1.get(word).unwrap_or(&0.0);
        let v2 = vec2.get(word).unwrap_or(&0.0);
        dot_product += v1 * v2;
        mag1 += v1 * v1;
        mag2 += v2 * v2;
    }

    if mag1 == 0.0 || mag2 == 0.0 {
        return 0.0;
    }
    dot_product / (mag1.sqrt() * mag2.sqrt())
}
