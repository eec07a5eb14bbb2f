// Guidance document writer
//
// Regeneration is deterministic: the same pattern set always renders to the
// same bytes. A manual guidance block between the stable delimiters below is
// operator-authored and copied through verbatim on every regeneration.

use crate::state::{AutomationState, Pattern, PatternOrigin};

pub const MANUAL_START: &str = "<!-- magpie:manual -->";
pub const MANUAL_END: &str = "<!-- /magpie:manual -->";

/// Rendered length bound for illustrative quotes.
const QUOTE_MAX: usize = 200;

/// Render the guidance document for one agent. Static categories come first
/// in their declared order, then dynamic patterns by descending occurrence
/// count and title. `prior` supplies the manual block to preserve.
pub fn render(
    state: &AutomationState,
    agent: &str,
    static_order: &[String],
    prior: Option<&str>,
) -> String {
    let mut doc = String::new();
    doc.push_str(&format!("# {} Guidance Patterns\n\n", capitalize(agent)));
    doc.push_str(&format!(
        "Generated by magpie from {} session histories. Edit only the manual\nguidance block; everything else is regenerated.\n",
        agent
    ));

    for id in static_order {
        if let Some(pattern) = state.patterns.get(id) {
            render_pattern(&mut doc, pattern);
        }
    }

    let mut dynamic: Vec<&Pattern> = state
        .patterns
        .values()
        .filter(|p| p.origin == PatternOrigin::Dynamic)
        .collect();
    dynamic.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.title.cmp(&b.title)));
    for pattern in dynamic {
        render_pattern(&mut doc, pattern);
    }

    doc.push('\n');
    match prior.and_then(extract_manual_block) {
        Some(block) => doc.push_str(&block),
        None => {
            doc.push_str(MANUAL_START);
            doc.push('\n');
            doc.push_str(MANUAL_END);
        }
    }
    doc.push('\n');
    doc
}

fn render_pattern(doc: &mut String, pattern: &Pattern) {
    doc.push_str(&format!("\n## {}\n\n", pattern.title));
    for line in pattern.description.lines().filter(|l| !l.trim().is_empty()) {
        doc.push_str(&format!("- {}\n", line.trim()));
    }
    let plural = if pattern.count == 1 { "session" } else { "sessions" };
    doc.push_str(&format!("\n_Seen in {} {}._\n", pattern.count, plural));
    for example in pattern.examples.iter().take(3) {
        doc.push_str(&format!("\n> {}\n", truncate_quote(example)));
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate_quote(quote: &str) -> String {
    let flat = quote.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= QUOTE_MAX {
        return flat;
    }
    let truncated: String = flat.chars().take(QUOTE_MAX).collect();
    format!("{}…", truncated)
}

/// Locate the manual block (delimiters included) in a prior document.
pub fn extract_manual_block(doc: &str) -> Option<String> {
    let start = doc.find(MANUAL_START)?;
    let end = doc[start..].find(MANUAL_END)?;
    Some(doc[start..start + end + MANUAL_END.len()].to_string())
}
