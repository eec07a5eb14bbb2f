// Discovery prompt construction
//
// Each session's excerpts are truncated to a configured character budget so
// prompt size stays bounded no matter how long a session ran.

use crate::detect::ChangeSet;

/// Build the discovery prompt from changed sessions and already-known
/// pattern titles.
pub fn build_prompt(
    changes: &ChangeSet<'_>,
    known_titles: &[String],
    excerpt_budget: usize,
    capacity: usize,
    dynamic: bool,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You review transcripts of AI coding-agent sessions and identify recurring \
         behavioral themes worth turning into guidance.\n\n",
    );

    if known_titles.is_empty() {
        prompt.push_str("No patterns are known yet.\n\n");
    } else {
        prompt.push_str("Already-known patterns (do not re-propose these):\n");
        for title in known_titles {
            prompt.push_str("- ");
            prompt.push_str(title);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str("Session excerpts:\n\n");
    for session in changes.all() {
        prompt.push_str(&format!("### Session {}\n", session.id));
        prompt.push_str(&truncate_chars(&session.excerpts.join("\n"), excerpt_budget));
        prompt.push_str("\n\n");
    }

    prompt.push_str(&format!(
        "Respond with ONLY a JSON array of at most {} objects, each with:\n\
         - \"title\": short theme name\n\
         - \"description\": one or two sentences of guidance, one per line\n\
         - \"examples\": 1-3 short verbatim quotes from the excerpts\n\
         - \"keywords\": 3-6 lowercase words that would appear in sessions showing this theme\n",
        capacity
    ));
    if dynamic {
        prompt.push_str(
            "- \"novelty\": integer 1-10, how distinct this theme is from the known patterns\n",
        );
    }
    prompt.push_str("\nIf no new themes stand out, respond with [].\n");

    prompt
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let truncated: String = text.chars().take(budget).collect();
    format!("{}…", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect_changes;
    use crate::sessions::Session;
    use std::collections::BTreeMap;

    #[test]
    fn test_excerpts_respect_budget() {
        let mut s = Session::new("s1");
        s.push_excerpt("a".repeat(10_000), 100);
        let corpus = vec![s];
        let changes = detect_changes(&corpus, &BTreeMap::new());

        let prompt = build_prompt(&changes, &[], 500, 5, true);
        // Budget plus surrounding scaffolding, nowhere near the raw 10k
        assert!(prompt.chars().count() < 2_000);
        assert!(prompt.contains('…'));
    }

    #[test]
    fn test_known_titles_are_listed() {
        let corpus = vec![];
        let changes = detect_changes(&corpus, &BTreeMap::new());
        let prompt = build_prompt(
            &changes,
            &["Premature Completion".to_string()],
            500,
            5,
            false,
        );
        assert!(prompt.contains("- Premature Completion"));
        assert!(prompt.contains("\"keywords\""));
        assert!(!prompt.contains("\"novelty\""));
    }

    #[test]
    fn test_dynamic_mode_requests_novelty() {
        let corpus = vec![];
        let changes = detect_changes(&corpus, &BTreeMap::new());
        let prompt = build_prompt(&changes, &[], 500, 5, true);
        assert!(prompt.contains("\"novelty\""));
    }
}
