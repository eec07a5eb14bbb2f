// Agent session corpus

use once_cell::sync::Lazy;
use regex::Regex;

pub mod reader;

pub use reader::{read_claude_history, read_claude_projects, read_codex_history};

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B\[[0-9;?]*[ -/]*[@-~]").expect("ansi escape pattern"));
static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("control char pattern"));
static INLINE_WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+").expect("whitespace pattern"));

/// Strip ANSI escape sequences and control characters from transcript text.
/// Real agent transcripts carry both; neither belongs in a prompt or in the
/// regenerated markdown quotes.
pub fn sanitize_text(value: &str) -> String {
    let cleaned = ANSI_ESCAPE.replace_all(value, "");
    let cleaned = cleaned.replace('\r', "");
    let cleaned = CONTROL_CHARS.replace_all(&cleaned, "");
    let cleaned = INLINE_WHITESPACE.replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// A single agent interaction session. Read-only input; may grow (new
/// messages appended) between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub excerpts: Vec<String>,
    pub last_seen: i64,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            excerpts: Vec::new(),
            last_seen: 0,
        }
    }

    /// Fold a message into the session, keeping last_seen at the max
    /// observed timestamp. Text is sanitized on the way in.
    pub fn push_excerpt(&mut self, text: String, ts: i64) {
        let text = sanitize_text(&text);
        if !text.is_empty() {
            self.excerpts.push(text);
        }
        if ts > self.last_seen {
            self.last_seen = ts;
        }
    }
}

/// Merge session lists that may share identifiers (e.g. a history log and a
/// transcript directory covering the same session).
pub fn merge_sessions(parts: Vec<Vec<Session>>) -> Vec<Session> {
    let mut merged: std::collections::BTreeMap<String, Session> = std::collections::BTreeMap::new();
    for part in parts {
        for session in part {
            match merged.get_mut(&session.id) {
                Some(existing) => {
                    existing.excerpts.extend(session.excerpts);
                    if session.last_seen > existing.last_seen {
                        existing.last_seen = session.last_seen;
                    }
                }
                None => {
                    merged.insert(session.id.clone(), session);
                }
            }
        }
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_excerpt_tracks_max_timestamp() {
        let mut s = Session::new("s1");
        s.push_excerpt("first".into(), 100);
        s.push_excerpt("second".into(), 50);
        assert_eq!(s.last_seen, 100);
        assert_eq!(s.excerpts.len(), 2);
    }

    #[test]
    fn test_blank_excerpts_are_dropped() {
        let mut s = Session::new("s1");
        s.push_excerpt("   ".into(), 100);
        assert!(s.excerpts.is_empty());
        assert_eq!(s.last_seen, 100);
    }

    #[test]
    fn test_sanitize_strips_ansi_and_control_chars() {
        let raw = "\x1b[1;32mrun the tests\x1b[0m\r\n\x07done\x1b[2K";
        assert_eq!(sanitize_text(raw), "run the tests\ndone");
    }

    #[test]
    fn test_sanitize_collapses_inline_whitespace() {
        assert_eq!(sanitize_text("fix\t\tthe   build  "), "fix the build");
    }

    #[test]
    fn test_push_excerpt_sanitizes() {
        let mut s = Session::new("s1");
        s.push_excerpt("\x1b[31mrun the tests\x1b[0m".into(), 100);
        assert_eq!(s.excerpts, vec!["run the tests".to_string()]);
        // Text that is nothing but escapes is dropped entirely
        s.push_excerpt("\x1b[2J\x1b[H".into(), 150);
        assert_eq!(s.excerpts.len(), 1);
        assert_eq!(s.last_seen, 150);
    }

    #[test]
    fn test_merge_sessions_combines_by_id() {
        let mut a = Session::new("s1");
        a.push_excerpt("from history".into(), 100);
        let mut b = Session::new("s1");
        b.push_excerpt("from transcript".into(), 200);
        let c = Session::new("s2");

        let merged = merge_sessions(vec![vec![a], vec![b, c]]);
        assert_eq!(merged.len(), 2);
        let s1 = merged.iter().find(|s| s.id == "s1").unwrap();
        assert_eq!(s1.excerpts.len(), 2);
        assert_eq!(s1.last_seen, 200);
    }
}
