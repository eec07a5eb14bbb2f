// Session history readers
//
// Two source shapes: an append-only JSONL history log (one message per line,
// tagged with a session id and timestamp) and a directory tree of per-session
// JSONL transcripts (Claude-style, file stem = session id). Missing inputs
// yield an empty corpus; an unreadable transcript file is logged and skipped
// without blocking other sessions.

use anyhow::{Context, Result};
use chrono::DateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use super::Session;

/// One line of an append-only history log. Codex history carries
/// `session_id`/`ts`/`text`; Claude history lines lack a session id and fall
/// back to grouping by `project`.
#[derive(Debug, Deserialize)]
struct HistoryLine {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    display: Option<String>,
}

/// One line of a per-session transcript. Only user messages contribute
/// excerpts; every line's timestamp advances last_seen.
#[derive(Debug, Deserialize)]
struct TranscriptLine {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<TranscriptMessage>,
}

#[derive(Debug, Deserialize)]
struct TranscriptMessage {
    #[serde(default)]
    content: Option<serde_json::Value>,
}

pub fn read_codex_history(path: &Path) -> Result<Vec<Session>> {
    read_history(path)
}

pub fn read_claude_history(path: &Path) -> Result<Vec<Session>> {
    read_history(path)
}

fn read_history(path: &Path) -> Result<Vec<Session>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("history log {} not found, skipping", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).with_context(|| format!("reading history {}", path.display())),
    };

    let mut sessions: BTreeMap<String, Session> = BTreeMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: HistoryLine = match serde_json::from_str(line) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(
                    "skipping unparseable history line {}:{}: {}",
                    path.display(),
                    lineno + 1,
                    e
                );
                continue;
            }
        };

        let id = match parsed.session_id.or(parsed.project) {
            Some(id) if !id.is_empty() => id,
            _ => continue,
        };
        let ts = parsed.ts.or(parsed.timestamp).unwrap_or(0);
        let text = parsed.text.or(parsed.display).unwrap_or_default();

        sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id))
            .push_excerpt(text, ts);
    }

    Ok(sessions.into_values().collect())
}

/// Read every `*.jsonl` transcript under `dir` (one directory level per
/// project, one file per session). Per-file read failures are reported as
/// non-fatal errors and the session is excluded from this run.
pub fn read_claude_projects(dir: &Path) -> Result<Vec<Session>> {
    if !dir.exists() {
        tracing::debug!("projects directory {} not found, skipping", dir.display());
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("cannot list {}: {}, skipping", current.display(), e);
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("cannot read entry under {}: {}", current.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "jsonl") {
                match read_transcript(&path) {
                    Ok(Some(session)) => sessions.push(session),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("skipping transcript {}: {:#}", path.display(), e);
                    }
                }
            }
        }
    }

    sessions.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(sessions)
}

fn read_transcript(path: &Path) -> Result<Option<Session>> {
    let id = match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => return Ok(None),
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let mut session = Session::new(id);
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: TranscriptLine = match serde_json::from_str(line) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("unparseable line in {}: {}", path.display(), e);
                continue;
            }
        };

        let ts = parsed
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp())
            .unwrap_or(0);

        if parsed.kind.as_deref() == Some("user") {
            if let Some(text) = parsed.message.and_then(|m| extract_text(m.content)) {
                session.push_excerpt(text, ts);
                continue;
            }
        }
        if ts > session.last_seen {
            session.last_seen = ts;
        }
    }

    if session.excerpts.is_empty() && session.last_seen == 0 {
        return Ok(None);
    }
    Ok(Some(session))
}

/// Transcript content is either a plain string or an array of typed blocks;
/// only text blocks contribute.
fn extract_text(content: Option<serde_json::Value>) -> Option<String> {
    match content? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Array(blocks) => {
            let texts: Vec<String> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .map(|s| s.to_string())
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_history_groups_by_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"session_id": "s1", "ts": 100, "text": "fix the build"}"#,
                "\n",
                r#"{"session_id": "s1", "ts": 150, "text": "now run the tests"}"#,
                "\n",
                r#"{"session_id": "s2", "ts": 200, "text": "add a flag"}"#,
                "\n",
                "not json\n",
            ),
        )
        .unwrap();

        let sessions = read_codex_history(&path).unwrap();
        assert_eq!(sessions.len(), 2);
        let s1 = sessions.iter().find(|s| s.id == "s1").unwrap();
        assert_eq!(s1.excerpts.len(), 2);
        assert_eq!(s1.last_seen, 150);
    }

    #[test]
    fn test_read_history_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let sessions = read_codex_history(&dir.path().join("absent.jsonl")).unwrap();
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_read_claude_projects() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("my-project");
        fs::create_dir_all(&project).unwrap();
        fs::write(
            project.join("abc-123.jsonl"),
            concat!(
                r#"{"type": "user", "timestamp": "2026-01-02T03:04:05Z", "message": {"content": "please refactor"}}"#,
                "\n",
                r#"{"type": "assistant", "timestamp": "2026-01-02T03:05:00Z", "message": {"content": [{"type": "text", "text": "done"}]}}"#,
                "\n",
            ),
        )
        .unwrap();

        let sessions = read_claude_projects(dir.path()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "abc-123");
        assert_eq!(sessions[0].excerpts, vec!["please refactor".to_string()]);
        // last_seen advances past the user message to the final line
        assert!(sessions[0].last_seen > 0);
    }

    #[test]
    fn test_content_block_array_extraction() {
        let value = serde_json::json!([
            {"type": "text", "text": "alpha"},
            {"type": "tool_use", "name": "bash"},
            {"type": "text", "text": "beta"}
        ]);
        assert_eq!(extract_text(Some(value)), Some("alpha\nbeta".to_string()));
    }
}
