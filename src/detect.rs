// Change detection
//
// Diffs the session corpus against persisted per-session progress so LLM
// spend is bounded to genuinely new material.

use std::collections::BTreeMap;

use crate::sessions::Session;

/// Disjoint NEW/UPDATED sets for one run.
#[derive(Debug, Default)]
pub struct ChangeSet<'a> {
    pub new: Vec<&'a Session>,
    pub updated: Vec<&'a Session>,
}

impl<'a> ChangeSet<'a> {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &&'a Session> {
        self.new.iter().chain(self.updated.iter())
    }
}

/// NEW: identifier absent from progress. UPDATED: present, but the session's
/// latest message timestamp exceeds the stored value. Everything else is
/// skipped.
pub fn detect_changes<'a>(
    corpus: &'a [Session],
    progress: &BTreeMap<String, i64>,
) -> ChangeSet<'a> {
    let mut changes = ChangeSet::default();
    for session in corpus {
        match progress.get(&session.id) {
            None => changes.new.push(session),
            Some(&seen) if session.last_seen > seen => changes.updated.push(session),
            Some(_) => {
                tracing::debug!("session {} unchanged, skipping", session.id);
            }
        }
    }
    changes
}
