// Publisher
//
// Stages exactly the regenerated document/state pair on a dedicated branch,
// commits, and pushes to origin. Opening or refreshing a pull request via
// `gh` is best-effort: a missing or failing `gh` never fails the run.
// Failure leaves the working tree dirty but the files are already safely on
// disk, so a re-run or manual commit recovers without redoing discovery.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::RunError;

pub struct Publisher {
    repo: PathBuf,
    branch: String,
    base_branch: Option<String>,
}

/// Inputs for the commit-message summary.
#[derive(Debug, Default)]
pub struct PublishSummary {
    pub new_sessions: usize,
    pub updated_sessions: usize,
    pub new_patterns: Vec<String>,
}

impl Publisher {
    pub fn new(repo: PathBuf, branch: String, base_branch: Option<String>) -> Self {
        Self {
            repo,
            branch,
            base_branch,
        }
    }

    pub fn publish(&self, paths: &[&Path], summary: &PublishSummary) -> Result<(), RunError> {
        self.checkout_branch()?;

        let mut add_args = vec!["add".to_string(), "--".to_string()];
        add_args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        self.git(&add_args)?;

        let message = commit_message(summary);
        self.git(&["commit".to_string(), "-m".to_string(), message.clone()])?;
        tracing::info!("committed to branch {}", self.branch);

        self.push()?;
        self.ensure_pull_request(&message);
        Ok(())
    }

    /// Push the branch, setting the upstream on first push. Some remotes
    /// refuse `--set-upstream` re-pushes; a plain push is the fallback.
    fn push(&self) -> Result<(), RunError> {
        let upstream = [
            "push".to_string(),
            "--set-upstream".to_string(),
            "origin".to_string(),
            self.branch.clone(),
        ];
        match self.git(&upstream) {
            Ok(_) => {
                tracing::info!("pushed branch {} to origin", self.branch);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("upstream push failed ({}), retrying plain push", e);
                self.git(&[
                    "push".to_string(),
                    "origin".to_string(),
                    self.branch.clone(),
                ])?;
                tracing::info!("pushed branch {} to origin", self.branch);
                Ok(())
            }
        }
    }

    /// Open a pull request for the branch, or refresh the open one. Requires
    /// the `gh` CLI; skipped with a log line when it is not installed, and
    /// any `gh` failure is reported but never fails the publish.
    fn ensure_pull_request(&self, body: &str) {
        let title = format!("magpie: pattern updates ({})", self.branch);

        let branch = self.branch.as_str();
        let view = match self.gh(&["pr", "view", branch, "--json", "state", "-q", ".state"]) {
            GhResult::Missing => {
                tracing::info!("gh not installed, skipping pull request");
                return;
            }
            other => other,
        };

        let result = match view {
            GhResult::Ok(state) if state.trim() == "OPEN" => self.gh(&[
                "pr",
                "edit",
                branch,
                "--title",
                title.as_str(),
                "--body",
                body,
            ]),
            _ => {
                let mut args = vec!["pr", "create", "--head", branch];
                if let Some(base) = &self.base_branch {
                    args.extend(["--base", base.as_str()]);
                }
                args.extend(["--title", title.as_str(), "--body", body]);
                self.gh(&args)
            }
        };

        match result {
            GhResult::Ok(_) => tracing::info!("pull request ready for {}", self.branch),
            GhResult::Failed(stderr) => {
                tracing::warn!("gh pull request step failed: {}", stderr)
            }
            GhResult::Missing => tracing::info!("gh not installed, skipping pull request"),
        }
    }

    fn gh(&self, args: &[&str]) -> GhResult {
        tracing::debug!("gh {}", args.join(" "));
        match Command::new("gh").current_dir(&self.repo).args(args).output() {
            Ok(output) if output.status.success() => {
                GhResult::Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                GhResult::Failed(String::from_utf8_lossy(&output.stderr).trim().to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => GhResult::Missing,
            Err(e) => GhResult::Failed(e.to_string()),
        }
    }

    /// Reuse the branch when it exists, otherwise create it from the base.
    fn checkout_branch(&self) -> Result<(), RunError> {
        let exists = Command::new("git")
            .current_dir(&self.repo)
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("refs/heads/{}", self.branch))
            .output()
            .map_err(|e| RunError::Publish(format!("running git: {}", e)))?
            .status
            .success();

        if exists {
            self.git(&["checkout".to_string(), self.branch.clone()])?;
        } else {
            let mut args = vec!["checkout".to_string(), "-b".to_string(), self.branch.clone()];
            if let Some(base) = &self.base_branch {
                args.push(base.clone());
            }
            self.git(&args)?;
        }
        Ok(())
    }

    fn git(&self, args: &[String]) -> Result<String, RunError> {
        tracing::debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .current_dir(&self.repo)
            .args(args)
            .output()
            .map_err(|e| RunError::Publish(format!("running git: {}", e)))?;

        if !output.status.success() {
            return Err(RunError::Publish(format!(
                "git {} failed: {}",
                args.first().map(String::as_str).unwrap_or(""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

enum GhResult {
    Ok(String),
    Failed(String),
    Missing,
}

fn commit_message(summary: &PublishSummary) -> String {
    let mut message = format!(
        "magpie: {} new, {} updated sessions",
        summary.new_sessions, summary.updated_sessions
    );
    if !summary.new_patterns.is_empty() {
        message.push_str("\n\nNew patterns:\n");
        for title in &summary.new_patterns {
            message.push_str(&format!("- {}\n", title));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_message_without_new_patterns() {
        let summary = PublishSummary {
            new_sessions: 2,
            updated_sessions: 1,
            new_patterns: vec![],
        };
        assert_eq!(commit_message(&summary), "magpie: 2 new, 1 updated sessions");
    }

    #[test]
    fn test_commit_message_lists_new_patterns() {
        let summary = PublishSummary {
            new_sessions: 1,
            updated_sessions: 0,
            new_patterns: vec!["Retry Loops".to_string(), "Over-broad Edits".to_string()],
        };
        let message = commit_message(&summary);
        assert!(message.starts_with("magpie: 1 new, 0 updated sessions"));
        assert!(message.contains("- Retry Loops\n"));
        assert!(message.contains("- Over-broad Edits\n"));
    }
}
