// Publisher tests against a throwaway git repository with a local bare remote

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use magpie::errors::RunError;
use magpie::publish::{PublishSummary, Publisher};

fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo)
        .args(args)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Work repo plus a bare origin it pushes to, both inside one tempdir.
fn init_repo() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let remote = dir.path().join("origin.git");
    git(dir.path(), &["init", "--bare", "--initial-branch=main", "origin.git"]);

    let repo = dir.path().join("work");
    fs::create_dir(&repo).expect("work dir");
    git(&repo, &["init", "--initial-branch=main"]);
    git(&repo, &["config", "user.email", "test@example.com"]);
    git(&repo, &["config", "user.name", "Test"]);
    git(&repo, &["remote", "add", "origin", remote.to_str().unwrap()]);
    fs::write(repo.join("README.md"), "seed\n").expect("seed file");
    git(&repo, &["add", "README.md"]);
    git(&repo, &["commit", "-m", "seed"]);
    (dir, repo, remote)
}

#[test]
fn test_publish_creates_branch_and_commits_only_given_files() {
    let (_dir, repo, _remote) = init_repo();
    let repo = repo.as_path();

    fs::write(repo.join("patterns.md"), "# doc\n").expect("doc");
    fs::write(repo.join("state.json"), "{}\n").expect("state");
    fs::write(repo.join("unrelated.txt"), "left behind\n").expect("unrelated");

    let publisher = Publisher::new(
        repo.to_path_buf(),
        "magpie/patterns".to_string(),
        Some("main".to_string()),
    );
    let summary = PublishSummary {
        new_sessions: 2,
        updated_sessions: 1,
        new_patterns: vec!["Retry Loops".to_string()],
    };
    let doc = repo.join("patterns.md");
    let state = repo.join("state.json");
    publisher
        .publish(&[doc.as_path(), state.as_path()], &summary)
        .expect("publish");

    let branch = git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]);
    assert_eq!(branch.trim(), "magpie/patterns");

    let message = git(repo, &["log", "-1", "--pretty=%B"]);
    assert!(message.contains("magpie: 2 new, 1 updated sessions"));
    assert!(message.contains("- Retry Loops"));

    let committed = git(repo, &["show", "--name-only", "--pretty=format:", "HEAD"]);
    assert!(committed.contains("patterns.md"));
    assert!(committed.contains("state.json"));
    assert!(!committed.contains("unrelated.txt"));
}

#[test]
fn test_publish_pushes_branch_to_origin() {
    let (_dir, repo, remote) = init_repo();
    let repo = repo.as_path();

    fs::write(repo.join("patterns.md"), "# doc\n").expect("doc");
    let publisher = Publisher::new(
        repo.to_path_buf(),
        "magpie/patterns".to_string(),
        Some("main".to_string()),
    );
    let doc = repo.join("patterns.md");
    publisher
        .publish(
            &[doc.as_path()],
            &PublishSummary {
                new_sessions: 1,
                updated_sessions: 0,
                new_patterns: vec![],
            },
        )
        .expect("publish");

    // The commit made locally is the one on the remote branch
    let local = git(repo, &["rev-parse", "magpie/patterns"]);
    let pushed = git(&remote, &["rev-parse", "magpie/patterns"]);
    assert_eq!(local.trim(), pushed.trim());

    // Upstream tracking was configured on first push
    let upstream = git(
        repo,
        &["rev-parse", "--abbrev-ref", "magpie/patterns@{upstream}"],
    );
    assert_eq!(upstream.trim(), "origin/magpie/patterns");
}

#[test]
fn test_publish_reuses_existing_branch() {
    let (_dir, repo, _remote) = init_repo();
    let repo = repo.as_path();
    git(repo, &["branch", "magpie/patterns"]);

    fs::write(repo.join("patterns.md"), "# doc\n").expect("doc");
    let publisher = Publisher::new(repo.to_path_buf(), "magpie/patterns".to_string(), None);
    let doc = repo.join("patterns.md");
    publisher
        .publish(
            &[doc.as_path()],
            &PublishSummary {
                new_sessions: 1,
                updated_sessions: 0,
                new_patterns: vec![],
            },
        )
        .expect("publish");

    let branch = git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]);
    assert_eq!(branch.trim(), "magpie/patterns");
}

#[test]
fn test_publish_without_remote_reports_publish_error() {
    let (_dir, repo, remote) = init_repo();
    let repo = repo.as_path();
    fs::remove_dir_all(&remote).expect("drop remote");

    fs::write(repo.join("patterns.md"), "# doc\n").expect("doc");
    let publisher = Publisher::new(repo.to_path_buf(), "magpie/patterns".to_string(), None);
    let doc = repo.join("patterns.md");
    let result = publisher.publish(
        &[doc.as_path()],
        &PublishSummary {
            new_sessions: 1,
            updated_sessions: 0,
            new_patterns: vec![],
        },
    );
    match result {
        Err(RunError::Publish(_)) => {}
        other => panic!("expected Publish error, got {:?}", other.map(|_| ())),
    }
    // The commit landed locally even though the push failed
    let message = git(repo, &["log", "-1", "--pretty=%B"]);
    assert!(message.contains("magpie: 1 new, 0 updated sessions"));
}

#[test]
fn test_failed_commit_reports_publish_error_and_keeps_files() {
    let (_dir, repo, _remote) = init_repo();
    let repo = repo.as_path();

    fs::write(repo.join("patterns.md"), "# doc\n").expect("doc");
    let publisher = Publisher::new(repo.to_path_buf(), "magpie/patterns".to_string(), None);

    // Committing an already-clean tree fails; staging nothing new triggers it
    git(repo, &["add", "patterns.md"]);
    git(repo, &["commit", "-m", "already committed"]);

    let doc = repo.join("patterns.md");
    let result = publisher.publish(&[doc.as_path()], &PublishSummary::default());
    match result {
        Err(RunError::Publish(_)) => {}
        other => panic!("expected Publish error, got {:?}", other.map(|_| ())),
    }
    // The document is still on disk, recoverable without redoing discovery
    assert_eq!(fs::read_to_string(repo.join("patterns.md")).unwrap(), "# doc\n");
}
