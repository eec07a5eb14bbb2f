// Run pipeline
//
// Strictly ordered single pass: lock, load state, read sessions, detect
// changes, discover, filter, render, write, publish. Each stage's output is
// the next stage's input; a run with no changes writes nothing and exits 0.

use anyhow::Context;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::cli::{AgentKind, Cli};
use crate::config::Settings;
use crate::detect::detect_changes;
use crate::discovery::{create_backend, prompt::build_prompt, DiscoveryEngine};
use crate::document;
use crate::errors::RunError;
use crate::filter::{apply_dynamic, apply_static, count_occurrences, ensure_static_categories};
use crate::publish::{PublishSummary, Publisher};
use crate::sessions::{
    merge_sessions, read_claude_history, read_claude_projects, read_codex_history, Session,
};
use crate::state::{AutomationState, StateLock};

struct AgentTarget {
    name: &'static str,
    output: PathBuf,
    sources: AgentSources,
}

enum AgentSources {
    Codex { history: PathBuf },
    Claude { history: PathBuf, projects: PathBuf },
}

impl AgentTarget {
    fn load(&self) -> Result<Vec<Session>, RunError> {
        let parts = match &self.sources {
            AgentSources::Codex { history } => vec![read_codex_history(history)?],
            AgentSources::Claude { history, projects } => vec![
                read_claude_history(history)?,
                read_claude_projects(projects)?,
            ],
        };
        Ok(merge_sessions(parts))
    }
}

pub async fn run(cli: &Cli, settings: &Settings) -> Result<(), RunError> {
    let state_path = resolve(cli.state.clone(), ".magpie/state.json", "--state")?;
    let targets = build_targets(cli)?;

    let _lock = StateLock::acquire(&state_path)?;
    let mut state = AutomationState::load(&state_path)?;
    ensure_static_categories(&mut state, &settings.static_categories);

    let mut summary = PublishSummary::default();
    let mut any_changes = false;

    for target in &targets {
        let corpus = target.load()?;
        let changes = detect_changes(&corpus, &state.session_progress);
        if changes.is_empty() {
            tracing::info!("{}: no new or updated sessions", target.name);
            continue;
        }
        tracing::info!(
            "{}: {} new, {} updated sessions",
            target.name,
            changes.new.len(),
            changes.updated.len()
        );
        any_changes = true;
        summary.new_sessions += changes.new.len();
        summary.updated_sessions += changes.updated.len();

        if settings.no_llm {
            tracing::info!("{}: LLM calls disabled, keyword counts only", target.name);
        } else {
            let backend = create_backend(settings)?;
            let engine = DiscoveryEngine::new(backend, settings.capacity, settings.dynamic);
            let known: Vec<String> = state.patterns.values().map(|p| p.title.clone()).collect();
            let prompt = build_prompt(
                &changes,
                &known,
                settings.excerpt_budget,
                settings.capacity,
                settings.dynamic,
            );
            let candidates = engine.submit(&prompt).await?;
            tracing::info!("{}: {} candidate patterns", target.name, candidates.len());

            if settings.dynamic {
                let created =
                    apply_dynamic(&mut state, candidates, settings.novelty_threshold);
                summary.new_patterns.extend(created);
            } else {
                apply_static(
                    &mut state,
                    candidates,
                    &settings.static_categories,
                    settings.match_threshold,
                );
            }
        }

        // After the merge so patterns created this run get counted too.
        count_occurrences(&mut state, &changes);

        for session in changes.all() {
            state.advance_session(&session.id, session.last_seen);
        }
    }

    if !any_changes {
        tracing::info!("no changes found");
        return Ok(());
    }

    let static_order = settings.static_order();
    let mut rendered = Vec::new();
    for target in &targets {
        let prior = read_prior(&target.output)?;
        let doc = document::render(&state, target.name, &static_order, prior.as_deref());
        rendered.push((target.output.clone(), doc));
    }

    if cli.dry_run {
        for (path, doc) in &rendered {
            println!("--- preview: {} ---", path.display());
            println!("{}", doc);
        }
        tracing::info!("dry run, nothing written");
        return Ok(());
    }

    for (path, doc) in &rendered {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        fs::write(path, doc).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("wrote {}", path.display());
    }
    state.save_atomic(&state_path)?;

    if let Some(branch) = &cli.branch {
        let publisher =
            Publisher::new(cli.repo.clone(), branch.clone(), cli.base_branch.clone());
        let mut files: Vec<&Path> = rendered.iter().map(|(p, _)| p.as_path()).collect();
        files.push(&state_path);
        publisher.publish(&files, &summary)?;
    }

    Ok(())
}

fn build_targets(cli: &Cli) -> Result<Vec<AgentTarget>, RunError> {
    let mut targets = Vec::new();
    if matches!(cli.agent, AgentKind::Codex | AgentKind::All) {
        targets.push(AgentTarget {
            name: "codex",
            output: resolve(cli.codex_output.clone(), ".codex/patterns.md", "--codex-output")?,
            sources: AgentSources::Codex {
                history: resolve(
                    cli.codex_history.clone(),
                    ".codex/history.jsonl",
                    "--codex-history",
                )?,
            },
        });
    }
    if matches!(cli.agent, AgentKind::Claude | AgentKind::All) {
        targets.push(AgentTarget {
            name: "claude",
            output: resolve(
                cli.claude_output.clone(),
                ".claude/patterns.md",
                "--claude-output",
            )?,
            sources: AgentSources::Claude {
                history: resolve(
                    cli.claude_history.clone(),
                    ".claude/history.jsonl",
                    "--claude-history",
                )?,
                projects: resolve(
                    cli.claude_projects.clone(),
                    ".claude/projects",
                    "--claude-projects",
                )?,
            },
        });
    }
    Ok(targets)
}

fn resolve(flag: Option<PathBuf>, home_relative: &str, flag_name: &str) -> Result<PathBuf, RunError> {
    if let Some(path) = flag {
        return Ok(path);
    }
    dirs::home_dir()
        .map(|home| home.join(home_relative))
        .ok_or_else(|| {
            RunError::Config(format!(
                "cannot determine home directory; pass {}",
                flag_name
            ))
        })
}

fn read_prior(path: &Path) -> Result<Option<String>, RunError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RunError::Other(anyhow::Error::new(e).context(format!(
            "reading prior document {}",
            path.display()
        )))),
    }
}
