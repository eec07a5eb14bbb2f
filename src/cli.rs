// Command-line interface

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    Codex,
    Claude,
    All,
}

#[derive(Debug, Parser)]
#[command(
    name = "magpie",
    version,
    about = "Distills recurring behavior patterns from AI agent session histories into guidance documents"
)]
pub struct Cli {
    /// Perform discovery and formatting, print a preview, write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Which history source/output pair to process.
    #[arg(long, value_enum, default_value_t = AgentKind::All)]
    pub agent: AgentKind,

    /// Branch to commit the regenerated files to. Publishing is skipped when
    /// unset.
    #[arg(long)]
    pub branch: Option<String>,

    /// Base branch a newly created publish branch starts from.
    #[arg(long)]
    pub base_branch: Option<String>,

    /// State file path (default ~/.magpie/state.json).
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Codex guidance document path (default ~/.codex/patterns.md).
    #[arg(long)]
    pub codex_output: Option<PathBuf>,

    /// Claude guidance document path (default ~/.claude/patterns.md).
    #[arg(long)]
    pub claude_output: Option<PathBuf>,

    /// Codex append-only history log (default ~/.codex/history.jsonl).
    #[arg(long)]
    pub codex_history: Option<PathBuf>,

    /// Claude append-only history log (default ~/.claude/history.jsonl).
    #[arg(long)]
    pub claude_history: Option<PathBuf>,

    /// Claude per-session transcript directory (default ~/.claude/projects).
    #[arg(long)]
    pub claude_projects: Option<PathBuf>,

    /// Repository the publisher commits in.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
}
