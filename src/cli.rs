//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::repository::GetFileOptions;

/// Git repository and .gitignore tracking for workspace folders
#[derive(Parser, Debug)]
#[command(name = "repo-index")]
#[command(about = "Lists and watches the git repositories inside a workspace folder")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "REPO_INDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================
// Main Commands Enum
// ============================================

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a folder once and print the files of every repository in it
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Keep the folder's repository state live and report every rebuild
    Watch(WatchArgs),
}

// ============================================
// List Command
// ============================================

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Workspace folder to scan
    pub folder: PathBuf,

    /// Omit files matched by .gitignore or the exclude file
    #[arg(long)]
    pub exclude_ignored: bool,

    /// Omit files inside .git/
    #[arg(long)]
    pub exclude_git_folder: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

impl ListArgs {
    pub fn file_options(&self) -> GetFileOptions {
        GetFileOptions {
            exclude_git_folder: self.exclude_git_folder,
            exclude_ignored: self.exclude_ignored,
        }
    }
}

// ============================================
// Watch Command
// ============================================

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Workspace folder to watch
    pub folder: PathBuf,

    /// Emit each rebuild as a JSON line on stdout
    #[arg(long)]
    pub events: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One path per line, ignored files marked
    #[default]
    Text,
    /// JSON array of files
    Json,
}
