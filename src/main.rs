//! repo-index CLI entry point

use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use repo_index::cli::{Cli, Commands, ListArgs, OutputFormat, WatchArgs};
use repo_index::service::{EventEmitter, RepositoriesSetEvent};
use repo_index::{
    GetFileOptions, LocalDirectoryWalker, NormalizedPath, RepoError, RepositoryService,
    ServiceConfig, WorkspaceFolder, WorkspaceWatcher,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<RepoError>() {
                Some(repo_error) => repo_error.exit_code(),
                None => ExitCode::FAILURE,
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "repo_index=debug"
    } else {
        "repo_index=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    // Logs go to stderr; stdout carries command output and events
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };

    match cli.command {
        Commands::List(args) => run_list(config, &args).await,
        Commands::Watch(args) => run_watch(config, &args).await,
    }
}

fn workspace_folder(path: &Path) -> Result<WorkspaceFolder> {
    let canonical = std::fs::canonicalize(path)
        .with_context(|| format!("Cannot open workspace folder {}", path.display()))?;
    Ok(WorkspaceFolder::new(NormalizedPath::new(canonical)))
}

async fn run_list(config: ServiceConfig, args: &ListArgs) -> Result<()> {
    let folder = workspace_folder(&args.folder)?;
    let service = RepositoryService::with_local_collaborators(config);
    service.scan_workspace_folder(&folder).await?;

    if service.get_repositories_for_workspace(&folder.uri).is_empty() {
        return Err(RepoError::NotGitRepo {
            path: folder.uri.as_path().to_path_buf(),
        }
        .into());
    }

    let files = service.get_current_files_for_workspace(&folder.uri, args.file_options());
    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&files).context("JSON serialization failed")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for file in &files {
                if file.is_ignored {
                    println!("{} (ignored)", file.uri);
                } else {
                    println!("{}", file.uri);
                }
            }
        }
    }

    service.dispose();
    Ok(())
}

async fn run_watch(config: ServiceConfig, args: &WatchArgs) -> Result<()> {
    let folder = workspace_folder(&args.folder)?;
    let watcher_config = config.watcher_config();
    let service = Arc::new(RepositoryService::with_local_collaborators(config));
    let emitter = EventEmitter::new(args.events);

    let weak: Weak<RepositoryService> = Arc::downgrade(&service);
    let _subscription = service.on_workspace_repositories_set(move |folder| {
        let Some(service) = weak.upgrade() else {
            return;
        };
        let mut repositories: Vec<NormalizedPath> = service
            .get_repositories_for_workspace(&folder.uri)
            .into_keys()
            .collect();
        repositories.sort();
        let files = service
            .get_current_files_for_workspace(&folder.uri, GetFileOptions::default())
            .len();
        tracing::info!(
            "Repositories set for {}: {} repositories, {} files",
            folder.uri,
            repositories.len(),
            files
        );
        emitter.emit(
            "repositories_set",
            &RepositoriesSetEvent {
                folder: folder.clone(),
                repositories,
                files,
            },
        );
    });

    let (tx, rx) = mpsc::channel(1024);
    let pump = service.subscribe(rx)?;
    let watcher = WorkspaceWatcher::with_config(
        folder.clone(),
        Arc::new(LocalDirectoryWalker::new()),
        watcher_config,
    );
    let handle = watcher.start(tx).await?;
    tracing::info!("Watching {} (Ctrl+C to stop)", folder.uri);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    tracing::info!("Shutting down");
    handle.stop();
    pump.abort();
    service.dispose();
    Ok(())
}
