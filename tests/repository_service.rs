//! RepositoryService against real workspace folders on disk
//!
//! Uses the local filesystem client and directory walker; only the git
//! plumbing (tracked-file listing) is stubbed.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{service_for, StaticGit, TestRepo};
use repo_index::{
    FileChangeType, FileEvent, FileSystemEvent, GetFileOptions, NormalizedPath,
    RepositoryService, WorkspaceFileEvent,
};

fn all_files() -> GetFileOptions {
    GetFileOptions::default()
}

fn visible() -> GetFileOptions {
    GetFileOptions {
        exclude_git_folder: true,
        exclude_ignored: true,
    }
}

/// Relative path of each file mapped to whether it is ignored
fn ignore_map(service: &RepositoryService, repo: &TestRepo) -> BTreeMap<String, bool> {
    let root = NormalizedPath::new(repo.path());
    service
        .get_current_files_for_workspace(&root, GetFileOptions {
            exclude_git_folder: true,
            exclude_ignored: false,
        })
        .into_iter()
        .map(|file| {
            let relative = file
                .uri
                .relative_to(&root)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            (relative, file.is_ignored)
        })
        .collect()
}

async fn file_event(
    service: &RepositoryService,
    repo: &TestRepo,
    relative_path: &str,
    change_type: FileChangeType,
) {
    service
        .handle_event(FileSystemEvent::WorkspaceFile(WorkspaceFileEvent {
            folder: repo.folder(),
            file_event: FileEvent::new(repo.uri(relative_path), change_type),
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_tracked_file_in_ignored_directory_is_kept() {
    let repo = TestRepo::new();
    repo.init_repo("")
        .add_file(".gitignore", "node_modules/\n")
        .add_file("index.js", "")
        .add_file("node_modules/keep.js", "")
        .add_file("node_modules/ignored.js", "");
    let git = StaticGit::new();
    git.set_tracked(repo.path(), &[".gitignore", "index.js", "node_modules/keep.js"]);

    let service = service_for(git);
    service.scan_workspace_folder(&repo.folder()).await.unwrap();

    let files = ignore_map(&service, &repo);
    assert_eq!(files.get("index.js"), Some(&false));
    assert_eq!(files.get("node_modules/keep.js"), Some(&false));
    assert_eq!(files.get("node_modules/ignored.js"), Some(&true));

    let visible: Vec<NormalizedPath> = service
        .get_current_files_for_workspace(&repo.folder().uri, visible())
        .into_iter()
        .map(|f| f.uri)
        .collect();
    assert!(visible.contains(&repo.uri("node_modules/keep.js")));
    assert!(!visible.contains(&repo.uri("node_modules/ignored.js")));
    assert!(!visible.iter().any(|uri| uri.has_component(".git")));
}

#[tokio::test]
async fn test_nested_gitignore_negation() {
    let repo = TestRepo::new();
    repo.init_repo("")
        .add_file(".gitignore", "*.log\n")
        .add_file("app.log", "")
        .add_file("logs/.gitignore", "!keep.log\n")
        .add_file("logs/keep.log", "")
        .add_file("logs/other.log", "")
        .set_exclude("", "*.tmp\n")
        .add_file("scratch.tmp", "");

    let service = service_for(StaticGit::new());
    service.scan_workspace_folder(&repo.folder()).await.unwrap();

    let files = ignore_map(&service, &repo);
    assert_eq!(files.get("app.log"), Some(&true));
    assert_eq!(files.get("logs/keep.log"), Some(&false));
    assert_eq!(files.get("logs/other.log"), Some(&true));
    assert_eq!(files.get("scratch.tmp"), Some(&true));
    assert_eq!(files.get(".gitignore"), Some(&false));
}

#[tokio::test]
async fn test_nested_repositories_own_their_files() {
    let repo = TestRepo::new();
    repo.init_repo("")
        .add_file(".gitignore", "*.gen\n")
        .add_file("main.rs", "")
        .init_repo("vendor/lib")
        .add_file("vendor/lib/lib.rs", "")
        .add_file("vendor/lib/code.gen", "");

    let service = service_for(StaticGit::new());
    service.scan_workspace_folder(&repo.folder()).await.unwrap();

    let repositories = service.get_repositories_for_workspace(&repo.folder().uri);
    assert_eq!(repositories.len(), 2);

    let inner = service
        .get_matching_repository(&repo.uri("vendor/lib/lib.rs"), &repo.folder().uri)
        .unwrap();
    assert_eq!(inner.uri(), &repo.uri("vendor/lib"));
    let outer = service
        .get_matching_repository(&repo.uri("main.rs"), &repo.folder().uri)
        .unwrap();
    assert_eq!(outer.uri(), &repo.uri(""));

    // The outer .gitignore does not reach into the nested repository
    let generated = service
        .get_repository_file_for_uri(&repo.uri("vendor/lib/code.gen"), inner.uri(), &repo.folder())
        .unwrap();
    assert!(!generated.is_ignored);

    let outer_files = service.get_current_files_for_repository(
        outer.uri(),
        &repo.folder().uri,
        all_files(),
    );
    assert!(outer_files
        .iter()
        .all(|f| !f.uri.starts_with(&repo.uri("vendor/lib"))));
}

#[tokio::test]
async fn test_rescan_replaces_previous_state() {
    let repo = TestRepo::new();
    repo.init_repo("").add_file("a.txt", "");
    let service = service_for(StaticGit::new());
    let rebuilds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&rebuilds);
    let _subscription = service.on_workspace_repositories_set(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    service.scan_workspace_folder(&repo.folder()).await.unwrap();
    let first = service
        .get_repository_for_workspace(&repo.folder().uri, &repo.uri(""))
        .unwrap();

    repo.remove("a.txt").add_file("b.txt", "");
    service.scan_workspace_folder(&repo.folder()).await.unwrap();
    let second = service
        .get_repository_for_workspace(&repo.folder().uri, &repo.uri(""))
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    let files = ignore_map(&service, &repo);
    assert!(files.contains_key("b.txt"));
    assert!(!files.contains_key("a.txt"));
    assert_eq!(rebuilds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_incremental_events_follow_the_disk() {
    let repo = TestRepo::new();
    repo.init_repo("").add_file(".gitignore", "*.log\n").add_file("src/lib.rs", "");
    let service = service_for(StaticGit::new());
    service.scan_workspace_folder(&repo.folder()).await.unwrap();

    repo.add_file("src/new.rs", "").add_file("src/debug.log", "");
    file_event(&service, &repo, "src/new.rs", FileChangeType::Created).await;
    file_event(&service, &repo, "src/debug.log", FileChangeType::Created).await;

    let files = ignore_map(&service, &repo);
    assert_eq!(files.get("src/new.rs"), Some(&false));
    assert_eq!(files.get("src/debug.log"), Some(&true));

    repo.remove("src");
    file_event(&service, &repo, "src", FileChangeType::Deleted).await;
    let files = ignore_map(&service, &repo);
    assert!(!files.keys().any(|path| path.starts_with("src/")));
}

#[tokio::test]
async fn test_gitignore_change_rebuilds_workspace() {
    let repo = TestRepo::new();
    repo.init_repo("").add_file("notes.md", "").add_file("build.out", "");
    let service = service_for(StaticGit::new());
    service.scan_workspace_folder(&repo.folder()).await.unwrap();
    assert_eq!(ignore_map(&service, &repo).get("build.out"), Some(&false));

    repo.add_file(".gitignore", "*.out\n");
    file_event(&service, &repo, ".gitignore", FileChangeType::Created).await;

    let files = ignore_map(&service, &repo);
    assert_eq!(files.get("build.out"), Some(&true));
    assert_eq!(files.get("notes.md"), Some(&false));
}

#[tokio::test]
async fn test_folder_without_repository_is_empty() {
    let repo = TestRepo::new();
    repo.add_file("loose.txt", "");
    let service = service_for(StaticGit::new());
    service.scan_workspace_folder(&repo.folder()).await.unwrap();

    assert!(service.get_repositories_for_workspace(&repo.folder().uri).is_empty());
    assert!(service
        .get_current_files_for_workspace(&repo.folder().uri, all_files())
        .is_empty());
}
