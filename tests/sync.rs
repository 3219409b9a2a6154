//! Wire-level scenarios against the in-process smart-HTTP server:
//! clone, fetch, pull, push with status report, and shallow clones.

mod common;

use std::sync::Arc;

use common::MockGitServer;
use git_embed::{
    HashKind, InitOptions, Repository,
    repo::{
        commit::CommitOptions,
        merge::MergeOutcome,
        remote::RemoteOptions,
        stage::AddOptions,
    },
    store::MemoryStore,
    vfs::{MemVfs, VirtualFileSystem},
};

const URL: &str = "https://mock/repo.git";

async fn clone_it(server: &Arc<MockGitServer>) -> (Repository, Arc<MemVfs>) {
    let vfs = Arc::new(MemVfs::new());
    let repo = Repository::clone_from(
        Arc::new(MemoryStore::new()),
        vfs.clone(),
        server.clone(),
        URL,
        "origin",
        InitOptions::default(),
        &RemoteOptions::default(),
    )
    .await
    .unwrap();
    repo.set_user("Ada", "a@x").await.unwrap();
    (repo, vfs)
}

/// Clone a seeded server: working tree, HEAD, and tracking refs all
/// line up with the remote tip.
#[tokio::test]
async fn clone_seeded_repository() {
    let server = Arc::new(MockGitServer::new());
    let tip = server
        .seed_commit(
            "main",
            &[("README", b"remote says hi\n"), ("data.txt", b"1\n2\n3\n")],
            vec![],
            "seed",
        )
        .await;

    let (repo, vfs) = clone_it(&server).await;

    assert_eq!(vfs.read_file("README").await.unwrap(), b"remote says hi\n");
    assert_eq!(
        repo.current_branch().await.unwrap(),
        Some("main".to_string())
    );
    assert_eq!(repo.refs().resolve_head().await.unwrap(), Some(tip));
    assert_eq!(
        repo.refs().read("refs/remotes/origin/main").await.unwrap(),
        Some(tip)
    );
    assert!(repo.status().await.unwrap().is_clean());
}

/// Scenario 6: clone a server holding commit X, commit Y locally, push.
/// The server's branch advances from X to Y and the status report is
/// `unpack ok` + `ok refs/heads/main`.
#[tokio::test]
async fn fetch_then_push() {
    let server = Arc::new(MockGitServer::new());
    let x = server
        .seed_commit("main", &[("README", b"version X\n")], vec![], "X")
        .await;

    let (repo, vfs) = clone_it(&server).await;

    vfs.write_file("README", b"version Y\n").await.unwrap();
    repo.add(&[], AddOptions::default()).await.unwrap();
    let y = repo.commit("Y", CommitOptions::default()).await.unwrap();
    assert_eq!(y.parent_ids, vec![x]);

    let report = repo
        .push(server.clone(), "origin", None, &RemoteOptions::default())
        .await
        .unwrap();
    assert!(report.unpack_ok);
    assert_eq!(
        report.ref_results,
        vec![("refs/heads/main".to_string(), Ok(()))]
    );

    assert_eq!(server.branch_tip("main").await, Some(y.id));
    // The server can parse what it received.
    let server_commit = server.odb.get_commit(y.id).await.unwrap();
    assert_eq!(server_commit.message, "Y\n");
}

/// A stale push (remote moved on) is refused per-ref, not fatally.
#[tokio::test]
async fn non_fast_forward_push_refused() {
    let server = Arc::new(MockGitServer::new());
    let x = server
        .seed_commit("main", &[("README", b"X\n")], vec![], "X")
        .await;

    let (repo, vfs) = clone_it(&server).await;

    // The remote advances underneath us.
    server
        .seed_commit("main", &[("README", b"X2\n")], vec![x], "X2")
        .await;

    vfs.write_file("README", b"Y\n").await.unwrap();
    repo.add(&[], AddOptions::default()).await.unwrap();
    repo.commit("Y", CommitOptions::default()).await.unwrap();

    let report = repo
        .push(server.clone(), "origin", None, &RemoteOptions::default())
        .await
        .unwrap();
    assert!(report.unpack_ok);
    assert!(!report.all_ok());
    assert!(matches!(&report.ref_results[0], (name, Err(_)) if name == "refs/heads/main"));
}

/// Pull: fetch the advanced remote and fast-forward the local branch.
#[tokio::test]
async fn pull_fast_forwards() {
    let server = Arc::new(MockGitServer::new());
    let x = server
        .seed_commit("main", &[("README", b"one\n")], vec![], "one")
        .await;

    let (repo, vfs) = clone_it(&server).await;

    let y = server
        .seed_commit(
            "main",
            &[("README", b"one\n"), ("second.txt", b"two\n")],
            vec![x],
            "two",
        )
        .await;

    let outcome = repo
        .pull(server.clone(), &RemoteOptions::default())
        .await
        .unwrap();
    assert!(matches!(outcome, MergeOutcome::FastForward(id) if id == y));
    assert_eq!(vfs.read_file("second.txt").await.unwrap(), b"two\n");
    assert_eq!(repo.refs().resolve_head().await.unwrap(), Some(y));
}

/// Fetch into a diverged repository, then merge the tracking ref: a
/// two-parent merge commit lands and can be pushed back.
#[tokio::test]
async fn fetch_merge_push_cycle() {
    let server = Arc::new(MockGitServer::new());
    let x = server
        .seed_commit("main", &[("README", b"base\n")], vec![], "base")
        .await;

    let (repo, vfs) = clone_it(&server).await;

    // Remote adds a file; we add a different one.
    let remote_tip = server
        .seed_commit(
            "main",
            &[("README", b"base\n"), ("remote.txt", b"r\n")],
            vec![x],
            "remote work",
        )
        .await;
    vfs.write_file("local.txt", b"l\n").await.unwrap();
    repo.add(&[], AddOptions::default()).await.unwrap();
    let local_tip = repo.commit("local work", CommitOptions::default()).await.unwrap();

    let outcome = repo
        .pull(server.clone(), &RemoteOptions::default())
        .await
        .unwrap();
    let merge_commit = match outcome {
        MergeOutcome::Merged(commit) => commit,
        other => panic!("expected merge, got {other:?}"),
    };
    assert_eq!(merge_commit.parent_ids, vec![local_tip.id, remote_tip]);
    assert_eq!(vfs.read_file("remote.txt").await.unwrap(), b"r\n");
    assert_eq!(vfs.read_file("local.txt").await.unwrap(), b"l\n");

    let report = repo
        .push(server.clone(), "origin", None, &RemoteOptions::default())
        .await
        .unwrap();
    assert!(report.all_ok());
    assert_eq!(server.branch_tip("main").await, Some(merge_commit.id));
}

/// A depth-1 clone records the shallow boundary and the log stops at
/// it.
#[tokio::test]
async fn shallow_clone_depth_one() {
    let server = Arc::new(MockGitServer::new());
    let first = server
        .seed_commit("main", &[("README", b"v1\n")], vec![], "v1")
        .await;
    let second = server
        .seed_commit("main", &[("README", b"v2\n")], vec![first], "v2")
        .await;

    let vfs = Arc::new(MemVfs::new());
    let repo = Repository::clone_from(
        Arc::new(MemoryStore::new()),
        vfs.clone(),
        server.clone(),
        URL,
        "origin",
        InitOptions::default(),
        &RemoteOptions {
            depth: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(repo.refs().resolve_head().await.unwrap(), Some(second));
    assert_eq!(vfs.read_file("README").await.unwrap(), b"v2\n");

    // History stops at the shallow boundary instead of failing on the
    // absent parent.
    let log = repo.log(None, None).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].id, second);
}

/// Fetching twice is idempotent and cheap: the second round moves no
/// refs and ships no objects.
#[tokio::test]
async fn fetch_is_idempotent() {
    let server = Arc::new(MockGitServer::new());
    server
        .seed_commit("main", &[("README", b"x\n")], vec![], "x")
        .await;

    let (repo, _vfs) = clone_it(&server).await;
    let summary = repo
        .fetch(server.clone(), "origin", &RemoteOptions::default())
        .await
        .unwrap();
    assert!(summary.updated.is_empty());
    assert_eq!(summary.objects, 0);
}

/// Hash-width guard: a SHA-256 repository refuses a SHA-1 remote.
#[tokio::test]
async fn object_format_mismatch_rejected() {
    let server = Arc::new(MockGitServer::new());
    server
        .seed_commit("main", &[("README", b"x\n")], vec![], "x")
        .await;

    let vfs = Arc::new(MemVfs::new());
    let err = Repository::clone_from(
        Arc::new(MemoryStore::new()),
        vfs,
        server.clone(),
        URL,
        "origin",
        InitOptions {
            hash: HashKind::Sha256,
            ..Default::default()
        },
        &RemoteOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("object-format"));
}
