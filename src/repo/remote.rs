//! Remote operations: clone, fetch, pull, and push over the smart-HTTP
//! client, driven by `remote.<name>.*` and `branch.<name>.*` config.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    protocol::{
        AuthScheme, AuthedTransport, CredentialResolver, FetchPackOptions, HttpTransport,
        PushReport, RefUpdateCommand, ServiceType, SmartHttpClient,
    },
    refs::{HEADS_PREFIX, REMOTES_PREFIX, RefExpect},
    repo::{InitOptions, Repository, merge::MergeOutcome},
    store::BlobStore,
    vfs::VirtualFileSystem,
};

/// One fetch/push refspec, e.g. `+refs/heads/*:refs/remotes/origin/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    pub force: bool,
    pub src: String,
    pub dst: String,
}

impl RefSpec {
    pub fn parse(text: &str) -> Result<RefSpec, GitError> {
        let (force, rest) = match text.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (src, dst) = rest
            .split_once(':')
            .ok_or_else(|| GitError::InvalidConfig(format!("refspec `{text}` has no colon")))?;
        if src.matches('*').count() > 1 || src.matches('*').count() != dst.matches('*').count() {
            return Err(GitError::InvalidConfig(format!(
                "unbalanced wildcard in refspec `{text}`"
            )));
        }
        Ok(RefSpec {
            force,
            src: src.to_string(),
            dst: dst.to_string(),
        })
    }

    /// Map a source ref name through the spec, or `None` when it does
    /// not match.
    pub fn map(&self, name: &str) -> Option<String> {
        match self.src.split_once('*') {
            Some((prefix, suffix)) => {
                let middle = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
                Some(self.dst.replacen('*', middle, 1))
            }
            None => (name == self.src).then(|| self.dst.clone()),
        }
    }
}

/// Connection-level options shared by the remote operations.
#[derive(Default)]
pub struct RemoteOptions {
    pub auth: AuthScheme,
    pub resolver: Option<Arc<dyn CredentialResolver>>,
    /// Commit-depth limit; nonzero makes the clone/fetch shallow.
    pub depth: Option<u32>,
    /// Per-request deadline.
    pub request_timeout: Option<Duration>,
    /// Deadline over the whole operation.
    pub overall_deadline: Option<Duration>,
    pub quiet: bool,
}

/// What a fetch changed.
#[derive(Debug, Default)]
pub struct FetchSummary {
    /// Remote-tracking refs written, with their new tips.
    pub updated: Vec<(String, ObjectHash)>,
    /// Objects ingested from the pack stream.
    pub objects: usize,
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    label: &str,
    fut: impl Future<Output = Result<T, GitError>>,
) -> Result<T, GitError> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| GitError::NetworkTimeout(format!("{label} exceeded overall deadline")))?,
        None => fut.await,
    }
}

impl Repository {
    fn authed(&self, transport: Arc<dyn HttpTransport>, options: &RemoteOptions) -> AuthedTransport {
        AuthedTransport::new(
            transport,
            options.auth.clone(),
            options.resolver.clone(),
            options.request_timeout,
            self.cancellation_token(),
        )
    }

    /// Compare-and-set a ref against its freshly read value, retrying a
    /// bounded number of times when a concurrent writer wins the race.
    async fn update_ref_with_retry(
        &self,
        name: &str,
        new: ObjectHash,
    ) -> Result<(), GitError> {
        let mut attempts = 0;
        loop {
            let expect = match self.refs.read(name).await? {
                Some(current) => RefExpect::Value(current),
                None => RefExpect::MustNotExist,
            };
            match self.refs.update(name, expect, Some(new)).await {
                Ok(()) => return Ok(()),
                Err(GitError::RefRaceLost(_)) if attempts < self.engine.ref_retry_limit => {
                    attempts += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn remote_url_and_spec(&self, remote: &str) -> Result<(String, RefSpec), GitError> {
        let config = self.config().await;
        let url = config
            .remote_url(remote)
            .ok_or_else(|| GitError::NotFound(format!("remote `{remote}`")))?
            .to_string();
        let spec = match config.remote_fetch(remote) {
            Some(text) => RefSpec::parse(text)?,
            None => RefSpec::parse(&format!("+refs/heads/*:{REMOTES_PREFIX}{remote}/*"))?,
        };
        Ok((url, spec))
    }

    /// Recent local commit ids, newest first, offered as `have` lines.
    async fn negotiation_haves(&self) -> Result<Vec<ObjectHash>, GitError> {
        let mut tips = Vec::new();
        for (_, id) in self.refs.list(HEADS_PREFIX).await? {
            tips.push(id);
        }
        for (_, id) in self.refs.list(REMOTES_PREFIX).await? {
            tips.push(id);
        }

        let mut haves = Vec::new();
        let mut seen = HashSet::new();
        for tip in tips {
            if !seen.contains(&tip) {
                for commit in self.log(Some(tip), Some(self.engine.negotiation_batch)).await? {
                    if seen.insert(commit.id) {
                        haves.push(commit.id);
                    }
                }
            }
        }
        Ok(haves)
    }

    /// Fetch from a configured remote: discovery, negotiation, pack
    /// ingest, then atomic remote-tracking ref updates.
    pub async fn fetch(
        &self,
        transport: Arc<dyn HttpTransport>,
        remote: &str,
        options: &RemoteOptions,
    ) -> Result<FetchSummary, GitError> {
        with_deadline(options.overall_deadline, "fetch", self.fetch_inner(transport, remote, options)).await
    }

    async fn fetch_inner(
        &self,
        transport: Arc<dyn HttpTransport>,
        remote: &str,
        options: &RemoteOptions,
    ) -> Result<FetchSummary, GitError> {
        let (url, spec) = self.remote_url_and_spec(remote).await?;
        let authed = self.authed(transport, options);
        let client = SmartHttpClient::new(&authed, &url, self.kind);
        let discovery = client.discover(ServiceType::UploadPack).await?;

        // Matching refs, with ids parsed at our width.
        let mut targets: Vec<(String, ObjectHash)> = Vec::new();
        for remote_ref in &discovery.refs {
            if let Some(dst) = spec.map(&remote_ref.name) {
                let id = ObjectHash::from_str(&remote_ref.id_hex).map_err(|_| {
                    GitError::ProtocolError(format!(
                        "ref {} advertises id `{}` of the wrong width",
                        remote_ref.name, remote_ref.id_hex
                    ))
                })?;
                targets.push((dst, id));
            }
        }

        let mut wants = Vec::new();
        for (_, id) in &targets {
            if !self.odb.has(*id).await? && !wants.contains(id) {
                wants.push(*id);
            }
        }

        let mut summary = FetchSummary::default();
        if !wants.is_empty() {
            let haves = self.negotiation_haves().await?;
            let result = client
                .fetch_pack(
                    &discovery,
                    &wants,
                    &haves,
                    &FetchPackOptions {
                        depth: options.depth,
                        quiet: options.quiet,
                        progress: None,
                    },
                )
                .await?;

            let cancel = self.cancellation_token();
            let pack = self.odb.ingest_pack(&result.pack, &cancel).await?;
            summary.objects = pack.entries.len();

            // Shallow boundary bookkeeping from the server's markers.
            let mut boundary = self.shallow_boundary().await?;
            for id in result.shallow {
                boundary.insert(id);
            }
            for id in &result.unshallow {
                boundary.remove(id);
            }
            self.write_shallow_boundary(&boundary).await?;
        }

        // Tracking refs move only after the pack landed, so a ref never
        // points at an object the store does not hold.
        for (dst, id) in targets {
            if self.refs.read(&dst).await? == Some(id) {
                continue;
            }
            if !self.odb.has(id).await? {
                return Err(GitError::ProtocolError(format!(
                    "server advertised {id} for {dst} but sent no such object"
                )));
            }
            self.update_ref_with_retry(&dst, id).await?;
            summary.updated.push((dst, id));
        }

        tracing::debug!(
            remote,
            objects = summary.objects,
            refs = summary.updated.len(),
            "fetch complete"
        );
        Ok(summary)
    }

    /// Clone: initialize, configure the remote, fetch everything, then
    /// create and check out the default branch.
    pub async fn clone_from(
        store: Arc<dyn BlobStore>,
        vfs: Arc<dyn VirtualFileSystem>,
        transport: Arc<dyn HttpTransport>,
        url: &str,
        remote: &str,
        init: InitOptions,
        options: &RemoteOptions,
    ) -> Result<Repository, GitError> {
        let repo = Repository::init(store, vfs, init.clone()).await?;
        repo.update_config(|c| {
            c.set("remote", Some(remote), "url", url);
            c.set(
                "remote",
                Some(remote),
                "fetch",
                &format!("+refs/heads/*:{REMOTES_PREFIX}{remote}/*"),
            );
        })
        .await?;

        repo.fetch(transport, remote, options).await?;

        // Prefer the configured default branch, then whatever the
        // remote has.
        let tracking = repo.refs.list(&format!("{REMOTES_PREFIX}{remote}/")).await?;
        let preferred = format!("{REMOTES_PREFIX}{remote}/{}", init.default_branch);
        let (tracking_ref, tip) = tracking
            .iter()
            .find(|(name, _)| *name == preferred)
            .or_else(|| tracking.first())
            .cloned()
            .ok_or_else(|| GitError::NotFound(format!("remote `{remote}` has no branches")))?;
        let branch = tracking_ref[REMOTES_PREFIX.len() + remote.len() + 1..].to_string();

        repo.refs
            .update(
                &format!("{HEADS_PREFIX}{branch}"),
                RefExpect::MustNotExist,
                Some(tip),
            )
            .await?;
        repo.update_config(|c| {
            c.set("branch", Some(&branch), "remote", remote);
            c.set("branch", Some(&branch), "merge", &format!("{HEADS_PREFIX}{branch}"));
        })
        .await?;
        repo.checkout(&branch, true).await?;
        tracing::debug!(url, branch, "clone complete");
        Ok(repo)
    }

    /// Pull: fetch the configured upstream, then merge its tracking ref
    /// into the current branch.
    pub async fn pull(
        &self,
        transport: Arc<dyn HttpTransport>,
        options: &RemoteOptions,
    ) -> Result<MergeOutcome, GitError> {
        let branch = self
            .current_branch()
            .await?
            .ok_or_else(|| GitError::InvalidArgument("HEAD is detached".to_string()))?;
        let config = self.config().await;
        let (remote, merge_ref) = match config.branch_upstream(&branch) {
            Some((remote, merge)) => (remote.to_string(), merge.to_string()),
            None => ("origin".to_string(), format!("{HEADS_PREFIX}{branch}")),
        };
        drop(config);

        self.fetch(transport, &remote, options).await?;

        let short = merge_ref
            .strip_prefix(HEADS_PREFIX)
            .unwrap_or(merge_ref.as_str());
        let tracking = format!("{REMOTES_PREFIX}{remote}/{short}");
        let tip = self
            .refs
            .read(&tracking)
            .await?
            .ok_or_else(|| GitError::NotFound(format!("tracking ref {tracking}")))?;
        self.merge(&tip.to_string()).await
    }

    /// Push the current branch (or `refspec` as `src:dst` short names)
    /// to a configured remote.
    pub async fn push(
        &self,
        transport: Arc<dyn HttpTransport>,
        remote: &str,
        refspec: Option<&str>,
        options: &RemoteOptions,
    ) -> Result<PushReport, GitError> {
        with_deadline(
            options.overall_deadline,
            "push",
            self.push_inner(transport, remote, refspec, options),
        )
        .await
    }

    async fn push_inner(
        &self,
        transport: Arc<dyn HttpTransport>,
        remote: &str,
        refspec: Option<&str>,
        options: &RemoteOptions,
    ) -> Result<PushReport, GitError> {
        let (src_branch, dst_branch) = match refspec {
            Some(text) => match text.split_once(':') {
                Some((src, dst)) => (src.to_string(), dst.to_string()),
                None => (text.to_string(), text.to_string()),
            },
            None => {
                let branch = self
                    .current_branch()
                    .await?
                    .ok_or_else(|| GitError::InvalidArgument("HEAD is detached".to_string()))?;
                (branch.clone(), branch)
            }
        };
        let src_ref = format!("{HEADS_PREFIX}{src_branch}");
        let dst_ref = format!("{HEADS_PREFIX}{dst_branch}");
        let tip = self
            .refs
            .read(&src_ref)
            .await?
            .ok_or_else(|| GitError::NotFound(format!("branch {src_branch}")))?;

        let config = self.config().await;
        let url = config
            .remote_url(remote)
            .ok_or_else(|| GitError::NotFound(format!("remote `{remote}`")))?
            .to_string();
        drop(config);

        let authed = self.authed(transport, options);
        let client = SmartHttpClient::new(&authed, &url, self.kind);
        let discovery = client.discover(ServiceType::ReceivePack).await?;

        let old = match discovery.find(&dst_ref) {
            Some(remote_ref) => ObjectHash::from_str(&remote_ref.id_hex)?,
            None => ObjectHash::zero(self.kind),
        };
        if old == tip {
            return Ok(PushReport {
                unpack_ok: true,
                unpack_error: None,
                ref_results: vec![(dst_ref, Ok(()))],
            });
        }

        // Fast-forward guard: the remote tip must be an ancestor of what
        // we are pushing. A tip we do not even hold means the remote has
        // work we never fetched.
        if !old.is_zero() {
            let fast_forward = self.odb.has(old).await?
                && self.ancestor_set(tip).await?.contains(&old);
            if !fast_forward {
                return Ok(PushReport {
                    unpack_ok: true,
                    unpack_error: None,
                    ref_results: vec![(dst_ref, Err("non-fast-forward".to_string()))],
                });
            }
        }

        // Objects the remote already holds: everything reachable from
        // advertised tips that exist locally.
        let mut known = HashSet::new();
        for remote_ref in &discovery.refs {
            if let Ok(id) = ObjectHash::from_str(&remote_ref.id_hex)
                && self.odb.has(id).await?
            {
                for reachable in self.reachable_objects(&[id], &HashSet::new()).await? {
                    known.insert(reachable);
                }
            }
        }

        let to_send = self.reachable_objects(&[tip], &known).await?;
        let cancel = self.cancellation_token();
        let pack = self.odb.export_pack(&to_send, true, &cancel).await?;

        let commands = vec![RefUpdateCommand {
            old,
            new: tip,
            name: dst_ref.clone(),
        }];
        let report = client.send_pack(&discovery, &commands, pack).await?;

        if report.all_ok() {
            // Mirror the accepted update into the tracking namespace.
            let tracking = format!("{REMOTES_PREFIX}{remote}/{dst_branch}");
            self.update_ref_with_retry(&tracking, tip).await?;
        }
        tracing::debug!(remote, %tip, ok = report.all_ok(), "push complete");
        Ok(report)
    }
}
