//! Checkout: plan the create/modify/delete set between the index and a
//! target tree, refuse to clobber unsaved work, materialize the plan
//! through the virtual filesystem, and move `HEAD`.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{
        index::{Index, IndexEntry},
        object::{GitObject, commit::Commit, tree::TreeMode, types::ObjectType},
    },
    refs::HEADS_PREFIX,
    repo::Repository,
};

/// One planned working-tree change.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PlanStep {
    Create(String),
    Modify(String),
    Delete(String),
}

/// What a checkout did.
#[derive(Debug, Default)]
pub struct CheckoutSummary {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    /// True when `HEAD` ended up detached at a commit id.
    pub detached: bool,
}

impl Repository {
    /// Resolve a checkout target: a local branch name or a commit id
    /// (annotated tags peel to their commit).
    async fn resolve_target(
        &self,
        target: &str,
    ) -> Result<(Option<String>, Commit), GitError> {
        let branch_ref = format!("{HEADS_PREFIX}{target}");
        if let Some(tip) = self.refs.read(&branch_ref).await? {
            return Ok((Some(target.to_string()), self.odb.get_commit(tip).await?));
        }
        let id = ObjectHash::from_str(target)
            .map_err(|_| GitError::NotFound(format!("branch or commit `{target}`")))?;
        match self.odb.get_object(id).await? {
            GitObject::Commit(commit) => Ok((None, commit)),
            GitObject::Tag(tag) => Ok((None, self.odb.get_commit(tag.object_id).await?)),
            other => Err(GitError::InvalidArgument(format!(
                "`{target}` is a {}, not a commit",
                other.get_type()
            ))),
        }
    }

    /// Check out a branch name or commit id. In non-force mode the
    /// operation aborts with `WorkingTreeDirty` before touching anything
    /// if a planned change would overwrite content that matches neither
    /// the current index nor the target.
    pub async fn checkout(&self, target: &str, force: bool) -> Result<CheckoutSummary, GitError> {
        let _guard = self.index_lock.lock().await;
        let (branch, commit) = self.resolve_target(target).await?;
        let target_flat = self.flatten_tree(commit.tree_id).await?;
        let index = self.read_index().await?;

        let current: BTreeMap<String, ObjectHash> = index
            .entries()
            .iter()
            .filter(|e| e.stage == 0)
            .map(|e| (e.path.clone(), e.id))
            .collect();

        // Plan first, apply later: a failed plan leaves the repository
        // untouched.
        let mut plan = Vec::new();
        for (path, (mode, target_id)) in &target_flat {
            // Submodule rows have no working-tree materialization.
            if *mode == TreeMode::Submodule {
                continue;
            }
            match current.get(path) {
                None => plan.push(PlanStep::Create(path.clone())),
                Some(current_id) if current_id != target_id => {
                    plan.push(PlanStep::Modify(path.clone()));
                }
                Some(_) => {}
            }
        }
        for path in current.keys() {
            if !target_flat.contains_key(path) {
                plan.push(PlanStep::Delete(path.clone()));
            }
        }

        if !force {
            for step in &plan {
                let path = match step {
                    PlanStep::Create(p) | PlanStep::Modify(p) | PlanStep::Delete(p) => p,
                };
                self.check_cancelled()?;
                if let Ok(content) = self.vfs.read_file(path).await {
                    let on_disk =
                        ObjectHash::from_type_and_data(self.kind, ObjectType::Blob, &content);
                    let matches_current = current.get(path) == Some(&on_disk);
                    let matches_target =
                        target_flat.get(path).is_some_and(|(_, id)| *id == on_disk);
                    if !matches_current && !matches_target {
                        return Err(GitError::WorkingTreeDirty(path.clone()));
                    }
                }
            }
        }

        let mut summary = CheckoutSummary {
            detached: branch.is_none(),
            ..Default::default()
        };
        for step in &plan {
            self.check_cancelled()?;
            match step {
                PlanStep::Create(path) | PlanStep::Modify(path) => {
                    let (_, id) = target_flat.get(path).expect("planned from target");
                    let blob = self.odb.get_blob(*id).await?;
                    self.vfs.write_file(path, &blob.data).await?;
                    match step {
                        PlanStep::Create(_) => summary.created.push(path.clone()),
                        _ => summary.modified.push(path.clone()),
                    }
                }
                PlanStep::Delete(path) => {
                    self.vfs.unlink(path).await?;
                    summary.deleted.push(path.clone());
                }
            }
        }

        // Rewrite the index to mirror the target tree, with fresh stat
        // metadata so status starts clean.
        let mut new_index = Index::new();
        for (path, (mode, id)) in &target_flat {
            let mut entry = IndexEntry::new(path.clone(), mode.to_index_mode(), *id);
            if *mode != TreeMode::Submodule
                && let Some(stat) = self.vfs.stat(path).await?
            {
                entry.ctime = stat.ctime;
                entry.mtime = stat.mtime;
                entry.size = stat.size as u32;
            }
            new_index.upsert(entry);
        }
        self.write_index(&new_index).await?;

        match &branch {
            Some(name) => {
                self.refs
                    .set_head_symbolic(&format!("{HEADS_PREFIX}{name}"))
                    .await?;
            }
            None => self.refs.set_head_detached(commit.id).await?,
        }

        tracing::debug!(
            target,
            created = summary.created.len(),
            modified = summary.modified.len(),
            deleted = summary.deleted.len(),
            "checkout complete"
        );
        Ok(summary)
    }
}
