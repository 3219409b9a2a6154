//! Commit pipeline: bottom-up tree assembly from the flat index, commit
//! synthesis with parents derived from `HEAD`, and the atomic branch
//! advance.

use std::collections::BTreeMap;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{
        index::Index,
        object::{
            ObjectTrait,
            commit::Commit,
            signature::SignatureRole,
            tree::{Tree, TreeEntry, TreeMode},
            types::ObjectType,
        },
    },
    refs::{HeadState, RefExpect},
    repo::{KEY_MERGE_HEAD, KEY_MERGE_MSG, Repository},
};

/// Options for [`Repository::commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Override `user.name` for the author line.
    pub author_name: Option<String>,
    /// Override `user.email` for the author line.
    pub author_email: Option<String>,
    /// Permit a commit whose tree equals its parent's.
    pub allow_empty: bool,
}

impl Repository {
    /// Assemble one tree object per directory named by the index,
    /// deepest first, and return the root tree id. Stage slots other
    /// than 0 must have been resolved by the caller.
    pub async fn build_tree_from_index(
        &self,
        index: &Index,
    ) -> Result<ObjectHash, GitError> {
        // Directory path → direct children collected so far.
        let mut dirs: BTreeMap<String, Vec<TreeEntry>> = BTreeMap::new();
        dirs.insert(String::new(), Vec::new());

        for entry in index.entries() {
            let (dir, name) = match entry.path.rsplit_once('/') {
                Some((dir, name)) => (dir.to_string(), name.to_string()),
                None => (String::new(), entry.path.clone()),
            };
            // Materialize every ancestor directory.
            let mut ancestor = dir.clone();
            loop {
                dirs.entry(ancestor.clone()).or_default();
                match ancestor.rsplit_once('/') {
                    Some((parent, _)) => ancestor = parent.to_string(),
                    None => {
                        dirs.entry(String::new()).or_default();
                        break;
                    }
                }
            }
            let mode = TreeMode::from_index_mode(entry.mode)?;
            dirs.get_mut(&dir)
                .expect("ancestor just materialized")
                .push(TreeEntry::new(mode, entry.id, name));
        }

        // A child path sorts after its parent (it extends it by `/`),
        // so reverse order visits leaves before their parents.
        let dir_names: Vec<String> = dirs.keys().rev().cloned().collect();
        let mut built: BTreeMap<String, ObjectHash> = BTreeMap::new();
        for dir in dir_names {
            self.check_cancelled()?;
            let mut entries = dirs.remove(&dir).expect("listed from map");
            // Attach already-built subdirectories of this directory.
            let prefix = if dir.is_empty() {
                String::new()
            } else {
                format!("{dir}/")
            };
            let subdirs: Vec<(String, ObjectHash)> = built
                .iter()
                .filter(|(path, _)| {
                    path.strip_prefix(&prefix)
                        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
                })
                .map(|(path, id)| (path.clone(), *id))
                .collect();
            for (path, id) in subdirs {
                let name = path[prefix.len()..].to_string();
                entries.push(TreeEntry::new(TreeMode::Directory, id, name));
                built.remove(&path);
            }

            let tree = Tree::from_entries(self.kind, entries)?;
            let id = self.odb.put_raw(ObjectType::Tree, &tree.to_data()?).await?;
            built.insert(dir, id);
        }

        Ok(*built.get("").expect("root tree always built"))
    }

    /// Flatten a tree into path → (mode, id) over all non-directory
    /// entries, with an explicit traversal stack.
    pub(crate) async fn flatten_tree(
        &self,
        tree_id: ObjectHash,
    ) -> Result<BTreeMap<String, (TreeMode, ObjectHash)>, GitError> {
        let mut out = BTreeMap::new();
        let mut stack: Vec<(String, ObjectHash)> = vec![(String::new(), tree_id)];
        let mut visited = 0usize;

        while let Some((prefix, id)) = stack.pop() {
            self.check_cancelled()?;
            let tree = self.odb.get_tree(id).await?;
            for entry in &tree.entries {
                let path = if prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{prefix}/{}", entry.name)
                };
                if entry.is_tree() {
                    stack.push((path, entry.id));
                } else {
                    out.insert(path, (entry.mode, entry.id));
                }
            }
            visited += 1;
            if visited % self.engine.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(out)
    }

    /// Record the staged state as a commit and advance the current
    /// branch atomically against its previous tip. During a merge the
    /// recorded `MERGE_HEAD` becomes the second parent and the stored
    /// merge message is the default.
    pub async fn commit(
        &self,
        message: &str,
        options: CommitOptions,
    ) -> Result<Commit, GitError> {
        let _guard = self.index_lock.lock().await;
        let index = self.read_index().await?;
        if index.has_conflicts() {
            return Err(GitError::MergeConflict(index.conflicted_paths()));
        }

        let head_tip = self.refs.resolve_head().await?;
        let merge_head = self.merge_head().await?;

        let mut parents = Vec::new();
        if let Some(tip) = head_tip {
            parents.push(tip);
        }
        if let Some(theirs) = merge_head {
            parents.push(theirs);
        }

        let tree_id = self.build_tree_from_index(&index).await?;
        if !options.allow_empty && merge_head.is_none() {
            let parent_tree = match head_tip {
                Some(tip) => Some(self.odb.get_commit(tip).await?.tree_id),
                None => None,
            };
            if parent_tree == Some(tree_id) || (parent_tree.is_none() && index.is_empty()) {
                return Err(GitError::InvalidArgument(
                    "nothing to commit".to_string(),
                ));
            }
        }

        let message = if message.is_empty() {
            self.merge_message()
                .await?
                .ok_or_else(|| GitError::InvalidArgument("empty commit message".to_string()))?
        } else {
            message.to_string()
        };

        let author = self
            .signature(
                SignatureRole::Author,
                options.author_name.as_deref(),
                options.author_email.as_deref(),
            )
            .await?;
        let committer = self.signature(SignatureRole::Committer, None, None).await?;
        let commit = Commit::new(self.kind, author, committer, tree_id, parents, &message)?;
        self.odb
            .put_raw(ObjectType::Commit, &commit.to_data()?)
            .await?;

        // Single compare-and-set against the tip we derived parents
        // from; a racing committer makes this fail rather than fork.
        match self.refs.head().await? {
            HeadState::Symbolic(branch_ref) => {
                let expect = match head_tip {
                    Some(tip) => RefExpect::Value(tip),
                    None => RefExpect::MustNotExist,
                };
                self.refs.update(&branch_ref, expect, Some(commit.id)).await?;
            }
            HeadState::Detached(_) => {
                self.refs.set_head_detached(commit.id).await?;
            }
        }

        if merge_head.is_some() {
            self.clear_merge_state().await?;
        }

        tracing::debug!(id = %commit.id, "created commit");
        Ok(commit)
    }

    // ---- merge-in-progress state ---------------------------------------

    pub(crate) async fn merge_head(&self) -> Result<Option<ObjectHash>, GitError> {
        match self.store.get(KEY_MERGE_HEAD).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| GitError::ConversionError(e.to_string()))?;
                Ok(Some(text.trim().parse().map_err(|_| {
                    GitError::Corrupt("malformed MERGE_HEAD".to_string())
                })?))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn merge_message(&self) -> Result<Option<String>, GitError> {
        match self.store.get(KEY_MERGE_MSG).await? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes).map_err(|e| GitError::ConversionError(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub(crate) async fn clear_merge_state(&self) -> Result<(), GitError> {
        self.store.delete(KEY_MERGE_HEAD).await?;
        self.store.delete(KEY_MERGE_MSG).await
    }
}
