//! Three-way merge: best-common-ancestor search, fast-forward
//! detection, tree-level reconciliation, and a line-based blob merge
//! that produces structured conflicts.
//!
//! Conflicts are values, not errors: `merge` returns
//! [`MergeOutcome::Conflicted`] carrying per-path sides and hunks, and
//! leaves the index populated at stage slots 1/2/3 so a later commit
//! finishes the merge.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::str::FromStr;

use similar::{Algorithm, DiffOp, TextDiffConfig};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{
        index::{Index, IndexEntry},
        object::{
            ObjectTrait, commit::Commit, signature::SignatureRole, tree::TreeMode,
            types::ObjectType,
        },
    },
    refs::{HEADS_PREFIX, HeadState, RefExpect},
    repo::{KEY_MERGE_HEAD, KEY_MERGE_MSG, KEY_ORIG_HEAD, Repository},
};

/// Half-open line range.
pub type LineRange = (usize, usize);

/// Why a hunk conflicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides rewrote overlapping base lines.
    BothModified,
    /// Both sides added different content where the base had none.
    BothAdded,
    /// One side deleted the file while the other modified it.
    DeleteModify,
}

/// One conflicted region inside a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeHunk {
    pub base_range: LineRange,
    pub ours_range: LineRange,
    pub theirs_range: LineRange,
    pub kind: ConflictKind,
}

/// One conflicted path with its three sides.
#[derive(Debug, Clone)]
pub struct MergeConflict {
    pub path: String,
    pub base: Option<(TreeMode, ObjectHash)>,
    pub ours: Option<(TreeMode, ObjectHash)>,
    pub theirs: Option<(TreeMode, ObjectHash)>,
    pub hunks: Vec<MergeHunk>,
}

/// What a merge did.
#[derive(Debug)]
pub enum MergeOutcome {
    /// The other side is already an ancestor of ours.
    AlreadyUpToDate,
    /// Our tip was an ancestor of theirs; the branch moved there.
    FastForward(ObjectHash),
    /// A clean three-way merge produced this commit.
    Merged(Commit),
    /// Conflicts were recorded; the branch did not move.
    Conflicted(Vec<MergeConflict>),
}

/// Result of merging one blob's lines.
struct BlobMerge {
    content: Vec<u8>,
    hunks: Vec<MergeHunk>,
}

/// Non-equal regions of a side relative to the base:
/// (base_range, side_range).
fn side_hunks(base: &str, side: &str) -> Vec<(LineRange, LineRange)> {
    let diff = TextDiffConfig::default()
        .algorithm(Algorithm::Myers)
        .diff_lines(base, side);
    diff.ops()
        .iter()
        .filter_map(|op| match op {
            DiffOp::Equal { .. } => None,
            DiffOp::Delete {
                old_index,
                old_len,
                new_index,
            } => Some(((*old_index, old_index + old_len), (*new_index, *new_index))),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => Some(((*old_index, *old_index), (*new_index, new_index + new_len))),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => Some((
                (*old_index, old_index + old_len),
                (*new_index, new_index + new_len),
            )),
        })
        .collect()
}

/// Map a base region through one side's hunks: the side's replacement
/// lines for its hunks, base lines in the gaps between them.
fn project_region(
    region: LineRange,
    hunks: &[(LineRange, LineRange)],
    base_lines: &[&str],
    side_lines: &[&str],
) -> (Vec<String>, LineRange) {
    let mut out = Vec::new();
    let mut cursor = region.0;
    let mut side_start = None;
    let mut side_end = 0;

    for ((b_start, b_end), (s_start, s_end)) in hunks {
        // Pure insertions carry an empty base range and may sit exactly
        // on the region boundary; only hunks strictly outside are skipped.
        if *b_end < region.0 || *b_start > region.1 {
            continue;
        }
        for line in &base_lines[cursor..*b_start] {
            out.push((*line).to_string());
        }
        for line in &side_lines[*s_start..*s_end] {
            out.push((*line).to_string());
        }
        side_start.get_or_insert(*s_start);
        side_end = *s_end;
        cursor = *b_end;
    }
    for line in &base_lines[cursor..region.1] {
        out.push((*line).to_string());
    }
    (out, (side_start.unwrap_or(side_end), side_end))
}

/// Line-based three-way merge of blob contents (classic diff3): regions
/// changed on one side take that side, identical changes collapse, and
/// overlapping different changes become conflict hunks rendered with
/// standard markers.
fn merge_lines(base: &str, ours: &str, theirs: &str) -> BlobMerge {
    let base_lines: Vec<&str> = base.split_inclusive('\n').collect();
    let ours_lines: Vec<&str> = ours.split_inclusive('\n').collect();
    let theirs_lines: Vec<&str> = theirs.split_inclusive('\n').collect();

    let ours_hunks = side_hunks(base, ours);
    let theirs_hunks = side_hunks(base, theirs);

    let mut output = String::new();
    let mut hunks = Vec::new();
    let mut cursor = 0usize;
    let (mut oi, mut ti) = (0usize, 0usize);

    while oi < ours_hunks.len() || ti < theirs_hunks.len() {
        let next_o = ours_hunks.get(oi).map(|h| h.0.0);
        let next_t = theirs_hunks.get(ti).map(|h| h.0.0);
        let region_start = match (next_o, next_t) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };

        for line in &base_lines[cursor..region_start] {
            output.push_str(line);
        }

        // Grow the region until no hunk on either side straddles its
        // end; overlapping edits must be judged together.
        let mut region_end = region_start;
        let (o_from, t_from) = (oi, ti);
        loop {
            let mut grew = false;
            while let Some(((s, e), _)) = ours_hunks.get(oi) {
                if *s <= region_end {
                    region_end = region_end.max(*e).max(*s);
                    oi += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            while let Some(((s, e), _)) = theirs_hunks.get(ti) {
                if *s <= region_end {
                    region_end = region_end.max(*e).max(*s);
                    ti += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            if !grew {
                break;
            }
        }

        let region = (region_start, region_end);
        let ours_in_region = &ours_hunks[o_from..oi];
        let theirs_in_region = &theirs_hunks[t_from..ti];

        let (ours_repl, ours_range) =
            project_region(region, ours_in_region, &base_lines, &ours_lines);
        let (theirs_repl, theirs_range) =
            project_region(region, theirs_in_region, &base_lines, &theirs_lines);

        if ours_in_region.is_empty() {
            for line in &theirs_repl {
                output.push_str(line);
            }
        } else if theirs_in_region.is_empty() || ours_repl == theirs_repl {
            for line in &ours_repl {
                output.push_str(line);
            }
        } else {
            let kind = if region.0 == region.1 {
                ConflictKind::BothAdded
            } else {
                ConflictKind::BothModified
            };
            hunks.push(MergeHunk {
                base_range: region,
                ours_range,
                theirs_range,
                kind,
            });
            output.push_str("<<<<<<< ours\n");
            for line in &ours_repl {
                output.push_str(line);
            }
            output.push_str("=======\n");
            for line in &theirs_repl {
                output.push_str(line);
            }
            output.push_str(">>>>>>> theirs\n");
        }
        cursor = region_end;
    }

    for line in &base_lines[cursor..] {
        output.push_str(line);
    }

    BlobMerge {
        content: output.into_bytes(),
        hunks,
    }
}

impl Repository {
    /// All ancestors of `tip` (inclusive), with an explicit seen-set.
    pub(crate) async fn ancestor_set(
        &self,
        tip: ObjectHash,
    ) -> Result<HashSet<ObjectHash>, GitError> {
        let shallow = self.shallow_boundary().await?;
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([tip]);
        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            self.check_cancelled()?;
            if !seen.insert(id) {
                continue;
            }
            if shallow.contains(&id) {
                continue;
            }
            let commit = self.odb.get_commit(id).await?;
            queue.extend(commit.parent_ids.iter().copied());
            visited += 1;
            if visited % self.engine.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(seen)
    }

    /// Best common ancestor of two commits: breadth-first reachability
    /// from both sides, then candidates that are ancestors of other
    /// candidates are discarded. With several equally good survivors,
    /// the one closest to `ours` wins.
    pub async fn merge_base(
        &self,
        ours: ObjectHash,
        theirs: ObjectHash,
    ) -> Result<Option<ObjectHash>, GitError> {
        let ours_set = self.ancestor_set(ours).await?;
        let theirs_set = self.ancestor_set(theirs).await?;
        let common: HashSet<ObjectHash> =
            ours_set.intersection(&theirs_set).copied().collect();
        if common.is_empty() {
            return Ok(None);
        }

        // Strict ancestors of any common commit cannot be best.
        let mut redundant: HashSet<ObjectHash> = HashSet::new();
        for &candidate in &common {
            if redundant.contains(&candidate) {
                continue;
            }
            let commit = self.odb.get_commit(candidate).await?;
            let mut queue: VecDeque<ObjectHash> = commit.parent_ids.iter().copied().collect();
            let mut seen = HashSet::new();
            while let Some(id) = queue.pop_front() {
                if !seen.insert(id) {
                    continue;
                }
                if common.contains(&id) {
                    redundant.insert(id);
                }
                if let Ok(parent) = self.odb.get_commit(id).await {
                    queue.extend(parent.parent_ids.iter().copied());
                }
            }
        }

        let mut best: Vec<ObjectHash> = common.difference(&redundant).copied().collect();
        // Deterministic pick when history has several best ancestors.
        best.sort_by_key(|id| id.to_string());
        Ok(best.into_iter().next())
    }

    /// Resolve a merge source: branch name or commit id.
    async fn resolve_merge_source(&self, source: &str) -> Result<ObjectHash, GitError> {
        let branch_ref = format!("{HEADS_PREFIX}{source}");
        if let Some(tip) = self.refs.read(&branch_ref).await? {
            return Ok(tip);
        }
        ObjectHash::from_str(source)
            .map_err(|_| GitError::NotFound(format!("branch or commit `{source}`")))
    }

    /// Merge `source` into the current branch.
    pub async fn merge(&self, source: &str) -> Result<MergeOutcome, GitError> {
        let theirs_id = self.resolve_merge_source(source).await?;
        if self.merge_head().await?.is_some() {
            return Err(GitError::InvalidArgument(
                "a merge is already in progress".to_string(),
            ));
        }

        let ours_id = match self.refs.resolve_head().await? {
            Some(id) => id,
            // Merging into an unborn branch is a trivial fast-forward;
            // `fast_forward_to` still runs the per-path dirty guard.
            None => {
                self.fast_forward_to(theirs_id, RefExpect::MustNotExist)
                    .await?;
                return Ok(MergeOutcome::FastForward(theirs_id));
            }
        };

        let base_id = self.merge_base(ours_id, theirs_id).await?;
        if base_id == Some(theirs_id) || ours_id == theirs_id {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }
        if base_id == Some(ours_id) {
            self.fast_forward_to(theirs_id, RefExpect::Value(ours_id))
                .await?;
            return Ok(MergeOutcome::FastForward(theirs_id));
        }

        let ours_commit = self.odb.get_commit(ours_id).await?;
        let theirs_commit = self.odb.get_commit(theirs_id).await?;
        let base_flat = match base_id {
            Some(id) => {
                let base_commit = self.odb.get_commit(id).await?;
                self.flatten_tree(base_commit.tree_id).await?
            }
            None => BTreeMap::new(),
        };
        let ours_flat = self.flatten_tree(ours_commit.tree_id).await?;
        let theirs_flat = self.flatten_tree(theirs_commit.tree_id).await?;

        let mut paths: BTreeSet<String> = BTreeSet::new();
        paths.extend(base_flat.keys().cloned());
        paths.extend(ours_flat.keys().cloned());
        paths.extend(theirs_flat.keys().cloned());

        // Merged path → (mode, id); conflicts collected alongside.
        let mut merged: BTreeMap<String, (TreeMode, ObjectHash)> = BTreeMap::new();
        let mut conflicts: Vec<MergeConflict> = Vec::new();
        let mut merged_blobs: HashMap<String, Vec<u8>> = HashMap::new();

        for path in paths {
            self.check_cancelled()?;
            let base = base_flat.get(&path).copied();
            let ours = ours_flat.get(&path).copied();
            let theirs = theirs_flat.get(&path).copied();

            if ours == theirs {
                // Same change on both sides (including both deleted).
                if let Some(side) = ours {
                    merged.insert(path, side);
                }
                continue;
            }
            if ours == base {
                // Only their side changed.
                if let Some(side) = theirs {
                    merged.insert(path, side);
                }
                continue;
            }
            if theirs == base {
                if let Some(side) = ours {
                    merged.insert(path, side);
                }
                continue;
            }

            // True divergence. Blob-vs-blob attempts a line merge; any
            // shape involving a deletion is a structural conflict.
            match (ours, theirs) {
                (Some((ours_mode, ours_blob)), Some((theirs_mode, theirs_blob))) => {
                    let base_text = match base {
                        Some((_, id)) => {
                            String::from_utf8_lossy(&self.odb.get_blob(id).await?.data).to_string()
                        }
                        None => String::new(),
                    };
                    let ours_text =
                        String::from_utf8_lossy(&self.odb.get_blob(ours_blob).await?.data)
                            .to_string();
                    let theirs_text =
                        String::from_utf8_lossy(&self.odb.get_blob(theirs_blob).await?.data)
                            .to_string();

                    let result = merge_lines(&base_text, &ours_text, &theirs_text);
                    // A mode disagreement keeps the non-base side.
                    let mode = if Some(ours_mode) != base.map(|(m, _)| m) {
                        ours_mode
                    } else {
                        theirs_mode
                    };
                    if result.hunks.is_empty() {
                        let id = self.odb.put_raw(ObjectType::Blob, &result.content).await?;
                        merged.insert(path, (mode, id));
                    } else {
                        merged_blobs.insert(path.clone(), result.content);
                        conflicts.push(MergeConflict {
                            path,
                            base,
                            ours,
                            theirs,
                            hunks: result.hunks,
                        });
                    }
                }
                _ => {
                    conflicts.push(MergeConflict {
                        path,
                        base,
                        ours,
                        theirs,
                        hunks: vec![MergeHunk {
                            base_range: (0, 0),
                            ours_range: (0, 0),
                            theirs_range: (0, 0),
                            kind: ConflictKind::DeleteModify,
                        }],
                    });
                }
            }
        }

        // Dirty guard over exactly the paths this merge rewrites: a
        // conflicted path is absent from `merged`, so it shows up as a
        // planned delete whose working copy must still match our side.
        self.ensure_tree_swap_safe(&merged).await?;

        if conflicts.is_empty() {
            return self
                .finish_clean_merge(&merged, ours_id, theirs_id, source)
                .await
                .map(MergeOutcome::Merged);
        }

        self.record_conflicted_merge(&merged, &conflicts, &merged_blobs, ours_id, theirs_id, source)
            .await?;
        Ok(MergeOutcome::Conflicted(conflicts))
    }

    /// Move the branch (or detached `HEAD`) to `target` and materialize
    /// its tree, refusing first if that would clobber unsaved content.
    async fn fast_forward_to(
        &self,
        target: ObjectHash,
        expect: RefExpect,
    ) -> Result<(), GitError> {
        let commit = self.odb.get_commit(target).await?;
        let flat = self.flatten_tree(commit.tree_id).await?;
        self.ensure_tree_swap_safe(&flat).await?;

        match self.refs.head().await? {
            HeadState::Symbolic(branch_ref) => {
                self.refs.update(&branch_ref, expect, Some(target)).await?;
            }
            HeadState::Detached(_) => self.refs.set_head_detached(target).await?,
        }
        self.materialize_tree(&flat).await
    }

    /// Per-path dirty check before a tree swap. Of the paths the swap
    /// would create, modify, or delete, any whose working-tree content
    /// matches neither the current index entry nor the target blob
    /// aborts with `WorkingTreeDirty`. Paths the swap never touches are
    /// never inspected, so unrelated local edits cannot block it.
    async fn ensure_tree_swap_safe(
        &self,
        target: &BTreeMap<String, (TreeMode, ObjectHash)>,
    ) -> Result<(), GitError> {
        let index = self.read_index().await?;
        let current: BTreeMap<String, ObjectHash> = index
            .entries()
            .iter()
            .filter(|e| e.stage == 0)
            .map(|e| (e.path.clone(), e.id))
            .collect();

        let mut planned: Vec<String> = Vec::new();
        for (path, (mode, id)) in target {
            if *mode == TreeMode::Submodule {
                continue;
            }
            if current.get(path) != Some(id) {
                planned.push(path.clone());
            }
        }
        for path in current.keys() {
            if !target.contains_key(path) {
                planned.push(path.clone());
            }
        }

        for path in planned {
            self.check_cancelled()?;
            if let Ok(content) = self.vfs.read_file(&path).await {
                let on_disk =
                    ObjectHash::from_type_and_data(self.kind, ObjectType::Blob, &content);
                let matches_current = current.get(&path) == Some(&on_disk);
                let matches_target = target.get(&path).is_some_and(|(_, id)| *id == on_disk);
                if !matches_current && !matches_target {
                    return Err(GitError::WorkingTreeDirty(path));
                }
            }
        }
        Ok(())
    }

    /// Write the merged tree to worktree + index, then commit with both
    /// parents and advance the branch against our previous tip.
    async fn finish_clean_merge(
        &self,
        merged: &BTreeMap<String, (TreeMode, ObjectHash)>,
        ours_id: ObjectHash,
        theirs_id: ObjectHash,
        source: &str,
    ) -> Result<Commit, GitError> {
        self.materialize_tree(merged).await?;

        let index = self.read_index().await?;
        let tree_id = self.build_tree_from_index(&index).await?;

        let branch = self.current_branch().await?;
        let message = format!(
            "Merge {} into {}",
            source,
            branch.as_deref().unwrap_or("HEAD")
        );
        let author = self.signature(SignatureRole::Author, None, None).await?;
        let committer = self.signature(SignatureRole::Committer, None, None).await?;
        let commit = Commit::new(
            self.kind,
            author,
            committer,
            tree_id,
            vec![ours_id, theirs_id],
            &message,
        )?;
        self.odb
            .put_raw(ObjectType::Commit, &commit.to_data()?)
            .await?;

        match self.refs.head().await? {
            HeadState::Symbolic(branch_ref) => {
                self.refs
                    .update(&branch_ref, RefExpect::Value(ours_id), Some(commit.id))
                    .await?;
            }
            HeadState::Detached(_) => self.refs.set_head_detached(commit.id).await?,
        }
        tracing::debug!(id = %commit.id, "merge commit created");
        Ok(commit)
    }

    /// Leave the repository in the labeled merge-in-progress state:
    /// stage 1/2/3 slots for conflicted paths, marker-annotated files in
    /// the working tree, and `MERGE_HEAD`/`MERGE_MSG`/`ORIG_HEAD`.
    async fn record_conflicted_merge(
        &self,
        merged: &BTreeMap<String, (TreeMode, ObjectHash)>,
        conflicts: &[MergeConflict],
        merged_blobs: &HashMap<String, Vec<u8>>,
        ours_id: ObjectHash,
        theirs_id: ObjectHash,
        source: &str,
    ) -> Result<(), GitError> {
        self.materialize_tree(merged).await?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        for conflict in conflicts {
            let to_entry = |side: Option<(TreeMode, ObjectHash)>| {
                side.map(|(mode, id)| {
                    IndexEntry::new(conflict.path.clone(), mode.to_index_mode(), id)
                })
            };
            index.set_conflict(
                &conflict.path,
                to_entry(conflict.base),
                to_entry(conflict.ours),
                to_entry(conflict.theirs),
            );
            match merged_blobs.get(&conflict.path) {
                Some(content) => self.vfs.write_file(&conflict.path, content).await?,
                // Delete/modify shapes keep the surviving side on disk.
                None => {
                    if let Some((_, id)) = conflict.ours.or(conflict.theirs) {
                        let blob = self.odb.get_blob(id).await?;
                        self.vfs.write_file(&conflict.path, &blob.data).await?;
                    }
                }
            }
        }
        self.write_index(&index).await?;

        self.store
            .put(KEY_ORIG_HEAD, format!("{ours_id}\n").as_bytes())
            .await?;
        self.store
            .put(KEY_MERGE_HEAD, format!("{theirs_id}\n").as_bytes())
            .await?;
        let branch = self.current_branch().await?;
        self.store
            .put(
                KEY_MERGE_MSG,
                format!(
                    "Merge {} into {}\n",
                    source,
                    branch.as_deref().unwrap_or("HEAD")
                )
                .as_bytes(),
            )
            .await?;
        tracing::debug!(conflicts = conflicts.len(), "merge stopped on conflicts");
        Ok(())
    }

    /// Apply a flattened tree to the working tree and rewrite the index
    /// to match. Only paths that differ from their index entry are
    /// touched; unchanged entries keep their cached metadata, so local
    /// edits to untouched files survive. No `HEAD` movement and no
    /// dirty check; callers run `ensure_tree_swap_safe` first wherever
    /// unsaved content could be lost.
    async fn materialize_tree(
        &self,
        flat: &BTreeMap<String, (TreeMode, ObjectHash)>,
    ) -> Result<(), GitError> {
        let _guard = self.index_lock.lock().await;
        let index = self.read_index().await?;
        let mut current: BTreeMap<String, IndexEntry> = BTreeMap::new();
        for entry in index.entries() {
            if entry.stage == 0 {
                current.insert(entry.path.clone(), entry.clone());
            }
        }

        for path in current.keys() {
            if !flat.contains_key(path) {
                self.vfs.unlink(path).await?;
            }
        }

        let mut new_index = Index::new();
        for (path, (mode, id)) in flat {
            if let Some(existing) = current.get(path)
                && existing.id == *id
                && existing.mode == mode.to_index_mode()
            {
                new_index.upsert(existing.clone());
                continue;
            }
            if *mode != TreeMode::Submodule {
                let blob = self.odb.get_blob(*id).await?;
                self.vfs.write_file(path, &blob.data).await?;
            }
            let mut entry = IndexEntry::new(path.clone(), mode.to_index_mode(), *id);
            if let Some(stat) = self.vfs.stat(path).await? {
                entry.ctime = stat.ctime;
                entry.mtime = stat.mtime;
                entry.size = stat.size as u32;
            }
            new_index.upsert(entry);
        }
        self.write_index(&new_index).await
    }

    /// Abandon an in-progress merge: restore index and working tree to
    /// the pre-merge tip and clear the merge state markers.
    pub async fn merge_abort(&self) -> Result<(), GitError> {
        let orig = self
            .store
            .get(KEY_ORIG_HEAD)
            .await?
            .ok_or_else(|| GitError::NotFound("no merge in progress".to_string()))?;
        let orig_id = ObjectHash::from_str(
            String::from_utf8(orig)
                .map_err(|e| GitError::ConversionError(e.to_string()))?
                .trim(),
        )?;

        let commit = self.odb.get_commit(orig_id).await?;
        let flat = self.flatten_tree(commit.tree_id).await?;
        self.materialize_tree(&flat).await?;
        self.clear_merge_state().await?;
        self.store.delete(KEY_ORIG_HEAD).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-sided edits merge cleanly without markers.
    #[test]
    fn one_sided_change_is_clean() {
        let base = "a\nb\nc\n";
        let result = merge_lines(base, "a\nB\nc\n", base);
        assert!(result.hunks.is_empty());
        assert_eq!(result.content, b"a\nB\nc\n");

        let result = merge_lines(base, base, "a\nb\nC\n");
        assert!(result.hunks.is_empty());
        assert_eq!(result.content, b"a\nb\nC\n");
    }

    /// Edits to different regions combine.
    #[test]
    fn disjoint_edits_combine() {
        let base = "one\ntwo\nthree\nfour\nfive\n";
        let ours = "ONE\ntwo\nthree\nfour\nfive\n";
        let theirs = "one\ntwo\nthree\nfour\nFIVE\n";
        let result = merge_lines(base, ours, theirs);
        assert!(result.hunks.is_empty());
        assert_eq!(result.content, b"ONE\ntwo\nthree\nfour\nFIVE\n");
    }

    /// The same edit on both sides collapses to one copy.
    #[test]
    fn identical_edits_collapse() {
        let base = "x\ny\n";
        let both = "x\nY!\n";
        let result = merge_lines(base, both, both);
        assert!(result.hunks.is_empty());
        assert_eq!(result.content, b"x\nY!\n");
    }

    /// Overlapping different edits produce a marker block and a hunk
    /// with the right ranges.
    #[test]
    fn overlap_conflicts() {
        let base = "hello\n";
        let result = merge_lines(base, "hello\nworld\n", "hello\nmars\n");
        assert_eq!(result.hunks.len(), 1);
        let hunk = &result.hunks[0];
        assert_eq!(hunk.kind, ConflictKind::BothAdded);
        assert_eq!(hunk.base_range, (1, 1));
        assert_eq!(hunk.ours_range, (1, 2));
        assert_eq!(hunk.theirs_range, (1, 2));

        let text = String::from_utf8(result.content).unwrap();
        assert!(text.contains("<<<<<<< ours\nworld\n=======\nmars\n>>>>>>> theirs\n"));
        assert!(text.starts_with("hello\n"));
    }

    /// Modified overlapping lines conflict as BothModified.
    #[test]
    fn modified_overlap() {
        let base = "a\nshared\nz\n";
        let result = merge_lines(base, "a\nours version\nz\n", "a\ntheirs version\nz\n");
        assert_eq!(result.hunks.len(), 1);
        assert_eq!(result.hunks[0].kind, ConflictKind::BothModified);
        assert_eq!(result.hunks[0].base_range, (1, 2));
    }

    /// Conflict plus a clean edit elsewhere: only the overlap conflicts.
    #[test]
    fn mixed_clean_and_conflict() {
        let base = "1\n2\n3\n4\n5\n6\n7\n8\n9\n";
        let ours = "1\n2\nOURS\n4\n5\n6\n7\n8\nNINE\n";
        let theirs = "1\n2\nTHEIRS\n4\n5\n6\n7\n8\n9\n";
        let result = merge_lines(base, ours, theirs);
        assert_eq!(result.hunks.len(), 1);
        let text = String::from_utf8(result.content).unwrap();
        assert!(text.ends_with("NINE\n"));
        assert!(text.contains("OURS\n=======\nTHEIRS"));
    }
}
