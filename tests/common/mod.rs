//! In-process smart-HTTP Git server used by the sync integration tests.
//! It keeps its own object database and refs over a `MemoryStore` and
//! answers discovery, upload-pack, and receive-pack requests with the
//! same pkt-line and pack codecs the client uses.

use std::collections::{HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;

use git_embed::{
    GitError, HashKind, ObjectHash,
    internal::object::{
        GitObject, ObjectTrait,
        blob::Blob,
        commit::Commit,
        signature::{Signature, SignatureRole},
        tree::{Tree, TreeEntry, TreeMode},
        types::ObjectType,
    },
    odb::ObjectDatabase,
    protocol::{HttpRequest, HttpResponse, HttpTransport},
    refs::{RefExpect, RefStore},
    store::MemoryStore,
};

const CAPS: &str = "multi_ack multi_ack_detailed side-band-64k thin-pack ofs-delta shallow \
                    no-progress report-status delete-refs agent=mock-server/1 object-format=sha1";

pub struct MockGitServer {
    pub odb: Arc<ObjectDatabase>,
    pub refs: RefStore,
}

fn write_pkt(out: &mut BytesMut, text: &str) {
    let length = text.len() + 4;
    out.extend_from_slice(format!("{length:04x}").as_bytes());
    out.extend_from_slice(text.as_bytes());
}

fn write_pkt_raw(out: &mut BytesMut, payload: &[u8]) {
    let length = payload.len() + 4;
    out.extend_from_slice(format!("{length:04x}").as_bytes());
    out.extend_from_slice(payload);
}

fn write_flush(out: &mut BytesMut) {
    out.extend_from_slice(b"0000");
}

/// Read one pkt-line; `None` for flush or exhausted input.
fn read_pkt(bytes: &mut Bytes) -> Option<Bytes> {
    use bytes::Buf;
    if bytes.len() < 4 {
        return None;
    }
    let prefix = bytes.copy_to_bytes(4);
    let len = usize::from_str_radix(core::str::from_utf8(&prefix).ok()?, 16).ok()?;
    if len < 4 {
        return None;
    }
    Some(bytes.copy_to_bytes(len - 4))
}

impl MockGitServer {
    pub fn new() -> MockGitServer {
        let store = Arc::new(MemoryStore::new());
        MockGitServer {
            odb: Arc::new(ObjectDatabase::new(store.clone(), HashKind::Sha1, 256, 64)),
            refs: RefStore::new(store),
        }
    }

    /// Store one commit holding the given files on `branch`.
    pub async fn seed_commit(
        &self,
        branch: &str,
        files: &[(&str, &[u8])],
        parents: Vec<ObjectHash>,
        message: &str,
    ) -> ObjectHash {
        let mut entries = Vec::new();
        for (path, content) in files {
            let blob = Blob::from_content(HashKind::Sha1, content);
            self.odb.put_raw(ObjectType::Blob, &blob.data).await.unwrap();
            entries.push(TreeEntry::new(TreeMode::Normal, blob.id, path.to_string()));
        }
        let tree = Tree::from_entries(HashKind::Sha1, entries).unwrap();
        self.odb
            .put_raw(ObjectType::Tree, &tree.to_data().unwrap())
            .await
            .unwrap();

        let signature = |role| {
            Signature::new(role, "Server".to_string(), "s@rv".to_string(), 1700000000, 0)
        };
        let commit = Commit::new(
            HashKind::Sha1,
            signature(SignatureRole::Author),
            signature(SignatureRole::Committer),
            tree.id,
            parents,
            message,
        )
        .unwrap();
        self.odb
            .put_raw(ObjectType::Commit, &commit.to_data().unwrap())
            .await
            .unwrap();

        self.refs
            .update(
                &format!("refs/heads/{branch}"),
                RefExpect::Any,
                Some(commit.id),
            )
            .await
            .unwrap();
        commit.id
    }

    pub async fn branch_tip(&self, branch: &str) -> Option<ObjectHash> {
        self.refs
            .read(&format!("refs/heads/{branch}"))
            .await
            .unwrap()
    }

    /// Objects reachable from `tips`, stopping at `stop` ids and at
    /// `depth` commits when given.
    async fn reachable(
        &self,
        tips: &[ObjectHash],
        stop: &HashSet<ObjectHash>,
        depth: Option<u32>,
    ) -> (Vec<ObjectHash>, Vec<ObjectHash>) {
        let mut out = Vec::new();
        let mut shallow = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<(ObjectHash, u32)> =
            tips.iter().map(|id| (*id, 1)).collect();

        while let Some((id, commit_depth)) = queue.pop_front() {
            if stop.contains(&id) || !seen.insert(id) {
                continue;
            }
            match self.odb.get_object(id).await {
                Ok(GitObject::Commit(commit)) => {
                    out.push(id);
                    let mut trees = vec![commit.tree_id];
                    while let Some(tree_id) = trees.pop() {
                        if !seen.insert(tree_id) {
                            continue;
                        }
                        out.push(tree_id);
                        let tree = match self.odb.get_object(tree_id).await {
                            Ok(GitObject::Tree(tree)) => tree,
                            _ => continue,
                        };
                        for entry in &tree.entries {
                            if entry.is_tree() {
                                trees.push(entry.id);
                            } else if seen.insert(entry.id) {
                                out.push(entry.id);
                            }
                        }
                    }
                    let at_limit = depth.is_some_and(|limit| commit_depth >= limit);
                    if at_limit && !commit.parent_ids.is_empty() {
                        shallow.push(id);
                    } else {
                        for parent in commit.parent_ids {
                            queue.push_back((parent, commit_depth + 1));
                        }
                    }
                }
                Ok(_) | Err(_) => {}
            }
        }
        (out, shallow)
    }

    async fn advertisement(&self, service: &str) -> Vec<u8> {
        let mut body = BytesMut::new();
        write_pkt(&mut body, &format!("# service={service}\n"));
        write_flush(&mut body);

        let heads = self.refs.list("refs/heads/").await.unwrap();
        let head_tip = heads
            .iter()
            .find(|(name, _)| name == "refs/heads/main")
            .or_else(|| heads.first())
            .map(|(_, id)| *id);

        let mut first = true;
        let mut emit = |name: &str, id: ObjectHash, body: &mut BytesMut| {
            if first {
                write_pkt_raw(body, format!("{id} {name}\0{CAPS}\n").as_bytes());
                first = false;
            } else {
                write_pkt(body, &format!("{id} {name}\n"));
            }
        };

        if heads.is_empty() {
            let zero = ObjectHash::zero(HashKind::Sha1);
            write_pkt_raw(&mut body, format!("{zero} capabilities^{{}}\0{CAPS}\n").as_bytes());
        } else {
            if let Some(tip) = head_tip {
                emit("HEAD", tip, &mut body);
            }
            for (name, id) in &heads {
                emit(name, *id, &mut body);
            }
        }
        write_flush(&mut body);
        body.to_vec()
    }

    async fn upload_pack(&self, mut body: Bytes) -> Vec<u8> {
        let mut wants = Vec::new();
        let mut haves = Vec::new();
        let mut depth = None;
        while !body.is_empty() {
            // A flush separates the want section from the haves.
            let Some(line) = read_pkt(&mut body) else {
                continue;
            };
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end();
            if let Some(rest) = text.strip_prefix("want ") {
                let hex = rest.split(' ').next().unwrap_or(rest);
                wants.push(ObjectHash::from_str(hex).unwrap());
            } else if let Some(rest) = text.strip_prefix("have ") {
                haves.push(ObjectHash::from_str(rest).unwrap());
            } else if let Some(rest) = text.strip_prefix("deepen ") {
                depth = rest.parse::<u32>().ok();
            } else if text == "done" {
                break;
            }
        }

        // Common base: every have we actually hold, expanded to its
        // reachable objects so the pack stays incremental.
        let mut stop = HashSet::new();
        for have in &haves {
            if self.odb.has(*have).await.unwrap() {
                let (reachable, _) = self.reachable(&[*have], &HashSet::new(), None).await;
                stop.extend(reachable);
            }
        }

        let (ids, shallow) = self.reachable(&wants, &stop, depth).await;
        let cancel = CancellationToken::new();
        let pack = self.odb.export_pack(&ids, false, &cancel).await.unwrap();

        let mut out = BytesMut::new();
        for id in shallow {
            write_pkt(&mut out, &format!("shallow {id}\n"));
        }
        write_pkt(&mut out, "NAK\n");
        // side-band-64k framing, 8k payload chunks.
        for chunk in pack.chunks(8192) {
            let mut frame = vec![1u8];
            frame.extend_from_slice(chunk);
            write_pkt_raw(&mut out, &frame);
        }
        let mut progress = vec![2u8];
        progress.extend_from_slice(b"counting objects done\n");
        write_pkt_raw(&mut out, &progress);
        write_flush(&mut out);
        out.to_vec()
    }

    async fn receive_pack(&self, mut body: Bytes) -> Vec<u8> {
        let mut commands: Vec<(ObjectHash, ObjectHash, String)> = Vec::new();
        loop {
            let Some(line) = read_pkt(&mut body) else {
                break;
            };
            let stripped: &[u8] = match line.iter().position(|b| *b == 0) {
                Some(nul) => &line[..nul],
                None => &line,
            };
            let text = String::from_utf8_lossy(stripped);
            let text = text.trim_end();
            let mut words = text.split(' ');
            let old = ObjectHash::from_str(words.next().unwrap()).unwrap();
            let new = ObjectHash::from_str(words.next().unwrap()).unwrap();
            let name = words.next().unwrap().to_string();
            commands.push((old, new, name));
        }

        // Remainder is the inline pack.
        let cancel = CancellationToken::new();
        let unpack_ok = if body.is_empty() {
            true
        } else {
            self.odb.ingest_pack(&body, &cancel).await.is_ok()
        };

        let mut out = BytesMut::new();
        if unpack_ok {
            write_pkt(&mut out, "unpack ok\n");
        } else {
            write_pkt(&mut out, "unpack error\n");
        }
        for (old, new, name) in commands {
            let current = self.refs.read(&name).await.unwrap();
            let expected_old = if old.is_zero() { None } else { Some(old) };
            if current != expected_old {
                write_pkt(&mut out, &format!("ng {name} fetch-first\n"));
                continue;
            }
            let update = if new.is_zero() { None } else { Some(new) };
            self.refs
                .update(&name, RefExpect::Any, update)
                .await
                .unwrap();
            write_pkt(&mut out, &format!("ok {name}\n"));
        }
        write_flush(&mut out);
        out.to_vec()
    }
}

#[async_trait]
impl HttpTransport for MockGitServer {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GitError> {
        let url = &request.url;
        let (body, content_type) = if url.contains("/info/refs?service=git-upload-pack") {
            (
                self.advertisement("git-upload-pack").await,
                "application/x-git-upload-pack-advertisement",
            )
        } else if url.contains("/info/refs?service=git-receive-pack") {
            (
                self.advertisement("git-receive-pack").await,
                "application/x-git-receive-pack-advertisement",
            )
        } else if url.ends_with("/git-upload-pack") {
            (
                self.upload_pack(request.body.unwrap_or_default()).await,
                "application/x-git-upload-pack-result",
            )
        } else if url.ends_with("/git-receive-pack") {
            (
                self.receive_pack(request.body.unwrap_or_default()).await,
                "application/x-git-receive-pack-result",
            )
        } else {
            return Ok(HttpResponse {
                status: 404,
                headers: vec![],
                body: git_embed::protocol::http::body_from_bytes(Bytes::new()),
            });
        };

        Ok(HttpResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: git_embed::protocol::http::body_from_bytes(Bytes::from(body)),
        })
    }
}
