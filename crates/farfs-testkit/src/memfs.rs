//! An in-memory [`Vfs`] with honest POSIX-flavored edge cases.
//!
//! Paths are absolute and already-normalized: `/`-separated, no empty, `.`
//! or `..` segments. The tree is a flat map from path to node; hard links
//! are map entries sharing one file state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use farfs_vfs::{Vfs, VfsFile};
use farfs_wire::{DirEntry, FileKind, FsError, FsResult, Metadata, OpenOptions};

/// Hop limit when following symlinks.
const MAX_SYMLINK_HOPS: u32 = 8;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct FileState {
    data: Vec<u8>,
    mode: u32,
    uid: u32,
    gid: u32,
    nlink: u32,
    atime_ms: u64,
    mtime_ms: u64,
    ctime_ms: u64,
}

impl FileState {
    fn new(mode: u32) -> Self {
        let now = now_ms();
        FileState {
            data: Vec::new(),
            mode,
            uid: 0,
            gid: 0,
            nlink: 1,
            atime_ms: now,
            mtime_ms: now,
            ctime_ms: now,
        }
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            kind: FileKind::File,
            size: self.data.len() as u64,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            nlink: self.nlink,
            atime_ms: self.atime_ms,
            mtime_ms: self.mtime_ms,
            ctime_ms: self.ctime_ms,
        }
    }
}

enum Node {
    File(Arc<Mutex<FileState>>),
    Dir { mode: u32 },
    Symlink { target: String },
}

impl Node {
    fn kind(&self) -> FileKind {
        match self {
            Node::File(_) => FileKind::File,
            Node::Dir { .. } => FileKind::Directory,
            Node::Symlink { .. } => FileKind::Symlink,
        }
    }
}

/// In-memory filesystem. The root directory `/` always exists.
pub struct MemFs {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(path: &str) -> FsResult<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') {
        return Err(FsError::invalid_path(path));
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(FsError::invalid_path(path));
        }
    }
    Ok(())
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Resolve a symlink target relative to the directory holding the link.
fn join_target(link: &str, target: &str) -> String {
    if target.starts_with('/') {
        target.to_string()
    } else {
        let parent = parent_of(link);
        if parent == "/" {
            format!("/{target}")
        } else {
            format!("{parent}/{target}")
        }
    }
}

impl MemFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir { mode: 0o755 });
        MemFs {
            nodes: Mutex::new(nodes),
        }
    }

    /// Convenience seeding: create the file (and fail if it exists) with the
    /// given content.
    pub async fn put(&self, path: &str, content: &[u8]) -> FsResult<()> {
        let file = self
            .open(path, OpenOptions::write_truncate().with_create_new(true))
            .await?;
        file.write_at(0, content).await?;
        file.close().await
    }

    /// Read a whole file, for assertions.
    pub async fn get(&self, path: &str) -> FsResult<Vec<u8>> {
        let file = self.open(path, OpenOptions::read_only()).await?;
        let meta = VfsFile::stat(&file).await?;
        let data = file.read_at(0, meta.size as u32).await?;
        file.close().await?;
        Ok(data)
    }

    /// Follow symlinks until a non-symlink node (or a missing path) is
    /// reached. Returns the final path; the node may or may not exist there.
    fn resolve(nodes: &BTreeMap<String, Node>, path: &str) -> FsResult<String> {
        let mut current = path.to_string();
        for _ in 0..MAX_SYMLINK_HOPS {
            match nodes.get(&current) {
                Some(Node::Symlink { target }) => {
                    current = join_target(&current, target);
                    validate(&current)?;
                }
                _ => return Ok(current),
            }
        }
        Err(FsError::invalid_path(format!("{path}: symlink loop")))
    }

    fn require_parent_dir(nodes: &BTreeMap<String, Node>, path: &str) -> FsResult<()> {
        let parent = parent_of(path);
        match nodes.get(parent) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(_) => Err(FsError::not_a_directory(parent)),
            None => Err(FsError::not_found(parent)),
        }
    }

    fn children<'a>(
        nodes: &'a BTreeMap<String, Node>,
        dir: &str,
    ) -> impl Iterator<Item = (&'a String, &'a Node)> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        let plen = prefix.len();
        nodes
            .range(prefix.clone()..)
            .take_while(move |(path, _)| path.starts_with(&prefix))
            .filter(move |(path, _)| {
                // Skip the directory itself (root is its own prefix) and
                // anything deeper than one level.
                path.len() > plen && !path[plen..].contains('/')
            })
    }

    fn node_metadata(nodes: &BTreeMap<String, Node>, path: &str) -> FsResult<Metadata> {
        match nodes.get(path) {
            Some(Node::File(state)) => Ok(state.lock().metadata()),
            Some(Node::Dir { mode }) => Ok(Metadata {
                kind: FileKind::Directory,
                size: 0,
                mode: *mode,
                uid: 0,
                gid: 0,
                nlink: 1,
                atime_ms: 0,
                mtime_ms: 0,
                ctime_ms: 0,
            }),
            Some(Node::Symlink { target }) => Ok(Metadata {
                kind: FileKind::Symlink,
                size: target.len() as u64,
                mode: 0o777,
                uid: 0,
                gid: 0,
                nlink: 1,
                atime_ms: 0,
                mtime_ms: 0,
                ctime_ms: 0,
            }),
            None => Err(FsError::not_found(path)),
        }
    }
}

impl Vfs for MemFs {
    type File = MemFile;

    async fn open(&self, path: &str, opts: OpenOptions) -> FsResult<MemFile> {
        validate(path)?;
        let mut nodes = self.nodes.lock();
        let resolved = Self::resolve(&nodes, path)?;

        let state = match nodes.get(&resolved) {
            Some(Node::Dir { .. }) => return Err(FsError::is_a_directory(path)),
            Some(Node::File(state)) => {
                if opts.create_new {
                    return Err(FsError::already_exists(path));
                }
                if opts.truncate && opts.write {
                    let mut file = state.lock();
                    file.data.clear();
                    file.mtime_ms = now_ms();
                }
                state.clone()
            }
            Some(Node::Symlink { .. }) => unreachable!("resolve returned a symlink"),
            None => {
                if !opts.may_create() {
                    return Err(FsError::not_found(path));
                }
                Self::require_parent_dir(&nodes, &resolved)?;
                let state = Arc::new(Mutex::new(FileState::new(opts.mode)));
                nodes.insert(resolved.clone(), Node::File(state.clone()));
                state
            }
        };

        Ok(MemFile {
            path: path.to_string(),
            state,
            readable: opts.read,
            writable: opts.write,
            append: opts.append,
            closed: AtomicBool::new(false),
        })
    }

    async fn stat(&self, path: &str) -> FsResult<Metadata> {
        validate(path)?;
        let nodes = self.nodes.lock();
        let resolved = Self::resolve(&nodes, path)?;
        Self::node_metadata(&nodes, &resolved)
    }

    async fn lstat(&self, path: &str) -> FsResult<Metadata> {
        validate(path)?;
        let nodes = self.nodes.lock();
        Self::node_metadata(&nodes, path)
    }

    async fn exists(&self, path: &str) -> FsResult<bool> {
        validate(path)?;
        let nodes = self.nodes.lock();
        let resolved = Self::resolve(&nodes, path)?;
        Ok(nodes.contains_key(&resolved))
    }

    async fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        validate(path)?;
        let nodes = self.nodes.lock();
        let resolved = Self::resolve(&nodes, path)?;
        match nodes.get(&resolved) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(FsError::not_a_directory(path)),
            None => return Err(FsError::not_found(path)),
        }
        Ok(Self::children(&nodes, &resolved)
            .map(|(child, node)| DirEntry {
                name: child[child.rfind('/').map_or(0, |i| i + 1)..].to_string(),
                kind: node.kind(),
            })
            .collect())
    }

    async fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        validate(path)?;
        if path == "/" {
            return Err(FsError::already_exists(path));
        }
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(path) {
            return Err(FsError::already_exists(path));
        }
        Self::require_parent_dir(&nodes, path)?;
        nodes.insert(path.to_string(), Node::Dir { mode });
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> FsResult<()> {
        validate(path)?;
        if path == "/" {
            return Err(FsError::invalid_argument("cannot remove the root directory"));
        }
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(FsError::not_a_directory(path)),
            None => return Err(FsError::not_found(path)),
        }
        if Self::children(&nodes, path).next().is_some() {
            return Err(FsError::not_empty(path));
        }
        nodes.remove(path);
        Ok(())
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        validate(path)?;
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::Dir { .. }) => return Err(FsError::is_a_directory(path)),
            Some(Node::File(state)) => {
                state.lock().nlink -= 1;
            }
            Some(Node::Symlink { .. }) => {}
            None => return Err(FsError::not_found(path)),
        }
        nodes.remove(path);
        Ok(())
    }

    async fn link(&self, src: &str, dst: &str) -> FsResult<()> {
        validate(src)?;
        validate(dst)?;
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(dst) {
            return Err(FsError::already_exists(dst));
        }
        let resolved = Self::resolve(&nodes, src)?;
        let state = match nodes.get(&resolved) {
            Some(Node::File(state)) => state.clone(),
            Some(_) => return Err(FsError::is_a_directory(src)),
            None => return Err(FsError::not_found(src)),
        };
        Self::require_parent_dir(&nodes, dst)?;
        state.lock().nlink += 1;
        nodes.insert(dst.to_string(), Node::File(state));
        Ok(())
    }

    async fn symlink(&self, target: &str, link: &str) -> FsResult<()> {
        validate(link)?;
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(link) {
            return Err(FsError::already_exists(link));
        }
        Self::require_parent_dir(&nodes, link)?;
        nodes.insert(
            link.to_string(),
            Node::Symlink {
                target: target.to_string(),
            },
        );
        Ok(())
    }

    async fn read_link(&self, path: &str) -> FsResult<String> {
        validate(path)?;
        let nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(FsError::invalid_argument(format!("{path} is not a symlink"))),
            None => Err(FsError::not_found(path)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        validate(from)?;
        validate(to)?;
        if from == "/" || to == "/" {
            return Err(FsError::invalid_argument("cannot rename the root directory"));
        }
        if to == from {
            return Ok(());
        }
        if to.starts_with(&format!("{from}/")) {
            return Err(FsError::invalid_argument(format!(
                "cannot rename {from} into itself"
            )));
        }
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(from) {
            return Err(FsError::not_found(from));
        }
        match nodes.get(to) {
            Some(Node::Dir { .. }) => return Err(FsError::is_a_directory(to)),
            Some(_) => {
                nodes.remove(to);
            }
            None => Self::require_parent_dir(&nodes, to)?,
        }

        // Move the node and, for a directory, its whole subtree.
        let prefix = format!("{from}/");
        let moved: Vec<String> = std::iter::once(from.to_string())
            .chain(
                nodes
                    .range(prefix.clone()..)
                    .take_while(|(path, _)| path.starts_with(&prefix))
                    .map(|(path, _)| path.clone()),
            )
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    async fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        validate(path)?;
        let nodes = self.nodes.lock();
        let resolved = Self::resolve(&nodes, path)?;
        match nodes.get(&resolved) {
            Some(Node::File(state)) => {
                let mut file = state.lock();
                file.data.resize(len as usize, 0);
                file.mtime_ms = now_ms();
                Ok(())
            }
            Some(_) => Err(FsError::is_a_directory(path)),
            None => Err(FsError::not_found(path)),
        }
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        validate(path)?;
        let mut nodes = self.nodes.lock();
        let resolved = Self::resolve(&nodes, path)?;
        match nodes.get_mut(&resolved) {
            Some(Node::File(state)) => {
                state.lock().mode = mode;
                Ok(())
            }
            Some(Node::Dir { mode: dir_mode }) => {
                *dir_mode = mode;
                Ok(())
            }
            Some(Node::Symlink { .. }) => unreachable!("resolve returned a symlink"),
            None => Err(FsError::not_found(path)),
        }
    }

    async fn utimes(&self, path: &str, atime_ms: u64, mtime_ms: u64) -> FsResult<()> {
        validate(path)?;
        let nodes = self.nodes.lock();
        let resolved = Self::resolve(&nodes, path)?;
        match nodes.get(&resolved) {
            Some(Node::File(state)) => {
                let mut file = state.lock();
                file.atime_ms = atime_ms;
                file.mtime_ms = mtime_ms;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(FsError::not_found(path)),
        }
    }

    async fn sync(&self) -> FsResult<()> {
        Ok(())
    }
}

/// An open file in a [`MemFs`]. The access mode requested at open time is
/// enforced: reads need `read`, writes and truncation need `write`.
pub struct MemFile {
    path: String,
    state: Arc<Mutex<FileState>>,
    readable: bool,
    writable: bool,
    append: bool,
    closed: AtomicBool,
}

impl std::fmt::Debug for MemFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFile")
            .field("path", &self.path)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("append", &self.append)
            .field("closed", &self.closed)
            .finish()
    }
}

impl MemFile {
    fn ensure_open(&self) -> FsResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(FsError::handle_closed(&self.path))
        } else {
            Ok(())
        }
    }

    fn ensure_readable(&self) -> FsResult<()> {
        self.ensure_open()?;
        if self.readable {
            Ok(())
        } else {
            Err(FsError::permission_denied(&self.path))
        }
    }

    fn ensure_writable(&self) -> FsResult<()> {
        self.ensure_open()?;
        if self.writable {
            Ok(())
        } else {
            Err(FsError::permission_denied(&self.path))
        }
    }

    fn write_span(&self, state: &FileState, pos: u64) -> usize {
        if self.append {
            state.data.len()
        } else {
            pos as usize
        }
    }
}

impl VfsFile for MemFile {
    async fn read_at(&self, pos: u64, len: u32) -> FsResult<Vec<u8>> {
        self.ensure_readable()?;
        let state = self.state.lock();
        let start = (pos as usize).min(state.data.len());
        let end = (start + len as usize).min(state.data.len());
        Ok(state.data[start..end].to_vec())
    }

    async fn read_vectored_at(&self, pos: u64, lens: &[u32]) -> FsResult<Vec<Vec<u8>>> {
        self.ensure_readable()?;
        let state = self.state.lock();
        let mut out = Vec::with_capacity(lens.len());
        let mut at = pos as usize;
        for len in lens {
            let start = at.min(state.data.len());
            let end = (start + *len as usize).min(state.data.len());
            out.push(state.data[start..end].to_vec());
            at = end;
            if end - start < *len as usize {
                break;
            }
        }
        Ok(out)
    }

    async fn write_at(&self, pos: u64, data: &[u8]) -> FsResult<u64> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        let start = self.write_span(&state, pos);
        let end = start + data.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(data);
        state.mtime_ms = now_ms();
        Ok(data.len() as u64)
    }

    async fn write_vectored_at(&self, pos: u64, bufs: &[Vec<u8>]) -> FsResult<u64> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        let mut at = self.write_span(&state, pos);
        let start = at;
        for buf in bufs {
            let end = at + buf.len();
            if state.data.len() < end {
                state.data.resize(end, 0);
            }
            state.data[at..end].copy_from_slice(buf);
            at = end;
        }
        state.mtime_ms = now_ms();
        Ok((at - start) as u64)
    }

    async fn truncate(&self, len: u64) -> FsResult<()> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        state.data.resize(len as usize, 0);
        state.mtime_ms = now_ms();
        Ok(())
    }

    async fn sync(&self) -> FsResult<()> {
        self.ensure_open()
    }

    async fn datasync(&self) -> FsResult<()> {
        self.ensure_open()
    }

    async fn chmod(&self, mode: u32) -> FsResult<()> {
        self.ensure_open()?;
        self.state.lock().mode = mode;
        Ok(())
    }

    async fn chown(&self, uid: u32, gid: u32) -> FsResult<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        state.uid = uid;
        state.gid = gid;
        Ok(())
    }

    async fn utimes(&self, atime_ms: u64, mtime_ms: u64) -> FsResult<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        state.atime_ms = atime_ms;
        state.mtime_ms = mtime_ms;
        Ok(())
    }

    async fn stat(&self) -> FsResult<Metadata> {
        self.ensure_open()?;
        Ok(self.state.lock().metadata())
    }

    async fn close(&self) -> FsResult<()> {
        self.ensure_open()?;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
