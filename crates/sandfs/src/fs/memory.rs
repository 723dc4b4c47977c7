//! In-memory filesystem implementation

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::SystemTime;
use url::Url;

use super::attributes::{
    self, AttributeMap, AttributeSnapshot, AttributeValue, AttributeView, FileAttribute,
    NodeAttributes, NodeType, Permissions,
};
use super::channel::{MemoryChannel, SeekableChannel};
use super::stream::{DirectoryStream, EntryFilter};
use super::traits::{
    AccessMode, CopyOption, FileSystemProvider, LinkOption, OpenOption, follows_links,
};
use crate::config::{Configuration, OsFlavor};
use crate::error::{Error, Result, fs_errors};
use crate::path::{PathSyntax, VfsPath};

/// URI scheme of in-memory filesystems.
pub const URI_SCHEME: &str = "sandfs";

/// Maximum number of symbolic links followed while resolving one path.
const MAX_SYMLINK_DEPTH: usize = 40;

type NodeId = u64;

/// Content and attributes of one node, shared with open channels.
#[derive(Debug)]
pub(crate) struct NodeData {
    pub content: Vec<u8>,
    pub attrs: NodeAttributes,
}

struct Node {
    kind: NodeKind,
    data: Arc<RwLock<NodeData>>,
    links: u64,
}

enum NodeKind {
    File,
    Directory(Directory),
    Symlink(VfsPath),
}

struct Directory {
    /// Roots are their own parent.
    parent: NodeId,
    name: String,
    root: Option<String>,
    /// Lookup key -> entry.
    entries: BTreeMap<String, Entry>,
}

impl Directory {
    fn new(parent: NodeId, name: &str) -> Self {
        Self {
            parent,
            name: name.to_string(),
            root: None,
            entries: BTreeMap::new(),
        }
    }
}

struct Entry {
    /// Name as created.
    name: String,
    node: NodeId,
}

/// Outcome of walking a path: the directory holding the final name, the name
/// (`None` for roots, `.` and `..`) and the node it names, if any.
struct Step {
    parent: NodeId,
    name: Option<String>,
    node: Option<NodeId>,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    roots: HashMap<String, NodeId>,
    next_id: NodeId,
}

impl Tree {
    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[&id]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).unwrap()
    }

    fn dir(&self, id: NodeId) -> Option<&Directory> {
        match &self.node(id).kind {
            NodeKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    fn dir_mut(&mut self, id: NodeId) -> Option<&mut Directory> {
        match &mut self.node_mut(id).kind {
            NodeKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    fn link_target(&self, id: NodeId) -> Option<&VfsPath> {
        match &self.node(id).kind {
            NodeKind::Symlink(target) => Some(target),
            _ => None,
        }
    }

    fn node_type(&self, id: NodeId) -> NodeType {
        match self.node(id).kind {
            NodeKind::File => NodeType::File,
            NodeKind::Directory(_) => NodeType::Directory,
            NodeKind::Symlink(_) => NodeType::Symlink,
        }
    }

    fn insert(&mut self, kind: NodeKind, attrs: NodeAttributes, content: Vec<u8>) -> NodeId {
        self.next_id += 1;
        let id = self.next_id;
        let data = Arc::new(RwLock::new(NodeData { content, attrs }));
        self.nodes.insert(
            id,
            Node {
                kind,
                data,
                links: 0,
            },
        );
        id
    }

    fn touch(&self, id: NodeId) {
        self.node(id).data.write().unwrap().attrs.modified = SystemTime::now();
    }

    /// Add an entry without changing the node's link count.
    fn attach(&mut self, dir: NodeId, key: String, name: String, id: NodeId) {
        if let Some(d) = self.dir_mut(dir) {
            d.entries.insert(key, Entry { name, node: id });
        }
        self.touch(dir);
    }

    fn link(&mut self, dir: NodeId, key: String, name: String, id: NodeId) {
        self.attach(dir, key, name, id);
        self.node_mut(id).links += 1;
    }

    fn unlink(&mut self, dir: NodeId, key: &str) -> Option<NodeId> {
        let id = self.dir_mut(dir)?.entries.remove(key)?.node;
        self.touch(dir);
        Some(id)
    }

    /// Drop one link; the node goes away with its last link.
    fn release(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.links = node.links.saturating_sub(1);
        if node.links == 0 {
            self.nodes.remove(&id);
        }
    }

    fn entry_name(&self, dir: NodeId, key: &str) -> Option<String> {
        self.dir(dir)?.entries.get(key).map(|e| e.name.clone())
    }

    /// Absolute path of a directory node.
    fn path_of(&self, mut id: NodeId, syntax: PathSyntax) -> VfsPath {
        let mut names = Vec::new();
        while let Some(dir) = self.dir(id) {
            if let Some(root) = &dir.root {
                names.reverse();
                return VfsPath::from_parts(syntax, Some(root.clone()), names);
            }
            names.push(dir.name.clone());
            id = dir.parent;
        }
        names.reverse();
        VfsPath::from_parts(syntax, None, names)
    }

    /// True if `id` is `ancestor` or lies beneath it.
    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.dir(id) {
                Some(dir) if dir.root.is_none() => id = dir.parent,
                _ => return false,
            }
        }
    }
}

struct Inner {
    name: String,
    flavor: OsFlavor,
    syntax: PathSyntax,
    views: BTreeSet<AttributeView>,
    working_directory: VfsPath,
    default_permissions: Permissions,
    default_owner: String,
    default_group: String,
    max_file_size: u64,
    tree: RwLock<Tree>,
    closed: AtomicBool,
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn key(&self, name: &str) -> String {
        if self.flavor.case_insensitive() {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    fn to_absolute(&self, path: &VfsPath) -> VfsPath {
        if path.is_absolute() {
            path.clone()
        } else {
            self.working_directory.join(path)
        }
    }

    fn default_attrs(&self) -> NodeAttributes {
        NodeAttributes::new(
            self.default_permissions,
            &self.default_owner,
            &self.default_group,
        )
    }

    fn initial_attrs(&self, attrs: &[FileAttribute]) -> Result<NodeAttributes> {
        let mut out = self.default_attrs();
        for attr in attrs {
            attributes::set(&attr.name, &attr.value, &self.views, &mut out, true)?;
        }
        Ok(out)
    }

    fn child(&self, tree: &Tree, dir: NodeId, name: &str) -> Option<NodeId> {
        match name {
            "." => Some(dir),
            ".." => tree.dir(dir).map(|d| d.parent),
            _ => tree
                .dir(dir)?
                .entries
                .get(&self.key(name))
                .map(|e| e.node),
        }
    }

    fn walk(&self, tree: &Tree, path: &VfsPath, follow_final: bool, depth: usize) -> Result<Step> {
        let path = self.to_absolute(path);
        let root = path.root().unwrap_or_default();
        let mut dir = *tree
            .roots
            .get(&self.key(root))
            .ok_or_else(|| fs_errors::not_found(&path))?;

        let Some((last, init)) = path.names().split_last() else {
            return Ok(Step {
                parent: dir,
                name: None,
                node: Some(dir),
            });
        };

        for name in init {
            let id = self
                .child(tree, dir, name)
                .ok_or_else(|| fs_errors::not_found(&path))?;
            let id = if tree.link_target(id).is_some() {
                self.follow(tree, dir, id, depth)?
                    .node
                    .ok_or_else(|| fs_errors::not_found(&path))?
            } else {
                id
            };
            if tree.dir(id).is_none() {
                return Err(fs_errors::not_a_directory(&path));
            }
            dir = id;
        }

        let node = self.child(tree, dir, last);
        if let Some(id) = node {
            if follow_final && tree.link_target(id).is_some() {
                return self.follow(tree, dir, id, depth);
            }
        }
        let name = (last != "." && last != "..").then(|| last.clone());
        Ok(Step {
            parent: dir,
            name,
            node,
        })
    }

    fn follow(&self, tree: &Tree, link_dir: NodeId, link: NodeId, depth: usize) -> Result<Step> {
        let Some(target) = tree.link_target(link) else {
            return Ok(Step {
                parent: link_dir,
                name: None,
                node: Some(link),
            });
        };
        if depth >= MAX_SYMLINK_DEPTH {
            return Err(fs_errors::too_many_links(target));
        }
        let base = tree.path_of(link_dir, self.syntax);
        self.walk(tree, &base.join(target), true, depth + 1)
    }

    fn lookup(&self, tree: &Tree, path: &VfsPath, follow: bool) -> Result<NodeId> {
        self.walk(tree, path, follow, 0)?
            .node
            .ok_or_else(|| fs_errors::not_found(path))
    }

    /// Create a node at the position described by `step`.
    fn create_at(
        &self,
        tree: &mut Tree,
        step: Step,
        path: &VfsPath,
        attrs: &[FileAttribute],
        make: impl FnOnce(NodeId, &str) -> NodeKind,
    ) -> Result<NodeId> {
        if step.node.is_some() {
            return Err(fs_errors::already_exists(path));
        }
        let name = step.name.ok_or_else(|| fs_errors::already_exists(path))?;
        let attrs = self.initial_attrs(attrs)?;
        let id = tree.insert(make(step.parent, &name), attrs, Vec::new());
        tree.link(step.parent, self.key(&name), name, id);
        Ok(id)
    }

    fn create_directories(&self, tree: &mut Tree, path: &VfsPath) -> Result<()> {
        let names = path.names();
        for i in 1..=names.len() {
            let prefix = VfsPath::from_parts(
                self.syntax,
                path.root().map(str::to_string),
                names[..i].to_vec(),
            );
            let step = self.walk(tree, &prefix, true, 0)?;
            match step.node {
                Some(id) if tree.dir(id).is_some() => {}
                Some(_) => return Err(fs_errors::not_a_directory(&prefix)),
                None => {
                    self.create_at(tree, step, &prefix, &[], |parent, name| {
                        NodeKind::Directory(Directory::new(parent, name))
                    })?;
                }
            }
        }
        Ok(())
    }

    fn remove_entry(&self, tree: &mut Tree, parent: NodeId, name: &str, id: NodeId) {
        tree.unlink(parent, &self.key(name));
        tree.release(id);
    }

    /// Make room for a copy or move target; returns the target name.
    fn prepare_target(
        &self,
        tree: &mut Tree,
        dst: &Step,
        target: &VfsPath,
        replace: bool,
    ) -> Result<String> {
        let Some(name) = dst.name.clone() else {
            return Err(fs_errors::already_exists(target));
        };
        if let Some(existing) = dst.node {
            if !replace {
                return Err(fs_errors::already_exists(target));
            }
            if tree.dir(existing).is_some_and(|d| !d.entries.is_empty()) {
                return Err(fs_errors::directory_not_empty(target));
            }
            self.remove_entry(tree, dst.parent, &name, existing);
        }
        Ok(name)
    }

    fn check_access(&self, path: &VfsPath) -> Result<()> {
        self.ensure_open()?;
        let tree = self.tree.read().unwrap();
        self.lookup(&tree, path, true).map(|_| ())
    }

    fn create_directory(&self, dir: &VfsPath, attrs: &[FileAttribute]) -> Result<()> {
        self.ensure_open()?;
        let mut tree = self.tree.write().unwrap();
        let step = self.walk(&tree, dir, false, 0)?;
        self.create_at(&mut tree, step, dir, attrs, |parent, name| {
            NodeKind::Directory(Directory::new(parent, name))
        })?;
        Ok(())
    }

    fn delete(&self, path: &VfsPath) -> Result<()> {
        self.ensure_open()?;
        let mut tree = self.tree.write().unwrap();
        let step = self.walk(&tree, path, false, 0)?;
        let id = step.node.ok_or_else(|| fs_errors::not_found(path))?;
        let Some(name) = step.name else {
            return Err(fs_errors::invalid_input(path, "cannot delete this directory"));
        };
        if tree.dir(id).is_some_and(|d| !d.entries.is_empty()) {
            return Err(fs_errors::directory_not_empty(path));
        }
        self.remove_entry(&mut tree, step.parent, &name, id);
        Ok(())
    }

    fn copy(&self, source: &VfsPath, target: &VfsPath, options: &[CopyOption]) -> Result<()> {
        self.ensure_open()?;
        let follow = !options.contains(&CopyOption::NoFollowLinks);
        let replace = options.contains(&CopyOption::ReplaceExisting);
        let mut tree = self.tree.write().unwrap();

        let src = self.lookup(&tree, source, follow)?;
        let dst = self.walk(&tree, target, false, 0)?;
        if dst.node == Some(src) {
            return Ok(());
        }
        let name = self.prepare_target(&mut tree, &dst, target, replace)?;

        let src_data = Arc::clone(&tree.node(src).data);
        let src_data = src_data.read().unwrap();
        let (kind, content) = match &tree.node(src).kind {
            NodeKind::File => (NodeKind::File, src_data.content.clone()),
            NodeKind::Directory(_) => (
                NodeKind::Directory(Directory::new(dst.parent, &name)),
                Vec::new(),
            ),
            NodeKind::Symlink(t) => (NodeKind::Symlink(t.clone()), Vec::new()),
        };
        let mut attrs = self.default_attrs();
        if options.contains(&CopyOption::CopyAttributes) {
            attrs.copy_from(&src_data.attrs);
        }
        drop(src_data);

        let id = tree.insert(kind, attrs, content);
        tree.link(dst.parent, self.key(&name), name, id);
        Ok(())
    }

    fn move_path(&self, source: &VfsPath, target: &VfsPath, options: &[CopyOption]) -> Result<()> {
        self.ensure_open()?;
        let replace = options.contains(&CopyOption::ReplaceExisting);
        let mut tree = self.tree.write().unwrap();

        let src = self.walk(&tree, source, false, 0)?;
        let id = src.node.ok_or_else(|| fs_errors::not_found(source))?;
        let Some(src_name) = src.name.clone() else {
            return Err(fs_errors::invalid_input(source, "cannot move this directory"));
        };
        let dst = self.walk(&tree, target, false, 0)?;

        if dst.node == Some(id) {
            // Same entry; a case-only rename still updates the stored spelling.
            if let (Some(name), true) = (dst.name.clone(), dst.parent == src.parent) {
                let key = self.key(&name);
                if let Some(entry) = tree
                    .dir_mut(src.parent)
                    .and_then(|d| d.entries.get_mut(&key))
                {
                    entry.name = name.clone();
                }
                if let Some(dir) = tree.dir_mut(id) {
                    dir.name = name;
                }
            }
            return Ok(());
        }
        if tree.dir(id).is_some() && tree.is_ancestor(id, dst.parent) {
            return Err(fs_errors::invalid_input(
                target,
                "cannot move a directory into itself",
            ));
        }

        let name = self.prepare_target(&mut tree, &dst, target, replace)?;
        tree.unlink(src.parent, &self.key(&src_name));
        tree.attach(dst.parent, self.key(&name), name.clone(), id);
        if let Some(dir) = tree.dir_mut(id) {
            dir.parent = dst.parent;
            dir.name = name;
        }
        Ok(())
    }

    fn open(
        self: &Arc<Self>,
        path: &VfsPath,
        options: &[OpenOption],
        attrs: &[FileAttribute],
        delete_on_close: bool,
    ) -> Result<Box<dyn SeekableChannel>> {
        self.ensure_open()?;
        let has = |o: OpenOption| options.contains(&o);
        let append = has(OpenOption::Append);
        let write = has(OpenOption::Write) || append;
        let read = has(OpenOption::Read) || !write;
        if has(OpenOption::Read) && append {
            return Err(Error::invalid_argument("READ + APPEND not allowed"));
        }
        if append && has(OpenOption::TruncateExisting) {
            return Err(Error::invalid_argument(
                "APPEND + TRUNCATE_EXISTING not allowed",
            ));
        }
        let create_new = write && has(OpenOption::CreateNew);
        let create = write && (has(OpenOption::Create) || create_new);

        let mut tree = self.tree.write().unwrap();
        let step = self.walk(&tree, path, !has(OpenOption::NoFollowLinks), 0)?;
        let node = step.node;
        let id = match node {
            Some(id) => {
                if create_new {
                    return Err(fs_errors::already_exists(path));
                }
                match tree.node_type(id) {
                    NodeType::Directory => return Err(fs_errors::is_a_directory(path)),
                    NodeType::Symlink => {
                        return Err(fs_errors::invalid_input(path, "is a symbolic link"));
                    }
                    NodeType::File => {}
                }
                if write && has(OpenOption::TruncateExisting) {
                    let mut data = tree.node(id).data.write().unwrap();
                    data.content.clear();
                    data.attrs.modified = SystemTime::now();
                }
                id
            }
            None if create => self.create_at(&mut tree, step, path, attrs, |_, _| NodeKind::File)?,
            None => return Err(fs_errors::not_found(path)),
        };

        let data = Arc::clone(&tree.node(id).data);
        drop(tree);

        let mut channel =
            MemoryChannel::new(data, read, write, append).max_size(self.max_file_size);
        if delete_on_close {
            let engine: Weak<Inner> = Arc::downgrade(self);
            let target = self.to_absolute(path);
            channel = channel.on_close(Box::new(move || {
                if let Some(engine) = engine.upgrade() {
                    if let Err(_err) = engine.delete(&target) {
                        #[cfg(feature = "logging")]
                        tracing::warn!(path = %target, error = %_err, "delete on close failed");
                    }
                }
            }));
        }
        Ok(Box::new(channel))
    }

    fn directory_stream(&self, dir: &VfsPath, filter: EntryFilter) -> Result<DirectoryStream> {
        self.ensure_open()?;
        let tree = self.tree.read().unwrap();
        let id = self.lookup(&tree, dir, true)?;
        let Some(d) = tree.dir(id) else {
            return Err(fs_errors::not_a_directory(dir));
        };
        let entries = d.entries.values().map(|e| dir.join_name(&e.name)).collect();
        Ok(DirectoryStream::new(entries, filter))
    }

    fn create_link(&self, link: &VfsPath, existing: &VfsPath) -> Result<()> {
        self.ensure_open()?;
        let mut tree = self.tree.write().unwrap();
        let id = self.lookup(&tree, existing, false)?;
        if tree.node_type(id) != NodeType::File {
            return Err(fs_errors::invalid_input(
                existing,
                "hard links require a regular file",
            ));
        }
        let step = self.walk(&tree, link, false, 0)?;
        if step.node.is_some() {
            return Err(fs_errors::already_exists(link));
        }
        let name = step.name.ok_or_else(|| fs_errors::already_exists(link))?;
        tree.link(step.parent, self.key(&name), name, id);
        Ok(())
    }

    fn create_symbolic_link(
        &self,
        link: &VfsPath,
        target: &VfsPath,
        attrs: &[FileAttribute],
    ) -> Result<()> {
        self.ensure_open()?;
        let mut tree = self.tree.write().unwrap();
        let step = self.walk(&tree, link, false, 0)?;
        self.create_at(&mut tree, step, link, attrs, |_, _| {
            NodeKind::Symlink(target.clone())
        })?;
        Ok(())
    }

    fn read_symbolic_link(&self, link: &VfsPath) -> Result<VfsPath> {
        self.ensure_open()?;
        let tree = self.tree.read().unwrap();
        let id = self.lookup(&tree, link, false)?;
        tree.link_target(id)
            .cloned()
            .ok_or_else(|| fs_errors::not_a_link(link))
    }

    fn read_attributes(
        &self,
        path: &VfsPath,
        spec: &str,
        options: &[LinkOption],
    ) -> Result<AttributeMap> {
        self.ensure_open()?;
        let tree = self.tree.read().unwrap();
        let id = self.lookup(&tree, path, follows_links(options))?;
        let node = tree.node(id);
        let data = node.data.read().unwrap();
        let size = match &node.kind {
            NodeKind::File => data.content.len() as u64,
            NodeKind::Directory(_) => 0,
            NodeKind::Symlink(target) => target.to_string().len() as u64,
        };
        let snapshot = AttributeSnapshot {
            node_type: tree.node_type(id),
            size,
            file_key: id,
            links: node.links,
            attrs: &data.attrs,
        };
        attributes::read(spec, &self.views, &snapshot)
    }

    fn set_attribute(
        &self,
        path: &VfsPath,
        spec: &str,
        value: &AttributeValue,
        options: &[LinkOption],
    ) -> Result<()> {
        self.ensure_open()?;
        let tree = self.tree.read().unwrap();
        let id = self.lookup(&tree, path, follows_links(options))?;
        let mut data = tree.node(id).data.write().unwrap();
        attributes::set(spec, value, &self.views, &mut data.attrs, false)
    }

    fn to_real_path(&self, path: &VfsPath, options: &[LinkOption]) -> Result<VfsPath> {
        self.ensure_open()?;
        let tree = self.tree.read().unwrap();
        let step = self.walk(&tree, path, follows_links(options), 0)?;
        let id = step.node.ok_or_else(|| fs_errors::not_found(path))?;
        if tree.dir(id).is_some() {
            return Ok(tree.path_of(id, self.syntax));
        }
        let name = step
            .name
            .and_then(|n| tree.entry_name(step.parent, &self.key(&n)))
            .ok_or_else(|| fs_errors::not_found(path))?;
        Ok(tree.path_of(step.parent, self.syntax).join_name(&name))
    }
}

/// In-memory filesystem engine.
///
/// Stores directories, files and links in a node table guarded by a single
/// lock. File contents are shared with open channels, so reading and writing
/// through a channel never takes the tree lock.
///
/// # Example
///
/// ```rust
/// use sandfs::{Configuration, FileSystemProvider, MemoryFs};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sandfs::Result<()> {
/// let fs = MemoryFs::new(Configuration::unix())?;
/// let dir = fs.parse_path("/work/data")?;
/// fs.create_directory(&dir, &[]).await?;
/// assert_eq!(fs.new_directory_stream(&fs.parse_path("/work")?, sandfs::accept_all()).await?.count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryFs {
    inner: Arc<Inner>,
}

impl MemoryFs {
    /// Create a new in-memory filesystem from `config`.
    ///
    /// Roots and the default working directory exist on return.
    pub fn new(config: Configuration) -> Result<Self> {
        config.validate()?;
        let inner = Inner {
            name: config.name.clone(),
            flavor: config.flavor,
            syntax: config.flavor.syntax(),
            views: config.views(),
            working_directory: config.working_directory_path()?,
            default_permissions: config.default_permissions,
            default_owner: config.default_owner.clone(),
            default_group: config.default_group.clone(),
            max_file_size: config.max_file_size,
            tree: RwLock::new(Tree::default()),
            closed: AtomicBool::new(false),
        };

        {
            let mut tree = inner.tree.write().unwrap();
            for root in config.root_paths()? {
                let root = root.root().unwrap_or_default().to_string();
                let mut dir = Directory::new(0, "");
                dir.root = Some(root.clone());
                let id = tree.insert(NodeKind::Directory(dir), inner.default_attrs(), Vec::new());
                if let Some(d) = tree.dir_mut(id) {
                    d.parent = id;
                }
                tree.node_mut(id).links = 1;
                tree.roots.insert(inner.key(&root), id);
            }
            inner.create_directories(&mut tree, &inner.working_directory)?;
        }

        #[cfg(feature = "logging")]
        tracing::debug!(name = %inner.name, flavor = ?inner.flavor, "in-memory filesystem created");

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// URI authority of this filesystem.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Engine default working directory.
    pub fn working_directory(&self) -> &VfsPath {
        &self.inner.working_directory
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystemProvider for MemoryFs {
    fn syntax(&self) -> PathSyntax {
        self.inner.syntax
    }

    fn parse_path(&self, path: &str) -> Result<VfsPath> {
        VfsPath::parse(self.inner.syntax, path)
    }

    fn parse_uri(&self, uri: &Url) -> Result<VfsPath> {
        if uri.scheme() != URI_SCHEME {
            return Err(Error::invalid_argument(format!(
                "URI scheme '{}' is not '{URI_SCHEME}'",
                uri.scheme()
            )));
        }
        if uri.host_str() != Some(self.inner.name.as_str()) {
            return Err(Error::invalid_argument(format!(
                "URI '{uri}' does not name filesystem '{}'",
                self.inner.name
            )));
        }
        VfsPath::from_uri_path(self.inner.syntax, uri.path())
    }

    fn to_uri(&self, path: &VfsPath) -> Result<Url> {
        let path = self.inner.to_absolute(path);
        let uri = format!("{URI_SCHEME}://{}{}", self.inner.name, path.to_uri_path());
        Url::parse(&uri).map_err(|e| Error::InvalidPath(format!("{uri}: {e}")))
    }

    fn to_absolute(&self, path: &VfsPath) -> VfsPath {
        self.inner.to_absolute(path)
    }

    /// Checks existence only; access modes are not enforced.
    async fn check_access(&self, path: &VfsPath, _modes: &[AccessMode]) -> Result<()> {
        self.inner.check_access(path)
    }

    async fn create_directory(&self, dir: &VfsPath, attrs: &[FileAttribute]) -> Result<()> {
        self.inner.create_directory(dir, attrs)
    }

    async fn delete(&self, path: &VfsPath) -> Result<()> {
        self.inner.delete(path)
    }

    async fn copy(
        &self,
        source: &VfsPath,
        target: &VfsPath,
        options: &[CopyOption],
    ) -> Result<()> {
        self.inner.copy(source, target, options)
    }

    async fn move_path(
        &self,
        source: &VfsPath,
        target: &VfsPath,
        options: &[CopyOption],
    ) -> Result<()> {
        self.inner.move_path(source, target, options)
    }

    async fn new_file_channel(
        &self,
        path: &VfsPath,
        options: &[OpenOption],
        attrs: &[FileAttribute],
    ) -> Result<Box<dyn SeekableChannel>> {
        if options.contains(&OpenOption::DeleteOnClose) {
            return Err(Error::unsupported(
                "file channels do not support DELETE_ON_CLOSE",
            ));
        }
        self.inner.open(path, options, attrs, false)
    }

    async fn new_byte_channel(
        &self,
        path: &VfsPath,
        options: &[OpenOption],
        attrs: &[FileAttribute],
    ) -> Result<Box<dyn SeekableChannel>> {
        let delete_on_close = options.contains(&OpenOption::DeleteOnClose);
        self.inner.open(path, options, attrs, delete_on_close)
    }

    async fn new_directory_stream(
        &self,
        dir: &VfsPath,
        filter: EntryFilter,
    ) -> Result<DirectoryStream> {
        self.inner.directory_stream(dir, filter)
    }

    async fn create_link(&self, link: &VfsPath, existing: &VfsPath) -> Result<()> {
        self.inner.create_link(link, existing)
    }

    async fn create_symbolic_link(
        &self,
        link: &VfsPath,
        target: &VfsPath,
        attrs: &[FileAttribute],
    ) -> Result<()> {
        self.inner.create_symbolic_link(link, target, attrs)
    }

    async fn read_symbolic_link(&self, link: &VfsPath) -> Result<VfsPath> {
        self.inner.read_symbolic_link(link)
    }

    async fn read_attributes(
        &self,
        path: &VfsPath,
        attributes: &str,
        options: &[LinkOption],
    ) -> Result<AttributeMap> {
        self.inner.read_attributes(path, attributes, options)
    }

    async fn set_attribute(
        &self,
        path: &VfsPath,
        attribute: &str,
        value: AttributeValue,
        options: &[LinkOption],
    ) -> Result<()> {
        self.inner.set_attribute(path, attribute, &value, options)
    }

    async fn to_real_path(&self, path: &VfsPath, options: &[LinkOption]) -> Result<VfsPath> {
        self.inner.to_real_path(path, options)
    }

    fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            #[cfg(feature = "logging")]
            tracing::debug!(name = %self.inner.name, "in-memory filesystem closed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fs::stream::accept_all;
    use pretty_assertions::assert_eq;
    use std::io::{ErrorKind, Read, Write};

    fn unix() -> MemoryFs {
        MemoryFs::new(Configuration::unix()).unwrap()
    }

    fn p(fs: &MemoryFs, s: &str) -> VfsPath {
        fs.parse_path(s).unwrap()
    }

    async fn write_file(fs: &MemoryFs, path: &str, content: &[u8]) {
        let mut ch = fs
            .new_byte_channel(
                &p(fs, path),
                &[OpenOption::Write, OpenOption::Create, OpenOption::TruncateExisting],
                &[],
            )
            .await
            .unwrap();
        ch.write_all(content).unwrap();
    }

    async fn read_file(fs: &MemoryFs, path: &str) -> Vec<u8> {
        let mut ch = fs.new_byte_channel(&p(fs, path), &[], &[]).await.unwrap();
        let mut out = Vec::new();
        ch.read_to_end(&mut out).unwrap();
        out
    }

    async fn list(fs: &MemoryFs, path: &str) -> Vec<String> {
        fs.new_directory_stream(&p(fs, path), accept_all())
            .await
            .unwrap()
            .map(|p| p.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_working_directory_created() {
        let fs = unix();
        fs.check_access(&p(&fs, "/work"), &[]).await.unwrap();
        assert_eq!(fs.to_absolute(&p(&fs, "rel")).to_string(), "/work/rel");
    }

    #[tokio::test]
    async fn test_relative_paths_use_engine_working_directory() {
        let fs = unix();
        fs.create_directory(&p(&fs, "sub"), &[]).await.unwrap();
        assert_eq!(list(&fs, "/work").await, vec!["/work/sub"]);
    }

    #[tokio::test]
    async fn test_create_directory_errors() {
        let fs = unix();
        let err = fs
            .create_directory(&p(&fs, "/missing/child"), &[])
            .await
            .unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::NotFound));

        let err = fs.create_directory(&p(&fs, "/work"), &[]).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::AlreadyExists));

        let err = fs.create_directory(&p(&fs, "/"), &[]).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::AlreadyExists));

        write_file(&fs, "/file", b"x").await;
        let err = fs
            .create_directory(&p(&fs, "/file/child"), &[])
            .await
            .unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::NotADirectory));
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
        let fs = unix();
        write_file(&fs, "/work/a.txt", b"hello world").await;
        assert_eq!(read_file(&fs, "/work/a.txt").await, b"hello world");
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let fs = unix();
        fs.create_directory(&p(&fs, "/d"), &[]).await.unwrap();
        write_file(&fs, "/d/f", b"x").await;

        let err = fs.delete(&p(&fs, "/d")).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::DirectoryNotEmpty));

        fs.delete(&p(&fs, "/d/f")).await.unwrap();
        fs.delete(&p(&fs, "/d")).await.unwrap();

        let err = fs.delete(&p(&fs, "/d")).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::NotFound));

        let err = fs.delete(&p(&fs, "/")).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_symlink_resolution() {
        let fs = unix();
        fs.create_directory(&p(&fs, "/data"), &[]).await.unwrap();
        write_file(&fs, "/data/f", b"payload").await;
        fs.create_symbolic_link(&p(&fs, "/link"), &p(&fs, "data"), &[])
            .await
            .unwrap();

        assert_eq!(read_file(&fs, "/link/f").await, b"payload");
        assert_eq!(
            fs.to_real_path(&p(&fs, "/link/f"), &[]).await.unwrap().to_string(),
            "/data/f"
        );
        assert_eq!(
            fs.to_real_path(&p(&fs, "/link"), &[LinkOption::NoFollowLinks])
                .await
                .unwrap()
                .to_string(),
            "/link"
        );
        assert_eq!(
            fs.read_symbolic_link(&p(&fs, "/link")).await.unwrap(),
            p(&fs, "data")
        );
    }

    #[tokio::test]
    async fn test_symlink_loop_detected() {
        let fs = unix();
        fs.create_symbolic_link(&p(&fs, "/a"), &p(&fs, "/b"), &[])
            .await
            .unwrap();
        fs.create_symbolic_link(&p(&fs, "/b"), &p(&fs, "/a"), &[])
            .await
            .unwrap();
        let err = fs.check_access(&p(&fs, "/a"), &[]).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::Other));
    }

    #[tokio::test]
    async fn test_read_symbolic_link_on_file() {
        let fs = unix();
        write_file(&fs, "/f", b"").await;
        let err = fs.read_symbolic_link(&p(&fs, "/f")).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_dot_dot_and_real_path() {
        let fs = unix();
        fs.create_directory(&p(&fs, "/a"), &[]).await.unwrap();
        fs.create_directory(&p(&fs, "/a/b"), &[]).await.unwrap();
        let real = fs
            .to_real_path(&p(&fs, "/a/b/../b/./"), &[])
            .await
            .unwrap();
        assert_eq!(real.to_string(), "/a/b");
        assert_eq!(
            fs.to_real_path(&p(&fs, "/.."), &[]).await.unwrap().to_string(),
            "/"
        );
    }

    #[tokio::test]
    async fn test_copy_and_replace() {
        let fs = unix();
        write_file(&fs, "/src", b"one").await;
        write_file(&fs, "/dst", b"two").await;

        let err = fs
            .copy(&p(&fs, "/src"), &p(&fs, "/dst"), &[])
            .await
            .unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::AlreadyExists));

        fs.copy(&p(&fs, "/src"), &p(&fs, "/dst"), &[CopyOption::ReplaceExisting])
            .await
            .unwrap();
        assert_eq!(read_file(&fs, "/dst").await, b"one");

        // copies are independent
        write_file(&fs, "/src", b"changed").await;
        assert_eq!(read_file(&fs, "/dst").await, b"one");
    }

    #[tokio::test]
    async fn test_copy_directory_is_shallow() {
        let fs = unix();
        fs.create_directory(&p(&fs, "/d"), &[]).await.unwrap();
        write_file(&fs, "/d/f", b"x").await;
        fs.copy(&p(&fs, "/d"), &p(&fs, "/e"), &[]).await.unwrap();
        assert!(list(&fs, "/e").await.is_empty());
    }

    #[tokio::test]
    async fn test_move_directory() {
        let fs = unix();
        fs.create_directory(&p(&fs, "/a"), &[]).await.unwrap();
        write_file(&fs, "/a/f", b"x").await;
        fs.move_path(&p(&fs, "/a"), &p(&fs, "/b"), &[]).await.unwrap();

        assert_eq!(read_file(&fs, "/b/f").await, b"x");
        assert_eq!(
            fs.to_real_path(&p(&fs, "/b/f"), &[]).await.unwrap().to_string(),
            "/b/f"
        );
        let err = fs.check_access(&p(&fs, "/a"), &[]).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_rejected() {
        let fs = unix();
        fs.create_directory(&p(&fs, "/a"), &[]).await.unwrap();
        fs.create_directory(&p(&fs, "/a/b"), &[]).await.unwrap();
        let err = fs
            .move_path(&p(&fs, "/a"), &p(&fs, "/a/b/c"), &[])
            .await
            .unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_hard_link_shares_content() {
        let fs = unix();
        write_file(&fs, "/f", b"shared").await;
        fs.create_link(&p(&fs, "/g"), &p(&fs, "/f")).await.unwrap();
        fs.delete(&p(&fs, "/f")).await.unwrap();
        assert_eq!(read_file(&fs, "/g").await, b"shared");

        fs.create_directory(&p(&fs, "/d"), &[]).await.unwrap();
        let err = fs.create_link(&p(&fs, "/h"), &p(&fs, "/d")).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_file_channel_rejects_delete_on_close() {
        let fs = unix();
        let err = fs
            .new_file_channel(
                &p(&fs, "/tmpfile"),
                &[OpenOption::Write, OpenOption::Create, OpenOption::DeleteOnClose],
                &[],
            )
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn test_byte_channel_delete_on_close() {
        let fs = unix();
        let mut ch = fs
            .new_byte_channel(
                &p(&fs, "/scratch"),
                &[OpenOption::Write, OpenOption::Create, OpenOption::DeleteOnClose],
                &[],
            )
            .await
            .unwrap();
        ch.write_all(b"temp").unwrap();
        fs.check_access(&p(&fs, "/scratch"), &[]).await.unwrap();
        ch.close().unwrap();
        let err = fs.check_access(&p(&fs, "/scratch"), &[]).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_configured_file_size_limit() {
        let fs = MemoryFs::new(Configuration::unix().max_file_size(8)).unwrap();
        write_file(&fs, "/f", b"12345678").await;

        let mut ch = fs
            .new_byte_channel(&p(&fs, "/f"), &[OpenOption::Append], &[])
            .await
            .unwrap();
        let err = ch.write(b"9").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);
        drop(ch);
        assert_eq!(read_file(&fs, "/f").await, b"12345678");
    }

    #[tokio::test]
    async fn test_open_option_rules() {
        let fs = unix();
        let err = fs
            .new_byte_channel(&p(&fs, "/f"), &[OpenOption::Read, OpenOption::Append], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = fs.new_byte_channel(&p(&fs, "/nope"), &[], &[]).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::NotFound));

        write_file(&fs, "/f", b"x").await;
        let err = fs
            .new_byte_channel(&p(&fs, "/f"), &[OpenOption::Write, OpenOption::CreateNew], &[])
            .await
            .unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::AlreadyExists));

        let err = fs.new_byte_channel(&p(&fs, "/work"), &[], &[]).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(ErrorKind::IsADirectory));
    }

    #[tokio::test]
    async fn test_attributes_round_trip() {
        let fs = MemoryFs::new(Configuration::unix().attribute_view(AttributeView::Posix)).unwrap();
        write_file(&fs, "/f", b"abc").await;

        let attrs = fs
            .read_attributes(&p(&fs, "/f"), "posix:size,permissions,owner", &[])
            .await
            .unwrap();
        assert_eq!(attrs["size"], AttributeValue::Int(3));
        assert_eq!(attrs["permissions"], AttributeValue::Permissions(Permissions::from_mode(0o644)));
        assert_eq!(attrs["owner"], AttributeValue::Text("user".into()));

        fs.set_attribute(
            &p(&fs, "/f"),
            "posix:permissions",
            AttributeValue::Permissions(Permissions::from_mode(0o600)),
            &[],
        )
        .await
        .unwrap();
        let attrs = fs
            .read_attributes(&p(&fs, "/f"), "posix:permissions", &[])
            .await
            .unwrap();
        assert_eq!(
            attrs["permissions"],
            AttributeValue::Permissions(Permissions::from_mode(0o600))
        );
    }

    #[tokio::test]
    async fn test_initial_attributes() {
        let fs = MemoryFs::new(Configuration::unix().attribute_view(AttributeView::Posix)).unwrap();
        fs.create_directory(
            &p(&fs, "/private"),
            &[FileAttribute::permissions(Permissions::from_mode(0o700))],
        )
        .await
        .unwrap();
        let attrs = fs
            .read_attributes(&p(&fs, "/private"), "posix:permissions,isDirectory", &[])
            .await
            .unwrap();
        assert_eq!(attrs["isDirectory"], AttributeValue::Bool(true));
        assert_eq!(
            attrs["permissions"],
            AttributeValue::Permissions(Permissions::from_mode(0o700))
        );

        let plain = unix();
        let err = plain
            .create_directory(
                &p(&plain, "/x"),
                &[FileAttribute::permissions(Permissions::from_mode(0o700))],
            )
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn test_case_insensitive_flavors() {
        let fs = MemoryFs::new(Configuration::macos()).unwrap();
        write_file(&fs, "/work/Readme.md", b"doc").await;
        assert_eq!(read_file(&fs, "/WORK/README.MD").await, b"doc");
        assert_eq!(
            fs.to_real_path(&p(&fs, "/work/readme.md"), &[]).await.unwrap().to_string(),
            "/work/Readme.md"
        );

        fs.move_path(&p(&fs, "/work/Readme.md"), &p(&fs, "/work/README.md"), &[])
            .await
            .unwrap();
        assert_eq!(list(&fs, "/work").await, vec!["/work/README.md"]);
    }

    #[tokio::test]
    async fn test_windows_flavor() {
        let fs = MemoryFs::new(Configuration::windows()).unwrap();
        fs.create_directory(&p(&fs, "C:\\work\\Docs"), &[]).await.unwrap();
        assert_eq!(
            fs.to_real_path(&p(&fs, "c:/WORK/docs"), &[]).await.unwrap().to_string(),
            "C:\\work\\Docs"
        );
        assert_eq!(fs.to_absolute(&p(&fs, "x")).to_string(), "C:\\work\\x");
    }

    #[tokio::test]
    async fn test_uri_round_trip() {
        let fs = unix();
        let path = p(&fs, "/work/a b.txt");
        let uri = fs.to_uri(&path).unwrap();
        assert_eq!(uri.as_str(), "sandfs://sandfs/work/a%20b.txt");
        assert_eq!(fs.parse_uri(&uri).unwrap(), path);

        let other = Url::parse("sandfs://elsewhere/x").unwrap();
        assert!(matches!(fs.parse_uri(&other), Err(Error::InvalidArgument(_))));
        let wrong = Url::parse("file:///x").unwrap();
        assert!(matches!(fs.parse_uri(&wrong), Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_closed_engine_rejects_operations() {
        let fs = unix();
        fs.close();
        assert!(fs.is_closed());
        let err = fs.check_access(&p(&fs, "/"), &[]).await.unwrap_err();
        assert!(matches!(err, Error::Closed));
    }
}
