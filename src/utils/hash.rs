use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Result as IoResult};
use std::path::Path;

/// One node of a content-hash tree over a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Entry name (file or directory). Root is "".
    pub name: String,
    /// Content hash for files; for directories, hash over sorted child entries.
    pub hash: String,
    pub is_dir: bool,
    /// Symbolic link; `hash` covers the link target, never what it points to.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_link: bool,
    /// Children for directories, sorted by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

pub fn sha256_file(path: &Path) -> IoResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Format: "tree\0{name}:{hash}:{d|f|l}\n..." sorted by name.
fn hash_dir_index(children: &[TreeNode]) -> String {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"tree\0");
    for child in children {
        buf.extend_from_slice(child.name.as_bytes());
        buf.push(b':');
        buf.extend_from_slice(child.hash.as_bytes());
        buf.push(b':');
        buf.push(if child.is_dir {
            b'd'
        } else if child.is_link {
            b'l'
        } else {
            b'f'
        });
        buf.push(b'\n');
    }
    sha256_bytes(&buf)
}

/// Build a Merkle tree for `root`, leaving out every entry for which
/// `should_skip(path, is_dir)` returns true, and directories left with only
/// such entries. Skipped directories are not descended into.
pub fn build_merkle_tree<F>(root: &Path, mut should_skip: F) -> IoResult<TreeNode>
where
    F: FnMut(&Path, bool) -> bool,
{
    fn build<F>(abs: &Path, name: String, should_skip: &mut F) -> IoResult<Option<TreeNode>>
    where
        F: FnMut(&Path, bool) -> bool,
    {
        // the root may itself be a link to the tree; anything below is taken as is
        let meta = if name.is_empty() { fs::metadata(abs)? } else { fs::symlink_metadata(abs)? };
        let is_dir = meta.is_dir();
        if !name.is_empty() && should_skip(abs, is_dir) {
            return Ok(None);
        }

        if meta.file_type().is_symlink() {
            let target = fs::read_link(abs)?;
            let mut buf = b"link\0".to_vec();
            buf.extend_from_slice(target.as_os_str().as_encoded_bytes());
            let hash = sha256_bytes(&buf);
            return Ok(Some(TreeNode { name, hash, is_dir: false, is_link: true, children: Vec::new() }));
        }
        if !is_dir {
            let hash = sha256_file(abs)?;
            return Ok(Some(TreeNode { name, hash, is_dir: false, is_link: false, children: Vec::new() }));
        }

        let mut children = Vec::new();
        let mut skipped_any = false;
        for entry in fs::read_dir(abs)? {
            let entry = entry?;
            let child_name = entry.file_name().to_string_lossy().to_string();
            match build(&entry.path(), child_name, should_skip)? {
                Some(node) => children.push(node),
                None => skipped_any = true,
            }
        }
        // a directory holding nothing but skipped entries is skipped as well
        if !name.is_empty() && children.is_empty() && skipped_any {
            return Ok(None);
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        let hash = hash_dir_index(&children);
        Ok(Some(TreeNode { name, hash, is_dir: true, is_link: false, children }))
    }

    // the root itself is never skipped
    let node = build(root, String::new(), &mut should_skip)?;
    Ok(node.unwrap_or_else(|| TreeNode {
        name: String::new(),
        hash: hash_dir_index(&[]),
        is_dir: true,
        is_link: false,
        children: Vec::new(),
    }))
}

/// Flatten a tree into relative slash-separated path -> (hash, is_dir).
/// The root is not included.
pub fn flatten_tree(tree: &TreeNode) -> BTreeMap<String, (String, bool)> {
    fn walk(prefix: &str, node: &TreeNode, out: &mut BTreeMap<String, (String, bool)>) {
        for child in &node.children {
            let path = if prefix.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", prefix, child.name)
            };
            out.insert(path.clone(), (child.hash.clone(), child.is_dir));
            if child.is_dir {
                walk(&path, child, out);
            }
        }
    }

    let mut out = BTreeMap::new();
    walk("", tree, &mut out);
    out
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Changes that turn `baseline` into `current`.
/// - added: present in current, absent in baseline
/// - deleted: present in baseline, absent in current
/// - modified: present in both with different hashes
pub fn diff_trees(current: &TreeNode, baseline: &TreeNode) -> Diff {
    let mut d = Diff::default();
    if current.hash == baseline.hash {
        return d;
    }
    let a = flatten_tree(current);
    let b = flatten_tree(baseline);

    for (path, (h, _)) in &a {
        match b.get(path) {
            None => d.added.push(path.clone()),
            Some((h_old, _)) if h_old != h => d.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in b.keys() {
        if !a.contains_key(path) {
            d.deleted.push(path.clone());
        }
    }
    d
}
