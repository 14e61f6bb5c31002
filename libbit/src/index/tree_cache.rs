use crate::error::BitResult;
use crate::io::{BufReadExt, WriteExt};
use crate::obj::Oid;
use crate::path::BitPath;
use crate::repo::BitRepo;
use crate::serialize::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::os::unix::ffi::OsStrExt;

/// mirrors the index's `TREE` extension: one node per directory (plus the root),
/// caching the oid and total entry count of everything below it so a write-tree
/// can skip hashing subtrees that haven't changed since the index was last read.
/// `entry_count == -1` marks a node whose cached oid/count is stale.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BitTreeCache {
    pub(crate) path: BitPath,
    pub(crate) children: Vec<BitTreeCache>,
    // -1 means invalid
    pub(crate) entry_count: isize,
    pub(crate) oid: Oid,
}

impl BitTreeCache {
    /// builds a fresh (fully valid) tree cache by walking the tree rooted at `oid`
    pub fn read_tree_cache(repo: BitRepo<'_>, oid: &Oid) -> BitResult<Self> {
        Self::read_tree_cache_at(repo, *oid, BitPath::EMPTY)
    }

    fn read_tree_cache_at(repo: BitRepo<'_>, oid: Oid, path: BitPath) -> BitResult<Self> {
        let tree = repo.read_obj(oid)?.into_tree()?;
        let mut entry_count = 0isize;
        let mut children = vec![];
        for entry in tree.entries.iter() {
            if entry.mode.is_tree() {
                let child_path =
                    if path.is_empty() { entry.path } else { path.join(entry.path) };
                let child = Self::read_tree_cache_at(repo, entry.oid, child_path)?;
                entry_count += child.entry_count;
                children.push(child);
            } else {
                entry_count += 1;
            }
        }
        Ok(Self { path, entry_count, children, oid })
    }

    /// looks up the node for `path` (which may be this node itself), descending
    /// only through ancestors of `path`
    pub fn find_child(&self, path: impl Into<BitPath>) -> Option<&Self> {
        let path = path.into();
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_child(path))
    }

    pub fn find_child_mut(&mut self, path: impl Into<BitPath>) -> Option<&mut Self> {
        let path = path.into();
        if self.path == path {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_child_mut(path))
    }

    /// marks this node and every cached ancestor of `path` as invalid; the deepest
    /// cached descendant strictly below `path` (if any) is left untouched as its
    /// own contents may not have changed
    pub fn invalidate_path(&mut self, path: impl Into<BitPath>) {
        let path = path.into();
        self.entry_count = -1;
        if path.is_empty() || path == self.path {
            return;
        }
        let prefix = format!("{}/", self.path.as_str());
        let is_descendant =
            |child_path: BitPath| path == child_path || path.as_str().starts_with(&prefix);
        if let Some(child) = self.children.iter_mut().find(|c| is_descendant(c.path)) {
            child.invalidate_path(path);
        }
    }
}

impl Serialize for BitTreeCache {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        // only the name relative to the parent directory is stored on disk;
        // the full path is reconstructed from the parent chain on deserialize
        writer.write_all(self.path.file_name().as_bytes())?;
        writer.write_all(&[0])?;
        write!(writer, "{} {}\n", self.entry_count, self.children.len())?;
        if self.entry_count >= 0 {
            writer.write_oid(self.oid)?;
        }
        for child in &self.children {
            child.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for BitTreeCache {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        Self::deserialize_at(reader, BitPath::EMPTY)
    }
}

impl BitTreeCache {
    fn deserialize_at(reader: &mut impl BufRead, parent: BitPath) -> BitResult<Self> {
        let name = reader.read_null_terminated_path()?;
        let path = if name.is_empty() {
            parent
        } else if parent.is_empty() {
            name
        } else {
            parent.join(name)
        };

        let entry_count = reader.read_ascii_num(b' ')? as isize;
        let subtree_count = reader.read_ascii_num(b'\n')? as usize;
        let oid = if entry_count >= 0 { reader.read_oid()? } else { Oid::UNKNOWN };

        let children = (0..subtree_count)
            .map(|_| Self::deserialize_at(reader, path))
            .collect::<BitResult<Vec<_>>>()?;

        Ok(Self { path, children, entry_count, oid })
    }
}
