mod index_entry;
mod index_inner;
mod reuc;
mod tree_cache;

use crate::error::BitResult;
use crate::hash::BIT_HASH_SIZE;
use crate::io::{HashWriter, ReadExt, WriteExt};
use crate::iter::{BitEntryIterator, IndexTreeIter};
use crate::lockfile::Lockfile;
use crate::obj::{FileMode, MutableTree, Oid, TreeEntry};
use crate::path::BitPath;
use crate::pathspec::Pathspec;
use crate::repo::BitRepo;
use crate::serialize::{Deserialize, Serialize};
use crate::time::Timespec;
pub use index_entry::*;
pub use index_inner::*;
pub use reuc::*;
pub use tree_cache::*;

use itertools::Itertools;
use num_enum::TryFromPrimitive;
use sha1::Digest;
use std::collections::{BTreeSet, HashMap};
use std::convert::{TryFrom, TryInto};
use std::fmt::{self, Display, Formatter};
use std::io::{prelude::*, BufReader};
use std::ops::{Deref, DerefMut};

const BIT_INDEX_HEADER_SIG: &[u8; 4] = b"DIRC";
const BIT_INDEX_VERSION: u32 = 2;
const BIT_INDEX_TREECACHE_SIG: &[u8; 4] = b"TREE";
const BIT_INDEX_REUC_SIG: &[u8; 4] = b"REUC";

type IndexStdIterator = impl Iterator<Item = BitIndexEntry> + Clone + std::fmt::Debug;
type IndexEntryIterator = impl BitEntryIterator;

#[derive(Debug)]
pub struct BitIndex<'r> {
    pub repo: BitRepo<'r>,
    // index file may not yet exist
    mtime: Option<Timespec>,
    inner: BitIndexInner,
}

impl<'r> Deref for BitIndex<'r> {
    type Target = BitIndexInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'r> DerefMut for BitIndex<'r> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<'r> BitIndex<'r> {
    pub fn from_lockfile(repo: BitRepo<'r>, lockfile: &Lockfile) -> BitResult<Self> {
        // not actually writing anything here, so we rollback
        // the lockfile is just to check that another process
        // is not currently writing to the index
        let inner = lockfile
            .file()
            .map(BitIndexInner::deserialize_unbuffered)
            .transpose()?
            .unwrap_or_default();
        let mtime = std::fs::metadata(repo.index_path()).as_ref().map(Timespec::mtime).ok();
        Ok(Self { repo, inner, mtime })
    }

    /// builds the tree (and subtrees) implied by the current index entries,
    /// writing each subtree to the object store bottom-up as it goes
    pub fn write_tree(&self) -> BitResult<MutableTree> {
        if self.has_conflicts() {
            bail!("cannot write-tree an index that is not fully merged");
        }
        TreeBuilder::new(self.repo, self.std_iter()).write_tree()
    }

    pub fn is_racy_entry(&self, worktree_entry: &BitIndexEntry) -> bool {
        // shouldn't strict equality be enough but libgit2 is `<=`
        // all index entries should have time `<=` the index file as
        // they are read before the index is written
        // all worktree entries that have been modified since the index has been written
        // clearly has mtime >= the index mtime.
        // so racily clean entries are the one's with mtime strictly equal to the index file's mtime
        self.mtime.map(|mtime| mtime == worktree_entry.mtime).unwrap_or(false)
    }

    /// if entry with the same path already exists, it will be replaced
    pub fn add_entry(&mut self, mut entry: BitIndexEntry) -> BitResult<()> {
        self.inner.remove_collisions(&entry)?;
        if entry.oid.is_unknown() {
            let blob = self.repo.read_blob_from_worktree(entry.path)?;
            entry.oid = self.repo.write_obj(&blob)?;
        }
        self.inner.insert_entry(entry);
        Ok(())
    }

    pub fn remove_entry(&mut self, entry: &BitIndexEntry) -> BitResult<()> {
        let key = entry.key();
        assert!(
            self.inner.find_entry(key.0, key.1).is_some(),
            "tried to remove nonexistent entry `{:?}`",
            key
        );
        self.inner.remove_entry(key);
        Ok(())
    }

    /// stages a single path: stats it, hashes+writes its contents as a blob, and
    /// inserts/replaces the corresponding entry
    pub fn add_path(&mut self, path: BitPath) -> BitResult<()> {
        let entry = BitIndexEntry::try_from(path)?;
        self.add_entry(entry)
    }

    /// makes the index exactly match the working tree (adds every file currently there)
    pub fn add_all(&mut self) -> BitResult<()> {
        for path in self.repo.worktree_files()? {
            self.add_path(path)?;
        }
        Ok(())
    }

    /// stages every worktree path matched by `pathspec`
    pub fn add(&mut self, pathspec: &Pathspec) -> BitResult<()> {
        if *pathspec == Pathspec::match_all() {
            return self.add_all();
        }

        let paths = self
            .repo
            .worktree_files()?
            .into_iter()
            .filter(|path| pathspec.matches_path(path))
            .collect::<Vec<_>>();
        ensure!(!paths.is_empty(), "pathspec `{}` did not match any files", pathspec);
        for path in paths {
            self.add_path(path)?;
        }
        Ok(())
    }
}

/// splits `path` into the directory containing its `depth`'th component and that
/// component itself, e.g. `split_path_at("a/b/c", 1) == Some(("a", "b"))`.
/// returns `None` once `path` has fewer than `depth + 1` components, which signals
/// to [`TreeBuilder`] that the current directory level is exhausted
fn split_path_at(path: BitPath, depth: usize) -> Option<(BitPath, BitPath)> {
    let mut components = path.components();
    let mut dir = BitPath::EMPTY;
    for _ in 0..depth {
        let component = components.next()?;
        dir = if dir.is_empty() { component } else { dir.join(component) };
    }
    let segment = components.next()?;
    Some((dir, segment))
}

/// assembles a [`MutableTree`] (and its subtrees) from a flat, path-sorted stream of
/// index entries, writing every subtree to the object store as soon as it is complete
struct TreeBuilder<'r> {
    repo: BitRepo<'r>,
    entries: std::iter::Peekable<IndexStdIterator>,
}

impl<'r> TreeBuilder<'r> {
    fn new(repo: BitRepo<'r>, entries: IndexStdIterator) -> Self {
        Self { repo, entries: entries.peekable() }
    }

    fn write_tree(mut self) -> BitResult<MutableTree> {
        self.build_tree(BitPath::EMPTY, 0)
    }

    fn build_tree(&mut self, current_dir: BitPath, depth: usize) -> BitResult<MutableTree> {
        let mut entries = BTreeSet::new();
        while let Some(next_entry) = self.entries.peek() {
            let BitIndexEntry { mode, path, oid, .. } = *next_entry;
            // once `path` runs out of components at this depth, this directory is done
            // and control returns to the caller one level up
            let (dir, segment) = match split_path_at(path, depth) {
                Some(x) => x,
                None => break,
            };

            if dir != current_dir {
                break;
            }

            let child_path = if dir.is_empty() { segment } else { dir.join(segment) };
            if child_path == path {
                assert!(entries.insert(TreeEntry { mode, path: segment, oid }));
                self.entries.next();
            } else {
                let subtree = self.build_tree(child_path, depth + 1)?;
                let oid = self.repo.write_obj(&subtree)?;
                assert!(entries.insert(TreeEntry { path: segment, mode: FileMode::TREE, oid }));
            }
        }
        Ok(MutableTree::new(entries))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BitIndexHeader {
    signature: [u8; 4],
    version: u32,
    entryc: u32,
}

impl Default for BitIndexHeader {
    fn default() -> Self {
        Self { signature: [b'D', b'I', b'R', b'C'], version: 2, entryc: 0 }
    }
}

/// a raw, unparsed index extension block (signature + size-prefixed payload)
#[derive(Debug, PartialEq, Clone)]
pub struct BitIndexExtension {
    pub signature: [u8; 4],
    pub size: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq, Ord, PartialOrd, Hash, TryFromPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum MergeStage {
    /// not merging
    None   = 0,
    Stage1 = 1,
    Stage2 = 2,
    Stage3 = 3,
}

impl Default for MergeStage {
    fn default() -> Self {
        Self::None
    }
}

impl MergeStage {
    pub fn is_merging(self) -> bool {
        self as u8 > 0
    }
}

impl Display for MergeStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl Serialize for BitIndexHeader {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        let Self { signature, version, entryc } = self;
        writer.write_all(signature)?;
        writer.write_all(&version.to_be_bytes())?;
        writer.write_all(&entryc.to_be_bytes())?;
        Ok(())
    }
}
