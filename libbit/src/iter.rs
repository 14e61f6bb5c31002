mod index_tree_iter;

mod tree_iter;

pub use fallible_iterator::FallibleIterator;
pub use index_tree_iter::IndexTreeIter;
pub use tree_iter::*;

use crate::error::{BitErrorExt, BitGenericError, BitResult};
use crate::index::BitIndexEntry;
use crate::obj::{FileMode, Oid, TreeEntry, Treeish};
use crate::path::BitPath;
use crate::repo::BitRepo;
use fallible_iterator::Peekable;
use std::borrow::Cow;
use std::fs::DirEntry;
use std::path::Path;

pub trait BitEntry {
    fn oid(&self) -> Oid;
    fn path(&self) -> BitPath;
    fn mode(&self) -> FileMode;

    // comparison function for differs
    // cares about paths first, then modes second
    // otherwise they are considered equal
    fn entry_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path().cmp(&other.path()).then_with(|| self.mode().cmp(&other.mode()))
    }

    fn entry_partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.entry_cmp(other))
    }

    fn is_tree(&self) -> bool {
        self.mode().is_tree()
    }

    fn is_file(&self) -> bool {
        self.mode().is_blob()
    }

    fn read_to_bytes(&self, repo: BitRepo<'_>) -> BitResult<Vec<u8>> {
        let oid = self.oid();
        // if object is known we try to read it from the object store
        // however, it's possible the object does not live there as the hash may have just been calculated to allow for comparisons
        // if it's not in the object store, then it must live on disk so we just read it from there
        // if the oid is not known, then it's definitely on disk (as otherwise it would have a known `oid`)
        if oid.is_known() {
            match repo.read_obj(oid) {
                Ok(obj) => return Ok(obj.into_blob().into_bytes()),
                Err(err) => err.try_into_obj_not_found_err()?,
            };
        }

        let absolute_path = repo.normalize_path(self.path().as_path())?;
        Ok(std::fs::read(absolute_path)?)
    }

    // we must have files sorted before directories
    // i.e. index.rs < index/
    // however, the trailing slash is not actually stored in the tree entry path (TODO confirm against git)
    // we fix this by appending appending a slash
    fn sort_path(&self) -> Cow<'static, Path> {
        if self.mode() == FileMode::TREE {
            Cow::Owned(self.path().join_trailing_slash())
        } else {
            Cow::Borrowed(self.path().as_path())
        }
    }
}

/// wrapper around `TreeIter` that skips the tree entries
#[derive(Debug)]
pub struct TreeEntryIter<'rcx> {
    tree_iter: TreeIter<'rcx>,
}

impl<'rcx> TreeEntryIter<'rcx> {
    pub fn new(repo: BitRepo<'rcx>, oid: Oid) -> Self {
        Self { tree_iter: TreeIter::new(repo, oid) }
    }
}

impl<'rcx> FallibleIterator for TreeEntryIter<'rcx> {
    type Error = BitGenericError;
    type Item = BitIndexEntry;

    fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        // entry iterators only yield non-tree entries
        loop {
            match self.tree_iter.next()? {
                Some(entry) if entry.is_file() => return Ok(Some(entry)),
                None => return Ok(None),
                _ => continue,
            }
        }
    }
}

/// non-recursive, sorted listing of a single directory (e.g. one `objects/xx/` prefix bucket).
pub struct DirIter {
    entries: std::vec::IntoIter<DirEntry>,
}

impl DirIter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let mut entries = std::fs::read_dir(path)
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| a.path().cmp(&b.path()));
        Self { entries: entries.into_iter() }
    }
}

impl Iterator for DirIter {
    type Item = DirEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

pub trait BitEntryIterator = BitIterator<BitIndexEntry>;

pub trait BitIterator<T> = FallibleIterator<Item = T, Error = BitGenericError>;

impl<'rcx> BitRepo<'rcx> {
    pub fn tree_entry_iter(self, oid: Oid) -> BitResult<impl BitEntryIterator + 'rcx> {
        trace!("tree_entry_iter(oid: {})", oid);
        Ok(TreeEntryIter::new(self, oid))
    }

    pub fn head_iter(self) -> BitResult<impl BitEntryIterator + 'rcx> {
        trace!("head_iter()");
        let oid = self.head_tree()?;
        self.tree_entry_iter(oid)
    }
}

trait BitIteratorExt: BitEntryIterator {}

impl<I: BitEntryIterator> BitIteratorExt for I {
}

#[cfg(test)]
mod tree_iter_tests;
