use super::{BitObjCached, BitObjType, BitObject, ImmutableBitObject, Oid};
use crate::error::{BitError, BitGenericError, BitResult};
use crate::io::BufReadExt;
use crate::obj::{FileMode, WritableObject};
use crate::path::BitPath;
use crate::repo::BitRepo;
use crate::serialize::{Deserialize, DeserializeSized, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::io::prelude::*;
use std::ops::Deref;
use std::os::unix::ffi::OsStrExt;

#[derive(PartialEq, Debug, Clone)]
pub struct Tree<'rcx> {
    owner: BitRepo<'rcx>,
    cached: BitObjCached,
    inner: MutableTree,
}

#[derive(PartialEq, Debug, Default, Clone)]
pub struct MutableTree {
    pub entries: BTreeSet<TreeEntry>,
}

impl MutableTree {
    pub fn new(entries: BTreeSet<TreeEntry>) -> Self {
        Self { entries }
    }
}

impl<'rcx> Tree<'rcx> {
    /// resolves a `/`-separated path relative to this tree, descending into
    /// subtrees as required, returning the mode and oid of whatever sits at
    /// the leaf. used to implement the `<rev>:<path>` revision syntax.
    ///
    /// an empty path resolves to this tree itself. a missing entry, or an
    /// intermediate path component that isn't a tree, is [`BitError::PathNotFound`]
    /// (not fatal: the resolver surfaces this as `None`, not an error).
    pub fn find_path(&self, path: BitPath) -> BitResult<(FileMode, Oid)> {
        if path.is_empty() {
            return Ok((FileMode::TREE, self.oid()));
        }

        let mut components = path.components();
        let first = components.next().expect("path is non-empty");
        let rest = components.fold(BitPath::EMPTY, |acc, c| {
            if acc.is_empty() { c } else { acc.join(c) }
        });

        let entry = match self.entries.iter().find(|entry| entry.path == first) {
            Some(entry) => entry,
            None => bail!(BitError::PathNotFound(path)),
        };

        if rest.is_empty() {
            Ok((entry.mode, entry.oid))
        } else {
            if !entry.mode.is_tree() {
                bail!(BitError::PathNotFound(path));
            }
            self.owner().read_obj_tree(entry.oid)?.find_path(rest)
        }
    }
}

/// scans the raw on-disk byte encoding of a tree's entries
/// (`mode SP name \0 <20-byte id>`, back to back with no separator between
/// entries) from either end, without needing to fully deserialize the buffer
/// first. Used where only a handful of entries near one edge of a (possibly
/// huge) tree are needed, e.g. comparing the last entries of two trees.
///
/// forward scanning is unambiguous: the first `SP` splits mode from name, and
/// the first `\0` after that (names can't contain `\0`) ends the name. backward
/// scanning is the hard direction — an id is 20 arbitrary bytes and may itself
/// contain `SP` or `\0`, so naively scanning backward for "the" separator can
/// land inside the previous entry's id instead of the true name terminator.
/// [`Self::next_back`] fixes the id window using the already-known position of
/// the following entry (ids are a fixed 20 bytes, so that boundary is never
/// ambiguous), then walks back through candidate mode/name splits, accepting
/// only the one whose mode bytes decode to a real [`FileMode`].
pub struct RawTreeEntryIter<'a> {
    buf: &'a [u8],
    front: usize,
    back: usize,
}

impl<'a> RawTreeEntryIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, front: 0, back: buf.len() }
    }

    pub fn next(&mut self) -> BitResult<Option<TreeEntry>> {
        if self.front >= self.back {
            return Ok(None);
        }
        let buf = &self.buf[..self.back];
        let sp = find(buf, self.front, b' ').ok_or_else(|| corrupt("missing mode separator"))?;
        let mode = parse_octal_mode(&buf[self.front..sp])?;

        let nul = find(buf, sp + 1, 0).ok_or_else(|| corrupt("missing name terminator"))?;
        let path = BitPath::intern(std::ffi::OsStr::from_bytes(&buf[sp + 1..nul]));

        let oid_start = nul + 1;
        let oid_end = oid_start + 20;
        if oid_end > self.back {
            bail!(corrupt("truncated id"));
        }
        let oid = Oid::new(buf[oid_start..oid_end].try_into().unwrap());

        self.front = oid_end;
        Ok(Some(TreeEntry { mode, path, oid }))
    }

    pub fn next_back(&mut self) -> BitResult<Option<TreeEntry>> {
        if self.front >= self.back {
            return Ok(None);
        }

        let oid_end = self.back;
        let oid_start = oid_end
            .checked_sub(20)
            .filter(|&s| s >= self.front)
            .ok_or_else(|| corrupt("truncated id"))?;
        let oid = Oid::new(self.buf[oid_start..oid_end].try_into().unwrap());

        let nul = oid_start.checked_sub(1).ok_or_else(|| corrupt("missing name terminator"))?;
        if self.buf[nul] != 0 {
            bail!(corrupt("expected NUL terminating the name before the id"));
        }

        // the name can itself legitimately contain spaces, so the separator isn't
        // simply "the nearest space before the NUL" — a git mode is always one of
        // a handful of fixed-width encodings ("40000", "100644", ...), so for each
        // space candidate (nearest first) we check whether the bytes immediately
        // preceding it spell out one of those exactly, rather than trusting the
        // first space we happen to find. this is what the second sanity check buys:
        // a stray 0x20 landing inside the *previous* entry's id, or inside this
        // entry's own name, won't match a real mode encoding and gets rejected in
        // favour of the next candidate further back
        let mut search_end = nul;
        let (mode_start, sp, mode) = loop {
            let sp = match rfind(self.buf, self.front, search_end, b' ') {
                Some(sp) if sp > self.front => sp,
                _ => bail!(corrupt("missing mode separator")),
            };
            let found = [6, 5].into_iter().find_map(|len| {
                let start = sp.checked_sub(len).filter(|&s| s >= self.front)?;
                let mode = parse_octal_mode(&self.buf[start..sp]).ok()?;
                Some((start, mode))
            });
            match found {
                Some((start, mode)) => break (start, sp, mode),
                None => search_end = sp,
            }
        };

        let path = BitPath::intern(std::ffi::OsStr::from_bytes(&self.buf[sp + 1..nul]));
        self.back = mode_start;
        Ok(Some(TreeEntry { mode, path, oid }))
    }
}

fn find(buf: &[u8], from: usize, byte: u8) -> Option<usize> {
    buf[from..].iter().position(|&b| b == byte).map(|i| from + i)
}

/// find the last occurrence of `byte` in `buf[lo..hi)`, if any
fn rfind(buf: &[u8], lo: usize, hi: usize, byte: u8) -> Option<usize> {
    buf[lo..hi].iter().rposition(|&b| b == byte).map(|i| lo + i)
}

fn parse_octal_mode(bytes: &[u8]) -> BitResult<FileMode> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        bail!(corrupt("invalid mode"));
    }
    let s = std::str::from_utf8(bytes).map_err(|_| corrupt("invalid mode"))?;
    let n = u32::from_str_radix(s, 8).map_err(|_| corrupt("invalid mode"))?;
    FileMode::try_from(n).map_err(|_| corrupt("invalid mode"))
}

fn corrupt(reason: &str) -> BitGenericError {
    anyhow!(BitError::Corrupt { file: "tree".to_owned(), offset: 0, reason: reason.to_owned() })
}

impl Deref for Tree<'_> {
    type Target = MutableTree;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Display for Tree<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl Serialize for Tree<'_> {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        self.inner.serialize(writer)
    }
}

impl<'rcx> BitObject<'rcx> for Tree<'rcx> {
    fn owner(&self) -> BitRepo<'rcx> {
        self.owner
    }

    fn obj_cached(&self) -> &BitObjCached {
        &self.cached
    }
}

impl<'rcx> ImmutableBitObject<'rcx> for Tree<'rcx> {
    type Mutable = MutableTree;

    fn from_mutable(owner: BitRepo<'rcx>, cached: BitObjCached, inner: Self::Mutable) -> Self {
        Self { owner, cached, inner }
    }
}

impl Display for MutableTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            for entry in &self.entries {
                write!(f, "{:#}", entry)?;
            }
        } else {
            for entry in &self.entries {
                writeln!(f, "{}", entry)?;
            }
        }
        Ok(())
    }
}

impl WritableObject for MutableTree {
    fn obj_ty(&self) -> BitObjType {
        BitObjType::Tree
    }
}

impl Serialize for MutableTree {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        for entry in &self.entries {
            entry.serialize(writer)?;
        }
        Ok(())
    }
}

impl DeserializeSized for MutableTree {
    fn deserialize_sized(r: &mut impl BufRead, size: u64) -> BitResult<Self> {
        let r = &mut r.take(size);

        let mut tree = Self::default();
        #[cfg(debug_assertions)]
        let mut v = vec![];

        while !r.is_at_eof()? {
            let entry = TreeEntry::deserialize(r)?;
            #[cfg(debug_assertions)]
            v.push(entry.clone());
            tree.entries.insert(entry);
        }

        // these debug assertions check that the btreeset ordering is consistent
        // with the order the tree entries appear in on disk
        #[cfg(debug_assertions)]
        assert_eq!(tree.entries.iter().cloned().collect::<Vec<_>>(), v);
        Ok(tree)
    }
}

#[derive(PartialEq, Debug, Clone, Eq, Copy)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub path: BitPath,
    pub oid: Oid,
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_path().cmp(&other.sort_path())
    }
}

impl TreeEntry {
    // files must sort before directories with the same prefix (e.g. `index.rs` < `index/`),
    // but the trailing slash isn't actually stored in the entry path, so we append one
    // just for the comparison
    fn sort_path(&self) -> BitPath {
        if self.mode.is_tree() { self.path.join_trailing_slash() } else { self.path }
    }
}

impl Display for TreeEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{} {}\0{}", self.mode, self.path, unsafe {
                // SAFETY: we're just printing this out and not using it anywhere
                std::str::from_utf8_unchecked(self.oid.as_ref())
            })
        } else {
            write!(f, "{} {} {}\t{}", self.mode, self.mode.infer_obj_type(), self.oid, self.path)
        }
    }
}

impl Deserialize for TreeEntry {
    fn deserialize(r: &mut impl BufRead) -> BitResult<Self> {
        let mut buf = vec![];
        let i = r.read_until(0x20, &mut buf)?;
        let mode = FileMode::new(
            u32::from_str_radix(std::str::from_utf8(&buf[..i - 1]).unwrap(), 8).unwrap(),
        );

        let j = r.read_until(0x00, &mut buf)?;
        let path = BitPath::intern(std::ffi::OsStr::from_bytes(&buf[i..i + j - 1]));

        let mut oid_bytes = [0; 20];
        r.read_exact(&mut oid_bytes)?;
        let oid = Oid::new(oid_bytes);
        Ok(Self { mode, path, oid })
    }
}

impl Serialize for TreeEntry {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        // use the alternate display impl to avoid the leading-zero padding
        write!(writer, "{:#}", self.mode)?;
        writer.write_all(b" ")?;
        write!(writer, "{}", self.path)?;
        writer.write_all(b"\0")?;
        writer.write_all(self.oid.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
