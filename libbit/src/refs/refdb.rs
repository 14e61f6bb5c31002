use super::{is_valid_name, BitRef, BitReflog, RefUpdateCause, Refs, SymbolicRef};
use crate::error::{BitError, BitResult, BitResultExt};
use crate::lockfile::{Lockfile, LockfileFlags};
use crate::obj::Oid;
use crate::path::BitPath;
use crate::repo::BitRepo;
use crate::rev::Revspec;
use crate::serialize::{Deserialize, Serialize};
use crate::signature::BitSignature;
use std::collections::HashSet;
use std::str::FromStr;

/// filesystem backed reference store, rooted at the repository's `.git` directory.
///
/// refs are stored loose (one file per ref under `.git/refs/..` or `.git/HEAD`) and,
/// as a fallback for refs without a loose file, in a single `.git/packed-refs` file.
pub struct BitRefDb<'rcx> {
    repo: BitRepo<'rcx>,
}

impl<'rcx> BitRefDb<'rcx> {
    pub fn new(repo: BitRepo<'rcx>) -> Self {
        Self { repo }
    }

    fn bitdir(&self) -> BitPath {
        self.repo.bitdir
    }

    fn join_ref(&self, path: BitPath) -> BitPath {
        self.bitdir().join(path)
    }

    fn join_log(&self, path: BitPath) -> BitPath {
        self.bitdir().join("logs").join(path)
    }

    fn packed_refs_path(&self) -> BitPath {
        self.bitdir().join("packed-refs")
    }

    fn loose_ref_exists(&self, sym: SymbolicRef) -> bool {
        self.join_ref(sym.path()).exists()
    }

    fn read_loose(&self, sym: SymbolicRef) -> BitResult<Option<BitRef>> {
        if !self.loose_ref_exists(sym) {
            return Ok(None);
        }
        Lockfile::with_readonly(self.join_ref(sym.path()), LockfileFlags::empty(), |lockfile| {
            let file = lockfile.file().expect("just checked the ref file exists");
            Ok(Some(BitRef::deserialize_unbuffered(file)?))
        })
    }

    /// parses the `packed-refs` file, a sequence of `<oid> <refname>` lines (with
    /// optional `#` comment header and `^<oid>` peeled-tag continuation lines, which
    /// we don't need to track as we always resolve through the object store directly)
    fn read_packed_refs(&self) -> BitResult<Vec<(Oid, SymbolicRef)>> {
        let path = self.packed_refs_path();
        if !path.exists() {
            return Ok(vec![]);
        }
        let contents = path.read_to_vec()?;
        let text = String::from_utf8(contents)?;
        let mut refs = vec![];
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
                continue;
            }
            let (oid, name) =
                line.split_once(' ').ok_or_else(|| anyhow!("invalid packed-refs line `{}`", line))?;
            refs.push((Oid::from_str(oid)?, SymbolicRef::intern(name)));
        }
        Ok(refs)
    }

    fn read_packed(&self, sym: SymbolicRef) -> BitResult<Option<BitRef>> {
        Ok(self
            .read_packed_refs()?
            .into_iter()
            .find(|(_, name)| *name == sym)
            .map(|(oid, _)| BitRef::Direct(oid)))
    }

    fn read_reflog_or_default(&self, sym: SymbolicRef) -> BitResult<BitReflog> {
        let path = self.join_log(sym.path());
        if !path.exists() {
            return Ok(BitReflog::default());
        }
        Lockfile::with_readonly(path, LockfileFlags::empty(), |lockfile| {
            let file = lockfile.file().expect("just checked the reflog file exists");
            BitReflog::deserialize(&mut std::io::BufReader::new(file))
        })
    }

    fn write_reflog_entry(
        &self,
        sym: SymbolicRef,
        old_oid: Oid,
        new_oid: Oid,
        cause: RefUpdateCause,
    ) -> BitResult<()> {
        let mut reflog = self.read_reflog_or_default(sym)?;
        let committer = BitSignature::from_env()?;
        reflog.append(old_oid, new_oid, committer, cause.to_string());
        Lockfile::with_mut(self.join_log(sym.path()), LockfileFlags::empty(), |lockfile| {
            reflog.serialize(lockfile)
        })
    }

    /// recursive search order git uses to resolve an unqualified name like `master`
    fn search_paths(short: &str) -> Vec<BitPath> {
        vec![
            BitPath::intern(short),
            BitPath::intern(format!("refs/{}", short)),
            BitPath::intern(format!("refs/tags/{}", short)),
            BitPath::intern(format!("refs/heads/{}", short)),
            BitPath::intern(format!("refs/remotes/{}", short)),
            BitPath::intern(format!("refs/remotes/{}/HEAD", short)),
        ]
    }
}

/// a refdb can't fully resolve on its own as resolving through `Oid`s that turn out
/// to be tags requires reading the object store, which both refdb and odb sit behind
/// (the repo itself owns both); `'rcx` lets a backend read through to one if needed.
pub trait BitRefDbBackend<'rcx> {
    fn create(&self, sym: SymbolicRef, from: BitRef) -> BitResult<()>;
    fn read(&self, sym: SymbolicRef) -> BitResult<BitRef>;
    /// may implicitly create the ref
    fn update(&self, sym: SymbolicRef, to: BitRef, cause: RefUpdateCause) -> BitResult<()>;
    fn delete(&self, sym: SymbolicRef) -> BitResult<()>;
    fn exists(&self, sym: SymbolicRef) -> BitResult<bool>;

    fn read_reflog(&self, sym: SymbolicRef) -> BitResult<BitReflog>;

    /// searches for a ref by an unqualified short name, e.g. `master` -> `refs/heads/master`
    fn get_ref(&self, short: &str) -> BitResult<Option<BitRef>>;

    /// checks the reference is either a well-formed symbolic ref that exists, or a direct oid
    fn validate(&self, reference: BitRef) -> BitResult<BitRef>;

    /// follows exactly one hop of symbolic indirection, returning the result as-is
    /// (which may itself still be symbolic)
    fn partially_resolve(&self, reference: BitRef) -> BitResult<BitRef>;

    /// follows the full chain of symbolic refs until a direct reference is reached,
    /// rejecting cycles
    fn resolve(&self, reference: BitRef) -> BitResult<BitRef>;

    /// fully resolves to the underlying oid
    fn fully_resolve(&self, reference: BitRef) -> BitResult<Oid>;

    fn create_branch(&self, sym: SymbolicRef, from: &Revspec) -> BitResult<()>;

    fn ls_refs(&self) -> BitResult<Refs>;
}

impl<'rcx> BitRefDbBackend<'rcx> for BitRefDb<'rcx> {
    fn create(&self, sym: SymbolicRef, from: BitRef) -> BitResult<()> {
        if self.exists(sym)? {
            bail!("a reference `{}` already exists", sym);
        }
        self.update(sym, from, RefUpdateCause::Create)
    }

    fn read(&self, sym: SymbolicRef) -> BitResult<BitRef> {
        ensure!(is_valid_name(sym.path().as_str()), "invalid reference name `{}`", sym);
        match self.read_loose(sym)? {
            Some(r) => Ok(r),
            None => match self.read_packed(sym)? {
                Some(r) => Ok(r),
                None => Err(anyhow!(BitError::RefNotFound(sym))),
            },
        }
    }

    fn update(&self, sym: SymbolicRef, to: BitRef, cause: RefUpdateCause) -> BitResult<()> {
        let old_oid = match self.read(sym) {
            Ok(old) => self.fully_resolve(old).unwrap_or(Oid::UNKNOWN),
            Err(..) => Oid::UNKNOWN,
        };
        Lockfile::with_mut(self.join_ref(sym.path()), LockfileFlags::empty(), |lockfile| {
            to.serialize(lockfile)
        })?;

        if let BitRef::Direct(new_oid) = to {
            self.write_reflog_entry(sym, old_oid, new_oid, cause)?;
        } else if let Ok(new_oid) = self.fully_resolve(to) {
            self.write_reflog_entry(sym, old_oid, new_oid, cause)?;
        }

        Ok(())
    }

    fn delete(&self, sym: SymbolicRef) -> BitResult<()> {
        let path = self.join_ref(sym.path());
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn exists(&self, sym: SymbolicRef) -> BitResult<bool> {
        Ok(self.loose_ref_exists(sym) || self.read_packed(sym)?.is_some())
    }

    fn read_reflog(&self, sym: SymbolicRef) -> BitResult<BitReflog> {
        self.read_reflog_or_default(sym)
    }

    fn get_ref(&self, short: &str) -> BitResult<Option<BitRef>> {
        for path in Self::search_paths(short) {
            let sym = SymbolicRef::new(path);
            if self.exists(sym)? {
                return self.read(sym).map(Some);
            }
        }
        Ok(None)
    }

    fn validate(&self, reference: BitRef) -> BitResult<BitRef> {
        match reference {
            BitRef::Direct(..) => Ok(reference),
            BitRef::Symbolic(sym) => {
                ensure!(self.exists(sym)?, BitError::RefNotFound(sym));
                Ok(reference)
            }
        }
    }

    fn partially_resolve(&self, reference: BitRef) -> BitResult<BitRef> {
        match reference {
            BitRef::Direct(..) => Ok(reference),
            BitRef::Symbolic(sym) => self.read(sym),
        }
    }

    // a symbolic ref whose target doesn't exist yet (e.g. `HEAD` in a fresh repo,
    // pointing at `refs/heads/master` before the first commit) is not an error here,
    // only a genuine cycle through refs that do all exist is
    fn resolve(&self, reference: BitRef) -> BitResult<BitRef> {
        let mut seen = HashSet::new();
        let mut current = reference;
        loop {
            match current {
                BitRef::Direct(..) => return Ok(current),
                BitRef::Symbolic(sym) => {
                    ensure!(seen.insert(sym), "symbolic reference `{}` is cyclic", sym);
                    current = match self.read(sym) {
                        Ok(next) => next,
                        Err(err) if err.is_not_found_err() => return Ok(BitRef::Symbolic(sym)),
                        Err(err) => return Err(err),
                    };
                }
            }
        }
    }

    fn fully_resolve(&self, reference: BitRef) -> BitResult<Oid> {
        match self.resolve(reference)? {
            BitRef::Direct(oid) => Ok(oid),
            BitRef::Symbolic(sym) => bail!(BitError::RefNotFound(sym)),
        }
    }

    fn create_branch(&self, sym: SymbolicRef, from: &Revspec) -> BitResult<()> {
        ensure!(!self.exists(sym)?, "a reference `{}` already exists", sym);
        // resolved, not fully resolved: `HEAD` in a repo with no commits yet still
        // names a branch worth creating another ref alongside, it just has nothing
        // underneath it to resolve down to an oid
        let reference = self.repo.resolve_rev(from)?;
        self.create(sym, reference)
    }

    fn ls_refs(&self) -> BitResult<Refs> {
        let mut refs = Refs::new();
        refs.insert(BitRef::HEAD);

        let refs_dir = self.bitdir().join("refs");
        if refs_dir.as_path().exists() {
            for entry in walkdir::WalkDir::new(refs_dir.as_path()) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(self.bitdir().as_path())?;
                refs.insert(BitRef::Symbolic(SymbolicRef::intern(relative)));
            }
        }

        for (_, sym) in self.read_packed_refs()? {
            refs.insert(BitRef::Symbolic(sym));
        }

        Ok(refs)
    }
}
