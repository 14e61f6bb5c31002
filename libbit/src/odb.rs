//! multiplexes the loose object store and the set of packs (plus transitively-included
//! alternates) behind a single read/write surface: [`BitObjDb`].

use crate::cache::{CacheConfig, DeltaBaseCache, MappedWindowCache};
use crate::error::{BitError, BitResult, BitResultExt};
use crate::hash;
use crate::iter::DirIter;
use crate::lockfile::{Lockfile, LockfileFlags};
use crate::obj::{self, *};
use crate::pack::Pack;
use crate::path::BitPath;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fs::File;
use std::io::{prelude::*, BufReader};
use std::str::FromStr;
use std::sync::Arc;

/// a single object-store backend: either the loose `objects/xx/yyyy...` tree or the set
/// of packs (plus their indexes) found under `objects/pack`.
///
/// modelled as a sum type rather than `Box<dyn Backend>` so dispatch is a match, not a
/// vtable call, and so [`BitObjDb::new`] can lay both variants out inline.
enum Backend {
    Loose(BitLooseObjDb),
    Packed(BitPackedObjDb),
}

/// the surface [`crate::repo::Repo::Odb`] requires of an object-store backend;
/// mirrors [`crate::refs::refdb::BitRefDbBackend`] for the ref side.
pub trait BitObjDbBackend {
    fn read_raw(&self, id: BitId) -> BitResult<BitRawObj>;
    fn read_header(&self, id: BitId) -> BitResult<BitObjHeader>;
    fn write(&self, obj: &dyn WritableObject) -> BitResult<Oid>;
    fn exists(&self, id: BitId) -> BitResult<bool>;
    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>>;
    fn expand_prefix(&self, prefix: PartialOid) -> BitResult<Oid>;
    fn expand_id(&self, id: BitId) -> BitResult<Oid>;
}

impl Backend {
    fn read_raw(&self, id: BitId) -> BitResult<BitRawObj> {
        match self {
            Self::Loose(db) => db.read_raw(id),
            Self::Packed(db) => db.read_raw(id),
        }
    }

    fn read_header(&self, id: BitId) -> BitResult<BitObjHeader> {
        match self {
            Self::Loose(db) => db.read_header(id),
            Self::Packed(db) => db.read_header(id),
        }
    }

    fn write(&self, obj: &dyn WritableObject) -> BitResult<Oid> {
        match self {
            Self::Loose(db) => db.write(obj),
            Self::Packed(db) => db.write(obj),
        }
    }

    fn exists(&self, id: BitId) -> BitResult<bool> {
        match self {
            Self::Loose(db) => db.exists(id),
            Self::Packed(db) => db.exists(id),
        }
    }

    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        match self {
            Self::Loose(db) => db.prefix_candidates(prefix),
            Self::Packed(db) => db.prefix_candidates(prefix),
        }
    }

    fn expand_id(&self, id: BitId) -> BitResult<Oid> {
        match id {
            BitId::Full(oid) => Ok(oid),
            BitId::Partial(partial) => expand_prefix(self, partial),
        }
    }
}

fn expand_prefix(db: &impl PrefixSource, prefix: PartialOid) -> BitResult<Oid> {
    let candidates = db.prefix_candidates(prefix)?;
    match candidates.len() {
        0 => Err(anyhow!(BitError::ObjectNotFound(prefix.into()))),
        1 => Ok(candidates[0]),
        _ => Err(anyhow!(BitError::AmbiguousPrefix(prefix, candidates))),
    }
}

trait PrefixSource {
    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>>;
}

impl PrefixSource for Backend {
    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        Backend::prefix_candidates(self, prefix)
    }
}

/// multiplexes the primary `objects/` directory with zero or more `alternates`
/// (directories listed, one per line, in `objects/info/alternates`). resolution order
/// is loose and packs of the primary directory first, then each alternate
/// recursively in the order listed. a canonical-path set guards against alternate cycles.
pub struct BitObjDb {
    backends: Vec<Backend>,
}

const MAX_ALTERNATE_DEPTH: usize = 32;

impl BitObjDb {
    pub fn new(objects_path: BitPath) -> BitResult<Self> {
        Self::with_cache_config(objects_path, CacheConfig::default())
    }

    /// like [`Self::new`] but with an explicit window/delta-base cache configuration.
    /// a single window cache and delta-base cache are shared across every pack loaded
    /// here, including those found transitively through `objects/info/alternates`, so
    /// that the memory budget is enforced across the whole object database, not per pack.
    pub fn with_cache_config(objects_path: BitPath, config: CacheConfig) -> BitResult<Self> {
        let window_cache = Arc::new(MappedWindowCache::new(config));
        let delta_base_cache = Arc::new(DeltaBaseCache::new(config.delta_base_cache_limit));
        let mut backends = Vec::new();
        let mut seen = std::collections::HashSet::new();
        Self::load_backends(
            objects_path,
            &mut backends,
            &mut seen,
            0,
            &window_cache,
            &delta_base_cache,
            config.stream_threshold,
        )?;
        Ok(Self { backends })
    }

    fn load_backends(
        objects_path: BitPath,
        backends: &mut Vec<Backend>,
        seen: &mut std::collections::HashSet<std::path::PathBuf>,
        depth: usize,
        window_cache: &Arc<MappedWindowCache>,
        delta_base_cache: &Arc<DeltaBaseCache<BitPackObjRaw>>,
        stream_threshold: u64,
    ) -> BitResult<()> {
        let canonical = objects_path
            .as_path()
            .canonicalize()
            .unwrap_or_else(|_| objects_path.as_path().to_path_buf());
        if !seen.insert(canonical) {
            // already loaded this directory (cycle, or duplicate alternate)
            return Ok(());
        }
        ensure!(depth < MAX_ALTERNATE_DEPTH, "alternates chain exceeds maximum depth (likely cyclic)");

        // loose objects are cheaper to probe than packs, so search them first
        backends.push(Backend::Loose(BitLooseObjDb::new(objects_path, stream_threshold)));
        backends.push(Backend::Packed(BitPackedObjDb::new(
            objects_path,
            Arc::clone(window_cache),
            Arc::clone(delta_base_cache),
            stream_threshold,
        )?));

        for alternate in Self::read_alternates(objects_path)? {
            Self::load_backends(
                alternate,
                backends,
                seen,
                depth + 1,
                window_cache,
                delta_base_cache,
                stream_threshold,
            )?;
        }
        Ok(())
    }

    /// parses `objects/info/alternates`: one object-directory path per line.
    fn read_alternates(objects_path: BitPath) -> BitResult<Vec<BitPath>> {
        let path = objects_path.join("info").join("alternates");
        if !path.as_path().exists() {
            return Ok(vec![]);
        }
        let contents = std::fs::read_to_string(path.as_path())?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| BitPath::intern(objects_path.as_path().join(line)))
            .collect())
    }

    /// runs `f` against each backend in search order, short-circuiting on the first
    /// success or the first fatal (non-`NotFound`) error.
    fn search<T>(&self, mut f: impl FnMut(&Backend) -> BitResult<T>) -> BitResult<T> {
        let mut last_err = None;
        for backend in &self.backends {
            match f(backend) {
                Ok(v) => return Ok(v),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("object database has no backends")))
    }

}

impl BitObjDbBackend for BitObjDb {
    fn read_raw(&self, id: BitId) -> BitResult<BitRawObj> {
        self.search(|backend| backend.read_raw(id))
    }

    fn read_header(&self, id: BitId) -> BitResult<BitObjHeader> {
        self.search(|backend| backend.read_header(id))
    }

    /// objects are always written to the loose backend (the first one, of the primary
    /// object directory); packs are read-only here (writing a packer is out of scope).
    fn write(&self, obj: &dyn WritableObject) -> BitResult<Oid> {
        self.backends
            .iter()
            .find_map(|backend| match backend {
                Backend::Loose(db) => Some(db.write(obj)),
                Backend::Packed(..) => None,
            })
            .unwrap_or_else(|| bail!("object database has no writable (loose) backend"))
    }

    /// `has()` short-circuits at the first hit, unlike `read_raw`/`read_header` which
    /// need to distinguish `NotFound` from other (fatal) errors along the way.
    fn exists(&self, id: BitId) -> BitResult<bool> {
        for backend in &self.backends {
            if backend.exists(id).unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// unions prefix candidates across every backend; ambiguity (≥ 2 distinct ids) is
    /// the caller's concern (see [`BitObjDbBackend::expand_id`]), not this method's.
    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        let mut candidates = Vec::new();
        for backend in &self.backends {
            candidates.extend(backend.prefix_candidates(prefix)?);
        }
        candidates.sort_unstable();
        candidates.dedup();
        Ok(candidates)
    }

    fn expand_prefix(&self, prefix: PartialOid) -> BitResult<Oid> {
        expand_prefix(self, prefix)
    }

    fn expand_id(&self, id: BitId) -> BitResult<Oid> {
        match id {
            BitId::Full(oid) => Ok(oid),
            BitId::Partial(partial) => self.expand_prefix(partial),
        }
    }
}

impl PrefixSource for BitObjDb {
    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        BitObjDbBackend::prefix_candidates(self, prefix)
    }
}

/// reads/writes `objects/xx/yyyy...`: zlib-framed `"<type> <size>\0<payload>"` streams.
struct BitLooseObjDb {
    /// path to .git/objects
    objects_path: BitPath,
    stream_threshold: u64,
}

impl BitLooseObjDb {
    pub fn new(objects_path: BitPath, stream_threshold: u64) -> Self {
        Self { objects_path, stream_threshold }
    }

    // this should be infallible as it is used by write
    // in particular, this should *not* check for the existence of the path
    fn obj_path(&self, oid: Oid) -> BitPath {
        let (dir, file) = oid.split_hex();
        self.objects_path.join(dir).join(file)
    }

    fn locate_obj(&self, id: impl Into<BitId>) -> BitResult<BitPath> {
        let oid = self.expand_id(id.into())?;
        let path = self.obj_path(oid);
        if path.exists() { Ok(path) } else { Err(anyhow!(BitError::ObjectNotFound(oid.into()))) }
    }

    fn read_stream(&self, id: impl Into<BitId>) -> BitResult<impl BufRead> {
        let reader = File::open(self.locate_obj(id)?)?;
        Ok(BufReader::new(ZlibDecoder::new(reader)))
    }

    fn expand_id(&self, id: BitId) -> BitResult<Oid> {
        match id {
            BitId::Full(oid) => Ok(oid),
            BitId::Partial(partial) => expand_prefix(&LooseAsPrefixSource(self), partial),
        }
    }

    fn read_raw(&self, id: BitId) -> BitResult<BitRawObj> {
        trace!("BitLooseObjDb::read_odb_obj(id: {})", id);
        let oid = self.expand_id(id)?;
        let mut stream = self.read_stream(oid)?;
        let BitObjHeader { obj_type, size } = obj::read_obj_header(&mut stream)?;
        // the zlib decoder is already a genuine incremental reader: a large loose
        // object never gets buffered wholesale here, threshold or not
        Ok(BitRawObj::new(oid, obj_type, size, self.stream_threshold, Box::new(stream)))
    }

    fn read_header(&self, id: BitId) -> BitResult<BitObjHeader> {
        let mut stream = self.read_stream(id)?;
        obj::read_obj_header(&mut stream)
    }

    /// serializes to a temp file under `objects/`, then renames into place only once the
    /// zlib stream is fully written; refuses to clobber an existing object (same-hash
    /// writes are a no-op, since the only way to reach that id is the same content).
    fn write(&self, obj: &dyn WritableObject) -> BitResult<Oid> {
        let bytes = obj.serialize_with_headers()?;
        let oid = hash::hash_bytes(&bytes);
        let path = self.obj_path(oid);

        if path.as_path().exists() {
            #[cfg(debug_assertions)]
            {
                let mut buf = vec![];
                ZlibDecoder::new(File::open(path)?).read_to_end(&mut buf)?;
                assert_eq!(buf, bytes, "same hash, different contents :O");
            }
        } else {
            Lockfile::with_mut(&path, LockfileFlags::SET_READONLY, |lockfile| {
                Ok(ZlibEncoder::new(lockfile, Compression::default()).write_all(&bytes)?)
            })?;
        }

        Ok(oid)
    }

    fn exists(&self, id: BitId) -> BitResult<bool> {
        match self.locate_obj(id) {
            Ok(..) => Ok(true),
            Err(err) if err.is_not_found_err() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        let (dir, file_prefix) = prefix.split();
        let full_dir = self.objects_path.as_path().join(dir.as_path());
        if !full_dir.exists() {
            return Ok(vec![]);
        }

        // looks into the relevant folder (determined by the two hash digit prefix)
        // create oids by concatenating dir and the filename
        let mut oids = vec![];
        for entry in DirIter::new(full_dir).filter(|entry| entry.path().is_file()) {
            let filename = entry.file_name().to_str().unwrap().to_owned();
            // we must use `str::starts_with` not `path::starts_with` as the latter
            // only considers it component wise
            if !filename.starts_with(file_prefix.as_str()) {
                continue;
            }
            debug_assert_eq!(filename.len(), 38);
            let oid = format!("{}{}", dir, filename);
            debug_assert_eq!(oid.len(), 40);
            oids.push(Oid::from_str(&oid)?);
        }
        Ok(oids)
    }
}

struct LooseAsPrefixSource<'a>(&'a BitLooseObjDb);

impl PrefixSource for LooseAsPrefixSource<'_> {
    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        self.0.prefix_candidates(prefix)
    }
}

/// one entry per `.pack`/`.idx` pair under `objects/pack`.
struct BitPackedObjDb {
    packs: RwLock<SmallVec<[Pack; 1]>>,
    stream_threshold: u64,
}

impl BitPackedObjDb {
    pub fn new(
        objects_path: BitPath,
        window_cache: Arc<MappedWindowCache>,
        delta_base_cache: Arc<DeltaBaseCache<BitPackObjRaw>>,
        stream_threshold: u64,
    ) -> BitResult<Self> {
        let pack_dir = objects_path.join("pack");
        let mut packs = SmallVec::new();

        if !pack_dir.as_path().exists() {
            return Ok(Self { packs: RwLock::new(packs), stream_threshold });
        }

        for entry in std::fs::read_dir(pack_dir.as_path())? {
            let entry = entry?;
            let pack = BitPath::intern(entry.path());
            if pack.extension() != Some("pack".as_ref()) {
                continue;
            }

            let idx = pack.with_extension("idx");
            ensure!(idx.exists(), "packfile `{}` is missing a corresponding index file", pack);
            packs.push(Pack::new(
                pack,
                idx,
                Arc::clone(&window_cache),
                Arc::clone(&delta_base_cache),
                stream_threshold,
            )?);
        }

        Ok(Self { packs: RwLock::new(packs), stream_threshold })
    }

    fn expand_id(&self, id: BitId) -> BitResult<Oid> {
        match id {
            BitId::Full(oid) => Ok(oid),
            BitId::Partial(partial) => expand_prefix(&PackedAsPrefixSource(self), partial),
        }
    }

    fn read_raw_pack_obj(&self, oid: Oid) -> BitResult<BitPackObjRaw> {
        trace!("BitPackedObjDb::read_raw(id: {})", oid);
        for pack in self.packs.write().iter_mut() {
            match pack.read_obj_raw(oid) {
                Ok(raw) => return Ok(raw),
                Err(err) if err.is_not_found_err() => continue,
                Err(err) => return Err(err),
            }
        }
        bail!(BitError::ObjectNotFound(oid.into()))
    }

    fn read_raw(&self, id: BitId) -> BitResult<BitRawObj> {
        trace!("BitPackedObjDb::read_odb_obj(id: {})", id);
        let oid = self.expand_id(id)?;
        self.read_raw_pack_obj(oid)
            .map(|raw| BitRawObj::from_raw_pack_obj(oid, self.stream_threshold, raw))
    }

    fn read_header(&self, id: BitId) -> BitResult<BitObjHeader> {
        let oid = self.expand_id(id)?;
        for pack in self.packs.write().iter_mut() {
            match pack.read_obj_header(oid) {
                Ok(header) => return Ok(header),
                Err(err) if err.is_not_found_err() => continue,
                Err(err) => return Err(err),
            }
        }
        bail!(BitError::ObjectNotFound(id))
    }

    fn write(&self, _obj: &dyn WritableObject) -> BitResult<Oid> {
        bail!("cannot write to pack odb backend")
    }

    fn exists(&self, id: BitId) -> BitResult<bool> {
        let oid = self.expand_id(id)?;
        Ok(self.packs.write().iter_mut().any(|pack| pack.obj_exists(oid).unwrap_or_default()))
    }

    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        let mut candidates = vec![];
        for pack in self.packs.write().iter_mut() {
            candidates.extend(pack.prefix_matches(prefix)?);
        }
        Ok(candidates)
    }
}

struct PackedAsPrefixSource<'a>(&'a BitPackedObjDb);

impl PrefixSource for PackedAsPrefixSource<'_> {
    fn prefix_candidates(&self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        self.0.prefix_candidates(prefix)
    }
}
