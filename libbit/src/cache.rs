//! the mapped-window cache sitting between pack readers and the filesystem.
//!
//! packs are read through fixed-size, aligned "windows" rather than mapping or
//! reading a whole file per access. windows are reference counted: a window that's
//! currently being read from (or whose bytes a [`crate::obj::BitObjKind`] still
//! borrows through a cursor) is pinned and is never evicted.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use crate::error::BitResult;
use crate::obj::{BitObjKind, Oid};
use crate::path::BitPath;

/// default window size: 32 MiB, matches the git default `core.packedGitWindowSize`.
pub const DEFAULT_WINDOW_SIZE: u64 = 32 * 1024 * 1024;
/// default cap on the number of resident windows across all open packs.
pub const DEFAULT_WINDOW_LIMIT: usize = 128;
/// default cap on cached, fully-materialized delta bases.
pub const DEFAULT_DELTA_BASE_CACHE_LIMIT: usize = 96;
/// objects larger than this are refused by [`crate::obj::BitRawObj::cached_bytes`]
/// (see [`crate::obj::BitRawObj::is_large`]) and must be read through
/// [`crate::obj::BitRawObj::stream`] instead.
pub const DEFAULT_STREAM_THRESHOLD: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub window_size: u64,
    pub window_limit: usize,
    pub delta_base_cache_limit: usize,
    pub stream_threshold: u64,
    /// if false, windows are heap-allocated copies (via `pread`) rather than slices
    /// into an `mmap`. useful on filesystems where mmap is unreliable (network mounts)
    /// or simply to bound resident-set-size more predictably.
    pub use_mmap: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            window_limit: DEFAULT_WINDOW_LIMIT,
            delta_base_cache_limit: DEFAULT_DELTA_BASE_CACHE_LIMIT,
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
            use_mmap: true,
        }
    }
}

enum WindowBytes {
    Mapped(Arc<filebuffer::FileBuffer>, usize, usize),
    Owned(Vec<u8>),
}

impl WindowBytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Mapped(buf, start, end) => &buf[*start..*end],
            Self::Owned(bytes) => bytes,
        }
    }
}

pub struct Window {
    path: BitPath,
    /// absolute offset into the file that `bytes[0]` corresponds to
    start: u64,
    bytes: WindowBytes,
}

impl Window {
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.start + self.bytes.as_slice().len() as u64
    }

    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_slice()
    }
}

struct Inner {
    config: CacheConfig,
    files: FxHashMap<BitPath, Arc<filebuffer::FileBuffer>>,
    windows: FxHashMap<(BitPath, u64), Arc<Window>>,
    /// most-recently-used at the back
    lru: VecDeque<(BitPath, u64)>,
}

/// process-wide cache of mapped pack-file windows, shared by every open [`crate::pack::Pack`].
///
/// a single instance is normally held behind an `Arc` and passed to every pack reader so
/// that the window budget (and therefore resident memory) is enforced globally rather than
/// per pack.
pub struct MappedWindowCache {
    inner: Mutex<Inner>,
}

impl MappedWindowCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config,
                files: Default::default(),
                windows: Default::default(),
                lru: Default::default(),
            }),
        }
    }

    fn aligned_offset(&self, window_size: u64, pos: u64) -> u64 {
        (pos / window_size) * window_size
    }

    /// returns the window covering byte `pos` of `path`, mapping/reading it in if necessary.
    /// the returned window is pinned (kept alive) for as long as the caller holds the `Arc`.
    pub fn get_window(&self, path: BitPath, pos: u64) -> BitResult<Arc<Window>> {
        let mut inner = self.inner.lock();
        let window_size = inner.config.window_size;
        let key = (path, self.aligned_offset(window_size, pos));

        if let Some(window) = inner.windows.get(&key) {
            let window = Arc::clone(window);
            inner.touch(key);
            return Ok(window);
        }

        let use_mmap = inner.config.use_mmap;
        let window = if use_mmap {
            let file_buf = inner.get_or_map_file(path)?;
            let len = file_buf.len() as u64;
            let start = key.1;
            let end = std::cmp::min(start + window_size, len);
            Arc::new(Window {
                path,
                start,
                bytes: WindowBytes::Mapped(file_buf, start as usize, end as usize),
            })
        } else {
            let bytes = Self::pread(path, key.1, window_size)?;
            Arc::new(Window { path, start: key.1, bytes: WindowBytes::Owned(bytes) })
        };

        inner.insert(key, Arc::clone(&window));
        Ok(window)
    }

    fn pread(path: BitPath, offset: u64, len: u64) -> BitResult<Vec<u8>> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        let end = std::cmp::min(offset + len, size);
        let mut buf = vec![0; (end - offset) as usize];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn evict_path(&self, path: BitPath) {
        let mut inner = self.inner.lock();
        inner.windows.retain(|k, _| k.0 != path);
        inner.lru.retain(|k| k.0 != path);
        inner.files.remove(&path);
    }
}

impl Inner {
    fn get_or_map_file(&mut self, path: BitPath) -> BitResult<Arc<filebuffer::FileBuffer>> {
        if let Some(buf) = self.files.get(&path) {
            return Ok(Arc::clone(buf));
        }
        let buf = Arc::new(
            filebuffer::FileBuffer::open(path.as_path())
                .map_err(|err| anyhow!("failed to mmap `{}`: {}", path, err))?,
        );
        self.files.insert(path, Arc::clone(&buf));
        Ok(buf)
    }

    fn touch(&mut self, key: (BitPath, u64)) {
        if let Some(idx) = self.lru.iter().position(|k| *k == key) {
            self.lru.remove(idx);
        }
        self.lru.push_back(key);
    }

    fn insert(&mut self, key: (BitPath, u64), window: Arc<Window>) {
        self.windows.insert(key, window);
        self.touch(key);
        self.evict_if_needed();
    }

    /// evicts least-recently-used, unpinned windows until we're back under budget.
    /// a window is pinned if something other than this cache still holds a strong
    /// reference to it (`Arc::strong_count > 1`). if every resident window is pinned,
    /// we simply exceed the budget rather than evicting something in use.
    fn evict_if_needed(&mut self) {
        let limit = self.config.window_limit;
        if self.windows.len() <= limit {
            return;
        }
        let mut i = 0;
        while self.windows.len() > limit && i < self.lru.len() {
            let key = self.lru[i];
            let evictable = self.windows.get(&key).map_or(false, |w| Arc::strong_count(w) == 1);
            if evictable {
                self.windows.remove(&key);
                self.lru.remove(i);
            } else {
                i += 1;
            }
        }
    }
}

/// reads bytes out of a [`MappedWindowCache`] transparently across window boundaries.
/// implements `Read` so it can be wrapped in a `BufReader`/`ZlibDecoder` like any other
/// byte stream; the windowing is invisible to callers. holds the cache via `Arc` (rather
/// than borrowing it) so a cursor can be stored long-term inside a [`crate::pack::Pack`]
/// without infecting that struct with a lifetime parameter.
pub struct WindowCursor {
    cache: Arc<MappedWindowCache>,
    path: BitPath,
    pos: u64,
    current: Option<Arc<Window>>,
}

impl WindowCursor {
    pub fn new(cache: Arc<MappedWindowCache>, path: BitPath, pos: u64) -> Self {
        Self { cache, path, pos, current: None }
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }
}

impl Read for WindowCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let window = match &self.current {
            Some(w) if w.start() <= self.pos && self.pos < w.end() => Arc::clone(w),
            _ => {
                let window = self
                    .cache
                    .get_window(self.path, self.pos)
                    .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
                self.current = Some(Arc::clone(&window));
                window
            }
        };

        if self.pos >= window.end() {
            // past end-of-file
            return Ok(0);
        }

        let slice = window.as_slice();
        let start = (self.pos - window.start()) as usize;
        let n = std::cmp::min(buf.len(), slice.len() - start);
        buf[..n].copy_from_slice(&slice[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for WindowCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(n) => (self.pos as i64 + n) as u64,
            SeekFrom::End(_) =>
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "seeking from the end of a pack window cursor is not supported",
                )),
        };
        Ok(self.pos)
    }
}

/// a small LRU cache of fully-materialized delta bases, indexed by `(pack path, offset)`.
/// distinct from [`MappedWindowCache`]: windows cache raw (possibly still-deflated) pack
/// bytes, this caches already-expanded object bytes so that a chain of deltas sharing a
/// base doesn't re-expand it for every descendant. generic over the cached value (a
/// [`crate::pack::Pack`] keys it by pack-relative offset and caches the fully expanded
/// `(type, bytes)` pair) so this module stays independent of the object-model types.
pub struct DeltaBaseCache<V> {
    inner: Mutex<DeltaBaseInner<V>>,
}

struct DeltaBaseInner<V> {
    limit: usize,
    map: FxHashMap<(BitPath, u64), Arc<V>>,
    lru: VecDeque<(BitPath, u64)>,
}

impl<V> DeltaBaseCache<V> {
    pub fn new(limit: usize) -> Self {
        Self { inner: Mutex::new(DeltaBaseInner { limit, map: Default::default(), lru: Default::default() }) }
    }

    pub fn get(&self, path: BitPath, offset: u64) -> Option<Arc<V>> {
        let mut inner = self.inner.lock();
        let key = (path, offset);
        let hit = inner.map.get(&key).cloned();
        if hit.is_some() {
            if let Some(idx) = inner.lru.iter().position(|k| *k == key) {
                inner.lru.remove(idx);
            }
            inner.lru.push_back(key);
        }
        hit
    }

    pub fn insert(&self, path: BitPath, offset: u64, value: Arc<V>) {
        let mut inner = self.inner.lock();
        let key = (path, offset);
        inner.map.insert(key, value);
        inner.lru.push_back(key);
        while inner.map.len() > inner.limit {
            if let Some(evict) = inner.lru.pop_front() {
                inner.map.remove(&evict);
            } else {
                break;
            }
        }
    }
}

/// in-memory cache of already-deserialized objects, indexed by oid. sits in front of
/// [`crate::odb::BitObjDb`] so that repeatedly dereferencing the same object (walking
/// the same commit's tree twice, say) doesn't re-read and re-inflate it from disk.
#[derive(Default)]
pub struct BitObjCache<'rcx> {
    objects: FxHashMap<Oid, BitObjKind<'rcx>>,
}

impl<'rcx> BitObjCache<'rcx> {
    pub fn get_or_insert_with(
        &mut self,
        oid: Oid,
        f: impl FnOnce() -> BitResult<BitObjKind<'rcx>>,
    ) -> BitResult<BitObjKind<'rcx>> {
        if let Some(obj) = self.objects.get(&oid) {
            return Ok(obj.clone());
        }
        let obj = f()?;
        self.objects.insert(oid, obj.clone());
        Ok(obj)
    }
}
