use crate::cache::{DeltaBaseCache, MappedWindowCache, WindowCursor};
use crate::delta::Delta;
use crate::error::{BitError, BitErrorExt, BitGenericError, BitResult, BitResultExt};
use crate::hash::{Crc32, MakeHash, SHA1Hash, OID_SIZE};
use crate::io::*;
use crate::iter::BitIterator;
use crate::obj::*;
use crate::path::BitPath;
use crate::serialize::{BufReadSeek, Deserialize, DeserializeSized, Serialize};
use fallible_iterator::FallibleIterator;
use flate2::{Decompress, FlushDecompress};
use num_traits::{FromPrimitive, ToPrimitive};
use rustc_hash::FxHashMap;
use std::collections::hash_map::RawEntryMut;
use std::fmt::{self, Debug, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, SeekFrom, Write};
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

/// delta chains longer than this are assumed cyclic or otherwise pathological and
/// rejected with [`BitError::DeltaDepthExceeded`] rather than recursed into indefinitely.
pub const MAX_DELTA_DEPTH: usize = 50;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_EXT: &str = "pack";
pub const PACK_IDX_EXT: &str = "idx";
const PACK_IDX_MAGIC: u32 = 0xff744f63;
const FANOUT_ENTRYC: usize = 256;
const FANOUT_ENTRY_SIZE: u64 = 4;
const FANOUT_SIZE: u64 = FANOUT_ENTRYC as u64 * FANOUT_ENTRY_SIZE;
const PACK_IDX_HEADER_SIZE: u64 = 8;
const CRC_SIZE: u64 = 4;
const OFFSET_SIZE: u64 = 4;
const EXT_OFFSET_SIZE: u64 = 8;
/// maximum 31 bit number (highest bit represents it uses a large offset in the EXT layer)
const MAX_OFFSET: u64 = 0x7fffffff;

impl BitPackObjRaw {
    fn expand_with_delta_bytes(&self, delta_bytes: &[u8]) -> BitResult<Self> {
        let delta = Delta::deserialize_from_slice(&delta_bytes)?;
        self.expand_with_delta(&delta)
    }

    fn expand_with_delta(&self, delta: &Delta) -> BitResult<Self> {
        trace!("BitObjRaw::expand_with_delta(..)");
        //? is it guaranteed that the (expanded) base of a delta is of the same type?
        let &Self { obj_type, ref bytes } = self;
        Ok(Self { obj_type, bytes: delta.expand(bytes)? })
    }
}

// all the bytes of the delta in `Self::Ofs` and `Self::Ref` should be zlib-inflated already
pub enum BitPackObjRawDeltified {
    Raw(BitPackObjRaw),
    Ofs(u64, Vec<u8>),
    Ref(Oid, Vec<u8>),
}

impl Debug for BitPackObjRawDeltified {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(raw) => write!(f, "BitObjRawKind::Raw({:?})", raw),
            Self::Ofs(offset, _) => write!(f, "BitObjRawKind::Ofs({}, ..)", offset),
            Self::Ref(oid, _) => write!(f, "BitObjRawKind::Ref({}, ..)", oid),
        }
    }
}

/// a pack's packfile reader draws its bytes through the shared [`MappedWindowCache`]
/// rather than holding its own file handle/buffer: many `Pack`s opened against the same
/// object database share one window budget.
pub type PackReader = PackfileReader<BufReader<WindowCursor>>;

pub struct Pack {
    pack_path: BitPath,
    pack_reader: PackReader,
    idx_reader: PackIndexReader<BufferedFileStream>,
    /// fully-expanded objects, keyed by offset within this pack; shared with sibling
    /// packs in the same object database so the memory budget is enforced globally.
    /// a result over `stream_threshold` is never inserted here (see
    /// [`Self::read_obj_raw_at_depth`]), so it is re-walked on every open instead of
    /// being retained indefinitely.
    delta_base_cache: Arc<DeltaBaseCache<BitPackObjRaw>>,
    stream_threshold: u64,
}

impl Pack {
    pub fn new(
        pack: impl AsRef<Path>,
        idx: impl AsRef<Path>,
        window_cache: Arc<MappedWindowCache>,
        delta_base_cache: Arc<DeltaBaseCache<BitPackObjRaw>>,
        stream_threshold: u64,
    ) -> BitResult<Self> {
        let pack_path = BitPath::intern(pack.as_ref());
        let cursor = WindowCursor::new(window_cache, pack_path, 0);
        let pack_reader = PackfileReader::new(BufReader::new(cursor))?;
        let idx_reader = File::open(idx)
            .map(BufReader::new)
            .map_err(Into::into)
            .and_then(PackIndexReader::new)?;
        Ok(Self { pack_path, pack_reader, idx_reader, delta_base_cache, stream_threshold })
    }

    #[inline]
    pub fn pack_reader(&mut self) -> &mut PackReader {
        &mut self.pack_reader
    }

    #[inline]
    pub fn idx_reader(&mut self) -> &mut PackIndexReader<BufferedFileStream> {
        &mut self.idx_reader
    }

    #[inline]
    pub fn obj_crc_offset(&mut self, oid: Oid) -> BitResult<(u32, u64)> {
        self.idx_reader().find_oid_crc_offset(oid)
    }

    #[inline]
    pub fn obj_offset(&mut self, oid: Oid) -> BitResult<u64> {
        self.obj_crc_offset(oid).map(|(_crc, offset)| offset)
    }

    /// returns a list of oids that start with `prefix`
    pub fn prefix_matches(&mut self, prefix: PartialOid) -> BitResult<Vec<Oid>> {
        trace!("prefix_matches(prefix: {})", prefix);
        let extended = prefix.into_oid()?;
        let r = match self.obj_offset(extended) {
            // in the unlikely event that extending the prefix with zeroes
            // resulted in a valid oid then we can just return that as the only candidate
            Ok(..) => Ok(vec![extended]),
            Err(err) => {
                // we know `idx` is the index of the very first oid that has prefix `prefix`
                // as we extended prefix by using only zeroes
                // so we just start scanning from `idx` until the prefixes change
                trace!("Pack::prefix_matches: prefix not found, searching for candidates");
                let (_, idx) = err.try_into_obj_not_found_in_pack_index_err()?;
                self.idx_reader().oid_iter(idx).take_while(|oid| oid.has_prefix(prefix)).collect()
            }
        };
        trace!("prefix_matches(..) -> {:?}", r);
        r
    }

    pub fn obj_exists(&mut self, oid: Oid) -> BitResult<bool> {
        // TODO this pattern is a little unpleasant
        // do something about it if it pops up any more
        // maybe some magic with a different error type could work
        match self.obj_offset(oid) {
            Ok(..) => Ok(true),
            Err(err) if err.is_not_found_err() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn expand_raw_obj(
        &mut self,
        raw_kind: BitPackObjRawDeltified,
        base_offset: u64,
        depth: usize,
    ) -> BitResult<BitPackObjRaw> {
        trace!("expand_raw_obj(raw_kind: {:?}, base_offset: {}, depth: {})", raw_kind, base_offset, depth);
        if depth > MAX_DELTA_DEPTH {
            return Err(anyhow!(BitError::DeltaDepthExceeded(base_offset, MAX_DELTA_DEPTH)));
        }
        let (base, delta_bytes) = match raw_kind {
            BitPackObjRawDeltified::Raw(raw) => return Ok(raw),
            BitPackObjRawDeltified::Ofs(offset, delta) =>
                (self.read_obj_raw_at_depth(base_offset - offset, depth + 1)?, delta),
            BitPackObjRawDeltified::Ref(base_oid, delta) => {
                let base_offset = self.obj_offset(base_oid)?;
                (self.read_obj_raw_at_depth(base_offset, depth + 1)?, delta)
            }
        };

        trace!("expand_raw_obj:base={:?}; delta_len={}", base, delta_bytes.len());
        base.expand_with_delta_bytes(&delta_bytes)
    }

    /// returns fully expanded raw object at offset
    pub fn read_obj_raw_at(&mut self, offset: u64) -> BitResult<BitPackObjRaw> {
        self.read_obj_raw_at_depth(offset, 0)
    }

    fn read_obj_raw_at_depth(&mut self, offset: u64, depth: usize) -> BitResult<BitPackObjRaw> {
        trace!("read_obj_raw_at(offset: {})", offset);
        match self.delta_base_cache.get(self.pack_path, offset) {
            Some(raw) => Ok((*raw).clone()),
            None => {
                let raw = self.pack_reader().read_obj_from_offset_raw(offset)?;
                let expanded = self.expand_raw_obj(raw, offset, depth)?;
                // objects over the streaming threshold are deliberately not cached:
                // keeping a 512MiB+ blob resident for every later open would defeat
                // the point of having a threshold at all, so each open re-walks it
                if (expanded.bytes.len() as u64) <= self.stream_threshold {
                    self.delta_base_cache.insert(self.pack_path, offset, Arc::new(expanded.clone()));
                }
                Ok(expanded)
            }
        }
    }

    /// returns fully expanded raw object with oid
    pub fn read_obj_raw(&mut self, oid: Oid) -> BitResult<BitPackObjRaw> {
        trace!("read_obj_raw(oid: {})", oid);
        let offset = self.obj_offset(oid)?;
        trace!("read_obj_raw(oid: {}): found object at offset `{}`)", oid, offset);
        let raw = self.read_obj_raw_at(offset)?;
        Ok(raw)
    }

    pub fn read_obj_header(&mut self, oid: Oid) -> BitResult<BitObjHeader> {
        let (crc, offset) = self.obj_crc_offset(oid)?;
        trace!("read_obj_header(oid: {}); crc={}; offset={}", oid, crc, offset);
        let header = self.read_obj_header_at(offset)?;
        Ok(header)
    }

    fn read_obj_header_at(&mut self, offset: u64) -> BitResult<BitObjHeader> {
        trace!("read_obj_header_at(offset: {})", offset);
        let reader = self.pack_reader();
        let header = reader.read_header_from_offset(offset)?;
        // can we assume base_header definitely has same type?
        let base_header = match header.obj_type {
            BitPackObjType::Commit
            | BitPackObjType::Tree
            | BitPackObjType::Blob
            | BitPackObjType::Tag => return Ok(header.into()),
            BitPackObjType::OfsDelta => {
                let ofs = reader.read_offset()?;
                self.read_obj_header_at(offset - ofs)
            }
            BitPackObjType::RefDelta => {
                let oid = self.pack_reader().read_oid()?;
                self.read_obj_header(oid)
            }
        }?;
        Ok(BitObjHeader { size: header.size, obj_type: base_header.obj_type })
    }
}

#[allow(unused)]
#[derive(Debug)]
#[cfg_attr(test, derive(Clone, PartialEq))]
pub struct PackIndex {
    /// layer 1 of the fanout table
    pub fanout: [u32; FANOUT_ENTRYC],
    pub oids: Vec<Oid>,
    pub crcs: Vec<u32>,
    pub offsets: Vec<u32>,
    /// 64-bit offsets for packs > 4 GiB; entries in `offsets` with the high bit
    /// set index into this table instead of encoding the offset directly
    pub large_offsets: Vec<u64>,
    pub pack_hash: SHA1Hash,
}

impl PackIndex {
    fn build_fanout(oids: &[Oid]) -> [u32; FANOUT_ENTRYC] {
        let mut fanout = [0; FANOUT_ENTRYC];
        for oid in oids {
            fanout[oid[0] as usize] += 1;
        }
        for i in 1..FANOUT_ENTRYC {
            fanout[i] += fanout[i - 1];
        }
        fanout
    }

    /// resolves the `i`th entry of the offset table to its true byte offset,
    /// following through the large-offset table if the high bit is set
    pub fn real_offset(&self, i: usize) -> u64 {
        let offset = self.offsets[i];
        if offset as u64 > MAX_OFFSET {
            self.large_offsets[(offset as u64 & MAX_OFFSET) as usize]
        } else {
            offset as u64
        }
    }
}

/// on-disk layout of a `.idx` file: v1 has no magic/version header and interleaves
/// `(offset, oid)` pairs; v2 adds the `\xfftOc` magic and lays out oids/crcs/offsets
/// as separate columns (see [`Layer`]).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PackIdxVersion {
    V1,
    V2,
}

/// size in bytes of one `(u32 offset, 20-byte oid)` record in a v1 index
const PACK_IDX_V1_ENTRY_SIZE: u64 = OFFSET_SIZE + OID_SIZE as u64;

pub struct PackIndexReader<R> {
    reader: R,
    fanout: [u32; FANOUT_ENTRYC],
    version: PackIdxVersion,
    oid_cache: FxHashMap<u64, Vec<Oid>>,
    crc_offset_cache: FxHashMap<Oid, (u32, u64)>,
    /// number of oids
    n: u64,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, FromPrimitive, ToPrimitive)]
pub enum Layer {
    Oid = 0,
    Crc = 1,
    Ofs = 2,
    Ext = 3,
}

impl<R: BufReadSeek> PackIndexReader<R> {
    pub fn new(mut reader: R) -> BitResult<Self> {
        let (version, fanout) = PackIndex::parse_header_and_fanout(&mut reader)?;
        let n = fanout[FANOUT_ENTRYC - 1] as u64;
        Ok(Self {
            reader,
            fanout,
            version,
            n,
            oid_cache: Default::default(),
            crc_offset_cache: Default::default(),
        })
    }

    /// byte offset of the first byte following the fanout table: the v1 header is
    /// empty (no magic/version), the v2 header is 8 bytes (`magic` + `version`)
    fn header_size(&self) -> u64 {
        match self.version {
            PackIdxVersion::V1 => 0,
            PackIdxVersion::V2 => PACK_IDX_HEADER_SIZE,
        }
    }

    /// byte offset of the `(offset, oid)` record for entry `index` in a v1 index
    fn v1_entry_offset(&self, index: u64) -> u64 {
        self.header_size() + FANOUT_SIZE + index * PACK_IDX_V1_ENTRY_SIZE
    }
}

impl<R: BufReadSeek> PackIndexReader<R> {
    /// returns the offset of the object with oid `oid` in the packfile
    pub fn find_oid_crc_offset(&mut self, oid: Oid) -> BitResult<(u32, u64)> {
        match self.crc_offset_cache.get(&oid) {
            Some(&crc_offset) => Ok(crc_offset),
            None => {
                let crc_offset = self.find_oid_crc_offset_inner(oid)?;
                self.crc_offset_cache.insert(oid, crc_offset);
                Ok(crc_offset)
            }
        }
        // the following is nicer as we can avoid calculating the hash twice
        // it's violating the borrow checker in it's current form though
        // match self.crc_offset_cache.entry(oid) {
        //     Entry::Occupied(entry) => Ok(*entry.get()),
        //     Entry::Vacant(entry) => self
        //         .find_oid_crc_offset_inner(oid)
        //         .map(|crc_offset| entry.insert(crc_offset))
        //         .copied(),
        // }
    }

    fn find_oid_crc_offset_inner(&mut self, oid: Oid) -> BitResult<(u32, u64)> {
        trace!("PackIndexReader::find_oid_crc_offset(oid: {})", oid);
        let index = self.find_oid_index(oid)?;
        match self.version {
            PackIdxVersion::V1 => {
                // v1 has no crc layer and no >2GiB extension table; the record is
                // simply `(u32 offset, 20-byte oid)`
                let entry_offset = self.v1_entry_offset(index);
                self.seek(SeekFrom::Start(entry_offset))?;
                let offset = self.read_type::<u32>()? as u64;
                debug_assert_eq!(oid, self.read_type::<Oid>()?);
                trace!("PackIndexReader::find_oid_crc_offset(..) -> (0, {}) [v1]", offset);
                Ok((0, offset))
            }
            PackIdxVersion::V2 => {
                debug_assert_eq!(oid, self.read_from(Layer::Oid, index)?);
                let crc = self.read_from::<u32>(Layer::Crc, index)?;
                let mut offset = self.read_from::<u32>(Layer::Ofs, index)? as u64;
                trace!("PackIndexReader::find_oid_crc_offset(..) -> ({}, {})", crc, offset);

                if offset > MAX_OFFSET {
                    let ext_index = offset & MAX_OFFSET;
                    offset = self.read_from(Layer::Ext, ext_index as u64)?;
                }

                Ok((crc, offset))
            }
        }
    }

    /// returns the offset of the start of the layer relative to the start of
    /// the pack index in bytes
    pub fn offset_of(&mut self, layer: Layer, index: u64) -> u64 {
        debug_assert!(layer < Layer::Ext);
        const SIZE: [u64; 4] = [OID_SIZE as u64, CRC_SIZE, OFFSET_SIZE, EXT_OFFSET_SIZE];
        let layer = layer.to_usize().unwrap();
        let base = PACK_IDX_HEADER_SIZE
            + FANOUT_SIZE
            + (0..layer).map(|layer| SIZE[layer] * self.n).sum::<u64>();
        base + index * SIZE[layer]
    }

    /// read from layer at index (index is not the same as byte offset)
    pub fn read_from<T: Deserialize>(&mut self, layer: Layer, index: u64) -> BitResult<T> {
        let offset = self.offset_of(layer, index);
        self.seek(SeekFrom::Start(offset))?;
        self.read_type()
    }

    pub fn read_oid_at(&mut self, index: u64) -> BitResult<Oid> {
        match self.version {
            PackIdxVersion::V1 => {
                let offset = self.v1_entry_offset(index) + OFFSET_SIZE;
                self.seek(SeekFrom::Start(offset))?;
                self.read_type()
            }
            PackIdxVersion::V2 => self.read_from(Layer::Oid, index),
        }
    }

    pub fn oid_iter(&mut self, start: u64) -> impl BitIterator<Oid> + '_ {
        struct OidIter<'a, R> {
            reader: &'a mut PackIndexReader<R>,
            index: u64,
        }

        impl<'a, R: BufReadSeek> FallibleIterator for OidIter<'a, R> {
            type Error = BitGenericError;
            type Item = Oid;

            fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
                if self.index >= self.reader.n {
                    return Ok(None);
                }
                let r = self.reader.read_oid_at(self.index);
                self.index += 1;
                Some(r).transpose()
            }
        }

        OidIter { reader: self, index: start }
    }

    /// return the index of `oid` in the Oid layer of the packindex (unit is sizeof::<Oid>)
    fn find_oid_index(&mut self, oid: Oid) -> BitResult<u64> {
        // fanout has 256 elements
        // example
        // [
        //     2,
        //     4,
        //     5,
        //     7,
        //     11,
        //     18
        //     ...
        //     n
        // ]
        // sorted list of n hashes
        //     00....
        //     00....
        //     01....
        //     01....
        //     02....
        //     03....
        //     03....
        //
        let prefix = oid[0] as usize;
        // low..high (inclusive lower bound, exclusive upper bound)
        let low = if prefix == 0 { 0 } else { self.fanout[prefix - 1] } as u64;
        let high = self.fanout[prefix] as u64;

        let search = |oids: &[Oid]| match oids.binary_search(&oid) {
            Ok(idx) => Ok(low + idx as u64),
            Err(idx) => Err(anyhow!(BitError::ObjectNotFoundInPackIndex(oid, low + idx as u64))),
        };

        let hash = low.mk_fx_hash();
        match self.oid_cache.raw_entry_mut().from_key_hashed_nocheck(hash, &low) {
            RawEntryMut::Occupied(entry) => search(entry.get()),
            RawEntryMut::Vacant(entry) => {
                let oids = match self.version {
                    // oids aren't contiguous in v1 (each is interleaved with its
                    // offset), so read them one record at a time; v1 has no header,
                    // so the fanout table starts at byte 0
                    PackIdxVersion::V1 => {
                        let mut oids = Vec::with_capacity((high - low) as usize);
                        for i in low..high {
                            let offset = FANOUT_SIZE + i * PACK_IDX_V1_ENTRY_SIZE + OFFSET_SIZE;
                            self.reader.seek(SeekFrom::Start(offset))?;
                            oids.push(self.reader.read_type()?);
                        }
                        oids
                    }
                    PackIdxVersion::V2 => {
                        let offset = PACK_IDX_HEADER_SIZE + FANOUT_SIZE + low * OID_SIZE as u64;
                        self.reader.seek(SeekFrom::Start(offset))?;
                        self.reader.read_vec((high - low) as usize).unwrap()
                    }
                };
                search(entry.insert_hashed_nocheck(hash, low, oids).1)
            }
        }
    }
}

impl<R> Deref for PackIndexReader<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<R> DerefMut for PackIndexReader<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}

impl Serialize for PackIndex {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        let mut writer = BufWriter::new(HashWriter::new_sha1(writer));
        writer.write_u32(PACK_IDX_MAGIC)?;
        writer.write_u32(2)?;
        writer.write_iter(&self.fanout)?;
        writer.write_iter(&self.oids)?;
        writer.write_iter(&self.crcs)?;
        writer.write_iter(&self.offsets)?;
        writer.write_iter(&self.large_offsets)?;
        writer.write_oid(self.pack_hash)?;

        match writer.into_inner() {
            Ok(writer) => writer.write_hash()?,
            Err(..) => bail!("hash writer flush failed while writing pack index"),
        };
        Ok(())
    }
}

impl Deserialize for PackIndex {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        let mut r = HashReader::new_sha1(reader);
        let (version, fanout) = Self::parse_header_and_fanout(&mut r)?;
        // the last value of the layer 1 fanout table is the number of
        // hashes we expect as it is cumulative
        let n = fanout[FANOUT_ENTRYC - 1] as usize;

        let (oids, crcs, offsets, large_offsets) = match version {
            PackIdxVersion::V2 => {
                let oids: Vec<Oid> = r.read_vec(n)?;
                debug_assert!(oids.is_sorted());

                let crcs = r.read_vec::<u32>(n)?;
                let offsets = r.read_vec::<u32>(n)?;

                // an offset with its high bit set doesn't encode a byte offset directly;
                // it's an index into the large-offset table that follows
                let n_large = offsets.iter().filter(|&&offset| offset as u64 > MAX_OFFSET).count();
                let large_offsets = r.read_vec::<u64>(n_large)?;
                (oids, crcs, offsets, large_offsets)
            }
            PackIdxVersion::V1 => {
                // interleaved `(u32 offset, 20-byte oid)` records sorted by oid;
                // no crc layer and no extension table (packs > 2GiB aren't representable)
                let mut oids = Vec::with_capacity(n);
                let mut offsets = Vec::with_capacity(n);
                for _ in 0..n {
                    let offset = r.read_u32()?;
                    ensure!(
                        offset as u64 <= MAX_OFFSET,
                        "pack index v1 cannot represent offsets beyond 2GiB"
                    );
                    offsets.push(offset);
                    oids.push(r.read_oid()?);
                }
                debug_assert!(oids.is_sorted());
                (oids, vec![0; n], offsets, vec![])
            }
        };

        let pack_hash = r.read_oid()?;
        let hash = r.finalize_sha1();
        let idx_hash = r.read_oid()?;

        ensure_eq!(idx_hash, hash);
        assert!(r.is_at_eof()?, "trailing bytes after pack index checksum");
        Ok(Self { fanout, oids, crcs, offsets, large_offsets, pack_hash })
    }
}

impl PackIndex {
    /// parses the header and fanout table, reporting which on-disk version was found:
    /// v2 carries an explicit `\xfftOc` magic and version word before the fanout table;
    /// v1 has neither, so its first word on disk *is* `fanout[0]`.
    fn parse_header_and_fanout(
        mut reader: impl BufRead,
    ) -> BitResult<(PackIdxVersion, [u32; FANOUT_ENTRYC])> {
        let first = reader.read_u32()?;
        if first == PACK_IDX_MAGIC {
            let version = reader.read_u32()?;
            ensure_eq!(version, 2);
            Ok((PackIdxVersion::V2, reader.read_array::<u32, FANOUT_ENTRYC>()?))
        } else {
            let mut fanout = [0u32; FANOUT_ENTRYC];
            fanout[0] = first;
            for entry in &mut fanout[1..] {
                *entry = reader.read_u32()?;
            }
            Ok((PackIdxVersion::V1, fanout))
        }
    }
}

pub struct PackfileReader<R> {
    pub(crate) reader: R,
    objectc: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
enum BitPackObjType {
    Commit   = 1,
    Tree     = 2,
    Blob     = 3,
    Tag      = 4,
    OfsDelta = 6,
    RefDelta = 7,
}

impl BitPackObjType {
    pub fn try_from_u8(ty: u8) -> BitResult<Self> {
        BitPackObjType::from_u8(ty).ok_or_else(|| anyhow!("invalid bit pack object type"))
    }
}

impl From<BitPackObjType> for BitObjType {
    fn from(obj_type: BitPackObjType) -> BitObjType {
        match obj_type {
            BitPackObjType::Commit => BitObjType::Commit,
            BitPackObjType::Tree => BitObjType::Tree,
            BitPackObjType::Blob => BitObjType::Blob,
            BitPackObjType::Tag => BitObjType::Tag,
            BitPackObjType::OfsDelta | BitPackObjType::RefDelta => bug!("found delta object type"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
struct BitPackObjHeader {
    obj_type: BitPackObjType,
    size: u64,
}

impl From<BitPackObjHeader> for BitObjHeader {
    fn from(header: BitPackObjHeader) -> BitObjHeader {
        let BitPackObjHeader { obj_type, size } = header;
        Self { obj_type: obj_type.into(), size }
    }
}

impl<R: BufRead> PackfileReader<R> {
    pub fn new(mut reader: R) -> BitResult<Self> {
        let objectc = Self::parse_header(&mut reader)?;
        Ok(Self { reader, objectc })
    }

    fn parse_header(mut reader: impl BufRead) -> BitResult<u32> {
        let sig = reader.read_array::<u8, 4>()?;
        ensure_eq!(&sig, PACK_SIGNATURE, "invalid packfile signature");
        let version = reader.read_u32()?;
        ensure_eq!(version, 2, "invalid packfile version `{}`", version);
        Ok(reader.read_u32()?)
    }

    // 3 bits object type
    // MSB is 1 then read next byte
    // the `size` here is the `size` shown in `git verify-pack` (not the `size-in-packfile`)
    // so the uncompressed size (i.e. we can call `take` on the zlib (decompressed) stream, rather than the compressed stream)
    // https://git-scm.com/docs/git-verify-pack
    #[inline]
    fn read_pack_obj_header(&mut self) -> BitResult<BitPackObjHeader> {
        let (ty, size) = self.read_le_varint_with_shift(3)?;
        let obj_type = BitPackObjType::try_from_u8(ty)?;
        Ok(BitPackObjHeader { obj_type, size })
    }

    fn inflate(&mut self, size: u64) -> BitResult<Vec<u8>> {
        let mut decompressor = Decompress::new(true);
        let mut output = Vec::with_capacity(size as usize);
        loop {
            let input = self.fill_buf()?;
            let at_eof = input.is_empty();
            let in_so_far = decompressor.total_in();
            let flush = if at_eof { FlushDecompress::Finish } else { FlushDecompress::None };
            let status = decompressor.decompress_vec(input, &mut output, flush)?;
            let consumed = decompressor.total_in() - in_so_far;
            self.consume(consumed as usize);
            match status {
                flate2::Status::Ok | flate2::Status::BufError => continue,
                flate2::Status::StreamEnd => break,
            }
        }
        assert_eq!(output.len() as u64, size);
        Ok(output)
    }

    fn read_pack_obj(&mut self) -> BitResult<BitPackObjRawDeltified> {
        let BitPackObjHeader { obj_type, size } = self.read_pack_obj_header()?;
        // the delta types have only the delta compressed but the size/baseoid is not,
        // the 4 base object types have all their data compressed
        // we so we have to treat them a bit differently
        let raw = match obj_type {
            BitPackObjType::Commit
            | BitPackObjType::Tree
            | BitPackObjType::Blob
            | BitPackObjType::Tag => BitPackObjRawDeltified::Raw(BitPackObjRaw {
                obj_type: BitObjType::from(obj_type),
                bytes: self.inflate(size)?,
            }),
            BitPackObjType::OfsDelta =>
                BitPackObjRawDeltified::Ofs(self.read_offset()?, self.inflate(size)?),
            BitPackObjType::RefDelta =>
                BitPackObjRawDeltified::Ref(self.read_oid()?, self.inflate(size)?),
        };

        Ok(raw)
    }

    /// Runs the closure `f` and returns the output of the closure along with the crc of the bytes consumed during it
    fn with_crc32<T>(
        &mut self,
        f: impl FnOnce(&mut PackfileReader<HashReader<Crc32, R>>) -> BitResult<T>,
    ) -> BitResult<(u32, T)> {
        let mut out = MaybeUninit::uninit();
        let mut crc = 0;
        let objectc = self.objectc;
        take_mut::take(&mut self.reader, |reader| {
            let reader: HashReader<Crc32, R> = HashReader::new_crc32(reader);
            let mut this: PackfileReader<HashReader<Crc32, R>> = PackfileReader { reader, objectc };
            out = MaybeUninit::new(f(&mut this));
            crc = this.reader.finalize_crc();
            this.reader.into_inner()
        });
        // SAFETY: out has now been initialized within the take_mut closure
        let out = unsafe { out.assume_init() };
        Ok((crc, out?))
    }

    /// Read the pack object also calculating the crc32 of the compressed data
    fn read_pack_obj_with_crc(&mut self) -> BitResult<(u32, BitPackObjRawDeltified)> {
        self.with_crc32(|this| this.read_pack_obj())
    }
}

impl<R: BufReadSeek> PackfileReader<R> {
    /// seek to `offset` and read pack object header
    #[inline]
    fn read_header_from_offset(&mut self, offset: u64) -> BitResult<BitPackObjHeader> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_pack_obj_header()
    }

    pub fn read_obj_from_offset_raw(&mut self, offset: u64) -> BitResult<BitPackObjRawDeltified> {
        trace!("read_obj_from_offset_raw(offset: {})", offset);
        self.seek(SeekFrom::Start(offset))?;
        self.read_pack_obj()
    }
}

impl<R> Deref for PackfileReader<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<R> DerefMut for PackfileReader<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}

#[cfg(test)]
mod tests;
