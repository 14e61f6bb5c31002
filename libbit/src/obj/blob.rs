use super::{BitObjCached, BitObjType, BitObject, ImmutableBitObject, WritableObject};
use crate::error::BitResult;
use crate::io::ReadExt;
use crate::repo::BitRepo;
use crate::serialize::{Deserialize, DeserializeSized, Serialize};
use std::fmt::{self, Display, Formatter};
use std::io::prelude::*;
use std::ops::Deref;

#[derive(PartialEq, Debug, Clone)]
pub struct Blob<'rcx> {
    owner: BitRepo<'rcx>,
    cached: BitObjCached,
    inner: MutableBlob,
}

#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct MutableBlob {
    pub bytes: Vec<u8>,
}

impl MutableBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_reader<R: Read>(mut reader: R) -> BitResult<Self> {
        Ok(Self::new(reader.read_to_vec()?))
    }
}

impl Display for Blob<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl Serialize for Blob<'_> {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        self.inner.serialize(writer)
    }
}

impl Display for MutableBlob {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.bytes) {
            Ok(utf8) => write!(f, "{}", utf8),
            Err(..) => write!(f, "<binary>"),
        }
    }
}

impl Serialize for MutableBlob {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        writer.write_all(&self.bytes)?;
        Ok(())
    }
}

impl DeserializeSized for MutableBlob {
    fn deserialize_sized(reader: &mut impl BufRead, size: u64) -> BitResult<Self> {
        let bytes = reader.take(size).read_to_vec()?;
        Ok(Self::new(bytes))
    }
}

impl WritableObject for MutableBlob {
    fn obj_ty(&self) -> BitObjType {
        BitObjType::Blob
    }
}

impl Deref for Blob<'_> {
    type Target = MutableBlob;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'rcx> BitObject<'rcx> for Blob<'rcx> {
    fn owner(&self) -> BitRepo<'rcx> {
        self.owner
    }

    fn obj_cached(&self) -> &BitObjCached {
        &self.cached
    }
}

impl<'rcx> ImmutableBitObject<'rcx> for Blob<'rcx> {
    type Mutable = MutableBlob;

    fn from_mutable(owner: BitRepo<'rcx>, cached: BitObjCached, inner: Self::Mutable) -> Self {
        Self { owner, cached, inner }
    }
}

// kept to satisfy `Deserialize` for unsized (header-prefixed) contexts, unused by the
// object-loading path which always knows the payload size up front
impl Deserialize for MutableBlob {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self> {
        Ok(Self::new(reader.read_to_vec()?))
    }
}
