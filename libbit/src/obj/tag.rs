use super::{BitObjCached, BitObjType, BitObject, ImmutableBitObject, Oid, WritableObject};
use crate::error::BitResult;
use crate::repo::BitRepo;
use crate::serialize::{Deserialize, DeserializeSized, Serialize};
use crate::signature::BitSignature;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::io::prelude::*;
use std::ops::Deref;

/// an annotated tag: unlike a lightweight ref under `refs/tags`, this is its own
/// object with a message and tagger identity, pointing at the object it tags.
#[derive(PartialEq, Clone, Debug)]
pub struct Tag<'rcx> {
    owner: BitRepo<'rcx>,
    cached: BitObjCached,
    inner: MutableTag,
}

#[derive(PartialEq, Clone, Debug)]
pub struct MutableTag {
    pub target: Oid,
    pub target_type: BitObjType,
    pub tag: String,
    pub tagger: Option<BitSignature>,
    pub message: String,
}

impl Deref for Tag<'_> {
    type Target = MutableTag;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Display for Tag<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl Display for MutableTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut buf = vec![];
        self.serialize(&mut buf).unwrap();
        write!(f, "{}", std::str::from_utf8(&buf).unwrap())
    }
}

impl Serialize for Tag<'_> {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        self.inner.serialize(writer)
    }
}

impl WritableObject for MutableTag {
    fn obj_ty(&self) -> BitObjType {
        BitObjType::Tag
    }
}

impl Serialize for MutableTag {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        writeln!(writer, "object {}", self.target)?;
        writeln!(writer, "type {}", self.target_type)?;
        writeln!(writer, "tag {}", self.tag)?;
        if let Some(tagger) = &self.tagger {
            writeln!(writer, "tagger {}", tagger)?;
        }
        writeln!(writer)?;
        write!(writer, "{}", self.message)?;
        Ok(())
    }
}

impl Deserialize for MutableTag {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self> {
        Self::deserialize_sized(reader, u64::MAX)
    }
}

impl DeserializeSized for MutableTag {
    fn deserialize_sized(r: &mut impl BufRead, size: u64) -> BitResult<Self> {
        let mut lines = r.take(size).lines();
        let mut attrs = HashMap::new();

        while let Some(line) = lines.next() {
            let line = line?;
            if line.is_empty() {
                break;
            }
            let (k, v) =
                line.split_once(' ').unwrap_or_else(|| panic!("failed to parse line `{}`", line));
            attrs.insert(k.to_owned(), v.to_owned());
        }

        let message = lines.collect::<Result<Vec<_>, _>>()?.join("\n");

        let target = attrs["object"].parse()?;
        let target_type = attrs["type"].parse()?;
        let tag = attrs["tag"].clone();
        let tagger = attrs.get("tagger").map(|s| s.parse()).transpose()?;
        Ok(Self { target, target_type, tag, tagger, message })
    }
}

impl<'rcx> BitObject<'rcx> for Tag<'rcx> {
    fn owner(&self) -> BitRepo<'rcx> {
        self.owner
    }

    fn obj_cached(&self) -> &BitObjCached {
        &self.cached
    }
}

impl<'rcx> ImmutableBitObject<'rcx> for Tag<'rcx> {
    type Mutable = MutableTag;

    fn from_mutable(owner: BitRepo<'rcx>, cached: BitObjCached, inner: Self::Mutable) -> Self {
        Self { owner, cached, inner }
    }
}
