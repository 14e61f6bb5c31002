use super::{BitObjCached, BitObjType, BitObject, ImmutableBitObject, Oid, WritableObject};
use crate::error::BitResult;
use crate::repo::BitRepo;
use crate::serialize::{Deserialize, DeserializeSized, Serialize};
use crate::signature::BitSignature;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::io::prelude::*;
use std::ops::Deref;

#[derive(PartialEq, Clone, Debug)]
pub struct Commit<'rcx> {
    owner: BitRepo<'rcx>,
    cached: BitObjCached,
    inner: MutableCommit,
}

#[derive(PartialEq, Clone, Debug)]
pub struct MutableCommit {
    pub tree: Oid,
    pub author: BitSignature,
    pub committer: BitSignature,
    pub message: String,
    /// zero or more, in the order they appear in the commit header; more than one
    /// parent marks a merge commit
    pub parents: Vec<Oid>,
    pub gpgsig: Option<String>,
}

impl MutableCommit {
    pub fn new(
        tree: Oid,
        parents: Vec<Oid>,
        author: BitSignature,
        committer: BitSignature,
        message: String,
    ) -> Self {
        Self { tree, parents, author, committer, message, gpgsig: None }
    }
}

impl<'rcx> Deref for Commit<'rcx> {
    type Target = MutableCommit;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'rcx> BitObject<'rcx> for Commit<'rcx> {
    fn owner(&self) -> BitRepo<'rcx> {
        self.owner
    }

    fn obj_cached(&self) -> &BitObjCached {
        &self.cached
    }
}

impl<'rcx> ImmutableBitObject<'rcx> for Commit<'rcx> {
    type Mutable = MutableCommit;

    fn from_mutable(owner: BitRepo<'rcx>, cached: BitObjCached, inner: Self::Mutable) -> Self {
        Self { owner, cached, inner }
    }
}

impl Display for Commit<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl Display for MutableCommit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut buf = vec![];
        self.serialize(&mut buf).unwrap();
        write!(f, "{}", std::str::from_utf8(&buf).unwrap())
    }
}

impl Serialize for Commit<'_> {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        self.inner.serialize(writer)
    }
}

impl WritableObject for MutableCommit {
    fn obj_ty(&self) -> BitObjType {
        BitObjType::Commit
    }
}

impl Serialize for MutableCommit {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        // adds the required leading space for multiline strings (gpg signatures span lines)
        macro_rules! w {
            ($s:expr) => {
                writeln!(writer, "{}", $s.replace('\n', "\n "))
            };
        }

        w!(format!("tree {}", self.tree))?;
        for parent in &self.parents {
            w!(format!("parent {}", parent))?;
        }
        w!(format!("author {}", self.author))?;
        w!(format!("committer {}", self.committer))?;
        if let Some(gpgsig) = &self.gpgsig {
            w!(format!("gpgsig {}", gpgsig))?;
        }

        writeln!(writer)?;
        write!(writer, "{}", self.message)?;
        Ok(())
    }
}

impl Deserialize for MutableCommit {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self> {
        Self::deserialize_sized(reader, u64::MAX)
    }
}

impl DeserializeSized for MutableCommit {
    fn deserialize_sized(r: &mut impl BufRead, size: u64) -> BitResult<Self> {
        let mut lines = r.take(size).lines();
        let mut attrs: HashMap<String, Vec<String>> = HashMap::new();

        let mut key: Option<String> = None;
        let mut value: Option<String> = None;

        while let Some(line) = lines.next() {
            let line = line?;

            // line is a continuation of the previous line
            if let Some(v) = &mut value {
                if line.starts_with(' ') {
                    v.push('\n');
                    v.push_str(&line[1..]);
                    continue;
                } else {
                    attrs.entry(key.take().unwrap()).or_default().push(value.take().unwrap());
                }
            }

            // everything after the current (blank) line is part of the message
            if line.is_empty() {
                break;
            }

            let (k, v) =
                line.split_once(' ').unwrap_or_else(|| panic!("failed to parse line `{}`", line));
            key = Some(k.to_owned());
            value = Some(v.to_owned());
        }
        if let (Some(key), Some(value)) = (key, value) {
            attrs.entry(key).or_default().push(value);
        }

        let message = lines.collect::<Result<Vec<_>, _>>()?.join("\n");

        let tree = attrs["tree"][0].parse()?;
        let parents = attrs
            .get("parent")
            .map(|ps| ps.iter().map(|p| p.parse()).collect::<Result<Vec<_>, _>>())
            .transpose()?
            .unwrap_or_default();
        let author = attrs["author"][0].parse()?;
        let committer = attrs["committer"][0].parse()?;
        let gpgsig = attrs.get("gpgsig").map(|sig| sig[0].clone());
        Ok(Self { tree, parents, author, committer, message, gpgsig })
    }
}

#[cfg(test)]
mod tests;
