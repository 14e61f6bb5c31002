use crate::error::BitGenericError;
use crate::error::BitResult;
use crate::obj::Oid;
use crate::serialize::Deserialize;
use crate::serialize::Serialize;
use crate::signature::BitSignature;
use std::io::BufRead;
use std::io::Write;
use std::ops::Deref;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct BitReflogEntry {
    pub old_oid: Oid,
    pub new_oid: Oid,
    pub committer: BitSignature,
    pub message: String,
}

impl Serialize for BitReflogEntry {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        Ok(writeln!(
            writer,
            "{} {} {}\t{}",
            self.old_oid, self.new_oid, self.committer, self.message
        )?)
    }
}

/// append-only log of the values a reference has taken on, oldest first.
/// stored at `.git/logs/<ref-path>`, one line per update.
#[derive(Debug, Default, Clone)]
pub struct BitReflog {
    // stored newest-first so `reflog[0]` is the most recent entry, matching
    // the `@{n}` revision syntax (`@{0}` is the current value)
    entries: Vec<BitReflogEntry>,
}

impl BitReflog {
    pub fn append(&mut self, old_oid: Oid, new_oid: Oid, committer: BitSignature, message: String) {
        self.entries.insert(0, BitReflogEntry { old_oid, new_oid, committer, message })
    }
}

impl Deref for BitReflog {
    type Target = [BitReflogEntry];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl FromStr for BitReflogEntry {
    type Err = BitGenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (old_oid, s) =
            s.split_once(' ').ok_or_else(|| anyhow!("malformed reflog line `{}`", s))?;
        let (new_oid, s) =
            s.split_once(' ').ok_or_else(|| anyhow!("malformed reflog line `{}`", s))?;
        let (committer, message) =
            s.split_once('\t').ok_or_else(|| anyhow!("malformed reflog line `{}`", s))?;
        Ok(Self {
            old_oid: old_oid.parse()?,
            new_oid: new_oid.parse()?,
            committer: committer.parse()?,
            message: message.to_owned(),
        })
    }
}

impl FromStr for BitReflog {
    type Err = BitGenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // on disk, oldest entry first; we keep the reverse (newest first) in memory
        // so `reflog[n]` matches the `@{n}` revision syntax
        let lines = s.lines().collect::<Vec<_>>();
        let mut entries = vec![];
        for (i, line) in lines.iter().enumerate() {
            match BitReflogEntry::from_str(line) {
                Ok(entry) => entries.push(entry),
                // a writer appends its line in multiple syscalls, so a reader racing an
                // in-progress append can observe a truncated final line; anything short of
                // the last line failing to parse means the file itself is corrupted
                Err(err) if i + 1 == lines.len() => {
                    warn!("ignoring truncated trailing reflog entry `{}`: {}", line, err);
                }
                Err(err) => return Err(err),
            }
        }
        entries.reverse();
        Ok(Self { entries })
    }
}

impl Serialize for BitReflog {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        for entry in self.entries.iter().rev() {
            entry.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for BitReflog {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        let mut s = String::new();
        reader.read_to_string(&mut s)?;
        Self::from_str(&s)
    }
}
