use crate::error::BitResult;
use crate::io::{BufReadExt, BufReadExtSized, ReadExt};
use crate::serialize::{Deserialize, DeserializeSized};
use std::io::{BufRead, Read};

#[derive(PartialEq, Clone, Debug)]
pub struct Delta {
    source_size: u64,
    target_size: u64,
    ops: Vec<DeltaOp>,
}

impl Delta {
    pub fn expand(&self, bytes: impl AsRef<[u8]>) -> BitResult<Vec<u8>> {
        trace!(
            "Delta::expand(bytes: ...) (source_size: {} -> target_size: {})",
            self.source_size,
            self.target_size
        );
        let bytes = bytes.as_ref();
        ensure_eq!(
            self.source_size as usize,
            bytes.len(),
            "expected source size to be `{}`, but given source with size `{}`",
            self.source_size,
            bytes.len()
        );

        let mut expanded = Vec::with_capacity(self.target_size as usize);
        for op in &self.ops {
            let slice = match op {
                &DeltaOp::Copy(offset, size) => {
                    let (offset, size) = (offset as usize, size as usize);
                    bytes.get(offset..offset + size).ok_or_else(|| {
                        anyhow!(
                            "delta copy command reads out of bounds of its base (offset {}, size {}, base len {})",
                            offset,
                            size,
                            bytes.len()
                        )
                    })?
                }
                DeltaOp::Insert(slice) => slice,
            };
            expanded.extend_from_slice(slice)
        }

        ensure_eq!(
            self.target_size as usize,
            expanded.len(),
            "expected target size to be `{}`, but got expanded target with size `{}`",
            self.target_size,
            expanded.len()
        );

        Ok(expanded)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeltaOp {
    /// copy (offset, size)
    Copy(u64, u64),
    Insert(Vec<u8>),
}

impl Deserialize for DeltaOp {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        // the MSB of the first byte tells us whether it is a
        // `Copy` or `Insert` instruction
        let byte = reader.read_u8()?;
        if byte & 0x80 != 0 {
            let n = reader.read_le_packed(byte)?;
            // assert highest byte is zero
            debug_assert_eq!(n & 0xFF << 56, 0);
            let (offset, mut size) = (n & 0xFFFFFFFF, n >> 32);
            // 0x10000 is default value for size
            if size == 0 {
                size = 0x10000
            }
            Ok(Self::Copy(offset, size))
        } else {
            reader.read_vec::<u8>(byte as usize & 0x7f).map(Self::Insert)
        }
    }
}

impl DeserializeSized for Delta {
    fn deserialize_sized(r: &mut impl BufRead, size: u64) -> BitResult<Self>
    where
        Self: Sized,
    {
        let source_size = r.read_size()?;
        let target_size = r.read_size()?;
        trace!(
            "Delta::deserialize_sized(size: {}); source_size: {}; target_size: {}",
            size,
            source_size,
            target_size
        );
        let r = &mut r.take(size);
        //? size is definitely an overestimate but maybe its fine
        let mut ops = Vec::with_capacity(size as usize);

        while !r.is_at_eof()? {
            ops.push(DeltaOp::deserialize(r)?);
        }

        Ok(Self { source_size, target_size, ops })
    }
}

#[cfg(test)]
mod tests;
