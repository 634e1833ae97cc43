//! Order preserving key encoding. Integers are fixed-width big-endian, so byte order equals
//! value order and range scans walk keys in priority order.

use anyhow::anyhow;
use committee_primitives::{BatchId, BlockId, Hash, ShardId, TaskId};
use committee_task_types::TaskType;

/// Key whose encoded bytes sort the same way as its values.
pub(crate) trait LexicographicKey: Sized {
    fn encode_lexicographic(&self, out: &mut Vec<u8>);
    fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self>;
}

pub(crate) fn encode_key<T: LexicographicKey>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    value.encode_lexicographic(&mut out);
    out
}

/// Decodes a whole key; trailing bytes are an error.
pub(crate) fn decode_key<T: LexicographicKey>(data: &[u8]) -> anyhow::Result<T> {
    let mut remaining = data;
    let value = T::decode_lexicographic(&mut remaining)?;
    if !remaining.is_empty() {
        return Err(anyhow!("lexicographic key has trailing bytes"));
    }
    Ok(value)
}

pub(crate) fn read_exact<const N: usize>(data: &mut &[u8]) -> anyhow::Result<[u8; N]> {
    if data.len() < N {
        return Err(anyhow!(
            "lexicographic key underflow: need {N} bytes, got {}",
            data.len()
        ));
    }
    let (prefix, rest) = data.split_at(N);
    *data = rest;
    let mut out = [0u8; N];
    out.copy_from_slice(prefix);
    Ok(out)
}

impl LexicographicKey for () {
    fn encode_lexicographic(&self, _out: &mut Vec<u8>) {}

    fn decode_lexicographic(_data: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(())
    }
}

impl LexicographicKey for u8 {
    fn encode_lexicographic(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(read_exact::<1>(data)?[0])
    }
}

macro_rules! impl_big_endian_key {
    ($($int:ty),*) => {$(
        impl LexicographicKey for $int {
            fn encode_lexicographic(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }

            fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self> {
                Ok(<$int>::from_be_bytes(read_exact(data)?))
            }
        }
    )*};
}

impl_big_endian_key!(u32, u64);

impl LexicographicKey for Hash {
    fn encode_lexicographic(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_ref());
    }

    fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Hash::new(read_exact::<32>(data)?))
    }
}

impl LexicographicKey for ShardId {
    fn encode_lexicographic(&self, out: &mut Vec<u8>) {
        self.0.encode_lexicographic(out);
    }

    fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(ShardId(u32::decode_lexicographic(data)?))
    }
}

// uuid v7 bytes sort by creation time
macro_rules! impl_uuid_key {
    ($($id:ty),*) => {$(
        impl LexicographicKey for $id {
            fn encode_lexicographic(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(self.as_bytes());
            }

            fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self> {
                Ok(<$id>::from_bytes(read_exact(data)?))
            }
        }
    )*};
}

impl_uuid_key!(TaskId, BatchId);

impl LexicographicKey for TaskType {
    fn encode_lexicographic(&self, out: &mut Vec<u8>) {
        self.as_u8().encode_lexicographic(out);
    }

    fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self> {
        let tag = u8::decode_lexicographic(data)?;
        TaskType::from_u8(tag).ok_or_else(|| anyhow!("unknown TaskType tag {tag}"))
    }
}

impl LexicographicKey for BlockId {
    fn encode_lexicographic(&self, out: &mut Vec<u8>) {
        self.shard_id.encode_lexicographic(out);
        self.hash.encode_lexicographic(out);
    }

    fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self> {
        let shard_id = ShardId::decode_lexicographic(data)?;
        let hash = Hash::decode_lexicographic(data)?;
        Ok(BlockId::new(shard_id, hash))
    }
}
