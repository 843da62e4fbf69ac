use bitvec::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// occupancy bitmap of the data-block pool, `true` means used
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BlockBitmap {
    bits: BitVec<u8, Lsb0>,
}

/// for serialize and deserialize
///
/// stored as the bit length followed by the raw backing bytes
impl Serialize for BlockBitmap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (self.bits.len() as u64, self.bits.as_raw_slice()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlockBitmap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (len, raw): (u64, Vec<u8>) = Deserialize::deserialize(deserializer)?;
        let mut bits = BitVec::<u8, Lsb0>::from_vec(raw);
        if (len as usize) > bits.len() {
            return Err(serde::de::Error::custom(format!(
                "bitmap claims {len} bits but only {} are stored",
                bits.len()
            )));
        }
        bits.truncate(len as usize);
        Ok(BlockBitmap { bits })
    }
}

impl BlockBitmap {
    /// a bitmap of `len` free blocks
    pub fn new(len: usize) -> Self {
        BlockBitmap {
            bits: bitvec![u8, Lsb0; 0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// check if a block is used
    /// # Params
    /// - `i`: block index, start at 0
    pub fn is_used(&self, i: usize) -> bool {
        self.bits.get(i).as_deref().copied().unwrap_or(false)
    }

    /// calculate the number of free blocks
    pub fn free_count(&self) -> usize {
        self.bits.count_zeros()
    }

    pub fn used_count(&self) -> usize {
        self.bits.count_ones()
    }

    /// occupy the first free block, scanning from index 0
    pub fn occupy_first_free(&mut self) -> Option<usize> {
        let index = self.bits.first_zero()?;
        self.bits.set(index, true);
        Some(index)
    }

    /// mark a block free again
    ///
    /// returns `false` if the index is out of range or the block was already free
    pub fn release(&mut self, index: usize) -> bool {
        if !self.is_used(index) {
            return false;
        }
        self.bits.set(index, false);
        true
    }
}
