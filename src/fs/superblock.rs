use log::debug;
use serde::{Deserialize, Serialize};

use crate::utils::{
    digest,
    time_util::{self, TimeDurationStruct},
    traits::{DigestInSelf, SerializeAndDigest},
};

use super::{BlockBitmap, FsError, Resource, Result};

/// index of a data block in the pool
pub type BlockIndex = u32;

/// The superblock of this filesystem
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SuperBlock {
    /// data block size
    pub block_size: u32,
    /// number of blocks in the data-block pool
    pub num_blocks: u32,
    pub free_blocks: u32,
    pub inode_table_size: u32,
    pub free_inode_count: u32,
    pub created_at: TimeDurationStruct,
    pub modified_at: Option<TimeDurationStruct>,
    /// occupancy of every data block
    pub block_bitmap: BlockBitmap,
    /// to verify the integrity of this superblock
    pub digest: [u8; 32],
}

impl SuperBlock {
    pub fn new(block_size: u32, num_blocks: u32, inode_table_size: u32) -> Self {
        let mut superblock = Self {
            block_size,
            num_blocks,
            free_blocks: num_blocks,
            inode_table_size,
            free_inode_count: inode_table_size,
            created_at: time_util::now(),
            modified_at: None,
            block_bitmap: BlockBitmap::new(num_blocks as usize),
            digest: [0u8; 32],
        };
        superblock.digest();
        superblock
    }

    pub fn update_modified_at(&mut self) {
        self.modified_at = Some(time_util::now());
    }

    /// total size of the simulated volume in bytes
    pub fn volume_size(&self) -> u64 {
        self.block_size as u64 * self.num_blocks as u64
    }

    pub fn used_blocks(&self) -> u32 {
        self.num_blocks - self.free_blocks
    }

    /// check the counters against the bitmap and table capacity
    pub fn is_consistent(&self) -> bool {
        self.block_bitmap.len() == self.num_blocks as usize
            && self.free_blocks as usize == self.block_bitmap.free_count()
            && self.free_inode_count <= self.inode_table_size
    }
}

/// for data block allocation
impl SuperBlock {
    /// allocate the first free data block
    pub fn allocate_block(&mut self) -> Result<BlockIndex> {
        let index = self
            .block_bitmap
            .occupy_first_free()
            .ok_or(FsError::Exhausted(Resource::Block))?;
        self.free_blocks -= 1;
        debug!("allocated block {index}, {} free", self.free_blocks);
        Ok(index as BlockIndex)
    }

    /// release a data block
    ///
    /// out-of-range or already free indices are ignored
    pub fn free_block(&mut self, index: BlockIndex) {
        if self.block_bitmap.release(index as usize) {
            self.free_blocks += 1;
            debug!("freed block {index}, {} free", self.free_blocks);
        }
    }
}

impl DigestInSelf for SuperBlock {
    fn digest(&mut self) {
        self.digest = [0u8; 32];
        self.digest = digest::digest(self).unwrap_or_default();
    }

    fn verify_digest(&mut self) -> bool {
        // get digest from itself
        let digest = self.digest;
        // clear the digest from struct
        self.digest = [0u8; 32];
        let ok = digest::digest(self).map_or(false, |digest2| digest == digest2);
        self.digest = digest;
        ok
    }
}

impl SerializeAndDigest for SuperBlock {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_new_superblock_is_empty() {
        let superblock = SuperBlock::new(4096, 1024, 128);
        assert_eq!(superblock.free_blocks, 1024);
        assert_eq!(superblock.free_inode_count, 128);
        assert_eq!(superblock.volume_size(), 4096 * 1024);
        assert!(superblock.is_consistent());
    }

    #[test]
    fn test_allocate_and_free_keeps_accounting() {
        let mut superblock = SuperBlock::new(512, 8, 4);
        let mut allocated = Vec::new();
        for _ in 0..8 {
            let block = superblock.allocate_block().unwrap();
            assert!(!allocated.contains(&block));
            allocated.push(block);
            assert_eq!(superblock.free_blocks + superblock.used_blocks(), 8);
        }
        assert!(matches!(
            superblock.allocate_block(),
            Err(FsError::Exhausted(Resource::Block))
        ));

        superblock.free_block(3);
        let after_first_free = superblock.clone();
        superblock.free_block(3);
        assert_eq!(superblock, after_first_free);
        superblock.free_block(100);
        assert_eq!(superblock, after_first_free);
        assert_eq!(superblock.free_blocks, 1);
        assert!(superblock.is_consistent());

        assert_eq!(superblock.allocate_block().unwrap(), 3);
    }

    #[test]
    fn test_superblock_serialization_and_digest() -> anyhow::Result<()> {
        let mut superblock = SuperBlock::new(512, 64, 16);
        superblock.allocate_block()?;
        let mut cursor = Cursor::new(Vec::new());
        superblock.serialize_into(&mut cursor)?;
        cursor.set_position(0);
        let decoded = SuperBlock::deserialize_from(&mut cursor)?;
        assert_eq!(decoded.free_blocks, 63);
        assert!(decoded.block_bitmap.is_used(0));

        // flip a counter behind the digest's back
        let mut bytes = cursor.into_inner();
        bytes[4] ^= 0xff;
        assert!(SuperBlock::deserialize_from(&mut Cursor::new(bytes)).is_err());
        Ok(())
    }
}
