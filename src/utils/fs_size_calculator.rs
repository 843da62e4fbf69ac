//! This module contains functions to calculate the size of different fs components

use crate::fs::DIRECT_BLOCKS;

/// calculate how many data blocks a file of `len` bytes occupies
/// # Arguments
/// - `len`: the file size in bytes
/// - `block_size`: the size of a data block
/// # Example
/// ```
/// use simfs::utils::fs_size_calculator::blocks_needed;
/// assert_eq!(blocks_needed(0, 4096), 0);
/// assert_eq!(blocks_needed(1, 4096), 1);
/// assert_eq!(blocks_needed(4096, 4096), 1);
/// assert_eq!(blocks_needed(4097, 4096), 2);
/// ```
pub const fn blocks_needed(len: u64, block_size: u32) -> u64 {
    len.div_ceil(block_size as u64)
}

/// calculate how many block references fit into the indirect index block
/// # Example
/// ```
/// use simfs::utils::fs_size_calculator::pointers_per_block;
/// assert_eq!(pointers_per_block(4096), 1024);
/// ```
pub const fn pointers_per_block(block_size: u32) -> u32 {
    block_size / std::mem::size_of::<u32>() as u32
}

/// the most data blocks one inode can reference: the direct blocks plus
/// everything reachable from the single indirect block
/// # Example
/// ```
/// use simfs::utils::fs_size_calculator::max_file_blocks;
/// use simfs::DIRECT_BLOCKS;
/// assert_eq!(max_file_blocks(512), DIRECT_BLOCKS as u64 + 128);
/// ```
pub const fn max_file_blocks(block_size: u32) -> u64 {
    DIRECT_BLOCKS as u64 + pointers_per_block(block_size) as u64
}

/// calculate the largest file size an inode can describe
/// # Example
/// ```
/// use simfs::utils::fs_size_calculator::max_file_size;
/// assert_eq!(max_file_size(4096), (12 + 1024) * 4096);
/// ```
pub const fn max_file_size(block_size: u32) -> u64 {
    max_file_blocks(block_size) * block_size as u64
}
