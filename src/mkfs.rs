//! create our filesystem
use crate::fs::{Credentials, FileSystem, FsConfig};
use crate::utils::fs_size_calculator::max_file_size;
use anyhow::anyhow;
use byte_unit::{Byte, ByteUnit};
use log::info;
use std::path::Path;

const MIN_BLOCK_SIZE: u32 = 512;
const MAX_BLOCK_SIZE: u32 = 64 * 1024;

/// create a new volume rooted at `root`, given its geometry
/// # Params
/// - `root`: the host directory that will hold file contents and metadata
/// - `block_size`: the data block size, a power of two in 512..=65536
/// - `num_blocks`: the number of data blocks
/// - `inode_count`: the number of inodes
///
/// # Return
/// an [anyhow::Result] type,\
/// which contains the open [FileSystem] if the operation is successful
pub fn mkfs<P>(
    root: P,
    block_size: u32,
    num_blocks: u32,
    inode_count: u32,
    credentials: Credentials,
) -> anyhow::Result<FileSystem>
where
    P: AsRef<Path>,
{
    if !block_size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(anyhow!(
            "block size must be a power of two between {} and {}, got {}",
            Byte::from_bytes(MIN_BLOCK_SIZE as _).get_adjusted_unit(ByteUnit::B),
            Byte::from_bytes(MAX_BLOCK_SIZE as _).get_appropriate_unit(true),
            block_size
        ));
    }
    if num_blocks == 0 || inode_count == 0 {
        return Err(anyhow!(
            "a volume needs at least one data block and one inode"
        ));
    }

    std::fs::create_dir_all(root.as_ref())?;
    let mut config = FsConfig::new(root.as_ref());
    config.block_size = block_size;
    config.num_blocks = num_blocks;
    config.inode_table_size = inode_count;
    let fs = FileSystem::format(config, credentials)?;
    info!(
        "created volume of {} in {}, files up to {}",
        Byte::from_bytes(fs.superblock().volume_size() as _).get_appropriate_unit(true),
        root.as_ref().display(),
        Byte::from_bytes(max_file_size(block_size) as _).get_appropriate_unit(true)
    );
    Ok(fs)
}
