//! the on-disk snapshot of the superblock and inode table, plus the directory artifact
//!
//! snapshot layout: the superblock, then `inode_table_size` inode slots in slot order.
//! There is no version header, a layout change breaks old snapshots.
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use log::{debug, info};

use crate::utils::traits::SerializeAndDigest;

use super::{DirectoryIndex, InodeSlot, InodeTable, Result, SuperBlock};

/// overwrite the snapshot at `path`
pub(crate) fn save_snapshot(
    path: &Path,
    superblock: &mut SuperBlock,
    inode_table: &InodeTable,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    superblock.serialize_into(&mut writer)?;
    let config = bincode::config::legacy();
    for slot in inode_table.slots() {
        bincode::serde::encode_into_std_write(slot, &mut writer, config)?;
    }
    writer.flush()?;
    debug!(
        "saved snapshot with {} of {} inodes in use to {}",
        inode_table.in_use(),
        inode_table.capacity(),
        path.display()
    );
    Ok(())
}

/// load the snapshot at `path`, `None` if there is none yet
pub(crate) fn load_snapshot(path: &Path) -> Result<Option<(SuperBlock, InodeTable)>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = BufReader::new(File::open(path)?);
    let superblock = SuperBlock::deserialize_from(&mut reader)?;
    let config = bincode::config::legacy();
    let slots = (0..superblock.inode_table_size)
        .map(|_| bincode::serde::decode_from_std_read::<InodeSlot, _, _>(&mut reader, config))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    info!(
        "loaded snapshot from {}: {} blocks, {} free",
        path.display(),
        superblock.num_blocks,
        superblock.free_blocks
    );
    Ok(Some((superblock, InodeTable::from_slots(slots))))
}

pub(crate) fn save_directory(path: &Path, directory: &mut DirectoryIndex) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    directory.serialize_into(&mut writer)?;
    writer.flush()?;
    debug!(
        "saved {} directory entries to {}",
        directory.len(),
        path.display()
    );
    Ok(())
}

pub(crate) fn load_directory(path: &Path) -> Result<Option<DirectoryIndex>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = BufReader::new(File::open(path)?);
    Ok(Some(DirectoryIndex::deserialize_from(&mut reader)?))
}
