use std::path::{Path, PathBuf};

use super::{BLOCK_SIZE, INODE_TABLE_SIZE, JOURNAL_SIZE, MAX_FILES, NUM_BLOCKS};

pub const METADATA_DIR: &str = ".simfs";
pub const SNAPSHOT_FILENAME: &str = "file_system_state.dat";
pub const DIRECTORY_FILENAME: &str = "directory.dat";
pub const JOURNAL_FILENAME: &str = "journal.log";

/// uid of the acting user when the caller does not say otherwise
pub const DEFAULT_USER_ID: u32 = 11;
pub const DEFAULT_GROUP_ID: u32 = 10;

/// geometry of the simulated volume and where its artifacts live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsConfig {
    /// host directory holding the real file contents
    pub root: PathBuf,
    pub block_size: u32,
    pub num_blocks: u32,
    pub inode_table_size: u32,
    pub max_dir_entries: usize,
    pub journal_size: usize,
}

impl FsConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsConfig {
            root: root.into(),
            block_size: BLOCK_SIZE,
            num_blocks: NUM_BLOCKS,
            inode_table_size: INODE_TABLE_SIZE,
            max_dir_entries: MAX_FILES,
            journal_size: JOURNAL_SIZE,
        }
    }

    /// directory for the snapshot, directory index and journal
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.metadata_dir().join(SNAPSHOT_FILENAME)
    }

    pub fn directory_path(&self) -> PathBuf {
        self.metadata_dir().join(DIRECTORY_FILENAME)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.metadata_dir().join(JOURNAL_FILENAME)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// identity of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials {
            uid: DEFAULT_USER_ID,
            gid: DEFAULT_GROUP_ID,
        }
    }
}

impl Credentials {
    pub fn new(uid: u32, gid: u32) -> Self {
        Credentials { uid, gid }
    }

    /// the effective uid and gid of this process
    pub fn current() -> Self {
        Credentials {
            uid: users::get_effective_uid(),
            gid: users::get_effective_gid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths() {
        let config = FsConfig::new("/tmp/simfs-root");
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.num_blocks, 1024);
        assert_eq!(
            config.journal_path(),
            PathBuf::from("/tmp/simfs-root/.simfs/journal.log")
        );
        assert_eq!(
            config.snapshot_path(),
            PathBuf::from("/tmp/simfs-root/.simfs/file_system_state.dat")
        );
    }
}
