//! what does our filesystem look like in the memory

use std::fs;

use log::{error, info, warn};

use crate::utils::fs_size_calculator;

use super::{
    persistence, Credentials, DirectoryIndex, FileKind, FsConfig, FsError, HostStore,
    IndirectBlock, Inode, InodeTable, Journal, JournalOperation, Mode, Permissions, Resource,
    Result, SuperBlock, DIRECT_BLOCKS,
};

/// every piece of bookkeeping the simulated volume owns
///
/// it has the following parts:
/// - superblock, with the block bitmap
/// - inode table
/// - the flat root directory
#[derive(Debug, Clone, PartialEq)]
pub struct FileSystemState {
    pub superblock: SuperBlock,
    pub inode_table: InodeTable,
    pub directory: DirectoryIndex,
}

impl FileSystemState {
    /// a freshly formatted volume
    pub fn new(config: &FsConfig) -> Self {
        FileSystemState {
            superblock: SuperBlock::new(
                config.block_size,
                config.num_blocks,
                config.inode_table_size,
            ),
            inode_table: InodeTable::new(config.inode_table_size),
            directory: DirectoryIndex::new(config.max_dir_entries),
        }
    }

    /// allocate an inode and charge it to the superblock
    pub fn create_inode(
        &mut self,
        file_kind: FileKind,
        mode: Mode,
        owner_id: u32,
        group_id: u32,
    ) -> Result<usize> {
        if self.superblock.free_inode_count == 0 {
            return Err(FsError::Exhausted(Resource::Inode));
        }
        let inode_number = self
            .inode_table
            .create_inode(file_kind, mode, owner_id, group_id)?;
        self.superblock.free_inode_count -= 1;
        self.superblock.update_modified_at();
        Ok(inode_number)
    }

    /// release an inode, returning its blocks and its slot to the free pools
    pub fn release_inode(&mut self, inode_number: usize) -> Result<()> {
        let mut inode = self.inode_table.release_inode(inode_number)?;
        for block in inode.take_blocks() {
            self.superblock.free_block(block);
        }
        self.superblock.free_inode_count =
            (self.superblock.free_inode_count + 1).min(self.superblock.inode_table_size);
        self.superblock.update_modified_at();
        Ok(())
    }

    /// how many more blocks the inode needs to hold `len` bytes,
    /// the index block included
    fn blocks_to_grow(&self, inode_number: usize, len: u64) -> Result<usize> {
        let block_size = self.superblock.block_size;
        let target = fs_size_calculator::blocks_needed(len, block_size);
        if target > fs_size_calculator::max_file_blocks(block_size) {
            return Err(FsError::FileTooLarge(len));
        }
        let target = target as usize;
        let required = target + usize::from(target > DIRECT_BLOCKS);
        let held = self.inode_table.get(inode_number)?.all_blocks().len();
        Ok(required.saturating_sub(held))
    }

    /// fail unless the inode can grow to `len` bytes
    pub fn check_capacity(&self, inode_number: usize, len: u64) -> Result<()> {
        if self.blocks_to_grow(inode_number, len)? > self.superblock.free_blocks as usize {
            return Err(FsError::Exhausted(Resource::Block));
        }
        Ok(())
    }

    /// make the inode hold exactly enough blocks for `len` bytes
    ///
    /// direct blocks fill first, the rest hang off the single index block
    pub fn resize_blocks(&mut self, inode_number: usize, len: u64) -> Result<()> {
        self.check_capacity(inode_number, len)?;
        let target = fs_size_calculator::blocks_needed(len, self.superblock.block_size) as usize;
        let inode = self.inode_table.get_mut(inode_number)?;
        let mut blocks = inode.data_blocks();
        let index_block = inode.indirect_block.as_ref().map(|i| i.index_block);

        while blocks.len() > target {
            if let Some(block) = blocks.pop() {
                self.superblock.free_block(block);
            }
        }
        while blocks.len() < target {
            blocks.push(self.superblock.allocate_block()?);
        }

        let overflow = blocks.split_off(DIRECT_BLOCKS.min(blocks.len()));
        inode.direct_blocks = [None; DIRECT_BLOCKS];
        for (slot, block) in inode.direct_blocks.iter_mut().zip(blocks) {
            *slot = Some(block);
        }
        inode.indirect_block = match (overflow.is_empty(), index_block) {
            (true, Some(index_block)) => {
                self.superblock.free_block(index_block);
                None
            }
            (true, None) => None,
            (false, index_block) => Some(IndirectBlock {
                index_block: match index_block {
                    Some(block) => block,
                    None => self.superblock.allocate_block()?,
                },
                refs: overflow,
            }),
        };
        inode.file_size = len;
        inode.update_modified_at();
        self.superblock.update_modified_at();
        Ok(())
    }
}

/// one open session on a simulated volume
#[derive(Debug)]
pub struct FileSystem {
    config: FsConfig,
    credentials: Credentials,
    state: FileSystemState,
    journal: Journal,
    host: HostStore,
}

impl FileSystem {
    /// open the volume rooted at `config.root`
    ///
    /// a missing snapshot means a fresh volume, not an error;
    /// a snapshot's geometry overrides the one in `config`
    pub fn open(mut config: FsConfig, credentials: Credentials) -> Result<Self> {
        fs::create_dir_all(config.metadata_dir())?;

        let (superblock, inode_table) = match persistence::load_snapshot(&config.snapshot_path())? {
            Some(loaded) => loaded,
            None => {
                info!("no snapshot under {}, initializing", config.root().display());
                let fresh = FileSystemState::new(&config);
                (fresh.superblock, fresh.inode_table)
            }
        };
        if !superblock.is_consistent()
            || superblock.free_inode_count as usize
                != inode_table.capacity() - inode_table.in_use()
        {
            error!("snapshot counters disagree with its tables");
            return Err(FsError::CorruptSnapshot(
                "free counters do not match the bitmap or inode table".to_string(),
            ));
        }
        config.block_size = superblock.block_size;
        config.num_blocks = superblock.num_blocks;
        config.inode_table_size = superblock.inode_table_size;

        let directory = persistence::load_directory(&config.directory_path())?
            .unwrap_or_else(|| DirectoryIndex::new(config.max_dir_entries));
        config.max_dir_entries = directory.capacity();

        let journal = Journal::open(config.journal_path(), config.journal_size)?;
        if !journal.diagnostics().is_empty() {
            warn!(
                "{} journal lines could not be parsed",
                journal.diagnostics().len()
            );
        }

        info!(
            "opened {} as uid {} gid {}",
            config.root().display(),
            credentials.uid,
            credentials.gid
        );
        Ok(FileSystem {
            host: HostStore::new(config.root()),
            state: FileSystemState {
                superblock,
                inode_table,
                directory,
            },
            journal,
            config,
            credentials,
        })
    }

    /// wipe the metadata under `config.root` and open a fresh volume
    ///
    /// host files already in the root are left alone but no longer tracked
    pub fn format(config: FsConfig, credentials: Credentials) -> Result<Self> {
        let metadata_dir = config.metadata_dir();
        if metadata_dir.exists() {
            warn!("removing existing metadata in {}", metadata_dir.display());
            fs::remove_dir_all(&metadata_dir)?;
        }
        fs::create_dir_all(&metadata_dir)?;
        let mut filesystem = FileSystem {
            host: HostStore::new(config.root()),
            state: FileSystemState::new(&config),
            journal: Journal::open(config.journal_path(), config.journal_size)?,
            config,
            credentials,
        };
        filesystem.journal.flush()?;
        filesystem.sync()?;
        info!("formatted {}", filesystem.config.root().display());
        Ok(filesystem)
    }

    /// write the snapshot and the directory artifact
    pub fn sync(&mut self) -> Result<()> {
        persistence::save_snapshot(
            &self.config.snapshot_path(),
            &mut self.state.superblock,
            &self.state.inode_table,
        )?;
        persistence::save_directory(&self.config.directory_path(), &mut self.state.directory)
    }
}

/// get the parts of this filesystem
impl FileSystem {
    #[inline]
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    #[inline]
    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    /// act as another user from now on
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    #[inline]
    pub fn state(&self) -> &FileSystemState {
        &self.state
    }

    #[inline]
    pub(crate) fn state_mut(&mut self) -> &mut FileSystemState {
        &mut self.state
    }

    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.state.superblock
    }

    #[inline]
    pub fn inode_table(&self) -> &InodeTable {
        &self.state.inode_table
    }

    #[inline]
    pub fn directory(&self) -> &DirectoryIndex {
        &self.state.directory
    }

    #[inline]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    #[inline]
    pub(crate) fn host(&self) -> &HostStore {
        &self.host
    }
}

/// lookups and checks shared by the file operations
impl FileSystem {
    /// resolve a name to its inode number and inode
    pub fn lookup(&self, name: &str) -> Result<(usize, &Inode)> {
        let inode_number = self.state.directory.resolve_name(name)?;
        Ok((inode_number, self.state.inode_table.get(inode_number)?))
    }

    /// fail with [FsError::NotAuthorized] unless the acting user holds `requested`
    pub(crate) fn authorize(
        &self,
        inode_number: usize,
        name: &str,
        requested: Permissions,
        action: &'static str,
    ) -> Result<()> {
        let uid = self.credentials.uid;
        if self.state.inode_table.resolve(inode_number, uid, requested) {
            return Ok(());
        }
        warn!("user {uid} denied {action} on {name}");
        Err(FsError::NotAuthorized {
            uid,
            action,
            name: name.to_string(),
        })
    }

    /// only the owner may change an inode's mode or ACL
    pub(crate) fn authorize_owner(
        &self,
        inode_number: usize,
        name: &str,
        action: &'static str,
    ) -> Result<()> {
        let uid = self.credentials.uid;
        if self.state.inode_table.get(inode_number)?.owner_id == uid {
            return Ok(());
        }
        warn!("user {uid} is not the owner of {name}, {action} denied");
        Err(FsError::NotAuthorized {
            uid,
            action,
            name: name.to_string(),
        })
    }

    /// append to the journal after a successful operation
    ///
    /// the operation already happened, so a failed flush is only logged
    pub(crate) fn record(
        &mut self,
        operation: JournalOperation,
        filename: &str,
        new_filename: Option<&str>,
        data: Option<&str>,
    ) {
        if let Err(e) = self.journal.append(operation, filename, new_filename, data) {
            error!("could not journal {operation} {filename}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{BLOCK_SIZE, DEFAULT_FILE_MODE};
    use tempfile::TempDir;

    fn small_state(num_blocks: u32) -> FileSystemState {
        let mut config = FsConfig::new("/nonexistent");
        config.block_size = 512;
        config.num_blocks = num_blocks;
        config.inode_table_size = 4;
        FileSystemState::new(&config)
    }

    fn file_mode() -> Mode {
        Mode::new(DEFAULT_FILE_MODE as u32).unwrap()
    }

    #[test]
    fn test_create_delete_reuses_inode_zero() {
        let mut config = FsConfig::new("/nonexistent");
        config.block_size = BLOCK_SIZE;
        let mut state = FileSystemState::new(&config);
        let ino = state
            .create_inode(FileKind::RegularFile, file_mode(), 11, 10)
            .unwrap();
        assert_eq!(ino, 0);
        state.resize_blocks(ino, 3 * BLOCK_SIZE as u64).unwrap();
        assert_eq!(state.superblock.used_blocks(), 3);

        state.release_inode(0).unwrap();
        assert_eq!(state.superblock.used_blocks(), 0);
        assert_eq!(state.superblock.free_inode_count, config.inode_table_size);

        let again = state
            .create_inode(FileKind::RegularFile, file_mode(), 11, 10)
            .unwrap();
        assert_eq!(again, 0);
        let inode = state.inode_table.get(0).unwrap();
        assert_eq!(inode.file_size, 0);
        assert!(inode.direct_blocks.iter().all(Option::is_none));
        assert!(inode.indirect_block.is_none());
    }

    #[test]
    fn test_inode_counter_limits_creation() {
        let mut state = small_state(16);
        for _ in 0..4 {
            state
                .create_inode(FileKind::RegularFile, file_mode(), 11, 10)
                .unwrap();
        }
        assert!(matches!(
            state.create_inode(FileKind::RegularFile, file_mode(), 11, 10),
            Err(FsError::Exhausted(Resource::Inode))
        ));
        state.release_inode(2).unwrap();
        assert_eq!(
            state
                .create_inode(FileKind::Directory, file_mode(), 11, 10)
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_resize_uses_index_block_past_direct_blocks() {
        let mut state = small_state(64);
        let ino = state
            .create_inode(FileKind::RegularFile, file_mode(), 11, 10)
            .unwrap();
        // 14 data blocks: 12 direct, 2 behind the index block
        state.resize_blocks(ino, 13 * 512 + 1).unwrap();
        let inode = state.inode_table.get(ino).unwrap();
        assert!(inode.direct_blocks.iter().all(Option::is_some));
        assert_eq!(inode.indirect_block.as_ref().map(|i| i.refs.len()), Some(2));
        assert_eq!(inode.block_count(), 14);
        assert_eq!(state.superblock.used_blocks(), 15);
        assert!(state.superblock.is_consistent());

        // shrink back under the direct limit, the index block goes too
        state.resize_blocks(ino, 512).unwrap();
        let inode = state.inode_table.get(ino).unwrap();
        assert_eq!(inode.block_count(), 1);
        assert!(inode.indirect_block.is_none());
        assert_eq!(state.superblock.used_blocks(), 1);

        state.resize_blocks(ino, 0).unwrap();
        assert_eq!(state.superblock.used_blocks(), 0);
    }

    #[test]
    fn test_resize_checks_budget_first() {
        let mut state = small_state(4);
        let ino = state
            .create_inode(FileKind::RegularFile, file_mode(), 11, 10)
            .unwrap();
        let before = state.clone();
        assert!(matches!(
            state.resize_blocks(ino, 5 * 512),
            Err(FsError::Exhausted(Resource::Block))
        ));
        assert_eq!(state, before);
        assert!(matches!(
            state.check_capacity(ino, fs_size_calculator::max_file_size(512) + 1),
            Err(FsError::FileTooLarge(_))
        ));
    }

    #[test]
    fn test_open_sync_reopen() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config = FsConfig::new(dir.path());
        {
            let mut fs = FileSystem::open(config.clone(), Credentials::default())?;
            let ino = fs.state_mut().create_inode(
                FileKind::RegularFile,
                file_mode(),
                11,
                10,
            )?;
            fs.state_mut().directory.insert("a.txt", ino)?;
            fs.sync()?;
        }
        let fs = FileSystem::open(config, Credentials::default())?;
        assert_eq!(fs.directory().entry("a.txt"), Some(0));
        assert_eq!(fs.inode_table().in_use(), 1);
        assert_eq!(fs.superblock().free_inode_count, 127);
        Ok(())
    }

    #[test]
    fn test_format_discards_metadata() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config = FsConfig::new(dir.path());
        let mut fs = FileSystem::open(config.clone(), Credentials::default())?;
        fs.state_mut()
            .create_inode(FileKind::RegularFile, file_mode(), 11, 10)?;
        fs.sync()?;

        let fs = FileSystem::format(config, Credentials::default())?;
        assert_eq!(fs.inode_table().in_use(), 0);
        assert!(fs.journal().is_empty());
        assert!(fs.config().snapshot_path().exists());
        Ok(())
    }
}
