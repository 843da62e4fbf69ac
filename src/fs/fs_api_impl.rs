use std::fmt;

use byte_unit::Byte;
use log::{debug, info, warn};

use crate::utils::time_util::TimeDurationStruct;

use super::{
    validate_name, AclEntry, FileKind, FileSystem, FsError, InodeTable, JournalOperation, Mode,
    Permissions, Resource, Result, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, METADATA_DIR,
};

/// what `stat` and `ls` report for one directory entry
#[derive(Debug, Clone, PartialEq)]
pub struct FileDetails {
    pub name: String,
    pub inode_number: usize,
    pub file_kind: FileKind,
    pub size: u64,
    pub blocks: usize,
    pub mode: Mode,
    pub owner_id: u32,
    pub group_id: u32,
    pub acl: Vec<AclEntry>,
    pub created_at: TimeDurationStruct,
    pub accessed_at: TimeDurationStruct,
    pub modified_at: TimeDurationStruct,
    pub metadata_changed_at: TimeDurationStruct,
}

impl FileDetails {
    /// `drwxr-xr-x` style
    pub fn permission_string(&self) -> String {
        format!("{}{}", self.file_kind.type_char(), self.mode.to_rwx())
    }
}

impl fmt::Display for FileDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>5} {:>5} {:>10} {} {}",
            self.permission_string(),
            self.owner_id,
            self.group_id,
            self.size,
            self.modified_at.format_minutes(),
            self.name
        )
    }
}

/// capacity summary of the volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub volume_size: u64,
    pub files: usize,
}

impl fmt::Display for FsStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "volume size: {}",
            Byte::from_bytes(self.volume_size as _).get_appropriate_unit(true)
        )?;
        writeln!(f, "block size:  {}", self.block_size)?;
        writeln!(
            f,
            "blocks:      {} total, {} used, {} free",
            self.total_blocks,
            self.total_blocks - self.free_blocks,
            self.free_blocks
        )?;
        writeln!(
            f,
            "inodes:      {} total, {} used, {} free",
            self.total_inodes,
            self.total_inodes - self.free_inodes,
            self.free_inodes
        )?;
        write!(f, "entries:     {}", self.files)
    }
}

/// names the host root may hold but the volume never tracks
pub(super) fn check_name(name: &str) -> Result<()> {
    validate_name(name)?;
    if name == METADATA_DIR {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// bookkeeping steps, shared by the public operations and journal replay;
/// none of them checks permissions or touches the journal
impl FileSystem {
    /// track a host entry that already exists
    pub(crate) fn register(&mut self, name: &str, file_kind: FileKind) -> Result<usize> {
        check_name(name)?;
        let mode = match file_kind {
            FileKind::RegularFile => DEFAULT_FILE_MODE,
            FileKind::Directory => DEFAULT_DIR_MODE,
        };
        let credentials = self.credentials();
        let state = self.state_mut();
        let inode_number = state.create_inode(
            file_kind,
            Mode::new(mode as u32)?,
            credentials.uid,
            credentials.gid,
        )?;
        if let Err(e) = state.directory.insert(name, inode_number) {
            state.release_inode(inode_number)?;
            return Err(e);
        }
        Ok(inode_number)
    }

    /// forget a tracked entry, its inode and blocks
    pub(crate) fn unregister(&mut self, name: &str) -> Result<()> {
        let state = self.state_mut();
        let inode_number = state.directory.resolve_name(name)?;
        state.release_inode(inode_number)?;
        state.directory.remove(name)?;
        Ok(())
    }

    /// create on the host, then track it
    pub(crate) fn apply_create(&mut self, name: &str, file_kind: FileKind) -> Result<usize> {
        check_name(name)?;
        let state = self.state();
        if state.directory.contains(name) {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        if state.directory.len() >= state.directory.capacity() {
            return Err(FsError::DirectoryFull(state.directory.capacity()));
        }
        if state.superblock.free_inode_count == 0 {
            return Err(FsError::Exhausted(Resource::Inode));
        }
        match file_kind {
            FileKind::RegularFile => self.host().create_file(name)?,
            FileKind::Directory => self.host().create_dir(name)?,
        }
        self.register(name, file_kind).or_else(|e| {
            warn!("rolling back host {file_kind} {name}: {e}");
            match file_kind {
                FileKind::RegularFile => self.host().remove_file(name)?,
                FileKind::Directory => self.host().remove_dir(name)?,
            }
            Err(e)
        })
    }

    /// remove from the host, then forget it
    pub(crate) fn apply_delete(&mut self, name: &str) -> Result<()> {
        let (_, inode) = self.lookup(name)?;
        match inode.file_kind {
            FileKind::RegularFile => self.host().remove_file(name)?,
            FileKind::Directory => self.host().remove_dir(name)?,
        }
        self.unregister(name)
    }

    pub(crate) fn apply_rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        check_name(new_name)?;
        self.directory().resolve_name(old_name)?;
        if self.directory().contains(new_name) || self.host().exists(new_name) {
            return Err(FsError::AlreadyExists(new_name.to_string()));
        }
        self.host().rename(old_name, new_name)?;
        self.state_mut().directory.rename(old_name, new_name)
    }

    pub(crate) fn apply_write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let (inode_number, inode) = self.lookup(name)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory(name.to_string()));
        }
        let len = data.len() as u64;
        self.state().check_capacity(inode_number, len)?;
        self.host().write(name, data)?;
        self.state_mut().resize_blocks(inode_number, len)
    }
}

/// file operations on the root directory
///
/// each checks names and permissions, performs the host step, updates the
/// bookkeeping and only then appends to the journal
impl FileSystem {
    pub fn create_file(&mut self, name: &str) -> Result<usize> {
        let inode_number = self.apply_create(name, FileKind::RegularFile)?;
        self.record(JournalOperation::Create, name, None, None);
        info!("created file {name} as inode {inode_number}");
        Ok(inode_number)
    }

    pub fn create_directory(&mut self, name: &str) -> Result<usize> {
        let inode_number = self.apply_create(name, FileKind::Directory)?;
        self.record(JournalOperation::Create, name, None, Some("dir"));
        info!("created directory {name} as inode {inode_number}");
        Ok(inode_number)
    }

    fn delete(&mut self, name: &str, expected: FileKind) -> Result<()> {
        let (inode_number, inode) = self.lookup(name)?;
        match (expected, inode.file_kind) {
            (FileKind::RegularFile, FileKind::Directory) => {
                return Err(FsError::IsADirectory(name.to_string()))
            }
            (FileKind::Directory, FileKind::RegularFile) => {
                return Err(FsError::NotADirectory(name.to_string()))
            }
            _ => {}
        }
        self.authorize(inode_number, name, Permissions::WRITE, "delete")?;
        self.apply_delete(name)?;
        self.record(JournalOperation::Delete, name, None, None);
        info!("deleted {expected} {name}");
        Ok(())
    }

    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        self.delete(name, FileKind::RegularFile)
    }

    /// the host refuses to remove a non-empty directory
    pub fn delete_directory(&mut self, name: &str) -> Result<()> {
        self.delete(name, FileKind::Directory)
    }

    pub fn rename_file(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let (inode_number, _) = self.lookup(old_name)?;
        self.authorize(inode_number, old_name, Permissions::WRITE, "rename")?;
        self.apply_rename(old_name, new_name)?;
        self.record(JournalOperation::Rename, old_name, Some(new_name), None);
        info!("renamed {old_name} to {new_name}");
        Ok(())
    }

    /// replace the whole content of a file
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let (inode_number, _) = self.lookup(name)?;
        self.authorize(inode_number, name, Permissions::WRITE, "write")?;
        self.apply_write(name, data)?;
        let payload = String::from_utf8_lossy(data);
        self.record(JournalOperation::Modify, name, None, Some(&payload));
        info!("wrote {} bytes to {name}", data.len());
        Ok(())
    }

    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let (inode_number, inode) = self.lookup(name)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory(name.to_string()));
        }
        self.authorize(inode_number, name, Permissions::READ, "read")?;
        let content = self.host().read(name)?;
        self.state_mut()
            .inode_table
            .get_mut(inode_number)?
            .update_accessed_at();
        self.record(JournalOperation::Read, name, None, None);
        debug!("read {} bytes from {name}", content.len());
        Ok(content)
    }

    /// change one inode's metadata and save it right away;
    /// the inode is restored if the save fails
    fn commit_inode_change<T>(
        &mut self,
        inode_number: usize,
        change: impl FnOnce(&mut InodeTable) -> Result<T>,
    ) -> Result<T> {
        let before = self.inode_table().get(inode_number)?.clone();
        let outcome = change(&mut self.state_mut().inode_table)?;
        if let Err(e) = self.sync() {
            warn!("could not save inode {inode_number}, rolling back: {e}");
            *self.state_mut().inode_table.get_mut(inode_number)? = before;
            return Err(e);
        }
        Ok(outcome)
    }

    /// set the 9-bit mode; only the owner may do this
    pub fn change_permissions(&mut self, name: &str, mode: u32) -> Result<()> {
        let (inode_number, _) = self.lookup(name)?;
        self.authorize_owner(inode_number, name, "chmod")?;
        self.commit_inode_change(inode_number, |table| table.set_mode(inode_number, mode))?;
        let octal = format!("{mode:o}");
        self.record(JournalOperation::ChangePermissions, name, Some(&octal), None);
        Ok(())
    }

    /// grant `user_id` extra permissions, replacing any entry it already has
    ///
    /// ACL changes are saved straight to the snapshot, the journal has no
    /// operation for them
    pub fn set_acl(&mut self, name: &str, user_id: u32, permissions: u32) -> Result<()> {
        let (inode_number, _) = self.lookup(name)?;
        self.authorize_owner(inode_number, name, "change the ACL of")?;
        self.commit_inode_change(inode_number, |table| {
            table.add_acl_entry(inode_number, user_id, permissions)
        })
    }

    /// # Return
    /// whether `user_id` had an entry
    pub fn remove_acl(&mut self, name: &str, user_id: u32) -> Result<bool> {
        let (inode_number, _) = self.lookup(name)?;
        self.authorize_owner(inode_number, name, "change the ACL of")?;
        self.commit_inode_change(inode_number, |table| {
            table.remove_acl_entry(inode_number, user_id)
        })
    }

    pub fn acl(&self, name: &str) -> Result<Vec<AclEntry>> {
        let (_, inode) = self.lookup(name)?;
        Ok(inode.acl.to_vec())
    }

    /// duplicate a file as `<name>_copy`
    /// # Return
    /// the name of the copy
    pub fn copy_file(&mut self, name: &str) -> Result<String> {
        let content = self.read_file(name)?;
        let copy_name = format!("{name}_copy");
        self.create_file(&copy_name)?;
        self.write_file(&copy_name, &content)?;
        Ok(copy_name)
    }

    /// entries whose name contains `filter`, in directory order
    pub fn list(&self, filter: &str) -> Result<Vec<FileDetails>> {
        self.directory()
            .entries()
            .iter()
            .filter(|entry| entry.name.contains(filter))
            .map(|entry| self.stat(&entry.name))
            .collect()
    }

    pub fn stat(&self, name: &str) -> Result<FileDetails> {
        let (inode_number, inode) = self.lookup(name)?;
        Ok(FileDetails {
            name: name.to_string(),
            inode_number,
            file_kind: inode.file_kind,
            size: inode.file_size,
            blocks: inode.block_count(),
            mode: inode.mode,
            owner_id: inode.owner_id,
            group_id: inode.group_id,
            acl: inode.acl.to_vec(),
            created_at: inode.created_at,
            accessed_at: inode.accessed_at,
            modified_at: inode.modified_at,
            metadata_changed_at: inode.metadata_changed_at,
        })
    }

    pub fn statfs(&self) -> FsStats {
        let superblock = self.superblock();
        FsStats {
            block_size: superblock.block_size,
            total_blocks: superblock.num_blocks,
            free_blocks: superblock.free_blocks,
            total_inodes: superblock.inode_table_size,
            free_inodes: superblock.free_inode_count,
            volume_size: superblock.volume_size(),
            files: self.directory().len(),
        }
    }

    /// does the host root hold an entry with this name
    pub fn exists(&self, name: &str) -> bool {
        check_name(name).is_ok() && self.host().exists(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Credentials, FsConfig};
    use tempfile::TempDir;

    fn open_fs(dir: &TempDir) -> FileSystem {
        FileSystem::open(FsConfig::new(dir.path()), Credentials::default()).unwrap()
    }

    fn journal_ops(fs: &FileSystem) -> Vec<JournalOperation> {
        fs.journal().entries().map(|e| e.operation).collect()
    }

    #[test]
    fn test_create_write_read() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        assert_eq!(fs.create_file("a.txt")?, 0);
        fs.write_file("a.txt", b"hello world")?;
        assert_eq!(fs.read_file("a.txt")?, b"hello world");
        assert_eq!(std::fs::read(dir.path().join("a.txt"))?, b"hello world");

        let details = fs.stat("a.txt")?;
        assert_eq!(details.size, 11);
        assert_eq!(details.blocks, 1);
        assert_eq!(details.permission_string(), "-rwxrwxrwx");
        assert_eq!(fs.superblock().used_blocks(), 1);
        assert_eq!(
            journal_ops(&fs),
            vec![
                JournalOperation::Create,
                JournalOperation::Modify,
                JournalOperation::Read
            ]
        );
        let modify = fs.journal().entries().nth(1).unwrap();
        assert_eq!(modify.data.as_deref(), Some("hello world"));
        Ok(())
    }

    #[test]
    fn test_failed_host_step_records_nothing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("stray.txt"), b"not tracked")?;
        let mut fs = open_fs(&dir);
        let before = fs.state().clone();
        assert!(matches!(
            fs.create_file("stray.txt"),
            Err(FsError::IOFailure(_))
        ));
        assert_eq!(fs.state(), &before);
        assert!(fs.journal().is_empty());

        assert!(matches!(fs.create_file(".simfs"), Err(FsError::InvalidName(_))));
        Ok(())
    }

    #[test]
    fn test_duplicate_create_is_rejected() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_file("a.txt")?;
        assert!(matches!(
            fs.create_file("a.txt"),
            Err(FsError::AlreadyExists(_))
        ));
        assert_eq!(fs.journal().len(), 1);
        Ok(())
    }

    #[test]
    fn test_delete_frees_inode_and_blocks() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_file("a.txt")?;
        fs.write_file("a.txt", &[7u8; 5000])?;
        assert_eq!(fs.superblock().used_blocks(), 2);
        fs.delete_file("a.txt")?;
        assert_eq!(fs.superblock().used_blocks(), 0);
        assert_eq!(fs.superblock().free_inode_count, 128);
        assert!(!fs.exists("a.txt"));
        assert_eq!(fs.create_file("b.txt")?, 0);
        Ok(())
    }

    #[test]
    fn test_directories() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_directory("docs")?;
        fs.create_file("a.txt")?;
        assert!(dir.path().join("docs").is_dir());
        assert_eq!(fs.stat("docs")?.permission_string(), "drwxr-xr-x");
        assert!(matches!(fs.delete_file("docs"), Err(FsError::IsADirectory(_))));
        assert!(matches!(
            fs.delete_directory("a.txt"),
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(
            fs.write_file("docs", b"x"),
            Err(FsError::IsADirectory(_))
        ));
        fs.delete_directory("docs")?;
        assert!(!dir.path().join("docs").exists());
        let create = fs.journal().entries().next().unwrap();
        assert_eq!(create.data.as_deref(), Some("dir"));
        Ok(())
    }

    #[test]
    fn test_rename() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_file("a.txt")?;
        fs.create_file("b.txt")?;
        assert!(matches!(
            fs.rename_file("a.txt", "b.txt"),
            Err(FsError::AlreadyExists(_))
        ));
        fs.rename_file("a.txt", "c.txt")?;
        assert_eq!(fs.directory().entry("c.txt"), Some(0));
        assert!(dir.path().join("c.txt").exists());
        assert!(!dir.path().join("a.txt").exists());
        let last = fs.journal().entries().last().unwrap();
        assert_eq!(last.operation, JournalOperation::Rename);
        assert_eq!(last.new_filename.as_deref(), Some("c.txt"));
        Ok(())
    }

    #[test]
    fn test_permission_gating_with_acl() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_file("a.txt")?;
        fs.change_permissions("a.txt", 0o644)?;

        fs.set_credentials(Credentials::new(99, 99));
        assert!(fs.read_file("a.txt").is_ok());
        assert!(matches!(
            fs.write_file("a.txt", b"x"),
            Err(FsError::NotAuthorized { uid: 99, .. })
        ));
        assert!(matches!(
            fs.change_permissions("a.txt", 0o777),
            Err(FsError::NotAuthorized { .. })
        ));
        assert!(matches!(
            fs.set_acl("a.txt", 99, 0o2),
            Err(FsError::NotAuthorized { .. })
        ));

        fs.set_credentials(Credentials::default());
        fs.set_acl("a.txt", 99, 0o2)?;
        assert_eq!(fs.acl("a.txt")?.len(), 1);

        fs.set_credentials(Credentials::new(99, 99));
        fs.write_file("a.txt", b"granted")?;

        fs.set_credentials(Credentials::default());
        assert!(fs.remove_acl("a.txt", 99)?);
        assert!(!fs.remove_acl("a.txt", 99)?);
        Ok(())
    }

    #[test]
    fn test_chmod_journals_octal_mode_and_saves() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_file("a.txt")?;
        assert!(matches!(
            fs.change_permissions("a.txt", 0o1777),
            Err(FsError::InvalidPermissionBits(_))
        ));
        fs.change_permissions("a.txt", 0o640)?;
        let last = fs.journal().entries().last().unwrap();
        assert_eq!(last.operation, JournalOperation::ChangePermissions);
        assert_eq!(last.new_filename.as_deref(), Some("640"));

        drop(fs);
        let fs = open_fs(&dir);
        assert_eq!(fs.stat("a.txt")?.mode.bits(), 0o640);
        Ok(())
    }

    #[test]
    fn test_copy_list_and_statfs() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_file("notes")?;
        fs.write_file("notes", b"abc")?;
        assert_eq!(fs.copy_file("notes")?, "notes_copy");
        assert_eq!(fs.read_file("notes_copy")?, b"abc");
        fs.create_file("other")?;

        let names: Vec<String> = fs.list("notes")?.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["notes", "notes_copy"]);
        assert_eq!(fs.list("")?.len(), 3);

        let stats = fs.statfs();
        assert_eq!(stats.free_inodes, 125);
        assert_eq!(stats.free_blocks, 1022);
        assert_eq!(stats.files, 3);
        assert!(stats.to_string().contains("1022 free"));
        Ok(())
    }

    #[test]
    fn test_write_over_budget_leaves_host_untouched() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut config = FsConfig::new(dir.path());
        config.block_size = 512;
        config.num_blocks = 2;
        let mut fs = FileSystem::open(config, Credentials::default())?;
        fs.create_file("a.txt")?;
        fs.write_file("a.txt", b"small")?;
        assert!(matches!(
            fs.write_file("a.txt", &[1u8; 2048]),
            Err(FsError::Exhausted(Resource::Block))
        ));
        assert_eq!(std::fs::read(dir.path().join("a.txt"))?, b"small");
        assert_eq!(fs.stat("a.txt")?.size, 5);
        Ok(())
    }

    #[test]
    fn test_failed_save_rolls_back_mode_and_acl() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_file("a.txt")?;
        // a directory where the snapshot file should go makes every save fail
        std::fs::create_dir(fs.config().snapshot_path())?;

        assert!(fs.change_permissions("a.txt", 0o600).is_err());
        assert_eq!(fs.stat("a.txt")?.mode.bits(), DEFAULT_FILE_MODE);
        assert!(fs.set_acl("a.txt", 99, 0o6).is_err());
        assert!(fs.acl("a.txt")?.is_empty());
        assert_eq!(journal_ops(&fs), vec![JournalOperation::Create]);
        Ok(())
    }

    #[test]
    fn test_names_with_spaces_never_reach_the_host() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut fs = open_fs(&dir);
        fs.create_file("my")?;
        assert!(matches!(
            fs.create_file("my notes"),
            Err(FsError::InvalidName(_))
        ));
        assert!(matches!(
            fs.rename_file("my", "my notes"),
            Err(FsError::InvalidName(_))
        ));
        assert!(!dir.path().join("my notes").exists());
        assert_eq!(journal_ops(&fs), vec![JournalOperation::Create]);
        Ok(())
    }
}
