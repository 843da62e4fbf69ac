//! rebuilding the volume's bookkeeping from the journal
//!
//! Replay starts from a freshly formatted state and re-applies the entries
//! oldest first, so the result depends on the journal alone and not on what
//! the volume tracked before. Afterwards the host root is reconciled with the
//! rebuilt directory, and entries that were tracked before but fell off the
//! ring are kept if the host still holds them.
//!
//! Replay runs with the privileges of the volume itself: no permission checks,
//! and nothing is journaled again.
use std::collections::HashMap;

use log::{debug, info, warn};

use super::{
    fs_api_impl::check_name, FileKind, FileSystem, FileSystemState, FsError, Inode, JournalEntry,
    JournalOperation, Mode, Result,
};

/// outcome of one replay pass
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// entries whose effect was re-applied or found already in place
    pub applied: usize,
    /// READ entries and CHANGE_PERMISSIONS entries without a mode
    pub audited: usize,
    /// failed entries by their position in replay order
    pub skipped: Vec<(usize, FsError)>,
    /// tracked names the host could not be brought in line with
    pub unrestored: Vec<(String, FsError)>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.unrestored.is_empty()
    }
}

impl FileSystem {
    /// rebuild the bookkeeping from the journal, oldest entry first
    ///
    /// a failing entry is skipped and reported, the rest still run
    pub fn replay(&mut self) -> ReplayReport {
        let entries: Vec<JournalEntry> = self.journal().entries().cloned().collect();
        let fresh = FileSystemState::new(self.config());
        let previous = std::mem::replace(self.state_mut(), fresh);

        let mut report = ReplayReport::default();
        // last journaled content of every tracked file, by current name
        let mut contents = HashMap::new();
        for (position, entry) in entries.iter().enumerate() {
            match self.replay_entry(entry, &mut contents) {
                Ok(true) => report.applied += 1,
                Ok(false) => report.audited += 1,
                Err(e) => {
                    warn!(
                        "replay skipped entry {position} ({} {}): {e}",
                        entry.operation, entry.filename
                    );
                    report.skipped.push((position, e));
                }
            }
        }
        self.restore_host(&contents, &mut report);
        self.keep_previous(&previous, &mut report);
        info!(
            "replayed journal: {} applied, {} audit only, {} skipped, {} unrestored",
            report.applied,
            report.audited,
            report.skipped.len(),
            report.unrestored.len()
        );
        report
    }

    /// replay the journal, then save the resulting state
    pub fn recover(&mut self) -> Result<ReplayReport> {
        let report = self.replay();
        self.sync()?;
        Ok(report)
    }

    /// apply one entry to the bookkeeping, the host is left alone
    /// # Return
    /// `false` if the entry is audit only
    fn replay_entry(
        &mut self,
        entry: &JournalEntry,
        contents: &mut HashMap<String, String>,
    ) -> Result<bool> {
        let name = entry.filename.as_str();
        debug!("replaying {}", entry.to_line());
        match entry.operation {
            JournalOperation::Create => {
                if self.directory().contains(name) {
                    debug!("{name} is already tracked");
                } else {
                    let file_kind = FileKind::from(entry.data.as_deref() == Some("dir"));
                    self.register(name, file_kind)?;
                    contents.remove(name);
                }
            }
            JournalOperation::Delete => {
                if self.directory().contains(name) {
                    self.unregister(name)?;
                }
                contents.remove(name);
            }
            JournalOperation::Modify => {
                if !self.directory().contains(name) {
                    // created before the oldest entry still in the ring
                    if !self.host().exists(name) {
                        return Err(FsError::NotFound(name.to_string()));
                    }
                    if self.host().is_dir(name) {
                        return Err(FsError::IsADirectory(name.to_string()));
                    }
                    self.register(name, FileKind::RegularFile)?;
                }
                let (inode_number, inode) = self.lookup(name)?;
                if inode.is_dir() {
                    return Err(FsError::IsADirectory(name.to_string()));
                }
                let data = entry.data.clone().unwrap_or_default();
                self.state_mut()
                    .resize_blocks(inode_number, data.len() as u64)?;
                contents.insert(name.to_string(), data);
            }
            JournalOperation::Rename => {
                let new_name = entry.new_filename.as_deref().ok_or_else(|| {
                    FsError::InvalidName(format!("rename of {name} has no target"))
                })?;
                check_name(new_name)?;
                self.state_mut().directory.rename(name, new_name)?;
                if let Some(data) = contents.remove(name) {
                    contents.insert(new_name.to_string(), data);
                }
            }
            JournalOperation::ChangePermissions => {
                let Some(mode) = entry.new_filename.as_deref() else {
                    return Ok(false);
                };
                let mode = Mode::from_octal(mode)?;
                let inode_number = self.directory().resolve_name(name)?;
                self.state_mut()
                    .inode_table
                    .set_mode(inode_number, mode.bits() as u32)?;
            }
            JournalOperation::Read => return Ok(false),
        }
        Ok(true)
    }

    /// put back every tracked entry the host lacks
    ///
    /// files get their last journaled content; a file the host still holds
    /// keeps its content and its inode is resized to match
    fn restore_host(&mut self, contents: &HashMap<String, String>, report: &mut ReplayReport) {
        let tracked: Vec<(String, usize)> = self
            .directory()
            .entries()
            .iter()
            .map(|entry| (entry.name.clone(), entry.inode_number))
            .collect();
        for (name, inode_number) in tracked {
            let content = contents.get(&name).map(String::as_bytes);
            if let Err(e) = self.restore_entry(&name, inode_number, content) {
                warn!("could not restore {name} on the host: {e}");
                report.unrestored.push((name, e));
            }
        }
    }

    fn restore_entry(
        &mut self,
        name: &str,
        inode_number: usize,
        content: Option<&[u8]>,
    ) -> Result<()> {
        let file_kind = self.inode_table().get(inode_number)?.file_kind;
        let host = self.host();
        match file_kind {
            FileKind::Directory if host.is_dir(name) => return Ok(()),
            FileKind::Directory => return host.create_dir(name),
            FileKind::RegularFile if host.is_dir(name) => {
                return Err(FsError::IsADirectory(name.to_string()))
            }
            FileKind::RegularFile if !host.exists(name) => {
                host.create_file(name)?;
                host.write(name, content.unwrap_or_default())?;
            }
            FileKind::RegularFile => {}
        }
        let len = self.host().metadata(name)?.len();
        if len != self.inode_table().get(inode_number)?.file_size {
            debug!("{name} holds {len} bytes on the host, resizing");
            self.state_mut().resize_blocks(inode_number, len)?;
        }
        Ok(())
    }

    /// carry ownership and ACLs over from the state replay replaced
    ///
    /// entries the rebuilt directory lacks are kept when the host still
    /// holds them, since their history is older than the ring
    fn keep_previous(&mut self, previous: &FileSystemState, report: &mut ReplayReport) {
        for entry in previous.directory.entries() {
            let Ok(old) = previous.inode_table.get(entry.inode_number) else {
                continue;
            };
            let name = entry.name.as_str();
            let kept = match self.directory().entry(name) {
                Some(inode_number) => self.inherit(inode_number, old, false),
                None if self.host().exists(name) => self.adopt(name, old),
                None => Ok(()),
            };
            if let Err(e) = kept {
                warn!("could not keep {name}: {e}");
                report.unrestored.push((name.to_string(), e));
            }
        }
    }

    /// track a host entry again with the metadata it had before
    fn adopt(&mut self, name: &str, old: &Inode) -> Result<()> {
        let inode_number = self.register(name, old.file_kind)?;
        self.inherit(inode_number, old, true)?;
        if !old.is_dir() {
            let len = self.host().metadata(name)?.len();
            self.state_mut().resize_blocks(inode_number, len)?;
        }
        info!("kept {name}, which the journal no longer describes");
        Ok(())
    }

    fn inherit(&mut self, inode_number: usize, old: &Inode, with_mode: bool) -> Result<()> {
        let inode = self.state_mut().inode_table.get_mut(inode_number)?;
        if inode.file_kind != old.file_kind {
            return Ok(());
        }
        inode.owner_id = old.owner_id;
        inode.group_id = old.group_id;
        inode.acl = old.acl.clone();
        inode.created_at = old.created_at;
        if with_mode {
            inode.mode = old.mode;
        }
        Ok(())
    }
}
