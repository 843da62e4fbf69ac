//! owner/group/other mode bits plus per-user ACL overrides
//!
//! Resolution picks exactly one identity class for the caller (owner if the
//! uid equals the owner id, else group if the uid equals the group id, else
//! other) and ORs in the ACL entry recorded for that exact uid. ACL entries
//! only ever grant, they never take a class bit away.
use std::fmt;

use bitflags::bitflags;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{FsError, Inode, InodeTable, Result, MAX_ACL_ENTRIES};

bitflags! {
    /// rwx bits of a single identity class
    #[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[serde(transparent)]
    pub struct Permissions: u8 {
        const READ = 0o4;
        const WRITE = 0o2;
        const EXECUTE = 0o1;
    }
}

impl Permissions {
    /// parse a 3-bit class word, rejecting anything outside rwx
    pub fn from_class_bits(bits: u32) -> Result<Self> {
        u8::try_from(bits)
            .ok()
            .and_then(Permissions::from_bits)
            .ok_or(FsError::InvalidPermissionBits(bits))
    }

    /// `rwx`, `r-x`, ...
    pub fn to_rwx(self) -> String {
        [
            (Permissions::READ, 'r'),
            (Permissions::WRITE, 'w'),
            (Permissions::EXECUTE, 'x'),
        ]
        .iter()
        .map(|(bit, c)| if self.contains(*bit) { *c } else { '-' })
        .collect()
    }
}

/// which third of the mode word applies to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionClass {
    Owner,
    Group,
    Other,
}

impl PermissionClass {
    const fn shift(self) -> u16 {
        match self {
            PermissionClass::Owner => 6,
            PermissionClass::Group => 3,
            PermissionClass::Other => 0,
        }
    }
}

/// 9-bit permission word, octal-conventional
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode(u16);

impl Mode {
    pub const MASK: u32 = 0o777;

    pub fn new(bits: u32) -> Result<Self> {
        if bits & !Self::MASK != 0 {
            return Err(FsError::InvalidPermissionBits(bits));
        }
        Ok(Mode(bits as u16))
    }

    /// parse an octal string such as `644` or `0755`
    pub fn from_octal(s: &str) -> Result<Self> {
        let bits = u32::from_str_radix(s.trim_start_matches("0o"), 8)
            .map_err(|_| FsError::InvalidPermissionBits(0))?;
        Mode::new(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub fn class(self, class: PermissionClass) -> Permissions {
        Permissions::from_bits_truncate(((self.0 >> class.shift()) & 0o7) as u8)
    }

    /// `rwxr-xr-x`
    pub fn to_rwx(self) -> String {
        [
            PermissionClass::Owner,
            PermissionClass::Group,
            PermissionClass::Other,
        ]
        .iter()
        .map(|class| self.class(*class).to_rwx())
        .collect()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

/// a per-user override
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclEntry {
    pub user_id: u32,
    pub permissions: Permissions,
}

/// This block is about permission resolution on a single inode
impl Inode {
    pub fn class_of(&self, user_id: u32) -> PermissionClass {
        if user_id == self.owner_id {
            PermissionClass::Owner
        } else if user_id == self.group_id {
            PermissionClass::Group
        } else {
            PermissionClass::Other
        }
    }

    pub fn acl_permissions(&self, user_id: u32) -> Permissions {
        self.acl
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.permissions)
            .unwrap_or_default()
    }

    /// class bits ORed with the caller's ACL override
    pub fn effective_permissions(&self, user_id: u32) -> Permissions {
        self.mode.class(self.class_of(user_id)) | self.acl_permissions(user_id)
    }

    pub fn permits(&self, user_id: u32, requested: Permissions) -> bool {
        self.effective_permissions(user_id).contains(requested)
    }
}

/// mode and ACL operations addressed by inode number
impl InodeTable {
    /// replace the mode word of an inode
    ///
    /// invalid bits or a bad inode number leave the inode untouched
    pub fn set_mode(&mut self, inode_number: usize, mode: u32) -> Result<()> {
        let mode = Mode::new(mode).map_err(|e| {
            warn!("set_mode() rejected for inode {inode_number}: {e}");
            e
        })?;
        let inode = self.get_mut(inode_number)?;
        inode.mode = mode;
        inode.update_changed_at();
        info!("set mode of inode {inode_number} to {mode}");
        Ok(())
    }

    pub fn get_mode(&self, inode_number: usize) -> Result<Mode> {
        Ok(self.get(inode_number)?.mode)
    }

    /// add an ACL entry, or replace the bits of the user's existing one
    pub fn add_acl_entry(&mut self, inode_number: usize, user_id: u32, permissions: u32) -> Result<()> {
        let permissions = Permissions::from_class_bits(permissions).map_err(|e| {
            warn!("add_acl_entry() rejected for inode {inode_number}: {e}");
            e
        })?;
        let inode = self.get_mut(inode_number)?;
        if let Some(entry) = inode.acl.iter_mut().find(|e| e.user_id == user_id) {
            entry.permissions = permissions;
        } else {
            if inode.acl.len() >= MAX_ACL_ENTRIES {
                warn!("ACL entry limit reached for inode {inode_number}");
                return Err(FsError::AclFull(inode_number));
            }
            inode.acl.push(AclEntry {
                user_id,
                permissions,
            });
        }
        inode.update_changed_at();
        info!(
            "ACL of inode {inode_number}: user {user_id} -> {}",
            permissions.to_rwx()
        );
        Ok(())
    }

    /// remove the user's ACL entry, keeping the others in order
    /// # Return
    /// whether an entry was removed
    pub fn remove_acl_entry(&mut self, inode_number: usize, user_id: u32) -> Result<bool> {
        let inode = self.get_mut(inode_number)?;
        let Some(position) = inode.acl.iter().position(|e| e.user_id == user_id) else {
            info!("no ACL entry found for inode {inode_number}, user {user_id}");
            return Ok(false);
        };
        inode.acl.remove(position);
        inode.update_changed_at();
        info!("removed ACL entry for inode {inode_number}, user {user_id}");
        Ok(true)
    }

    pub fn get_acl_permissions(&self, inode_number: usize, user_id: u32) -> Permissions {
        self.get(inode_number)
            .map(|inode| inode.acl_permissions(user_id))
            .unwrap_or_default()
    }

    /// does `user_id` hold every bit of `requested` on this inode
    ///
    /// unknown or free inodes grant nothing
    pub fn resolve(&self, inode_number: usize, user_id: u32, requested: Permissions) -> bool {
        self.get(inode_number)
            .map_or(false, |inode| inode.permits(user_id, requested))
    }
}
