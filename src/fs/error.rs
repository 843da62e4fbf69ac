use std::fmt;

use libc::c_int;

/// which fixed table ran out of room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Block,
    Inode,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Block => write!(f, "data blocks"),
            Resource::Inode => write!(f, "inodes"),
        }
    }
}

/// Filesystem error type
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// no free block or inode is left
    #[error("no free {0} left")]
    Exhausted(Resource),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// a mode or ACL word carries bits outside rwx for its class
    #[error("invalid permission bits: {0:#o}")]
    InvalidPermissionBits(u32),

    #[error("ACL of inode {0} is full")]
    AclFull(usize),

    /// the permission resolver denied the request
    #[error("user {uid} is not authorized to {action} {name}")]
    NotAuthorized {
        uid: u32,
        action: &'static str,
        name: String,
    },

    #[error("corrupt journal entry at line {line}: {reason}")]
    CorruptJournalEntry { line: usize, reason: String },

    /// a host file operation failed
    #[error("I/O error: {0}")]
    IOFailure(#[from] std::io::Error),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("directory is full ({0} entries)")]
    DirectoryFull(usize),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<bincode::error::EncodeError> for FsError {
    fn from(e: bincode::error::EncodeError) -> Self {
        FsError::Encoding(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for FsError {
    fn from(e: bincode::error::DecodeError) -> Self {
        FsError::CorruptSnapshot(e.to_string())
    }
}

impl FsError {
    /// the closest POSIX errno, used as the process exit status by the CLI
    pub fn errno(&self) -> c_int {
        match self {
            FsError::Exhausted(_) | FsError::DirectoryFull(_) => libc::ENOSPC,
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::InvalidPermissionBits(_) | FsError::InvalidName(_) => libc::EINVAL,
            FsError::AclFull(_) => libc::ENOSPC,
            FsError::NotAuthorized { .. } => libc::EACCES,
            FsError::CorruptJournalEntry { .. } | FsError::CorruptSnapshot(_) => libc::EBADMSG,
            FsError::IOFailure(e) => e.raw_os_error().unwrap_or(libc::EIO),
            FsError::FileTooLarge(_) => libc::EFBIG,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::Encoding(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::Exhausted(Resource::Inode).errno(), libc::ENOSPC);
        assert_eq!(FsError::NotFound("a".into()).errno(), libc::ENOENT);
        assert_eq!(FsError::AlreadyExists("a".into()).errno(), libc::EEXIST);
        let denied = FsError::NotAuthorized {
            uid: 99,
            action: "write",
            name: "a".into(),
        };
        assert_eq!(denied.errno(), libc::EACCES);
        let io = std::io::Error::from_raw_os_error(libc::EPERM);
        assert_eq!(FsError::from(io).errno(), libc::EPERM);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FsError::Exhausted(Resource::Block).to_string(),
            "no free data blocks left"
        );
        assert_eq!(
            FsError::InvalidPermissionBits(0o1000).to_string(),
            "invalid permission bits: 0o1000"
        );
    }
}
