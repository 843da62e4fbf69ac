//! our simulated filesystem
pub mod acl;
pub mod block_bitmap;
pub mod config;
pub mod directory;
pub mod error;
pub mod filekind;
pub mod fs_layout;
pub mod host;
pub mod inode;
pub mod inode_table;
pub mod journal;
pub mod superblock;
mod fs_api_impl;
mod persistence;
mod recovery;
pub use acl::*;
pub use block_bitmap::*;
pub use config::*;
pub use directory::*;
pub use error::*;
pub use filekind::*;
pub use fs_api_impl::{FileDetails, FsStats};
pub use fs_layout::*;
pub use host::*;
pub use inode::*;
pub use inode_table::*;
pub use journal::*;
pub use recovery::ReplayReport;
pub use superblock::*;

pub const BLOCK_SIZE: u32 = 4096;
pub const NUM_BLOCKS: u32 = 1024;
pub const INODE_TABLE_SIZE: u32 = 128;
/// longest name a directory entry can hold, in bytes
pub const MAX_FILENAME_LEN: usize = 254;
pub const MAX_FILES: usize = 128;
pub const DIRECT_BLOCKS: usize = 12;
pub const MAX_ACL_ENTRIES: usize = 10;
pub const JOURNAL_SIZE: usize = 1024;

pub const DEFAULT_FILE_MODE: u16 = 0o777;
pub const DEFAULT_DIR_MODE: u16 = 0o755;
