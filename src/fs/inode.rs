use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::utils::time_util::{self, TimeDurationStruct};

use super::{filekind::FileKind, AclEntry, BlockIndex, Mode, DIRECT_BLOCKS, MAX_ACL_ENTRIES};

/// the single index block of an inode and the overflow blocks it references
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct IndirectBlock {
    pub index_block: BlockIndex,
    pub refs: Vec<BlockIndex>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Inode {
    pub file_kind: FileKind,
    /// content length in bytes
    pub file_size: u64,
    pub direct_blocks: [Option<BlockIndex>; DIRECT_BLOCKS],
    pub indirect_block: Option<IndirectBlock>,
    pub mode: Mode,
    pub owner_id: u32,
    pub group_id: u32,
    pub created_at: TimeDurationStruct,
    pub accessed_at: TimeDurationStruct,
    pub modified_at: TimeDurationStruct,
    pub metadata_changed_at: TimeDurationStruct,
    pub acl: SmallVec<[AclEntry; MAX_ACL_ENTRIES]>,
}

/// a slot of the inode table
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub enum InodeSlot {
    #[default]
    Free,
    InUse(Inode),
}

impl InodeSlot {
    pub fn is_free(&self) -> bool {
        matches!(self, InodeSlot::Free)
    }

    pub fn inode(&self) -> Option<&Inode> {
        match self {
            InodeSlot::Free => None,
            InodeSlot::InUse(inode) => Some(inode),
        }
    }

    pub fn inode_mut(&mut self) -> Option<&mut Inode> {
        match self {
            InodeSlot::Free => None,
            InodeSlot::InUse(inode) => Some(inode),
        }
    }
}

impl Inode {
    pub fn new(file_kind: impl Into<FileKind>, mode: Mode, owner_id: u32, group_id: u32) -> Self {
        let now = time_util::now();
        Inode {
            file_kind: file_kind.into(),
            mode,
            owner_id,
            group_id,
            created_at: now,
            accessed_at: now,
            modified_at: now,
            metadata_changed_at: now,
            ..Inode::default()
        }
    }
}

/// This block is about file metadata operations
impl Inode {
    pub fn is_dir(&self) -> bool {
        self.file_kind.is_dir()
    }

    pub fn acl_count(&self) -> usize {
        self.acl.len()
    }

    pub fn update_modified_at(&mut self) {
        let now = time_util::now();
        self.metadata_changed_at = now;
        self.modified_at = now;
    }

    pub fn update_accessed_at(&mut self) {
        self.accessed_at = time_util::now();
    }

    pub fn update_changed_at(&mut self) {
        self.metadata_changed_at = time_util::now();
    }
}

/// This block is about block references
impl Inode {
    /// data blocks in file order, direct blocks first
    pub fn data_blocks(&self) -> Vec<BlockIndex> {
        self.direct_blocks
            .iter()
            .flatten()
            .copied()
            .chain(self.indirect_block.iter().flat_map(|i| i.refs.iter().copied()))
            .collect()
    }

    /// number of data blocks holding content, not counting the index block
    pub fn block_count(&self) -> usize {
        self.direct_blocks.iter().flatten().count()
            + self.indirect_block.as_ref().map_or(0, |i| i.refs.len())
    }

    /// every block this inode holds, the index block included
    pub fn all_blocks(&self) -> Vec<BlockIndex> {
        let mut blocks = self.data_blocks();
        if let Some(indirect) = &self.indirect_block {
            blocks.push(indirect.index_block);
        }
        blocks
    }

    /// take every block reference out of the inode, leaving them unset
    pub fn take_blocks(&mut self) -> Vec<BlockIndex> {
        let blocks = self.all_blocks();
        self.direct_blocks = [None; DIRECT_BLOCKS];
        self.indirect_block = None;
        blocks
    }
}
