use log::{debug, info};

use super::{FileKind, FsError, Inode, InodeSlot, Mode, Resource, Result};

/// fixed-capacity slot table; an inode number is its slot index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InodeTable {
    slots: Vec<InodeSlot>,
}

impl InodeTable {
    pub fn new(capacity: u32) -> Self {
        InodeTable {
            slots: vec![InodeSlot::Free; capacity as usize],
        }
    }

    pub(crate) fn from_slots(slots: Vec<InodeSlot>) -> Self {
        InodeTable { slots }
    }

    pub fn slots(&self) -> &[InodeSlot] {
        &self.slots
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    #[inline]
    pub fn get(&self, inode_number: usize) -> Result<&Inode> {
        self.slots
            .get(inode_number)
            .and_then(InodeSlot::inode)
            .ok_or_else(|| FsError::NotFound(format!("inode {inode_number}")))
    }

    #[inline]
    pub fn get_mut(&mut self, inode_number: usize) -> Result<&mut Inode> {
        self.slots
            .get_mut(inode_number)
            .and_then(InodeSlot::inode_mut)
            .ok_or_else(|| FsError::NotFound(format!("inode {inode_number}")))
    }

    /// claim the first free slot for a new inode
    ///
    /// the caller owns the free-inode accounting in the superblock
    pub fn create_inode(
        &mut self,
        file_kind: FileKind,
        mode: Mode,
        owner_id: u32,
        group_id: u32,
    ) -> Result<usize> {
        let index = self
            .slots
            .iter()
            .position(InodeSlot::is_free)
            .ok_or(FsError::Exhausted(Resource::Inode))?;
        self.slots[index] = InodeSlot::InUse(Inode::new(file_kind, mode, owner_id, group_id));
        info!("created inode {index} for {file_kind}");
        Ok(index)
    }

    /// mark a slot free and hand back the inode it held,
    /// whose blocks the caller must return to the allocator
    pub fn release_inode(&mut self, inode_number: usize) -> Result<Inode> {
        let slot = self
            .slots
            .get_mut(inode_number)
            .filter(|slot| !slot.is_free())
            .ok_or_else(|| FsError::NotFound(format!("inode {inode_number}")))?;
        let InodeSlot::InUse(inode) = std::mem::take(slot) else {
            unreachable!("slot {inode_number} was checked to be in use");
        };
        debug!("released inode {inode_number}");
        Ok(inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_release_reuses_slot() {
        let mut table = InodeTable::new(4);
        let mode = Mode::new(0o777).unwrap();
        assert_eq!(table.create_inode(FileKind::RegularFile, mode, 11, 10).unwrap(), 0);
        assert_eq!(table.create_inode(FileKind::Directory, mode, 11, 10).unwrap(), 1);
        let released = table.release_inode(0).unwrap();
        assert_eq!(released.owner_id, 11);
        assert!(table.slots()[0].is_free());
        assert_eq!(table.create_inode(FileKind::RegularFile, mode, 12, 10).unwrap(), 0);
        assert_eq!(table.get(0).unwrap().owner_id, 12);
        assert_eq!(table.in_use(), 2);
    }

    #[test]
    fn test_full_table_and_bad_numbers() {
        let mut table = InodeTable::new(2);
        table.create_inode(FileKind::RegularFile, Mode::default(), 1, 1).unwrap();
        table.create_inode(FileKind::RegularFile, Mode::default(), 1, 1).unwrap();
        assert!(matches!(
            table.create_inode(FileKind::RegularFile, Mode::default(), 1, 1),
            Err(FsError::Exhausted(Resource::Inode))
        ));
        assert!(matches!(table.get(2), Err(FsError::NotFound(_))));
        table.release_inode(1).unwrap();
        assert!(matches!(table.release_inode(1), Err(FsError::NotFound(_))));
    }
}
