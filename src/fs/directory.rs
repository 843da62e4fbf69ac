use log::info;
use serde::{Deserialize, Serialize};

use crate::utils;

use utils::traits::{DigestInSelf, SerializeAndDigest};

use super::{FsError, Result, MAX_FILENAME_LEN};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub inode_number: usize,
}

/// the flat root namespace, kept dense and in insertion order
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DirectoryIndex {
    entries: Vec<DirectoryEntry>,
    capacity: usize,
    pub digest: [u8; 32],
}

/// a usable entry name: non-empty, at most [MAX_FILENAME_LEN] bytes,
/// no path separators and no whitespace
///
/// journal lines are space separated, so a name with a space in it would
/// come back from the log as two fields
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > MAX_FILENAME_LEN
        || name.contains(['/', '\\', '\0'])
        || name.contains(char::is_whitespace)
        || name == "."
        || name == ".."
    {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl DirectoryIndex {
    pub fn new(capacity: usize) -> Self {
        DirectoryIndex {
            entries: Vec::with_capacity(capacity),
            capacity,
            digest: [0u8; 32],
        }
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn entry(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.inode_number)
    }

    /// first exact match wins
    pub fn resolve_name(&self, name: &str) -> Result<usize> {
        self.entry(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    pub fn insert(&mut self, name: &str, inode_number: usize) -> Result<()> {
        validate_name(name)?;
        if self.contains(name) {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        if self.entries.len() >= self.capacity {
            return Err(FsError::DirectoryFull(self.capacity));
        }
        self.entries.push(DirectoryEntry {
            name: name.to_string(),
            inode_number,
        });
        info!("directory entry {name} -> inode {inode_number}");
        Ok(())
    }

    /// remove an entry, later entries shift down
    pub fn remove(&mut self, name: &str) -> Result<usize> {
        let position = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        Ok(self.entries.remove(position).inode_number)
    }

    /// rename in place, the inode number and position are kept
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        if self.contains(new_name) {
            return Err(FsError::AlreadyExists(new_name.to_string()));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == old_name)
            .ok_or_else(|| FsError::NotFound(old_name.to_string()))?;
        entry.name = new_name.to_string();
        info!("renamed directory entry {old_name} to {new_name}");
        Ok(())
    }
}

impl DigestInSelf for DirectoryIndex {
    fn digest(&mut self) {
        self.digest = [0u8; 32];
        self.digest = utils::digest::digest(self).unwrap_or_default();
    }

    fn verify_digest(&mut self) -> bool {
        let digest_to_verify = self.digest;
        self.digest = [0u8; 32];
        let ok = utils::digest::digest(&self).map_or(false, |d| d == digest_to_verify);
        self.digest = digest_to_verify;
        ok
    }
}
impl SerializeAndDigest for DirectoryIndex {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn index_with(names: &[&str]) -> DirectoryIndex {
        let mut dir = DirectoryIndex::new(8);
        for (i, name) in names.iter().enumerate() {
            dir.insert(name, i).unwrap();
        }
        dir
    }

    #[test]
    fn test_directory_serialization_and_deserialization() -> anyhow::Result<()> {
        let mut dir = index_with(&["test1.txt", "test2.txt"]);
        let mut cursor = Cursor::new(Vec::new());
        dir.serialize_into(&mut cursor)?;
        cursor.set_position(0);
        let deserialized = DirectoryIndex::deserialize_from(&mut cursor)?;
        assert_eq!(deserialized.len(), 2);
        assert_eq!(deserialized.capacity(), 8);

        let mut iter = deserialized.entries().iter();
        assert_eq!(iter.next().map(|e| e.name.as_str()), Some("test1.txt"));
        assert_eq!(iter.next().map(|e| e.name.as_str()), Some("test2.txt"));
        Ok(())
    }

    #[test]
    fn test_directory_entry() {
        let dir = index_with(&["test1.txt", "test2.txt"]);
        assert_eq!(dir.entry("test1.txt"), Some(0));
        assert_eq!(dir.entry("test2.txt"), Some(1));
        assert_eq!(dir.entry("test3.txt"), None);
        assert_eq!(dir.entry("TEST1.txt"), None);
        assert!(matches!(dir.resolve_name("nope"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_insert_duplicate_leaves_index_unchanged() {
        let mut dir = index_with(&["a.txt"]);
        let before = dir.clone();
        assert!(matches!(dir.insert("a.txt", 7), Err(FsError::AlreadyExists(_))));
        assert_eq!(dir, before);
    }

    #[test]
    fn test_capacity_and_names() {
        let mut dir = DirectoryIndex::new(1);
        dir.insert("one", 0).unwrap();
        assert!(matches!(dir.insert("two", 1), Err(FsError::DirectoryFull(1))));
        assert!(matches!(dir.insert("", 1), Err(FsError::InvalidName(_))));
        assert!(validate_name(&"x".repeat(MAX_FILENAME_LEN)).is_ok());
        assert!(validate_name(&"x".repeat(MAX_FILENAME_LEN + 1)).is_err());
        assert!(validate_name("a/b").is_err());
    }

    #[test]
    fn test_names_with_whitespace_are_rejected() {
        for name in ["my notes", "tab\tname", "line\nbreak", " lead", "trail "] {
            assert!(
                matches!(validate_name(name), Err(FsError::InvalidName(_))),
                "{name:?}"
            );
        }
        let mut dir = index_with(&["my"]);
        let before = dir.clone();
        assert!(dir.insert("my notes", 1).is_err());
        assert!(dir.rename("my", "my notes").is_err());
        assert_eq!(dir, before);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut dir = index_with(&["a", "b", "c", "d"]);
        assert_eq!(dir.remove("b").unwrap(), 1);
        let names: Vec<&str> = dir.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "d"]);
        assert!(dir.remove("b").is_err());
    }

    #[test]
    fn test_rename_collision() {
        let mut dir = index_with(&["a.txt", "b.txt"]);
        let before = dir.clone();
        assert!(matches!(
            dir.rename("a.txt", "b.txt"),
            Err(FsError::AlreadyExists(_))
        ));
        assert_eq!(dir, before);

        dir.rename("a.txt", "c.txt").unwrap();
        assert_eq!(dir.entry("c.txt"), Some(0));
        assert_eq!(dir.entries()[0].name, "c.txt");
    }
}
