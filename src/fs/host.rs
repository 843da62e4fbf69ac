//! the host directory that actually stores file contents
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use log::error;

use super::{FsError, Result};

/// thin wrapper over `std::fs` rooted at one host directory
#[derive(Debug, Clone)]
pub struct HostStore {
    root: PathBuf,
}

fn logged(op: &str, path: &Path, e: std::io::Error) -> FsError {
    error!("{op} {} failed: {e}", path.display());
    FsError::IOFailure(e)
}

impl HostStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        HostStore { root: root.into() }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).exists()
    }

    pub fn is_dir(&self, name: &str) -> bool {
        self.path_of(name).is_dir()
    }

    /// create an empty file, failing if anything already has that name
    pub fn create_file(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map(|_| ())
            .map_err(|e| logged("create", &path, e))
    }

    pub fn create_dir(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        fs::create_dir(&path).map_err(|e| logged("mkdir", &path, e))
    }

    pub fn remove_file(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        fs::remove_file(&path).map_err(|e| logged("remove", &path, e))
    }

    pub fn remove_dir(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        fs::remove_dir(&path).map_err(|e| logged("rmdir", &path, e))
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let (old, new) = (self.path_of(old_name), self.path_of(new_name));
        fs::rename(&old, &new).map_err(|e| logged("rename", &old, e))
    }

    /// truncate and overwrite a file's content
    pub fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path_of(name);
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| logged("open", &path, e))?;
        file.write_all(data)
            .and_then(|_| file.flush())
            .map_err(|e| logged("write", &path, e))
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(name);
        fs::read(&path).map_err(|e| logged("read", &path, e))
    }

    pub fn metadata(&self, name: &str) -> Result<fs::Metadata> {
        let path = self.path_of(name);
        fs::metadata(&path).map_err(|e| logged("stat", &path, e))
    }
}
