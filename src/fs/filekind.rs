use std::fmt;

use serde::{Deserialize, Serialize};

/// an enum to describe the type of a file
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// an regular file
    #[default]
    RegularFile,
    /// a directory
    Directory,
}

impl FileKind {
    pub fn is_dir(self) -> bool {
        self == FileKind::Directory
    }

    /// leading character of an `ls -l` style permission string
    pub fn type_char(self) -> char {
        match self {
            FileKind::RegularFile => '-',
            FileKind::Directory => 'd',
        }
    }
}

impl From<bool> for FileKind {
    fn from(is_directory: bool) -> Self {
        if is_directory {
            FileKind::Directory
        } else {
            FileKind::RegularFile
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::RegularFile => write!(f, "File"),
            FileKind::Directory => write!(f, "Directory"),
        }
    }
}
