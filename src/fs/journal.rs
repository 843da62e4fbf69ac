//! append-only operation log kept in a fixed-capacity ring
//!
//! Every append rewrites the whole log file, one line per recorded entry:
//!
//! ```text
//! <unix-timestamp> <OPERATION> <filename> <new_filename-or-empty> <data-or-empty>
//! ```
//!
//! Fields are separated by single spaces so empty fields survive a reload.
//! The payload is the last field and may contain spaces. Names never do,
//! [validate_name](super::validate_name) rejects whitespace.
//! Lines are written oldest first, so reloading a full log puts the write
//! cursor back on the oldest slot.
use std::{
    fmt, fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use log::{debug, error, info, warn};

use crate::utils::time_util;

use super::{FsError, Result, BLOCK_SIZE, MAX_FILENAME_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOperation {
    Create,
    Delete,
    Modify,
    Rename,
    Read,
    ChangePermissions,
}

impl JournalOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            JournalOperation::Create => "CREATE",
            JournalOperation::Delete => "DELETE",
            JournalOperation::Modify => "MODIFY",
            JournalOperation::Rename => "RENAME",
            JournalOperation::Read => "READ",
            JournalOperation::ChangePermissions => "CHANGE_PERMISSIONS",
        }
    }
}

impl fmt::Display for JournalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JournalOperation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "CREATE" => JournalOperation::Create,
            "DELETE" => JournalOperation::Delete,
            "MODIFY" => JournalOperation::Modify,
            "RENAME" => JournalOperation::Rename,
            "READ" => JournalOperation::Read,
            "CHANGE_PERMISSIONS" => JournalOperation::ChangePermissions,
            other => return Err(format!("unknown operation {other:?}")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub operation: JournalOperation,
    pub filename: String,
    pub new_filename: Option<String>,
    pub data: Option<String>,
    /// seconds since the unix epoch
    pub timestamp: u64,
}

fn truncate_at_char_boundary(s: &mut String, max_len: usize) {
    if s.len() > max_len {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
}

/// `None` for an absent or empty field
fn non_empty(s: Option<&str>) -> Option<String> {
    s.filter(|s| !s.is_empty()).map(str::to_string)
}

impl JournalEntry {
    /// build an entry stamped with the current time
    ///
    /// names are capped at [MAX_FILENAME_LEN] bytes; the payload stops at the
    /// first NUL or newline and is capped at one block
    pub fn new(
        operation: JournalOperation,
        filename: &str,
        new_filename: Option<&str>,
        data: Option<&str>,
    ) -> Self {
        let mut filename = filename.to_string();
        truncate_at_char_boundary(&mut filename, MAX_FILENAME_LEN);
        let new_filename = non_empty(new_filename).map(|mut s| {
            truncate_at_char_boundary(&mut s, MAX_FILENAME_LEN);
            s
        });
        let data = data
            .and_then(|d| d.split(['\0', '\n']).next())
            .and_then(|d| non_empty(Some(d)))
            .map(|mut s| {
                truncate_at_char_boundary(&mut s, BLOCK_SIZE as usize - 1);
                s
            });
        JournalEntry {
            operation,
            filename,
            new_filename,
            data,
            timestamp: time_util::unix_timestamp(),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.timestamp,
            self.operation,
            self.filename,
            self.new_filename.as_deref().unwrap_or(""),
            self.data.as_deref().unwrap_or("")
        )
    }

    /// parse one log line; `line` is the 1-based line number for diagnostics
    pub fn parse_line(text: &str, line: usize) -> Result<Self> {
        let corrupt = |reason: String| FsError::CorruptJournalEntry { line, reason };
        let mut fields = text.splitn(5, ' ');
        let timestamp = fields
            .next()
            .and_then(|t| t.parse::<u64>().ok())
            .filter(|t| *t != 0)
            .ok_or_else(|| corrupt("missing or invalid timestamp".to_string()))?;
        let operation = fields
            .next()
            .ok_or_else(|| corrupt("missing operation".to_string()))?
            .parse::<JournalOperation>()
            .map_err(corrupt)?;
        let filename = non_empty(fields.next())
            .ok_or_else(|| corrupt("missing filename".to_string()))?;
        Ok(JournalEntry {
            operation,
            filename,
            new_filename: non_empty(fields.next()),
            data: non_empty(fields.next()),
            timestamp,
        })
    }
}

/// ring buffer of journal entries, `None` marks an unused slot
#[derive(Debug)]
pub struct Journal {
    slots: Vec<Option<JournalEntry>>,
    next: usize,
    path: Option<PathBuf>,
    diagnostics: Vec<FsError>,
}

impl Journal {
    /// a journal that is never written to disk
    pub fn in_memory(capacity: usize) -> Self {
        Journal {
            slots: vec![None; capacity.max(1)],
            next: 0,
            path: None,
            diagnostics: Vec::new(),
        }
    }

    /// open the log at `path`, loading it if it exists
    ///
    /// unparsable lines are skipped and kept as diagnostics
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let mut journal = Journal {
            path: Some(path.clone()),
            ..Journal::in_memory(capacity)
        };
        if !path.exists() {
            info!("journal file {} not found, starting fresh", path.display());
            return Ok(journal);
        }
        let text = fs::read_to_string(&path)?;
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match JournalEntry::parse_line(line, index + 1) {
                Ok(entry) => journal.push(entry),
                Err(e) => {
                    warn!("skipping journal line: {e}");
                    journal.diagnostics.push(e);
                }
            }
        }
        info!(
            "loaded {} journal entries from {}",
            journal.len(),
            path.display()
        );
        Ok(journal)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// number of recorded entries
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// index of the slot the next append overwrites
    pub fn cursor(&self) -> usize {
        self.next
    }

    pub fn slots(&self) -> &[Option<JournalEntry>] {
        &self.slots
    }

    /// lines skipped while loading
    pub fn diagnostics(&self) -> &[FsError] {
        &self.diagnostics
    }

    /// recorded entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &JournalEntry> {
        let (newer, older) = self.slots.split_at(self.next);
        older.iter().chain(newer.iter()).flatten()
    }

    fn push(&mut self, entry: JournalEntry) {
        self.slots[self.next] = Some(entry);
        self.next = (self.next + 1) % self.slots.len();
    }

    /// record an operation and flush the whole log
    pub fn append(
        &mut self,
        operation: JournalOperation,
        filename: &str,
        new_filename: Option<&str>,
        data: Option<&str>,
    ) -> Result<()> {
        if filename.is_empty() {
            return Err(FsError::InvalidName(filename.to_string()));
        }
        let entry = JournalEntry::new(operation, filename, new_filename, data);
        debug!("journal[{}] <- {}", self.next, entry.to_line());
        self.push(entry);
        self.flush()
    }

    /// write every recorded entry to the log file, replacing its content
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write = || -> std::io::Result<()> {
            let mut w = BufWriter::new(fs::File::create(path)?);
            for entry in self.entries() {
                writeln!(w, "{}", entry.to_line())?;
            }
            w.flush()
        };
        write().map_err(|e| {
            error!("could not write journal file {}: {e}", path.display());
            FsError::IOFailure(e)
        })
    }
}
