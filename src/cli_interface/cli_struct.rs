use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// octal permission words, `644` or `0o644`
fn parse_octal(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|e| format!("{s:?} is not an octal number: {e}"))
}

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub struct SimFsCli {
    /// the host directory holding the volume
    #[clap(short, long, default_value = ".")]
    pub root: PathBuf,
    /// act as this user id instead of the effective one
    #[clap(short, long)]
    pub uid: Option<u32>,
    /// act as this group id instead of the effective one
    #[clap(short, long)]
    pub gid: Option<u32>,
    /// how many entries the journal keeps
    #[clap(long, default_value_t = crate::JOURNAL_SIZE)]
    pub journal_size: usize,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// create a new, empty volume, dropping any existing metadata
    Format(FormatArgs),
    /// create an empty file
    Touch { name: String },
    /// create a directory
    Mkdir { name: String },
    /// delete a file
    Rm { name: String },
    /// delete an empty directory
    Rmdir { name: String },
    /// rename a file or directory
    Mv { old_name: String, new_name: String },
    /// replace a file's content, read from stdin when no data is given
    Write { name: String, data: Option<String> },
    /// print a file's content
    Cat { name: String },
    /// change the permission bits, owner only
    Chmod {
        #[clap(value_parser = parse_octal)]
        mode: u32,
        name: String,
    },
    /// grant a user extra permissions on a file
    Setfacl {
        name: String,
        user_id: u32,
        #[clap(value_parser = parse_octal)]
        permissions: u32,
    },
    /// remove a user's ACL entry
    Rmfacl { name: String, user_id: u32 },
    /// show the ACL of a file
    Getfacl { name: String },
    /// copy a file to `<name>_copy`
    Cp { name: String },
    /// list entries, optionally only those whose name contains FILTER
    Ls { filter: Option<String> },
    /// show the metadata of one entry
    Stat { name: String },
    /// show block and inode usage
    Df,
    /// print the journal, oldest entry first
    Journal,
    /// rebuild the volume's bookkeeping from the journal
    Recover,
}

/// make a new volume subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "make a new volume")]
pub struct FormatArgs {
    /// the data block size of the volume
    #[clap(short, long, default_value_t = crate::BLOCK_SIZE)]
    pub block_size: u32,
    /// the number of data blocks
    #[clap(short = 'n', long = "blocks", default_value_t = crate::NUM_BLOCKS)]
    pub num_blocks: u32,
    /// the inode count of the volume
    #[clap(short, long = "inodes", default_value_t = crate::INODE_TABLE_SIZE)]
    pub inode_count: u32,
}


/// test the file subcommands
#[cfg(test)]
mod file_parse_args_tests {
    use super::*;

    #[test]
    fn test_identity_options() {
        let args = SimFsCli::parse_from(["simfs", "-u", "99", "-g", "7", "cat", "a.txt"]);
        assert_eq!(args.uid, Some(99));
        assert_eq!(args.gid, Some(7));
        assert_eq!(args.root, PathBuf::from("."));
        assert_eq!(
            args.command,
            Command::Cat {
                name: "a.txt".to_string()
            }
        );
        let args = SimFsCli::parse_from(["simfs", "--journal-size", "16", "journal"]);
        assert_eq!(args.journal_size, 16);
        assert_eq!(args.command, Command::Journal);
        assert!(SimFsCli::try_parse_from(["simfs", "-u", "someone", "df"]).is_err());
    }

    #[test]
    fn test_octal_arguments() {
        let args = SimFsCli::parse_from(["simfs", "chmod", "0644", "a.txt"]);
        assert_eq!(
            args.command,
            Command::Chmod {
                mode: 0o644,
                name: "a.txt".to_string()
            }
        );
        let args = SimFsCli::parse_from(["simfs", "setfacl", "a.txt", "99", "6"]);
        assert_eq!(
            args.command,
            Command::Setfacl {
                name: "a.txt".to_string(),
                user_id: 99,
                permissions: 0o6,
            }
        );
        assert!(SimFsCli::try_parse_from(["simfs", "chmod", "0999", "a.txt"]).is_err());
    }

    #[test]
    fn test_optional_positionals() {
        let args = SimFsCli::parse_from(["simfs", "ls"]);
        assert_eq!(args.command, Command::Ls { filter: None });
        let args = SimFsCli::parse_from(["simfs", "write", "a.txt", "hello world"]);
        assert_eq!(
            args.command,
            Command::Write {
                name: "a.txt".to_string(),
                data: Some("hello world".to_string())
            }
        );
        let args = SimFsCli::parse_from(["simfs", "mv", "a", "b"]);
        assert_eq!(
            args.command,
            Command::Mv {
                old_name: "a".to_string(),
                new_name: "b".to_string()
            }
        );
    }
}
