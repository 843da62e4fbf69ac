//! run one CLI command against a volume
use std::io::{Read, Write};

use log::{debug, warn};

use crate::{
    cli_interface::{Command, SimFsCli},
    fs::{Credentials, FileDetails, FileSystem, FsConfig, PermissionClass},
    mkfs::mkfs,
};

impl SimFsCli {
    /// the identity commands run as, the process's own unless overridden
    pub fn credentials(&self) -> Credentials {
        let current = Credentials::current();
        Credentials::new(
            self.uid.unwrap_or(current.uid),
            self.gid.unwrap_or(current.gid),
        )
    }

    fn config(&self) -> FsConfig {
        let mut config = FsConfig::new(&self.root);
        config.journal_size = self.journal_size;
        config
    }
}

fn write_acl<W: Write>(out: &mut W, details: &FileDetails) -> std::io::Result<()> {
    writeln!(out, "# file: {}", details.name)?;
    writeln!(out, "# owner: {}", details.owner_id)?;
    writeln!(out, "# group: {}", details.group_id)?;
    writeln!(out, "user::{}", details.mode.class(PermissionClass::Owner).to_rwx())?;
    for entry in &details.acl {
        writeln!(out, "user:{}:{}", entry.user_id, entry.permissions.to_rwx())?;
    }
    writeln!(out, "group::{}", details.mode.class(PermissionClass::Group).to_rwx())?;
    writeln!(out, "other::{}", details.mode.class(PermissionClass::Other).to_rwx())
}

fn write_stat<W: Write>(out: &mut W, details: &FileDetails) -> std::io::Result<()> {
    writeln!(out, "  File: {}", details.name)?;
    writeln!(
        out,
        "  Size: {:<10} Blocks: {:<6} {}",
        details.size, details.blocks, details.file_kind
    )?;
    writeln!(out, " Inode: {}", details.inode_number)?;
    writeln!(
        out,
        "Access: ({:04o}/{})  Uid: {}  Gid: {}",
        details.mode.bits(),
        details.permission_string(),
        details.owner_id,
        details.group_id
    )?;
    writeln!(out, "   ACL: {} entries", details.acl.len())?;
    writeln!(out, "Access: {}", details.accessed_at.format_minutes())?;
    writeln!(out, "Modify: {}", details.modified_at.format_minutes())?;
    writeln!(out, "Change: {}", details.metadata_changed_at.format_minutes())?;
    writeln!(out, " Birth: {}", details.created_at.format_minutes())
}

/// open the volume, run the command, save the volume on success
pub fn run<W: Write>(cli: SimFsCli, out: &mut W) -> anyhow::Result<()> {
    let credentials = cli.credentials();
    if let Command::Format(args) = &cli.command {
        let fs = mkfs(
            &cli.root,
            args.block_size,
            args.num_blocks,
            args.inode_count,
            credentials,
        )?;
        write!(out, "{}", fs.statfs())?;
        writeln!(out)?;
        return Ok(());
    }

    let mut fs = FileSystem::open(cli.config(), credentials)?;
    debug!("running {:?}", cli.command);
    match cli.command {
        Command::Format(_) => unreachable!("format is handled before opening"),
        Command::Touch { name } => {
            fs.create_file(&name)?;
        }
        Command::Mkdir { name } => {
            fs.create_directory(&name)?;
        }
        Command::Rm { name } => fs.delete_file(&name)?,
        Command::Rmdir { name } => fs.delete_directory(&name)?,
        Command::Mv { old_name, new_name } => fs.rename_file(&old_name, &new_name)?,
        Command::Write { name, data } => {
            let data = match data {
                Some(data) => data.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            fs.write_file(&name, &data)?;
        }
        Command::Cat { name } => out.write_all(&fs.read_file(&name)?)?,
        Command::Chmod { mode, name } => fs.change_permissions(&name, mode)?,
        Command::Setfacl {
            name,
            user_id,
            permissions,
        } => fs.set_acl(&name, user_id, permissions)?,
        Command::Rmfacl { name, user_id } => {
            if !fs.remove_acl(&name, user_id)? {
                warn!("{name} has no ACL entry for user {user_id}");
            }
        }
        Command::Getfacl { name } => write_acl(out, &fs.stat(&name)?)?,
        Command::Cp { name } => {
            let copy = fs.copy_file(&name)?;
            writeln!(out, "{copy}")?;
        }
        Command::Ls { filter } => {
            for details in fs.list(filter.as_deref().unwrap_or_default())? {
                writeln!(out, "{details}")?;
            }
        }
        Command::Stat { name } => write_stat(out, &fs.stat(&name)?)?,
        Command::Df => writeln!(out, "{}", fs.statfs())?,
        Command::Journal => {
            for entry in fs.journal().entries() {
                writeln!(out, "{}", entry.to_line())?;
            }
            for diagnostic in fs.journal().diagnostics() {
                warn!("{diagnostic}");
            }
        }
        Command::Recover => {
            let report = fs.recover()?;
            writeln!(
                out,
                "replayed {} entries, {} audit only, {} skipped",
                report.applied,
                report.audited,
                report.skipped.len()
            )?;
            for (position, e) in &report.skipped {
                writeln!(out, "  entry {position}: {e}")?;
            }
            for (name, e) in &report.unrestored {
                writeln!(out, "  {name} not restored: {e}")?;
            }
        }
    }
    fs.sync()?;
    Ok(())
}
