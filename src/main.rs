use clap::Parser;
use simfs::{cli_interface::SimFsCli, FsError};
/// a CLI interface to users to create a simulated volume
/// and run one file operation against it per invocation.
///
/// Failures exit with the errno closest to the filesystem error.
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = SimFsCli::parse();
    if let Err(e) = simfs::commands::run(args, &mut std::io::stdout().lock()) {
        eprintln!("simfs: {e:#}");
        let code = e.downcast_ref::<FsError>().map_or(1, FsError::errno);
        std::process::exit(code);
    }
    Ok(())
}
