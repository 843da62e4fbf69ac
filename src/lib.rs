pub mod cli_interface;
pub mod commands;
mod fs;
pub mod mkfs;
pub mod utils;
pub use fs::*;
