use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Output image
    #[arg(long, short)]
    pub out: PathBuf,

    /// Image size in MiB
    #[arg(long, short, default_value_t = 16)]
    pub size_mib: u64,

    /// Inode count, 0 for one inode per three blocks
    #[arg(long, short, default_value_t = 0)]
    pub inodes: usize,

    /// Directory whose regular files are copied into the root directory
    #[arg(long)]
    pub source: Option<PathBuf>,
}
