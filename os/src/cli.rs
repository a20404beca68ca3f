use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(name = "minos", about = "A teaching operating system simulator")]
pub struct Cli {
    /// Disk image backing the simulated file system
    #[arg(long, default_value = "DISK")]
    pub disk: PathBuf,

    /// Format the disk before anything else
    #[arg(short = 'f', long)]
    pub format: bool,

    /// Import a host file into the simulated file system
    #[arg(long = "cp", num_args = 2, value_names = ["HOST", "PATH"])]
    pub copy: Option<Vec<String>>,

    /// Create a directory
    #[arg(long, value_name = "PATH")]
    pub mkdir: Option<String>,

    /// Print a file to stdout
    #[arg(short = 'p', long, value_name = "PATH")]
    pub print: Option<String>,

    /// Remove a file or an empty directory
    #[arg(short = 'r', long, value_name = "PATH")]
    pub remove: Option<String>,

    /// List the whole directory tree
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Dump the full file-system state
    #[arg(short = 'D', long)]
    pub dump: bool,

    /// Run a user executable
    #[arg(short = 'x', long, value_name = "PATH")]
    pub exec: Option<String>,

    #[arg(long, value_enum, default_value_t = PagingArg::Inverted)]
    pub paging: PagingArg,

    #[arg(long, value_enum, default_value_t = PolicyArg::Fifo)]
    pub tlb_policy: PolicyArg,

    #[arg(long, value_enum, default_value_t = PolicyArg::Fifo)]
    pub page_policy: PolicyArg,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PagingArg {
    Linear,
    Inverted,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    Fifo,
    Lru,
}
