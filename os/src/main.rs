mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, PagingArg, PolicyArg};
use sector_fs::{FileSystem, FileType};

use os::drivers::{DiskFile, WallClock};
use os::kernel::Kernel;
use os::machine::Machine;
use os::memory::policy::PolicyKind;
use os::memory::PagingMode;
use os::{logging, process};

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let device = match DiskFile::open(&cli.disk) {
        Ok(device) => Arc::new(device),
        Err(error) => {
            eprintln!("unable to open disk image {:?}: {error}", cli.disk);
            return ExitCode::FAILURE;
        }
    };
    let fs = FileSystem::new(device, Arc::new(WallClock), cli.format);
    let mut kernel = Kernel::new(fs, cli.paging.into(), cli.page_policy.into());

    if let Some(args) = &cli.copy {
        copy_in(&kernel, &args[0], &args[1]);
    }
    if let Some(path) = &cli.mkdir {
        if let Err(error) = kernel.fs.make_dir(path) {
            println!("Unable to create directory \"{path}\": {error}.");
        }
    }
    if let Some(path) = &cli.remove {
        if let Err(error) = kernel.fs.remove(path) {
            println!("Unable to remove \"{path}\": {error}.");
        }
    }
    if let Some(path) = &cli.print {
        print_file(&kernel, path);
    }
    if cli.list {
        kernel.fs.list();
    }
    if cli.dump {
        kernel.fs.dump();
    }

    let mut status = 0;
    if let Some(path) = &cli.exec {
        let mut machine = Machine::new(cli.tlb_policy.into());
        match process::start(&mut kernel, &mut machine, path) {
            Ok((_, code)) => status = code,
            Err(error) => {
                println!("Unable to run \"{path}\": {error}.");
                status = -1;
            }
        }
    }

    ExitCode::from(status as u8)
}

/// 把宿主机文件搬进模拟文件系统，类型按文件名后缀推断
fn copy_in(kernel: &Kernel, host: &str, path: &str) {
    let bytes = match std::fs::read(host) {
        Ok(bytes) => bytes,
        Err(error) => {
            println!("Unable to read host file \"{host}\": {error}.");
            return;
        }
    };

    let leaf = path.rsplit('/').next().unwrap_or(path);
    let result = kernel
        .fs
        .create(path, FileType::from_name(leaf))
        .map(|()| kernel.fs.open(path).map(|file| file.write_at(&bytes, 0)));
    match result {
        Ok(Ok(written)) if written == bytes.len() => {
            println!("Copied {host} -> {path} ({written} bytes).");
        }
        Ok(Ok(written)) => println!("Short copy of {host}: {written}/{} bytes.", bytes.len()),
        Ok(Err(error)) | Err(error) => println!("Unable to copy to \"{path}\": {error}."),
    }
}

fn print_file(kernel: &Kernel, path: &str) {
    match kernel.fs.open(path) {
        Ok(file) => {
            let bytes = file.read_all();
            print!("{}", String::from_utf8_lossy(&bytes));
        }
        Err(error) => println!("Unable to print \"{path}\": {error}."),
    }
}

impl From<PagingArg> for PagingMode {
    fn from(arg: PagingArg) -> Self {
        match arg {
            PagingArg::Linear => Self::Linear,
            PagingArg::Inverted => Self::Inverted,
        }
    }
}

impl From<PolicyArg> for PolicyKind {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Fifo => Self::Fifo,
            PolicyArg::Lru => Self::Lru,
        }
    }
}
