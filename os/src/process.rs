//! 用户程序的装载与运行。
//!
//! 取指与访存随时可能抛缺页，接住、补好快表、重来；
//! 自陷进内核就去分发系统调用。别的异常都是用户程序的死刑。

use core::fmt;

use log::info;
use sector_fs::{FileType, FsError};

use crate::kernel::Kernel;
use crate::machine::{cpu, Exception, Machine};
use crate::memory::{fault, AddrSpace};
use crate::syscall;
use crate::syscall::Flow;

#[derive(Debug)]
pub enum StartError {
    Fs(FsError),
    /// 不是合法的 NOFF 目标文件
    BadImage,
    TooManyThreads,
    OutOfMemory,
}

/// 装载并运行 `path` 处的可执行文件，回报线程号与退出码
pub fn start(
    kernel: &mut Kernel,
    machine: &mut Machine,
    path: &str,
) -> Result<(usize, i32), StartError> {
    let executable = kernel.fs.open(path).map_err(StartError::Fs)?;
    if executable.kind() != FileType::Exe {
        log::warn!("{path} is not marked EXE, running it anyway");
    }

    let tid = kernel
        .threads
        .spawn()
        .ok_or(StartError::TooManyThreads)?;
    info!("initializing address space of tid {tid}");

    let mut space = match AddrSpace::new(&executable, tid, kernel, machine) {
        Ok(space) => space,
        Err(error) => {
            kernel.threads.exited(tid, -1);
            return Err(error);
        }
    };
    drop(executable);

    machine.context_switch();
    space.init_registers(machine);
    let code = run(kernel, machine, &mut space);

    space.destroy(kernel);
    kernel.threads.exited(tid, code);
    Ok((tid, code))
}

/// 驱动机器执行到线程落幕为止，返回退出码
pub fn run(kernel: &mut Kernel, machine: &mut Machine, space: &mut AddrSpace) -> i32 {
    loop {
        match cpu::one_instruction(machine) {
            Ok(()) => {}

            Err(Exception::Syscall) => match syscall::dispatch(kernel, machine, space) {
                Flow::Continue => {}
                Flow::Exit(code) => return code,
                Flow::Halt => {
                    kernel.halted = true;
                    return 0;
                }
            },

            Err(Exception::PageFault(bad_vaddr)) => {
                if let Err(fatal) =
                    fault::handle_page_fault(machine, space, &mut kernel.frames, bad_vaddr)
                {
                    log::error!("tid {} hit an unrecoverable fault: {fatal:?}", space.tid);
                    return -1;
                }
            }

            Err(fatal) => {
                log::error!("tid {} died on {fatal:?}", space.tid);
                return -1;
            }
        }
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fs(error) => write!(f, "{error}"),
            Self::BadImage => f.write_str("not a valid NOFF binary"),
            Self::TooManyThreads => f.write_str("too many live threads"),
            Self::OutOfMemory => f.write_str("out of memory"),
        }
    }
}

impl From<FsError> for StartError {
    fn from(error: FsError) -> Self {
        Self::Fs(error)
    }
}
