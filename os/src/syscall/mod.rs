//! 系统调用分发。
//!
//! 自陷时 r2 携带调用号，r4..r7 是参数，结果放回 r2，
//! 返回用户态之前 PC 要照着延迟槽的规矩往前拨一格。
//! 字符串参数是虚拟地址，逐字节经容忍缺页的读取原语取到 NUL 为止。

mod fs;
mod process;

use log::debug;

use crate::kernel::Kernel;
use crate::machine::{Exception, Machine};
use crate::memory::{fault, AddrSpace, FrameTable};

const HALT: i32 = 0;
const EXIT: i32 = 1;
const EXEC: i32 = 2;
const JOIN: i32 = 3;
const CREATE: i32 = 4;
const OPEN: i32 = 5;
const READ: i32 = 6;
const WRITE: i32 = 7;
const CLOSE: i32 = 8;
const FORK: i32 = 9;
const YIELD: i32 = 10;

/// 一次系统调用之后线程的去向
pub enum Flow {
    Continue,
    Exit(i32),
    Halt,
}

pub fn dispatch(kernel: &mut Kernel, machine: &mut Machine, space: &mut AddrSpace) -> Flow {
    let id = machine.register(2);
    match id {
        HALT => {
            debug!("in syscall Halt");
            println!(
                "TLB lookups: {}, misses: {}",
                machine.tlb_lookups, machine.tlb_misses
            );
            Flow::Halt
        }
        EXIT => {
            let status = machine.register(4);
            println!(
                "User program (tid={}) exits with code: {status}",
                space.tid
            );
            Flow::Exit(status)
        }
        EXEC => process::sys_exec(kernel, machine, space),
        JOIN => process::sys_join(kernel, machine),
        FORK => process::sys_fork(kernel, machine, space),
        YIELD => {
            std::thread::yield_now();
            machine.advance_pc();
            Flow::Continue
        }
        CREATE => fs::sys_create(kernel, machine, space),
        OPEN => fs::sys_open(kernel, machine, space),
        READ => fs::sys_read(kernel, machine, space),
        WRITE => fs::sys_write(kernel, machine, space),
        CLOSE => fs::sys_close(machine, space),
        _ => {
            log::error!("unimplemented syscall {id}");
            Flow::Exit(-1)
        }
    }
}

/// 容忍缺页的读：缺页就地补好快表再重试
fn read_mem_stubborn(
    machine: &mut Machine,
    space: &mut AddrSpace,
    frames: &mut FrameTable,
    vaddr: u32,
    size: usize,
) -> Result<u32, Exception> {
    loop {
        match machine.read_mem(vaddr, size) {
            Ok(value) => return Ok(value),
            Err(Exception::PageFault(bad)) => {
                fault::handle_page_fault(machine, space, frames, bad)?;
            }
            Err(error) => return Err(error),
        }
    }
}

fn write_mem_stubborn(
    machine: &mut Machine,
    space: &mut AddrSpace,
    frames: &mut FrameTable,
    vaddr: u32,
    size: usize,
    value: u32,
) -> Result<(), Exception> {
    loop {
        match machine.write_mem(vaddr, size, value) {
            Ok(()) => return Ok(()),
            Err(Exception::PageFault(bad)) => {
                fault::handle_page_fault(machine, space, frames, bad)?;
            }
            Err(error) => return Err(error),
        }
    }
}

/// 取用户空间的 NUL 结尾字符串
fn read_str(
    machine: &mut Machine,
    space: &mut AddrSpace,
    frames: &mut FrameTable,
    mut vaddr: u32,
) -> Result<String, Exception> {
    let mut bytes = Vec::new();
    loop {
        let byte = read_mem_stubborn(machine, space, frames, vaddr, 1)? as u8;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
        vaddr += 1;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_bytes(
    machine: &mut Machine,
    space: &mut AddrSpace,
    frames: &mut FrameTable,
    vaddr: u32,
    len: usize,
) -> Result<Vec<u8>, Exception> {
    (0..len)
        .map(|i| read_mem_stubborn(machine, space, frames, vaddr + i as u32, 1).map(|b| b as u8))
        .collect()
}

fn write_bytes(
    machine: &mut Machine,
    space: &mut AddrSpace,
    frames: &mut FrameTable,
    vaddr: u32,
    bytes: &[u8],
) -> Result<(), Exception> {
    for (i, &byte) in bytes.iter().enumerate() {
        write_mem_stubborn(machine, space, frames, vaddr + i as u32, 1, byte.into())?;
    }
    Ok(())
}

/// 相对路径拼上地址空间的工作目录
fn resolve(space: &AddrSpace, name: &str) -> String {
    if name.starts_with('/') {
        name.to_owned()
    } else {
        format!("{}{name}", space.cwd)
    }
}
