//! 文件类系统调用。
//!
//! 0 号与 1 号文件是控制台的进口与出口，
//! 真正的文件号经每地址空间的打开文件表换成内核句柄。

use std::io;
use std::io::Write;

use log::debug;
use sector_fs::FileType;

use super::Flow;
use super::{read_bytes, read_str, resolve, write_bytes};
use crate::config::{CONSOLE_INPUT, CONSOLE_OUTPUT};
use crate::kernel::Kernel;
use crate::machine::Machine;
use crate::memory::AddrSpace;

pub fn sys_create(kernel: &mut Kernel, machine: &mut Machine, space: &mut AddrSpace) -> Flow {
    debug!("in syscall Create");
    let vaddr = machine.register(4) as u32;
    let Ok(name) = read_str(machine, space, &mut kernel.frames, vaddr) else {
        return Flow::Exit(-1);
    };

    let path = resolve(space, &name);
    if let Err(error) = kernel.fs.create(&path, FileType::Unk) {
        println!("Unable to create file \"{path}\": {error}.");
    }

    machine.advance_pc();
    Flow::Continue
}

pub fn sys_open(kernel: &mut Kernel, machine: &mut Machine, space: &mut AddrSpace) -> Flow {
    debug!("in syscall Open");
    let vaddr = machine.register(4) as u32;
    let Ok(name) = read_str(machine, space, &mut kernel.frames, vaddr) else {
        return Flow::Exit(-1);
    };

    let path = resolve(space, &name);
    let id = match kernel.fs.open(&path) {
        Ok(file) => space.files.insert(file),
        Err(error) => {
            println!("Unable to open file \"{path}\": {error}.");
            -1
        }
    };

    machine.set_register(2, id);
    machine.advance_pc();
    Flow::Continue
}

pub fn sys_write(kernel: &mut Kernel, machine: &mut Machine, space: &mut AddrSpace) -> Flow {
    debug!("in syscall Write");
    let vaddr = machine.register(4) as u32;
    let len = machine.register(5).max(0) as usize;
    let id = machine.register(6);

    let Ok(bytes) = read_bytes(machine, space, &mut kernel.frames, vaddr, len) else {
        return Flow::Exit(-1);
    };

    match id {
        CONSOLE_INPUT => {
            println!("Cannot Write to ConsoleInput!");
            return Flow::Exit(-1);
        }
        CONSOLE_OUTPUT => {
            let mut stdout = io::stdout();
            stdout.write_all(&bytes).unwrap();
            stdout.flush().unwrap();
        }
        _ => match space.files.get(id) {
            Some(file) => {
                file.write(&bytes);
            }
            None => println!("Write to a stale file id {id}!"),
        },
    }

    machine.advance_pc();
    Flow::Continue
}

pub fn sys_read(kernel: &mut Kernel, machine: &mut Machine, space: &mut AddrSpace) -> Flow {
    debug!("in syscall Read");
    let vaddr = machine.register(4) as u32;
    let len = machine.register(5).max(0) as usize;
    let id = machine.register(6);

    let mut bytes = vec![0; len];
    let count = match id {
        CONSOLE_OUTPUT => {
            println!("Cannot Read from ConsoleOutput!");
            return Flow::Exit(-1);
        }
        CONSOLE_INPUT => {
            let mut line = String::new();
            io::stdin().read_line(&mut line).unwrap_or(0);
            // 换行符不算输入
            let line = line.trim_end_matches('\n').as_bytes();
            let count = line.len().min(len);
            bytes[..count].copy_from_slice(&line[..count]);
            count
        }
        _ => match space.files.get(id) {
            Some(file) => file.read(&mut bytes),
            None => {
                println!("Read from a stale file id {id}!");
                0
            }
        },
    };

    if write_bytes(machine, space, &mut kernel.frames, vaddr, &bytes[..count]).is_err() {
        return Flow::Exit(-1);
    }
    machine.set_register(2, count as i32);
    machine.advance_pc();
    Flow::Continue
}

pub fn sys_close(machine: &mut Machine, space: &mut AddrSpace) -> Flow {
    debug!("in syscall Close");
    let id = machine.register(4);
    if space.files.remove(id).is_none() {
        println!("Close on a stale file id {id}!");
    }

    machine.advance_pc();
    Flow::Continue
}
