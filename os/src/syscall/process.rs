//! 进程类系统调用。
//!
//! 调度器不在核心之内，模拟器是确定性的单处理器：
//! Exec 与 Fork 的孩子同步地一口气跑完，父程序再接着走。

use log::debug;

use super::Flow;
use super::{read_str, resolve};
use crate::config::PAGE_SIZE;
use crate::kernel::Kernel;
use crate::machine::{Machine, NEXT_PC_REG, PC_REG, RET_ADDR_REG};
use crate::memory::AddrSpace;
use crate::process;

pub fn sys_exec(kernel: &mut Kernel, machine: &mut Machine, space: &mut AddrSpace) -> Flow {
    debug!("in syscall Exec");
    let vaddr = machine.register(4) as u32;
    let Ok(name) = read_str(machine, space, &mut kernel.frames, vaddr) else {
        return Flow::Exit(-1);
    };
    let path = resolve(space, &name);

    // 先拨好 PC 再存档，子程序归来时从系统调用之后接着跑
    machine.advance_pc();
    let saved = machine.save_registers();

    let result = process::start(kernel, machine, &path);

    // 子程序的映射对父地址空间全部无效
    machine.context_switch();
    machine.restore_registers(saved);
    if kernel.halted {
        return Flow::Halt;
    }

    let tid = match result {
        Ok((tid, _)) => tid as i32,
        Err(error) => {
            println!("Unable to exec \"{path}\": {error}.");
            -1
        }
    };
    machine.set_register(2, tid);
    Flow::Continue
}

pub fn sys_join(kernel: &mut Kernel, machine: &mut Machine) -> Flow {
    debug!("in syscall Join");
    let tid = machine.register(4);
    let code = kernel.threads.exit_code(tid.max(0) as usize).unwrap_or(-1);

    machine.set_register(2, code);
    machine.advance_pc();
    Flow::Continue
}

/// 在当前地址空间里同步地跑完 `func`。
/// 孩子顺着父线程的栈顶往低处长，父线程已压栈的数据动不到；
/// 返回地址指向空间之外，孩子要是胆敢从 `func` 返回就会被结果掉。
pub fn sys_fork(kernel: &mut Kernel, machine: &mut Machine, space: &mut AddrSpace) -> Flow {
    debug!("in syscall Fork");
    let func = machine.register(4);

    machine.advance_pc();
    let saved = machine.save_registers();

    machine.set_register(PC_REG, func);
    machine.set_register(NEXT_PC_REG, func.wrapping_add(4));
    machine.set_register(
        RET_ADDR_REG,
        (space.num_pages * PAGE_SIZE) as i32,
    );
    let code = process::run(kernel, machine, space);
    debug!("forked function finished with code {code}");

    machine.restore_registers(saved);
    if kernel.halted {
        Flow::Halt
    } else {
        Flow::Continue
    }
}
