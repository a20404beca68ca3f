//! MIPS I 指令解释器。
//!
//! 一次执行一条指令：取指、译码、执行，然后按
//! `PrevPC <- PC <- NextPC <- pc_after` 推进，
//! 分支与跳转改写的是 `pc_after`，于是延迟槽自然成立。
//!
//! 访存与取指途中抛出的异常会原样传出去，PC 保持不动，
//! 等内核补好快表后整条指令重来一遍。

use super::{Exception, Machine};
use super::{NEXT_PC_REG, PC_REG, RET_ADDR_REG};

pub fn one_instruction(machine: &mut Machine) -> Result<(), Exception> {
    let instruction = machine.read_mem(machine.register(PC_REG) as u32, 4)?;

    let op = instruction >> 26;
    let rs = (instruction >> 21 & 0x1f) as usize;
    let rt = (instruction >> 16 & 0x1f) as usize;
    let rd = (instruction >> 11 & 0x1f) as usize;
    let shamt = instruction >> 6 & 0x1f;
    let funct = instruction & 0x3f;
    let imm = instruction as u16;
    let simm = i32::from(imm as i16);
    let target = instruction & 0x03ff_ffff;

    let a = machine.register(rs);
    let b = machine.register(rt);
    let next_pc = machine.register(NEXT_PC_REG);
    let mut pc_after = next_pc.wrapping_add(4);
    let branch = next_pc.wrapping_add(simm << 2);

    match op {
        // SPECIAL
        0 => match funct {
            0x0c => return Err(Exception::Syscall),
            0x00 => machine.set_register(rd, ((b as u32) << shamt) as i32), // sll
            0x02 => machine.set_register(rd, ((b as u32) >> shamt) as i32), // srl
            0x03 => machine.set_register(rd, b >> shamt),                   // sra
            0x04 => machine.set_register(rd, ((b as u32) << (a & 0x1f)) as i32), // sllv
            0x06 => machine.set_register(rd, ((b as u32) >> (a & 0x1f)) as i32), // srlv
            0x07 => machine.set_register(rd, b >> (a & 0x1f)),              // srav
            0x08 => pc_after = a,                                           // jr
            0x09 => {
                // jalr
                machine.set_register(rd, next_pc.wrapping_add(4));
                pc_after = a;
            }
            0x20 => machine.set_register(rd, a.checked_add(b).ok_or(Exception::Overflow)?),
            0x21 => machine.set_register(rd, a.wrapping_add(b)), // addu
            0x22 => machine.set_register(rd, a.checked_sub(b).ok_or(Exception::Overflow)?),
            0x23 => machine.set_register(rd, a.wrapping_sub(b)), // subu
            0x24 => machine.set_register(rd, a & b),
            0x25 => machine.set_register(rd, a | b),
            0x26 => machine.set_register(rd, a ^ b),
            0x27 => machine.set_register(rd, !(a | b)), // nor
            0x2a => machine.set_register(rd, i32::from(a < b)), // slt
            0x2b => machine.set_register(rd, i32::from((a as u32) < b as u32)), // sltu
            _ => return Err(Exception::IllegalInstruction(instruction)),
        },

        // REGIMM: bltz/bgez
        1 => {
            let taken = match rt {
                0x00 => a < 0,
                0x01 => a >= 0,
                _ => return Err(Exception::IllegalInstruction(instruction)),
            };
            if taken {
                pc_after = branch;
            }
        }

        2 => pc_after = jump_target(next_pc, target), // j
        3 => {
            // jal
            machine.set_register(RET_ADDR_REG, next_pc.wrapping_add(4));
            pc_after = jump_target(next_pc, target);
        }

        4 if a == b => pc_after = branch, // beq
        5 if a != b => pc_after = branch, // bne
        6 if a <= 0 => pc_after = branch, // blez
        7 if a > 0 => pc_after = branch,  // bgtz
        4..=7 => {}                       // 未被采纳的分支

        8 => machine.set_register(rt, a.checked_add(simm).ok_or(Exception::Overflow)?), // addi
        9 => machine.set_register(rt, a.wrapping_add(simm)), // addiu
        10 => machine.set_register(rt, i32::from(a < simm)), // slti
        11 => machine.set_register(rt, i32::from((a as u32) < simm as u32)), // sltiu
        12 => machine.set_register(rt, a & i32::from(imm)),  // andi
        13 => machine.set_register(rt, a | i32::from(imm)),  // ori
        14 => machine.set_register(rt, a ^ i32::from(imm)),  // xori
        15 => machine.set_register(rt, ((u32::from(imm)) << 16) as i32), // lui

        32 => {
            let value = machine.read_mem(mem_addr(a, simm), 1)?;
            machine.set_register(rt, i32::from(value as u8 as i8)); // lb
        }
        33 => {
            let value = machine.read_mem(mem_addr(a, simm), 2)?;
            machine.set_register(rt, i32::from(value as u16 as i16)); // lh
        }
        35 => {
            let value = machine.read_mem(mem_addr(a, simm), 4)?;
            machine.set_register(rt, value as i32); // lw
        }
        36 => {
            let value = machine.read_mem(mem_addr(a, simm), 1)?;
            machine.set_register(rt, value as i32); // lbu
        }
        37 => {
            let value = machine.read_mem(mem_addr(a, simm), 2)?;
            machine.set_register(rt, value as i32); // lhu
        }
        40 => machine.write_mem(mem_addr(a, simm), 1, b as u32)?, // sb
        41 => machine.write_mem(mem_addr(a, simm), 2, b as u32)?, // sh
        43 => machine.write_mem(mem_addr(a, simm), 4, b as u32)?, // sw

        _ => return Err(Exception::IllegalInstruction(instruction)),
    }

    machine.advance_pc_to(pc_after);
    Ok(())
}

#[inline]
fn mem_addr(base: i32, offset: i32) -> u32 {
    base.wrapping_add(offset) as u32
}

/// 跳转目标落在延迟槽所在的 256MB 段内
#[inline]
fn jump_target(next_pc: i32, target: u32) -> i32 {
    ((next_pc as u32 & 0xf000_0000) | (target << 2)) as i32
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::machine_with_program;
    use super::*;
    use crate::assemble;

    #[test]
    fn arithmetic_and_logic() {
        let program = [
            assemble::addiu(2, 0, 100),
            assemble::addiu(3, 2, -30),
            assemble::lui(4, 0x1234),
            assemble::ori(4, 4, 0x5678),
            assemble::addu(5, 2, 3),
            assemble::slt(6, 3, 2),
        ];
        let mut machine = machine_with_program(&program);
        for _ in 0..program.len() {
            one_instruction(&mut machine).unwrap();
        }

        assert_eq!(machine.register(2), 100);
        assert_eq!(machine.register(3), 70);
        assert_eq!(machine.register(4), 0x1234_5678);
        assert_eq!(machine.register(5), 170);
        assert_eq!(machine.register(6), 1);
    }

    #[test]
    fn branch_takes_effect_after_the_delay_slot() {
        let program = [
            assemble::addiu(2, 0, 1),
            assemble::beq(0, 0, 2),  // 跳过第 4 条
            assemble::addiu(3, 0, 7), // 延迟槽仍执行
            assemble::addiu(2, 0, 99),
            assemble::addiu(4, 0, 5),
        ];
        let mut machine = machine_with_program(&program);
        for _ in 0..4 {
            one_instruction(&mut machine).unwrap();
        }

        assert_eq!(machine.register(2), 1, "skipped instruction must not run");
        assert_eq!(machine.register(3), 7, "delay slot must run");
        assert_eq!(machine.register(4), 5);
    }

    #[test]
    fn loads_and_stores_round_trip() {
        let program = [
            assemble::addiu(8, 0, 0x100),
            assemble::addiu(9, 0, -2),
            assemble::sw(9, 8, 0),
            assemble::lw(10, 8, 0),
            assemble::lb(11, 8, 0),
            assemble::lbu(12, 8, 0),
        ];
        let mut machine = machine_with_program(&program);
        for _ in 0..program.len() {
            one_instruction(&mut machine).unwrap();
        }

        assert_eq!(machine.register(10), -2);
        assert_eq!(machine.register(11), -2);
        assert_eq!(machine.register(12), 0xfe);
    }

    #[test]
    fn syscall_surfaces_without_advancing_pc() {
        let program = [assemble::syscall()];
        let mut machine = machine_with_program(&program);

        assert_eq!(one_instruction(&mut machine), Err(Exception::Syscall));
        assert_eq!(machine.register(PC_REG), 0);

        machine.advance_pc();
        assert_eq!(machine.register(PC_REG), 4);
        assert_eq!(machine.register(NEXT_PC_REG), 8);
    }

    #[test]
    fn illegal_instruction_is_reported() {
        let program = [0xffff_ffff];
        let mut machine = machine_with_program(&program);
        assert_eq!(
            one_instruction(&mut machine),
            Err(Exception::IllegalInstruction(0xffff_ffff))
        );
    }
}
