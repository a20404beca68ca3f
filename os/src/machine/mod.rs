//! 模拟机器：主存、寄存器堆与软件管理的快表。
//!
//! 地址翻译只查快表：命中则顺手设好 Use/Dirty 位，
//! 未命中一律抛 [`Exception::PageFault`]，填表是内核的事。
//! 上下文切换时快表整个作废，因为它缓存的是当前地址空间的映射。

pub mod cpu;

use enumflags2::BitFlags;

use crate::config::{MEMORY_SIZE, PAGE_SIZE, TLB_SIZE};
use crate::memory::policy::{PolicyKind, ReplacementPolicy};
use crate::memory::translation::{EntryFlag, TranslationEntry};

pub const NUM_TOTAL_REGS: usize = 40;
/// 栈指针
pub const STACK_REG: usize = 29;
/// 返回地址
pub const RET_ADDR_REG: usize = 31;
pub const PC_REG: usize = 34;
pub const NEXT_PC_REG: usize = 35;
/// 上一条指令的地址，异常回溯用
pub const PREV_PC_REG: usize = 36;
/// 延迟装载的目标寄存器与值
pub const LOAD_REG: usize = 37;
pub const LOAD_VALUE_REG: usize = 38;
/// 引发访存异常的虚拟地址
pub const BAD_VADDR_REG: usize = 39;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// 用户程序自陷进内核
    Syscall,
    /// 快表没接住这次翻译
    PageFault(u32),
    /// 写只读页
    ReadOnly(u32),
    /// 地址不对齐或越界
    AddressError(u32),
    /// 算术溢出
    Overflow,
    IllegalInstruction(u32),
}

pub struct Machine {
    pub memory: Vec<u8>,
    registers: [i32; NUM_TOTAL_REGS],
    pub tlb: Tlb,
    /// 地址翻译的总次数与未命中次数
    pub tlb_lookups: u64,
    pub tlb_misses: u64,
}

pub struct Tlb {
    pub entries: [TranslationEntry; TLB_SIZE],
    pub policy: Box<dyn ReplacementPolicy>,
}

impl Machine {
    pub fn new(tlb_policy: PolicyKind) -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE],
            registers: [0; NUM_TOTAL_REGS],
            tlb: Tlb {
                entries: [TranslationEntry::default(); TLB_SIZE],
                policy: tlb_policy.build(),
            },
            tlb_lookups: 0,
            tlb_misses: 0,
        }
    }

    #[inline]
    pub fn register(&self, index: usize) -> i32 {
        self.registers[index]
    }

    pub fn set_register(&mut self, index: usize, value: i32) {
        // r0 恒为零
        if index != 0 {
            self.registers[index] = value;
        }
    }

    /// 虚拟地址 -> 主存下标。
    /// 只查快表；命中时更新 Use/Dirty 并通知置换策略。
    pub fn translate(&mut self, vaddr: u32, writing: bool) -> Result<usize, Exception> {
        self.tlb_lookups += 1;
        let vpn = vaddr as usize / PAGE_SIZE;
        let offset = vaddr as usize % PAGE_SIZE;

        let Some(slot) = self
            .tlb
            .entries
            .iter()
            .position(|entry| entry.is_valid() && entry.virtual_page == vpn as u32)
        else {
            self.tlb_misses += 1;
            self.registers[BAD_VADDR_REG] = vaddr as i32;
            return Err(Exception::PageFault(vaddr));
        };

        let entry = &mut self.tlb.entries[slot];
        if writing && entry.flags.contains(EntryFlag::R) {
            self.registers[BAD_VADDR_REG] = vaddr as i32;
            return Err(Exception::ReadOnly(vaddr));
        }
        entry.flags |= EntryFlag::U;
        if writing {
            entry.flags |= EntryFlag::D;
        }
        self.tlb.policy.touch(slot);

        let paddr = entry.physical_page as usize * PAGE_SIZE + offset;
        assert!(paddr < MEMORY_SIZE);
        Ok(paddr)
    }

    /// 从模拟主存读 1/2/4 字节，小端
    pub fn read_mem(&mut self, vaddr: u32, size: usize) -> Result<u32, Exception> {
        self.check_alignment(vaddr, size)?;
        let paddr = self.translate(vaddr, false)?;

        let mut bytes = [0; 4];
        bytes[..size].copy_from_slice(&self.memory[paddr..paddr + size]);
        Ok(u32::from_le_bytes(bytes))
    }

    /// 往模拟主存写 1/2/4 字节，小端
    pub fn write_mem(&mut self, vaddr: u32, size: usize, value: u32) -> Result<(), Exception> {
        self.check_alignment(vaddr, size)?;
        let paddr = self.translate(vaddr, true)?;

        self.memory[paddr..paddr + size].copy_from_slice(&value.to_le_bytes()[..size]);
        Ok(())
    }

    /// 顺序推进 PC，含分支延迟槽的三件套
    pub fn advance_pc(&mut self) {
        let next = self.registers[NEXT_PC_REG];
        self.advance_pc_to(next.wrapping_add(4));
    }

    fn advance_pc_to(&mut self, pc_after: i32) {
        self.registers[PREV_PC_REG] = self.registers[PC_REG];
        self.registers[PC_REG] = self.registers[NEXT_PC_REG];
        self.registers[NEXT_PC_REG] = pc_after;
    }

    pub fn save_registers(&self) -> [i32; NUM_TOTAL_REGS] {
        self.registers
    }

    pub fn restore_registers(&mut self, registers: [i32; NUM_TOTAL_REGS]) {
        self.registers = registers;
    }

    /// 切换地址空间：快表整个作废
    pub fn context_switch(&mut self) {
        self.tlb.flush();
    }

    pub fn page_bytes_mut(&mut self, ppn: usize) -> &mut [u8] {
        &mut self.memory[ppn * PAGE_SIZE..(ppn + 1) * PAGE_SIZE]
    }

    fn check_alignment(&mut self, vaddr: u32, size: usize) -> Result<(), Exception> {
        debug_assert!(matches!(size, 1 | 2 | 4));
        if vaddr as usize % size != 0 {
            self.registers[BAD_VADDR_REG] = vaddr as i32;
            return Err(Exception::AddressError(vaddr));
        }
        Ok(())
    }
}

impl Tlb {
    /// 作废全部条目并抹掉策略的历史
    pub fn flush(&mut self) {
        self.entries = [TranslationEntry::default(); TLB_SIZE];
        self.policy.reset();
    }

    /// 先用空槽，没有空槽按策略挑牺牲者
    pub fn choose_slot(&mut self) -> usize {
        if let Some(slot) = self.entries.iter().position(|entry| !entry.is_valid()) {
            return slot;
        }
        let candidates: Vec<usize> = (0..TLB_SIZE).collect();
        self.policy.victim(&candidates)
    }

    /// `vpn` 当前缓存在哪个槽
    pub fn slot_of(&self, vpn: u32) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.is_valid() && entry.virtual_page == vpn)
    }

    pub fn fill(&mut self, slot: usize, entry: TranslationEntry) {
        self.entries[slot] = entry;
        self.policy.insert(slot);
    }

    pub fn invalidate(&mut self, slot: usize) {
        self.entries[slot].flags = BitFlags::empty();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn machine_with_identity_pages(pages: usize) -> Machine {
        let mut machine = Machine::new(PolicyKind::Fifo);
        for vpn in 0..pages {
            let slot = machine.tlb.choose_slot();
            machine.tlb.fill(
                slot,
                TranslationEntry {
                    virtual_page: vpn as u32,
                    physical_page: vpn as u32,
                    flags: EntryFlag::V.into(),
                },
            );
        }
        machine
    }

    #[test]
    fn translate_sets_use_and_dirty() {
        let mut machine = machine_with_identity_pages(1);

        machine.write_mem(4, 4, 0xdead_beef).unwrap();
        assert_eq!(machine.read_mem(4, 4).unwrap(), 0xdead_beef);
        assert_eq!(machine.read_mem(4, 1).unwrap(), 0xef);
        assert_eq!(machine.read_mem(6, 2).unwrap(), 0xdead);

        let entry = machine.tlb.entries[0];
        assert!(entry.flags.contains(EntryFlag::U));
        assert!(entry.flags.contains(EntryFlag::D));
    }

    #[test]
    fn miss_raises_page_fault() {
        let mut machine = machine_with_identity_pages(1);
        assert_eq!(
            machine.read_mem(PAGE_SIZE as u32, 4),
            Err(Exception::PageFault(PAGE_SIZE as u32))
        );
        assert_eq!(
            machine.register(BAD_VADDR_REG) as u32,
            PAGE_SIZE as u32
        );
        assert_eq!(machine.tlb_misses, 1);
    }

    #[test]
    fn read_only_pages_reject_stores() {
        let mut machine = Machine::new(PolicyKind::Fifo);
        machine.tlb.fill(
            0,
            TranslationEntry {
                virtual_page: 0,
                physical_page: 0,
                flags: EntryFlag::V | EntryFlag::R,
            },
        );

        assert_eq!(machine.read_mem(0, 4), Ok(0));
        assert_eq!(machine.write_mem(0, 4, 1), Err(Exception::ReadOnly(0)));
    }

    #[test]
    fn unaligned_access_is_an_address_error() {
        let mut machine = machine_with_identity_pages(1);
        assert_eq!(machine.read_mem(2, 4), Err(Exception::AddressError(2)));
        assert_eq!(machine.write_mem(1, 2, 0), Err(Exception::AddressError(1)));
    }

    #[test]
    fn context_switch_flushes_the_tlb() {
        let mut machine = machine_with_identity_pages(2);
        machine.context_switch();
        assert!(machine.tlb.entries.iter().all(|entry| !entry.is_valid()));
    }
}
