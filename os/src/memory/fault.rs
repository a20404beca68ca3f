//! 缺页处理。
//!
//! 快表未命中一律走到这里。先给翻译挑一个快表槽：有空槽用空槽，
//! 没有就按策略顶掉一条，被顶掉的条目要先把 Use/Dirty 写回权威表
//! （线性页表或倒排页表），否则脏页信息就丢了。
//!
//! 线性分页下页面必然驻留，从页表抄一条进快表即告收工；
//! 倒排分页下页面可能还躺在交换文件里，这时要在驻留集内找空闲页帧，
//! 找不到就按策略换出一页——脏的先写回其属主的交换文件——
//! 再把目标页从当前线程的交换文件里读进来。

use enumflags2::BitFlags;
use log::debug;
use sector_fs::{Bitmap, OpenFile};

use super::address_space::{AddrSpace, SpaceMode};
use super::frame_table::FrameTable;
use super::policy::ReplacementPolicy;
use super::translation::{EntryFlag, FrameEntry, TranslationEntry};
use crate::config::PAGE_SIZE;
use crate::machine::{Exception, Machine};

/// 处理 `bad_vaddr` 上的缺页。
/// 地址落在地址空间之外无药可救，原样抛给调用者去结果线程。
pub fn handle_page_fault(
    machine: &mut Machine,
    space: &mut AddrSpace,
    frames: &mut FrameTable,
    bad_vaddr: u32,
) -> Result<(), Exception> {
    let vpn = bad_vaddr as usize / PAGE_SIZE;
    if vpn >= space.num_pages {
        return Err(Exception::AddressError(bad_vaddr));
    }
    debug!("page fault at {bad_vaddr:#x}, vpn {vpn}");

    let tid = space.tid;
    let slot = machine.tlb.choose_slot();
    let evicted = machine.tlb.entries[slot];

    match &mut space.mode {
        SpaceMode::Linear { page_table } => {
            // 被顶掉的翻译写回页表，脏位随之落座
            if evicted.is_valid() {
                page_table[evicted.virtual_page as usize] = evicted;
            }

            // 线性分页不换页，页面必然驻留
            let entry = page_table[vpn];
            assert!(entry.is_valid());
            machine.tlb.fill(slot, entry);
        }

        SpaceMode::Inverted {
            swap,
            ro_map,
            policy,
            ..
        } => {
            if evicted.is_valid() {
                frames.entries[evicted.physical_page as usize].flags = evicted.flags;
            }

            let ppn = match frames.find_frame(tid, vpn as u32) {
                Some(ppn) => ppn,
                None => page_in(machine, frames, swap, ro_map, policy.as_mut(), tid, vpn),
            };
            machine.tlb.fill(
                slot,
                TranslationEntry {
                    virtual_page: vpn as u32,
                    physical_page: ppn as u32,
                    flags: frames.entries[ppn].flags,
                },
            );
        }
    }

    Ok(())
}

/// 把虚拟页 `vpn` 从交换文件装进驻留集，返回它落脚的页帧
fn page_in(
    machine: &mut Machine,
    frames: &mut FrameTable,
    swap: &OpenFile,
    ro_map: &Bitmap,
    policy: &mut dyn ReplacementPolicy,
    tid: usize,
    vpn: usize,
) -> usize {
    let ppn = match frames.find_invalid(tid) {
        Some(ppn) => ppn,
        None => {
            let resident = frames.resident(tid);
            let victim = policy.victim(&resident);

            // 牺牲页可能还挂在快表里：同步脏位后作废那一条
            if let Some(slot) = machine.tlb.slot_of(frames.entries[victim].virtual_page) {
                frames.entries[victim].flags = machine.tlb.entries[slot].flags;
                machine.tlb.invalidate(slot);
            }

            let old = frames.entries[victim];
            if old.flags.contains(EntryFlag::D) {
                debug!(
                    "evicting dirty vpn {} from frame {victim}",
                    old.virtual_page
                );
                swap.write_at(
                    &machine.memory[victim * PAGE_SIZE..(victim + 1) * PAGE_SIZE],
                    old.virtual_page as usize * PAGE_SIZE,
                );
            }
            victim
        }
    };

    debug!("paging vpn {vpn} into frame {ppn}");
    swap.read_at(
        &mut machine.memory[ppn * PAGE_SIZE..(ppn + 1) * PAGE_SIZE],
        vpn * PAGE_SIZE,
    );

    let mut flags = BitFlags::from(EntryFlag::V);
    if ro_map.test(vpn) {
        flags |= EntryFlag::R;
    }
    assert_eq!(frames.entries[ppn].tid, tid as i32);
    frames.entries[ppn] = FrameEntry {
        virtual_page: vpn as u32,
        flags,
        tid: tid as i32,
    };
    policy.insert(ppn);

    ppn
}
