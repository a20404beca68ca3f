//! 倒排页表与物理页帧位图。
//!
//! 倒排页表按**物理页帧**编号索引，每条记录持有者线程与虚拟页号，
//! 这样地址空间与页帧之间不必互相背着指针：
//! 地址空间销毁时线性扫一遍表即可收回自己的页帧。

use sector_fs::Bitmap;

use super::translation::FrameEntry;
use crate::config::{NUM_PHYS_PAGES, RES_SIZE};

pub struct FrameTable {
    pub entries: Vec<FrameEntry>,
    /// 物理页帧位图：线性分页下按页分配，
    /// 倒排分页下整个驻留集一起占用
    pub mem_map: Bitmap,
}

impl Default for FrameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTable {
    pub fn new() -> Self {
        Self {
            entries: vec![FrameEntry::default(); NUM_PHYS_PAGES],
            mem_map: Bitmap::new(NUM_PHYS_PAGES),
        }
    }

    /// 为线程圈出 `RES_SIZE` 个无主页帧作驻留集。
    /// 没凑够就整体失败，不留下半个被占的页帧。
    pub fn reserve_resident(&mut self, tid: usize) -> bool {
        let claimed: Vec<usize> = (0..self.entries.len())
            .filter(|&ppn| self.entries[ppn].tid == -1)
            .take(RES_SIZE)
            .collect();
        if claimed.len() < RES_SIZE {
            return false;
        }

        for &ppn in &claimed {
            assert!(!self.entries[ppn].is_valid());
            self.entries[ppn].tid = tid as i32;
            self.mem_map.mark(ppn);
        }
        true
    }

    /// 线程落幕，收回它名下的全部页帧
    pub fn release_thread(&mut self, tid: usize) {
        for ppn in 0..self.entries.len() {
            if self.entries[ppn].tid == tid as i32 {
                self.entries[ppn] = FrameEntry::default();
                self.mem_map.clear(ppn);
            }
        }
    }

    /// 线程的虚拟页当前驻留在哪个页帧
    pub fn find_frame(&self, tid: usize, vpn: u32) -> Option<usize> {
        (0..self.entries.len()).find(|&ppn| {
            let entry = &self.entries[ppn];
            entry.tid == tid as i32 && entry.is_valid() && entry.virtual_page == vpn
        })
    }

    /// 驻留集内还空着的页帧
    pub fn find_invalid(&self, tid: usize) -> Option<usize> {
        (0..self.entries.len())
            .find(|&ppn| self.entries[ppn].tid == tid as i32 && !self.entries[ppn].is_valid())
    }

    /// 线程驻留集内的全部页帧号
    pub fn resident(&self, tid: usize) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|&ppn| self.entries[ppn].tid == tid as i32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resident_sets_do_not_overlap() {
        let mut frames = FrameTable::new();
        for tid in 0..NUM_PHYS_PAGES / RES_SIZE {
            assert!(frames.reserve_resident(tid), "tid={tid}");
        }
        // 页帧分完了
        assert!(!frames.reserve_resident(99));

        frames.release_thread(0);
        assert!(frames.reserve_resident(99));
        assert_eq!(frames.resident(99).len(), RES_SIZE);
    }

    #[test]
    fn release_clears_ownership_and_bits() {
        let mut frames = FrameTable::new();
        frames.reserve_resident(3);
        assert_eq!(frames.resident(3).len(), RES_SIZE);
        assert_eq!(frames.find_invalid(3), Some(0));

        frames.release_thread(3);
        assert!(frames.resident(3).is_empty());
        assert_eq!(frames.mem_map.num_clear(), NUM_PHYS_PAGES);
    }
}
