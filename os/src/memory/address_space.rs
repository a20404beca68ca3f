//! 地址空间：一个用户程序的全部虚拟页。
//!
//! 装载时把 NOFF 目标文件的三个段铺进去，两种铺法：
//! - 线性分页：页帧一次性从物理页位图里取够，段内容直接拷进主存，
//!   每空间一张线性页表；
//! - 倒排分页：只圈出固定大小的驻留集，段内容全部写进按地址空间
//!   大小建好的交换文件，页帧等缺页时再按需装入。
//!
//! 整页都是代码的虚拟页记进只读位图，换进来的时候带上只读位。

use log::debug;
use sector_fs::{Bitmap, FileType, FsError, OpenFile};

use super::policy::ReplacementPolicy;
use super::translation::{EntryFlag, TranslationEntry};
use crate::config::{CONSOLE_OUTPUT, FIRST_FILE_ID, PAGE_SIZE, USER_STACK_SIZE};
use crate::kernel::Kernel;
use crate::machine::{Machine, NEXT_PC_REG, PC_REG, STACK_REG};
use crate::noff::{NoffHeader, Segment};
use crate::process::StartError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// 每空间一张线性页表，页帧全驻留
    Linear,
    /// 全局倒排页表加驻留集，按需调页
    Inverted,
}

pub struct AddrSpace {
    pub tid: usize,
    pub num_pages: usize,
    /// 文件系统调用里相对路径的前缀
    pub cwd: String,
    pub files: FdTable,
    pub(crate) mode: SpaceMode,
}

pub(crate) enum SpaceMode {
    Linear {
        page_table: Vec<TranslationEntry>,
    },
    Inverted {
        swap: OpenFile,
        swap_path: String,
        ro_map: Bitmap,
        policy: Box<dyn ReplacementPolicy>,
    },
}

/// 每地址空间的打开文件表。
/// 用户侧只见到不透明的文件号，0 与 1 留给控制台。
#[derive(Default)]
pub struct FdTable {
    files: Vec<Option<OpenFile>>,
}

impl AddrSpace {
    /// 从 NOFF 目标文件装出一个地址空间
    pub fn new(
        executable: &OpenFile,
        tid: usize,
        kernel: &mut Kernel,
        machine: &mut Machine,
    ) -> Result<Self, StartError> {
        let noff = NoffHeader::parse_from(executable).ok_or(StartError::BadImage)?;
        let size = (noff.code.size + noff.init_data.size + noff.uninit_data.size) as usize
            + USER_STACK_SIZE;
        let num_pages = size.div_ceil(PAGE_SIZE);
        debug!(
            "initializing address space, num pages {num_pages}, size {}",
            num_pages * PAGE_SIZE
        );

        let mode = match kernel.paging {
            PagingMode::Linear => Self::load_linear(executable, &noff, num_pages, kernel, machine)?,
            PagingMode::Inverted => Self::load_inverted(executable, &noff, num_pages, tid, kernel)?,
        };

        Ok(Self {
            tid,
            num_pages,
            cwd: String::from("/"),
            files: FdTable::default(),
            mode,
        })
    }

    fn load_linear(
        executable: &OpenFile,
        noff: &NoffHeader,
        num_pages: usize,
        kernel: &mut Kernel,
        machine: &mut Machine,
    ) -> Result<SpaceMode, StartError> {
        if num_pages > kernel.frames.mem_map.num_clear() {
            return Err(StartError::OutOfMemory);
        }

        let mut page_table = Vec::with_capacity(num_pages);
        for vpn in 0..num_pages {
            let ppn = kernel.frames.mem_map.find().unwrap();
            // 清零整个页帧，未初始化数据段与栈由此归零
            machine.page_bytes_mut(ppn).fill(0);
            page_table.push(TranslationEntry {
                virtual_page: vpn as u32,
                physical_page: ppn as u32,
                flags: EntryFlag::V.into(),
            });
        }

        copy_segment_to_memory(executable, &noff.code, &mut page_table, machine, true);
        copy_segment_to_memory(executable, &noff.init_data, &mut page_table, machine, false);

        Ok(SpaceMode::Linear { page_table })
    }

    fn load_inverted(
        executable: &OpenFile,
        noff: &NoffHeader,
        num_pages: usize,
        tid: usize,
        kernel: &mut Kernel,
    ) -> Result<SpaceMode, StartError> {
        if !kernel.frames.reserve_resident(tid) {
            return Err(StartError::OutOfMemory);
        }

        let swap_path = format!("/swap_{tid}");
        // 上一回异常退出可能留下残骸
        match kernel.fs.create(&swap_path, FileType::Swap) {
            Ok(()) => {}
            Err(FsError::NameTaken) => {
                let _ = kernel.fs.remove(&swap_path);
                if let Err(error) = kernel.fs.create(&swap_path, FileType::Swap) {
                    kernel.frames.release_thread(tid);
                    return Err(StartError::Fs(error));
                }
            }
            Err(error) => {
                kernel.frames.release_thread(tid);
                return Err(StartError::Fs(error));
            }
        }
        let swap = kernel.fs.open(&swap_path).map_err(StartError::Fs)?;

        // 交换文件先撑到地址空间的大小，未初始化段自然为零
        if swap.write_at(&vec![0; num_pages * PAGE_SIZE], 0) != num_pages * PAGE_SIZE {
            drop(swap);
            let _ = kernel.fs.remove(&swap_path);
            kernel.frames.release_thread(tid);
            return Err(StartError::OutOfMemory);
        }

        let mut ro_map = Bitmap::new(num_pages);
        copy_segment_to_swap(executable, &noff.code, &swap, Some(&mut ro_map));
        copy_segment_to_swap(executable, &noff.init_data, &swap, None);

        Ok(SpaceMode::Inverted {
            swap,
            swap_path,
            ro_map,
            policy: kernel.page_policy.build(),
        })
    }

    /// 用户态寄存器的初值：从 0 号地址开跑，
    /// 栈顶抵着地址空间的末尾再缩进一点
    pub fn init_registers(&self, machine: &mut Machine) {
        machine.restore_registers([0; crate::machine::NUM_TOTAL_REGS]);
        machine.set_register(PC_REG, 0);
        machine.set_register(NEXT_PC_REG, 4);

        let stack_top = self.num_pages * PAGE_SIZE - 16;
        machine.set_register(STACK_REG, stack_top as i32);
        debug!("initializing stack register to {stack_top}");
    }

    /// 归还页帧，倒排分页还要删掉交换文件
    pub fn destroy(self, kernel: &mut Kernel) {
        match self.mode {
            SpaceMode::Linear { page_table } => {
                for entry in page_table.iter().filter(|entry| entry.is_valid()) {
                    kernel.frames.mem_map.clear(entry.physical_page as usize);
                }
            }
            SpaceMode::Inverted {
                swap, swap_path, ..
            } => {
                kernel.frames.release_thread(self.tid);
                // 先关句柄再删，不然登记表会以 Busy 拒绝
                drop(swap);
                if let Err(error) = kernel.fs.remove(&swap_path) {
                    log::warn!("failed to remove {swap_path}: {error}");
                }
            }
        }
    }
}

impl FdTable {
    pub fn insert(&mut self, file: OpenFile) -> i32 {
        let index = match self.files.iter().position(Option::is_none) {
            Some(index) => {
                self.files[index] = Some(file);
                index
            }
            None => {
                self.files.push(Some(file));
                self.files.len() - 1
            }
        };
        FIRST_FILE_ID + index as i32
    }

    pub fn get(&self, id: i32) -> Option<&OpenFile> {
        if id < FIRST_FILE_ID {
            return None;
        }
        self.files.get((id - FIRST_FILE_ID) as usize)?.as_ref()
    }

    pub fn remove(&mut self, id: i32) -> Option<OpenFile> {
        debug_assert!(id > CONSOLE_OUTPUT);
        self.files.get_mut((id - FIRST_FILE_ID) as usize)?.take()
    }
}

/// 把一个段逐页拷进主存（线性分页）。
/// 整页都是代码的页顺手标成只读。
fn copy_segment_to_memory(
    executable: &OpenFile,
    segment: &Segment,
    page_table: &mut [TranslationEntry],
    machine: &mut Machine,
    read_only_pages: bool,
) {
    if segment.size == 0 {
        return;
    }
    debug!(
        "loading segment at {:#x}, size {}",
        segment.virtual_addr, segment.size
    );

    let mut remaining = segment.size as usize;
    let mut position = segment.in_file_addr as usize;
    let mut vpn = segment.virtual_addr as usize / PAGE_SIZE;
    let mut offset = segment.virtual_addr as usize % PAGE_SIZE;
    let mut buf = [0; PAGE_SIZE];

    while remaining > 0 {
        let block = (PAGE_SIZE - offset).min(remaining);
        executable.read_at(&mut buf[..block], position);

        let ppn = page_table[vpn].physical_page as usize;
        machine.memory[ppn * PAGE_SIZE + offset..ppn * PAGE_SIZE + offset + block]
            .copy_from_slice(&buf[..block]);
        if read_only_pages && block == PAGE_SIZE {
            page_table[vpn].flags |= EntryFlag::R;
        }

        remaining -= block;
        position += block;
        vpn += 1;
        offset = 0;
    }
}

/// 把一个段逐页写进交换文件（倒排分页）
fn copy_segment_to_swap(
    executable: &OpenFile,
    segment: &Segment,
    swap: &OpenFile,
    mut ro_map: Option<&mut Bitmap>,
) {
    if segment.size == 0 {
        return;
    }
    debug!(
        "copying segment at {:#x}, size {} into the swap file",
        segment.virtual_addr, segment.size
    );

    let mut remaining = segment.size as usize;
    let mut position = segment.in_file_addr as usize;
    let mut vpn = segment.virtual_addr as usize / PAGE_SIZE;
    let mut offset = segment.virtual_addr as usize % PAGE_SIZE;
    let mut buf = [0; PAGE_SIZE];

    while remaining > 0 {
        let block = (PAGE_SIZE - offset).min(remaining);
        executable.read_at(&mut buf[..block], position);
        swap.write_at(&buf[..block], vpn * PAGE_SIZE + offset);
        if block == PAGE_SIZE {
            if let Some(ro_map) = ro_map.as_deref_mut() {
                ro_map.mark(vpn);
            }
        }

        remaining -= block;
        position += block;
        vpn += 1;
        offset = 0;
    }
}
