//! Constants used across the simulator

pub use sector_fs::SECTOR_SIZE;

/// 物理页大小，与扇区一样大，换页就是换扇区
pub const PAGE_SIZE: usize = SECTOR_SIZE;
/// 物理页帧总数
pub const NUM_PHYS_PAGES: usize = 32;
/// 模拟主存的大小
pub const MEMORY_SIZE: usize = NUM_PHYS_PAGES * PAGE_SIZE;

/// 快表条目数
pub const TLB_SIZE: usize = 4;
/// 倒排分页下每个线程的驻留集大小
pub const RES_SIZE: usize = 4;
/// 驻留集互不重叠，线程数受物理页帧数约束
pub const MAX_THREADS: usize = NUM_PHYS_PAGES / RES_SIZE;

/// 用户栈大小（字节）
pub const USER_STACK_SIZE: usize = 1024;

/// 保留的控制台文件号
pub const CONSOLE_INPUT: i32 = 0;
pub const CONSOLE_OUTPUT: i32 = 1;
/// 打开文件号从这里开始分配
pub const FIRST_FILE_ID: i32 = 2;
