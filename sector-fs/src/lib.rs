//! # sector-fs 的整体架构，自下而上
//!
//! - 磁盘数据结构层：空闲扇区位图、文件头、目录表（`layout`）
//! - 打开文件层：按文件头扇区登记的共享状态与读写者纪律（`open_file`）
//! - 文件系统门面：绝对路径解析与 create/open/remove（`filesys`）
//!
//! 磁盘被抽象成定长扇区的数组（[`BlockDevice`]），
//! 0 号扇区固定存放空闲扇区位图文件的文件头，
//! 1 号扇区固定存放根目录文件的文件头，
//! 其余扇区要么空闲，要么属于某个文件头的索引表或数据块。

mod clock;
mod error;
mod filesys;
mod layout;
mod open_file;

pub use block_dev::BlockDevice;
pub use clock::{Clock, Timestamp, TIME_STR_LEN};
pub use error::FsError;
pub use filesys::FileSystem;
pub use layout::{Bitmap, Directory, FileHeader, FileType};
pub use layout::{DIRECTORY_FILE_SIZE, DIR_ENTRY_SIZE, NUM_DIR_ENTRIES, NUM_INDIRECT};
pub use open_file::OpenFile;

/// 扇区大小（字节）
pub const SECTOR_SIZE: usize = 128;
/// 模拟磁盘的扇区总数
pub const NUM_SECTORS: usize = 1024;
/// 一个间接索引扇区能容纳的扇区号数量
pub const IDS_PER_SECTOR: usize = SECTOR_SIZE / 4;
/// 单个文件的大小上限
pub const MAX_FILE_SIZE: usize = NUM_INDIRECT * IDS_PER_SECTOR * SECTOR_SIZE;

/// 空闲扇区位图文件的文件头所在扇区
pub const FREE_MAP_SECTOR: u32 = 0;
/// 根目录文件的文件头所在扇区
pub const ROOT_DIR_SECTOR: u32 = 1;
/// 位图文件的长度：每个扇区一位
pub const FREE_MAP_FILE_SIZE: usize = NUM_SECTORS / 8;

type DataSector = [u8; SECTOR_SIZE];
