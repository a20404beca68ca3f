//! 文件头（即 inode），在磁盘上恰好占据一个扇区。
//!
//! 文件头只用间接索引：`indirect` 数组的每一项指向一个间接索引扇区，
//! 间接索引扇区内连续存储**数据扇区号**，`-1` 表示空槽。
//! 因此文件大小上限为 `NUM_INDIRECT * IDS_PER_SECTOR * SECTOR_SIZE`。

use std::sync::Arc;

use block_dev::BlockDevice;

use crate::clock::{Clock, Timestamp, TIME_STR_LEN};
use crate::error::FsError;
use crate::{DataSector, IDS_PER_SECTOR, MAX_FILE_SIZE, SECTOR_SIZE};

/// 文件头里间接索引的项数
pub const NUM_INDIRECT: usize = (SECTOR_SIZE - 2 * 4 - 4 - 3 * TIME_STR_LEN) / 4;

/// 文件类型，磁盘上编码为小端 u32
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileType {
    Dir = 0,
    Exe = 1,
    Txt = 2,
    Cc = 3,
    Bit = 4,
    Fifo = 5,
    Swap = 6,
    #[default]
    Unk = 7,
}

#[derive(Debug, Clone)]
pub struct FileHeader {
    /// 文件长度（字节）
    num_bytes: u32,
    /// 数据扇区个数
    num_sectors: u32,
    /// 间接索引扇区号，`-1` 表示空槽
    indirect: [i32; NUM_INDIRECT],
    kind: FileType,
    create: Timestamp,
    visit: Timestamp,
    modify: Timestamp,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            num_bytes: 0,
            num_sectors: 0,
            indirect: [-1; NUM_INDIRECT],
            kind: FileType::default(),
            create: Timestamp::default(),
            visit: Timestamp::default(),
            modify: Timestamp::default(),
        }
    }
}

impl FileType {
    /// 按文件名最后一个 `.` 后缀推断类型
    pub fn from_name(name: &str) -> Self {
        match name.rsplit_once('.').map(|(_, suffix)| suffix) {
            Some("txt") => Self::Txt,
            Some("cc") => Self::Cc,
            Some("noff") => Self::Exe,
            _ => Self::Unk,
        }
    }

    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Dir,
            1 => Self::Exe,
            2 => Self::Txt,
            3 => Self::Cc,
            4 => Self::Bit,
            5 => Self::Fifo,
            6 => Self::Swap,
            _ => Self::Unk,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dir => "DIR",
            Self::Exe => "EXE",
            Self::Txt => "TXT",
            Self::Cc => "CC",
            Self::Bit => "BIT",
            Self::Fifo => "FIFO",
            Self::Swap => "SWAP",
            Self::Unk => "UNK",
        }
    }
}

impl FileHeader {
    /// 初始化新文件的文件头，从空闲扇区位图里取走
    /// 所需的全部数据扇区与间接索引扇区。
    /// 空间不足时整体失败，位图不变。
    pub fn allocate(
        &mut self,
        free_map: &mut crate::Bitmap,
        size: usize,
        kind: FileType,
        clock: &dyn Clock,
        device: &Arc<dyn BlockDevice>,
    ) -> Result<(), FsError> {
        if size > MAX_FILE_SIZE {
            return Err(FsError::NoSpace);
        }
        let num_sectors = size.div_ceil(SECTOR_SIZE);
        let num_indirect = num_sectors.div_ceil(IDS_PER_SECTOR);
        if free_map.num_clear() < num_sectors + num_indirect {
            return Err(FsError::NoSpace);
        }

        self.num_bytes = size as u32;
        self.num_sectors = num_sectors as u32;
        self.kind = kind;
        let stamp = clock.stamp();
        self.create = stamp;
        self.visit = stamp;
        self.modify = stamp;
        self.indirect = [-1; NUM_INDIRECT];

        let mut remaining = num_sectors;
        for slot in 0..num_indirect {
            // 位图余量查验过，find 一定成功
            self.indirect[slot] = free_map.find().unwrap() as i32;
            let mut ids = [-1_i32; IDS_PER_SECTOR];
            for id in ids.iter_mut().take(remaining) {
                *id = free_map.find().unwrap() as i32;
            }
            remaining = remaining.saturating_sub(IDS_PER_SECTOR);
            write_ids(device, self.indirect[slot] as u32, &ids);
        }

        Ok(())
    }

    /// 把文件占用的数据扇区与间接索引扇区全部归还位图
    pub fn deallocate(&mut self, free_map: &mut crate::Bitmap, device: &Arc<dyn BlockDevice>) {
        let num_indirect = (self.num_sectors as usize).div_ceil(IDS_PER_SECTOR);
        for slot in 0..num_indirect {
            let indirect = self.indirect[slot];
            assert_ne!(indirect, -1);

            for id in read_ids(device, indirect as u32) {
                if id == -1 {
                    break;
                }
                // 占用的扇区必须在位图里有记录
                assert!(free_map.test(id as usize));
                free_map.clear(id as usize);
            }
            assert!(free_map.test(indirect as usize));
            free_map.clear(indirect as usize);
            self.indirect[slot] = -1;
        }
        self.num_bytes = 0;
        self.num_sectors = 0;
    }

    /// 追加分配，使文件逻辑长度增长 `inc` 字节。
    /// 空间不足时整体失败，位图与文件头都不变。
    pub fn increase_size(
        &mut self,
        free_map: &mut crate::Bitmap,
        inc: usize,
        device: &Arc<dyn BlockDevice>,
    ) -> Result<(), FsError> {
        let new_bytes = self.num_bytes as usize + inc;
        if new_bytes > MAX_FILE_SIZE {
            return Err(FsError::NoSpace);
        }
        let old_sectors = self.num_sectors as usize;
        let new_sectors = new_bytes.div_ceil(SECTOR_SIZE);
        let old_indirect = old_sectors.div_ceil(IDS_PER_SECTOR);
        let new_indirect = new_sectors.div_ceil(IDS_PER_SECTOR);
        if free_map.num_clear() < (new_sectors - old_sectors) + (new_indirect - old_indirect) {
            return Err(FsError::NoSpace);
        }

        // 逐个间接索引扇区补齐新的数据扇区号
        let mut index = old_sectors;
        while index < new_sectors {
            let slot = index / IDS_PER_SECTOR;
            let mut ids = if self.indirect[slot] == -1 {
                self.indirect[slot] = free_map.find().unwrap() as i32;
                [-1; IDS_PER_SECTOR]
            } else {
                read_ids(device, self.indirect[slot] as u32)
            };
            while index < new_sectors && index / IDS_PER_SECTOR == slot {
                ids[index % IDS_PER_SECTOR] = free_map.find().unwrap() as i32;
                index += 1;
            }
            write_ids(device, self.indirect[slot] as u32, &ids);
        }

        self.num_bytes = new_bytes as u32;
        self.num_sectors = new_sectors as u32;
        Ok(())
    }

    /// 文件内字节偏移 -> 存放该字节的数据扇区号。
    /// 偏移落在未分配的槽上属于内核缺陷，直接断言失败。
    pub fn byte_to_sector(&self, offset: usize, device: &Arc<dyn BlockDevice>) -> u32 {
        let slot = offset / (IDS_PER_SECTOR * SECTOR_SIZE);
        let inslot = offset % (IDS_PER_SECTOR * SECTOR_SIZE) / SECTOR_SIZE;

        assert_ne!(self.indirect[slot], -1);
        let id = read_ids(device, self.indirect[slot] as u32)[inslot];
        assert_ne!(id, -1);
        id as u32
    }

    pub fn fetch_from(sector: u32, device: &Arc<dyn BlockDevice>) -> Self {
        let mut bytes: DataSector = [0; SECTOR_SIZE];
        device.read_sector(sector as usize, &mut bytes);
        Self::from_bytes(&bytes)
    }

    pub fn write_back(&self, sector: u32, device: &Arc<dyn BlockDevice>) {
        device.write_sector(sector as usize, &self.to_bytes());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_bytes as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_bytes == 0
    }

    #[inline]
    pub fn kind(&self) -> FileType {
        self.kind
    }

    #[inline]
    pub fn touch_visit(&mut self, clock: &dyn Clock) {
        self.visit = clock.stamp();
    }

    #[inline]
    pub fn touch_modify(&mut self, clock: &dyn Clock) {
        self.modify = clock.stamp();
    }

    /// 打印文件头与文件内容，调试用
    pub fn print(&self, device: &Arc<dyn BlockDevice>) {
        println!(
            "FileHeader contents:\n\tFile type: {}. File size: {}.",
            self.kind.name(),
            self.num_bytes
        );

        let num_indirect = (self.num_sectors as usize).div_ceil(IDS_PER_SECTOR);
        let mut blocks = String::new();
        for slot in 0..num_indirect {
            blocks.push_str(&format!("({}), ", self.indirect[slot]));
            for id in read_ids(device, self.indirect[slot] as u32) {
                if id == -1 {
                    break;
                }
                blocks.push_str(&format!("{id}, "));
            }
        }
        println!("\tFile blocks: {blocks}");
        println!(
            "\tCreated time: {}.\n\tLast visited time: {}.\n\tLast modified time: {}.",
            self.create, self.visit, self.modify
        );

        let mut contents = String::from("File contents:\n\t");
        let mut bytes = 0;
        'dump: for slot in 0..num_indirect {
            for id in read_ids(device, self.indirect[slot] as u32) {
                if id == -1 {
                    break;
                }
                let mut data: DataSector = [0; SECTOR_SIZE];
                device.read_sector(id as usize, &mut data);
                for &byte in &data[..] {
                    if bytes == self.num_bytes as usize {
                        break 'dump;
                    }
                    bytes += 1;
                    if (b' '..=b'~').contains(&byte) {
                        contents.push(byte as char);
                    } else {
                        contents.push_str(&format!("\\{byte:x}"));
                    }
                }
            }
        }
        println!("{contents}");
    }

    pub(crate) fn to_bytes(&self) -> DataSector {
        let mut bytes: DataSector = [0; SECTOR_SIZE];
        bytes[0..4].copy_from_slice(&self.num_bytes.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.num_sectors.to_le_bytes());
        for (slot, id) in self.indirect.iter().enumerate() {
            bytes[8 + slot * 4..12 + slot * 4].copy_from_slice(&id.to_le_bytes());
        }
        let stamps = 8 + NUM_INDIRECT * 4 + 4;
        bytes[stamps - 4..stamps].copy_from_slice(&(self.kind as u32).to_le_bytes());
        bytes[stamps..stamps + 20].copy_from_slice(self.create.as_bytes());
        bytes[stamps + 20..stamps + 40].copy_from_slice(self.visit.as_bytes());
        bytes[stamps + 40..stamps + 60].copy_from_slice(self.modify.as_bytes());
        bytes
    }

    pub(crate) fn from_bytes(bytes: &DataSector) -> Self {
        let mut indirect = [-1; NUM_INDIRECT];
        for (slot, id) in indirect.iter_mut().enumerate() {
            *id = i32::from_le_bytes(bytes[8 + slot * 4..12 + slot * 4].try_into().unwrap());
        }
        let stamps = 8 + NUM_INDIRECT * 4 + 4;
        Self {
            num_bytes: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            num_sectors: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            indirect,
            kind: FileType::from_raw(u32::from_le_bytes(
                bytes[stamps - 4..stamps].try_into().unwrap(),
            )),
            create: Timestamp::from_bytes(bytes[stamps..stamps + 20].try_into().unwrap()),
            visit: Timestamp::from_bytes(bytes[stamps + 20..stamps + 40].try_into().unwrap()),
            modify: Timestamp::from_bytes(bytes[stamps + 40..stamps + 60].try_into().unwrap()),
        }
    }
}

/// 读出一个间接索引扇区内的全部扇区号
pub(crate) fn read_ids(device: &Arc<dyn BlockDevice>, sector: u32) -> [i32; IDS_PER_SECTOR] {
    let mut bytes: DataSector = [0; SECTOR_SIZE];
    device.read_sector(sector as usize, &mut bytes);

    let mut ids = [-1; IDS_PER_SECTOR];
    for (i, id) in ids.iter_mut().enumerate() {
        *id = i32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
    }
    ids
}

fn write_ids(device: &Arc<dyn BlockDevice>, sector: u32, ids: &[i32; IDS_PER_SECTOR]) {
    let mut bytes: DataSector = [0; SECTOR_SIZE];
    for (i, id) in ids.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&id.to_le_bytes());
    }
    device.write_sector(sector as usize, &bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(NUM_INDIRECT, 14);
        assert_eq!(MAX_FILE_SIZE, 57344);
        assert_eq!(
            8 + NUM_INDIRECT * 4 + 4 + 3 * TIME_STR_LEN,
            SECTOR_SIZE,
            "header must fill exactly one sector"
        );
    }

    #[test]
    fn roundtrip() {
        let mut header = FileHeader {
            num_bytes: 400,
            num_sectors: 4,
            kind: FileType::Cc,
            create: Timestamp::from_civil(2024, 1, 2, 3, 4, 5),
            ..Default::default()
        };
        header.indirect[0] = 7;

        let decoded = FileHeader::from_bytes(&header.to_bytes());
        assert_eq!(decoded.num_bytes, 400);
        assert_eq!(decoded.num_sectors, 4);
        assert_eq!(decoded.kind, FileType::Cc);
        assert_eq!(decoded.indirect[0], 7);
        assert_eq!(decoded.indirect[1], -1);
        assert_eq!(decoded.create, header.create);
    }

    #[test]
    fn type_inference() {
        assert_eq!(FileType::from_name("a.txt"), FileType::Txt);
        assert_eq!(FileType::from_name("main.cc"), FileType::Cc);
        assert_eq!(FileType::from_name("halt.noff"), FileType::Exe);
        assert_eq!(FileType::from_name("README"), FileType::Unk);
        assert_eq!(FileType::from_name("archive.tar"), FileType::Unk);
    }
}
