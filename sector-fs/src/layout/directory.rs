//! 目录表：定长槽位的 `<文件名, 文件头扇区号>` 表，以普通文件持久化。
//!
//! 槽位有两种形态，共享开头的 `{normal, in_use, next}` 三个字段，
//! 靠 `normal` 区分：
//! - 首槽：携带名字总长、文件头扇区号以及名字的前 11 字节；
//! - 续槽：只携带名字的后续 20 字节。
//!
//! 超过 11 字节的长名字经 `next` 链到若干续槽上；
//! 槽位总数在构造时就固定了，目录不支持扩容。

use crate::error::FsError;
use crate::open_file::OpenFile;

/// 目录的槽位数
pub const NUM_DIR_ENTRIES: usize = 10;
/// 每个槽位在磁盘上的大小
pub const DIR_ENTRY_SIZE: usize = 40;
/// 目录文件的长度
pub const DIRECTORY_FILE_SIZE: usize = NUM_DIR_ENTRIES * DIR_ENTRY_SIZE;

/// 首槽能存放的名字字节数
const SHORT_NAME_LEN: usize = 11;
/// 每个续槽能存放的名字字节数
const LONG_CHUNK_LEN: usize = SHORT_NAME_LEN + 1 + 2 * 4;

#[derive(Debug, Clone, Copy)]
struct Slot {
    in_use: bool,
    /// 下一个续槽的下标，`-1` 为链尾
    next: i16,
    body: SlotBody,
}

#[derive(Debug, Clone, Copy)]
enum SlotBody {
    Head {
        name_len: u32,
        sector: u32,
        name: [u8; SHORT_NAME_LEN + 1],
    },
    Tail {
        name: [u8; LONG_CHUNK_LEN],
    },
}

#[derive(Debug, Clone)]
pub struct Directory {
    table: Vec<Slot>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    /// 空目录
    pub fn new() -> Self {
        Self {
            table: vec![Slot::free(); NUM_DIR_ENTRIES],
        }
    }

    pub fn fetch_from(file: &OpenFile) -> Self {
        let mut bytes = [0; DIRECTORY_FILE_SIZE];
        file.read_at(&mut bytes, 0);

        let table = bytes
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(Slot::decode)
            .collect();
        Self { table }
    }

    pub fn write_back(&self, file: &OpenFile) {
        let mut bytes = [0; DIRECTORY_FILE_SIZE];
        for (slot, chunk) in self.table.iter().zip(bytes.chunks_exact_mut(DIR_ENTRY_SIZE)) {
            slot.encode(chunk);
        }
        file.write_at(&bytes, 0);
    }

    /// 查找 `name` 对应的文件头扇区号
    pub fn find(&self, name: &str) -> Option<u32> {
        self.find_index(name).map(|index| {
            let SlotBody::Head { sector, .. } = self.table[index].body else {
                unreachable!()
            };
            sector
        })
    }

    /// 把 `<name, sector>` 加进目录。
    /// 失败时目录不变：重名返回 [`FsError::NameTaken`]，
    /// 空槽不足返回 [`FsError::DirectoryFull`]。
    pub fn add(&mut self, name: &str, sector: u32) -> Result<(), FsError> {
        if self.find_index(name).is_some() {
            return Err(FsError::NameTaken);
        }

        let name = name.as_bytes();
        let chunks = Self::chunks_for(name.len());
        let free: Vec<usize> = (0..self.table.len())
            .filter(|&i| !self.table[i].in_use)
            .take(chunks)
            .collect();
        if free.len() < chunks {
            return Err(FsError::DirectoryFull);
        }

        // 首槽放名字的前11字节，其余按20字节一段挂到续槽上
        let mut head_name = [0; SHORT_NAME_LEN + 1];
        let head_len = name.len().min(SHORT_NAME_LEN);
        head_name[..head_len].copy_from_slice(&name[..head_len]);
        self.table[free[0]] = Slot {
            in_use: true,
            next: -1,
            body: SlotBody::Head {
                name_len: name.len() as u32,
                sector,
                name: head_name,
            },
        };

        let mut offset = SHORT_NAME_LEN;
        for (&prev, &index) in free.iter().zip(&free[1..]) {
            let mut tail_name = [0; LONG_CHUNK_LEN];
            let chunk = &name[offset..(offset + LONG_CHUNK_LEN).min(name.len())];
            tail_name[..chunk.len()].copy_from_slice(chunk);
            offset += chunk.len();

            self.table[prev].next = index as i16;
            self.table[index] = Slot {
                in_use: true,
                next: -1,
                body: SlotBody::Tail { name: tail_name },
            };
        }

        Ok(())
    }

    /// 把 `name` 从目录里摘掉，清掉首槽与它链上的全部续槽
    pub fn remove(&mut self, name: &str) -> Result<(), FsError> {
        let index = self.find_index(name).ok_or(FsError::NotFound)?;

        self.table[index].in_use = false;
        let mut index = index;
        while self.table[index].next != -1 {
            index = self.table[index].next as usize;
            self.table[index].in_use = false;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        !self
            .table
            .iter()
            .any(|slot| slot.in_use && matches!(slot.body, SlotBody::Head { .. }))
    }

    /// 目录下的所有 `<文件名, 文件头扇区号>`
    pub fn entries(&self) -> impl Iterator<Item = (String, u32)> + '_ {
        self.table.iter().enumerate().filter_map(|(index, slot)| {
            let SlotBody::Head { sector, .. } = slot.body else {
                return None;
            };
            slot.in_use.then(|| (self.full_name(index), sector))
        })
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        (0..self.table.len()).find(|&index| {
            let slot = &self.table[index];
            let SlotBody::Head { name_len, .. } = slot.body else {
                return false;
            };
            slot.in_use && name_len as usize == name.len() && self.full_name(index) == name
        })
    }

    /// 沿 `next` 链重组首槽的完整名字
    fn full_name(&self, index: usize) -> String {
        let slot = &self.table[index];
        let SlotBody::Head { name_len, name, .. } = &slot.body else {
            panic!("full_name on a continuation slot");
        };

        let name_len = *name_len as usize;
        let mut bytes = Vec::with_capacity(name_len);
        bytes.extend_from_slice(&name[..name_len.min(SHORT_NAME_LEN)]);

        let mut index = index;
        while self.table[index].next != -1 {
            index = self.table[index].next as usize;
            let tail = &self.table[index];
            assert!(tail.in_use);
            let SlotBody::Tail { name } = &tail.body else {
                panic!("chained slot is not a continuation");
            };
            let chunk = (name_len - bytes.len()).min(LONG_CHUNK_LEN);
            bytes.extend_from_slice(&name[..chunk]);
        }

        assert_eq!(bytes.len(), name_len);
        String::from_utf8(bytes).expect("directory holds valid UTF-8 names")
    }

    /// 存下长为 `len` 的名字需要的槽位数
    fn chunks_for(len: usize) -> usize {
        1 + len.saturating_sub(SHORT_NAME_LEN).div_ceil(LONG_CHUNK_LEN)
    }
}

impl Slot {
    fn free() -> Self {
        Self {
            in_use: false,
            next: -1,
            body: SlotBody::Head {
                name_len: 0,
                sector: 0,
                name: [0; SHORT_NAME_LEN + 1],
            },
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        debug_assert_eq!(bytes.len(), DIR_ENTRY_SIZE);
        bytes.fill(0);
        bytes[0] = matches!(self.body, SlotBody::Head { .. }) as u8;
        bytes[1] = self.in_use as u8;
        bytes[2..4].copy_from_slice(&self.next.to_le_bytes());

        match &self.body {
            SlotBody::Head {
                name_len,
                sector,
                name,
            } => {
                bytes[4..8].copy_from_slice(&name_len.to_le_bytes());
                bytes[8..12].copy_from_slice(&sector.to_le_bytes());
                bytes[12..12 + name.len()].copy_from_slice(name);
            }
            SlotBody::Tail { name } => {
                bytes[4..4 + name.len()].copy_from_slice(name);
            }
        }
    }

    fn decode(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), DIR_ENTRY_SIZE);
        let body = if bytes[0] != 0 {
            SlotBody::Head {
                name_len: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
                sector: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
                name: bytes[12..12 + SHORT_NAME_LEN + 1].try_into().unwrap(),
            }
        } else {
            SlotBody::Tail {
                name: bytes[4..4 + LONG_CHUNK_LEN].try_into().unwrap(),
            }
        };

        Self {
            in_use: bytes[1] != 0,
            next: i16::from_le_bytes(bytes[2..4].try_into().unwrap()),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(LONG_CHUNK_LEN, 20);
        assert_eq!(DIRECTORY_FILE_SIZE, 400);
        // 槽位内容顶满也越不过 40 字节
        assert!(12 + SHORT_NAME_LEN + 1 <= DIR_ENTRY_SIZE);
        assert!(4 + LONG_CHUNK_LEN <= DIR_ENTRY_SIZE);
    }

    #[test]
    fn chunk_count() {
        assert_eq!(Directory::chunks_for(0), 1);
        assert_eq!(Directory::chunks_for(11), 1);
        assert_eq!(Directory::chunks_for(12), 2);
        assert_eq!(Directory::chunks_for(31), 2);
        assert_eq!(Directory::chunks_for(32), 3);
    }

    #[test]
    fn add_find_remove_short_name() {
        let mut directory = Directory::new();
        assert!(directory.is_empty());

        directory.add("a.txt", 9).unwrap();
        assert_eq!(directory.find("a.txt"), Some(9));
        assert_eq!(directory.add("a.txt", 10), Err(FsError::NameTaken));
        assert!(!directory.is_empty());

        directory.remove("a.txt").unwrap();
        assert_eq!(directory.find("a.txt"), None);
        assert!(directory.is_empty());
        assert_eq!(directory.remove("a.txt"), Err(FsError::NotFound));
    }

    #[test]
    fn long_names_round_trip() {
        // 1 + k·20 的边界两侧都要试到
        for len in [11, 12, 19, 31, 32, 51] {
            let name: String = (0..len)
                .map(|i| char::from(b'a' + (i % 26) as u8))
                .collect();

            let mut directory = Directory::new();
            directory.add(&name, 3).unwrap();
            assert_eq!(directory.find(&name), Some(3), "len={len}");

            let listed: Vec<_> = directory.entries().collect();
            assert_eq!(listed, vec![(name.clone(), 3)]);

            directory.remove(&name).unwrap();
            assert!(directory.is_empty(), "len={len}: chain not fully cleared");
        }
    }

    #[test]
    fn similar_names_do_not_collide() {
        let mut directory = Directory::new();
        directory.add("abcdefghijklmnop", 1).unwrap();
        directory.add("abcdefghijklmnoq", 2).unwrap();
        // 同前缀不同长度
        directory.add("abcdefghijk", 3).unwrap();

        assert_eq!(directory.find("abcdefghijklmnop"), Some(1));
        assert_eq!(directory.find("abcdefghijklmnoq"), Some(2));
        assert_eq!(directory.find("abcdefghijk"), Some(3));
        assert_eq!(directory.find("abcdefghij"), None);
    }

    #[test]
    fn fails_without_enough_slots() {
        let mut directory = Directory::new();
        // 9 + 1 槽：一个长名占俩，八个短名占八
        directory.add("longname-entry", 0).unwrap();
        for i in 0..8 {
            directory.add(&format!("f{i}"), i).unwrap();
        }

        assert_eq!(directory.add("x", 99), Err(FsError::DirectoryFull));
        // 长名字需要两个槽，只剩一个也不行；失败后目录原样
        directory.remove("f0").unwrap();
        assert_eq!(
            directory.add("another-long-name", 99),
            Err(FsError::DirectoryFull)
        );
        assert_eq!(directory.find("longname-entry"), Some(0));
        directory.add("y", 50).unwrap();
    }

    #[test]
    fn slot_encoding_round_trips() {
        let mut directory = Directory::new();
        directory.add("abcdefghijklmnopqrstuvwxyz", 17).unwrap();
        directory.add("b.cc", 5).unwrap();

        let mut bytes = [0; DIRECTORY_FILE_SIZE];
        for (slot, chunk) in directory
            .table
            .iter()
            .zip(bytes.chunks_exact_mut(DIR_ENTRY_SIZE))
        {
            slot.encode(chunk);
        }
        let decoded = Directory {
            table: bytes.chunks_exact(DIR_ENTRY_SIZE).map(Slot::decode).collect(),
        };

        assert_eq!(decoded.find("abcdefghijklmnopqrstuvwxyz"), Some(17));
        assert_eq!(decoded.find("b.cc"), Some(5));
    }
}
