//! # 打开文件层
//!
//! 每个被打开的文件按**文件头扇区号**在全局登记表里挂一份共享记录：
//! 引用计数、缓存的文件头，以及读写者纪律用的读者计数与读写信号量。
//! 同一文件的多个句柄共享同一份记录，最后一个句柄关闭时记录才释放。
//!
//! 读写者纪律：多个读者可以并发，写者独占；
//! 写者为补齐非对齐扇区发起的内部读不再重新进入纪律，
//! 否则会跟自己持有的信号量死锁。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ksync::{Lock, Semaphore};
use log::debug;

use crate::filesys::FsInner;
use crate::layout::{FileHeader, FileType};
use crate::{Bitmap, NUM_SECTORS, SECTOR_SIZE};

/// 全局打开文件表，归文件系统门面所有
pub(crate) struct Registry {
    records: Mutex<HashMap<u32, RecordSlot>>,
}

struct RecordSlot {
    ref_count: usize,
    record: Arc<FileRecord>,
}

/// 同一文件头扇区的全部句柄共享的状态
struct FileRecord {
    /// 打开期间缓存在内存里的文件头；
    /// 时间戳更新与写回都在此锁下进行
    header: Mutex<FileHeader>,
    /// 保护读者计数
    reader_lock: Lock,
    reader_count: AtomicU32,
    /// 读者群与写者互斥
    rw_sem: Semaphore,
}

/// 打开文件句柄：读写位置加上对共享记录的引用
pub struct OpenFile {
    hdr_sector: u32,
    seek: AtomicUsize,
    record: Arc<FileRecord>,
    fs: Arc<FsInner>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// 引用计数自增；0 -> 1 时装载记录，从磁盘取回文件头
    fn open(&self, sector: u32, fs: &FsInner) -> Arc<FileRecord> {
        let mut records = self.records.lock().unwrap();
        let slot = records.entry(sector).or_insert_with(|| RecordSlot {
            ref_count: 0,
            record: Arc::new(FileRecord {
                header: Mutex::new(FileHeader::fetch_from(sector, fs.device())),
                reader_lock: Lock::new(),
                reader_count: AtomicU32::new(0),
                rw_sem: Semaphore::new(1),
            }),
        });
        slot.ref_count += 1;
        slot.record.clone()
    }

    /// 引用计数自减，归零时丢弃记录
    fn close(&self, sector: u32) {
        let mut records = self.records.lock().unwrap();
        let slot = records
            .get_mut(&sector)
            .expect("closing a file that is not open");
        slot.ref_count -= 1;
        if slot.ref_count == 0 {
            records.remove(&sector);
        }
    }

    pub(crate) fn is_open(&self, sector: u32) -> bool {
        self.records.lock().unwrap().contains_key(&sector)
    }
}

impl OpenFile {
    pub(crate) fn new(sector: u32, fs: Arc<FsInner>) -> Self {
        let record = fs.registry().open(sector, &fs);
        Self {
            hdr_sector: sector,
            seek: AtomicUsize::new(0),
            record,
            fs,
        }
    }

    #[inline]
    pub fn hdr_sector(&self) -> u32 {
        self.hdr_sector
    }

    pub fn length(&self) -> usize {
        self.record.header.lock().unwrap().len()
    }

    pub fn kind(&self) -> FileType {
        self.record.header.lock().unwrap().kind()
    }

    /// 挪动下一次 read/write 的起始位置
    pub fn seek(&self, position: usize) {
        self.seek.store(position, Ordering::Relaxed);
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        let position = self.seek.load(Ordering::Relaxed);
        let count = self.read_at(buf, position);
        self.seek.store(position + count, Ordering::Relaxed);
        count
    }

    pub fn write(&self, buf: &[u8]) -> usize {
        let position = self.seek.load(Ordering::Relaxed);
        let count = self.write_at(buf, position);
        self.seek.store(position + count, Ordering::Relaxed);
        count
    }

    /// 从头到尾读出整个文件
    pub fn read_all(&self) -> Vec<u8> {
        let mut bytes = vec![0; self.length()];
        let count = self.read_at(&mut bytes, 0);
        bytes.truncate(count);
        bytes
    }

    pub fn read_at(&self, buf: &mut [u8], position: usize) -> usize {
        self.read_at_from(buf, position, false)
    }

    /// 在 `position` 处写入 `buf`，返回写入的字节数。
    /// 写越过文件末尾时先经空闲扇区位图扩容，扩不动就一个字节都不写。
    pub fn write_at(&self, buf: &[u8], position: usize) -> usize {
        if buf.is_empty() {
            return 0;
        }

        self.record.rw_sem.down();

        let file_length = self.record.header.lock().unwrap().len();
        if position + buf.len() > file_length {
            // 所有元数据变更都串行化在同一把锁后面：
            // 取位图、扩容、写回是一个不可分的整体
            let meta_lock = self.fs.meta_lock();
            meta_lock.acquire();
            let mut free_map = Bitmap::new(NUM_SECTORS);
            free_map.fetch_from(self.fs.free_map_file());
            let grown = self.record.header.lock().unwrap().increase_size(
                &mut free_map,
                position + buf.len() - file_length,
                self.fs.device(),
            );
            match grown {
                Ok(()) => free_map.write_back(self.fs.free_map_file()),
                Err(error) => {
                    meta_lock.release();
                    self.record.rw_sem.up();
                    log::warn!("unable to extend the file: {error}");
                    return 0;
                }
            }
            meta_lock.release();
        }

        debug!(
            "writing {} bytes at {position} to header sector {}",
            buf.len(),
            self.hdr_sector
        );

        let first = position / SECTOR_SIZE;
        let last = (position + buf.len() - 1) / SECTOR_SIZE;
        let mut scratch = vec![0; (last - first + 1) * SECTOR_SIZE];

        // 首尾扇区若只写到一半，先读回原内容再覆盖
        let first_aligned = position == first * SECTOR_SIZE;
        let last_aligned = position + buf.len() == (last + 1) * SECTOR_SIZE;
        if !first_aligned {
            self.read_at_from(&mut scratch[..SECTOR_SIZE], first * SECTOR_SIZE, true);
        }
        if !last_aligned && (first != last || first_aligned) {
            let offset = (last - first) * SECTOR_SIZE;
            self.read_at_from(
                &mut scratch[offset..offset + SECTOR_SIZE],
                last * SECTOR_SIZE,
                true,
            );
        }

        let inset = position - first * SECTOR_SIZE;
        scratch[inset..inset + buf.len()].copy_from_slice(buf);

        {
            let header = self.record.header.lock().unwrap();
            for index in first..=last {
                let sector = header.byte_to_sector(index * SECTOR_SIZE, self.fs.device());
                let offset = (index - first) * SECTOR_SIZE;
                self.fs
                    .device()
                    .write_sector(sector as usize, &scratch[offset..offset + SECTOR_SIZE]);
            }
        }

        {
            let mut header = self.record.header.lock().unwrap();
            header.touch_visit(self.fs.clock());
            header.touch_modify(self.fs.clock());
            header.write_back(self.hdr_sector, self.fs.device());
        }

        self.record.rw_sem.up();
        buf.len()
    }

    fn read_at_from(&self, buf: &mut [u8], position: usize, called_from_write: bool) -> usize {
        if !called_from_write {
            self.enter_readers();
        }

        let file_length = self.record.header.lock().unwrap().len();
        if buf.is_empty() || position >= file_length {
            if !called_from_write {
                self.exit_readers();
            }
            return 0;
        }
        let count = buf.len().min(file_length - position);

        debug!(
            "reading {count} bytes at {position}, from file of length {file_length}"
        );

        let first = position / SECTOR_SIZE;
        let last = (position + count - 1) / SECTOR_SIZE;
        let mut scratch = vec![0; (last - first + 1) * SECTOR_SIZE];
        {
            let header = self.record.header.lock().unwrap();
            for index in first..=last {
                let sector = header.byte_to_sector(index * SECTOR_SIZE, self.fs.device());
                let offset = (index - first) * SECTOR_SIZE;
                self.fs
                    .device()
                    .read_sector(sector as usize, &mut scratch[offset..offset + SECTOR_SIZE]);
            }
        }
        let inset = position - first * SECTOR_SIZE;
        buf[..count].copy_from_slice(&scratch[inset..inset + count]);

        {
            let mut header = self.record.header.lock().unwrap();
            header.touch_visit(self.fs.clock());
            header.write_back(self.hdr_sector, self.fs.device());
        }

        if !called_from_write {
            self.exit_readers();
        }
        count
    }

    /// 读者进场：第一个读者代表读者群拿下读写信号量
    fn enter_readers(&self) {
        let record = &self.record;
        record.reader_lock.acquire();
        if record.reader_count.fetch_add(1, Ordering::Relaxed) == 0 {
            record.rw_sem.down();
        }
        record.reader_lock.release();
    }

    /// 读者离场：最后一个读者归还读写信号量
    fn exit_readers(&self) {
        let record = &self.record;
        record.reader_lock.acquire();
        if record.reader_count.fetch_sub(1, Ordering::Relaxed) == 1 {
            record.rw_sem.up();
        }
        record.reader_lock.release();
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        self.fs.registry().close(self.hdr_sector);
    }
}
