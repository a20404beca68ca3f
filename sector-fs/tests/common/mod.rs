use std::sync::{Arc, Mutex};

use sector_fs::{BlockDevice, Clock, FileSystem, Timestamp, NUM_SECTORS, SECTOR_SIZE};

/// 驻留内存的模拟磁盘
pub struct MemDisk {
    sectors: Mutex<Vec<u8>>,
}

impl MemDisk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sectors: Mutex::new(vec![0; NUM_SECTORS * SECTOR_SIZE]),
        })
    }
}

impl BlockDevice for MemDisk {
    fn read_sector(&self, sector: usize, buf: &mut [u8]) {
        let sectors = self.sectors.lock().unwrap();
        buf.copy_from_slice(&sectors[sector * SECTOR_SIZE..][..SECTOR_SIZE]);
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) {
        let mut sectors = self.sectors.lock().unwrap();
        sectors[sector * SECTOR_SIZE..][..SECTOR_SIZE].copy_from_slice(buf);
    }
}

pub struct FixedClock;

impl Clock for FixedClock {
    fn stamp(&self) -> Timestamp {
        Timestamp::from_civil(2024, 1, 1, 0, 0, 0)
    }
}

#[allow(dead_code)]
pub fn fresh_fs() -> FileSystem {
    FileSystem::new(MemDisk::new(), Arc::new(FixedClock), true)
}
