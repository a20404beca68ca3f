use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Write};
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use block_dev::BlockDevice;
use sector_fs::{NUM_SECTORS, SECTOR_SIZE};

/// 以宿主机文件为介质的模拟磁盘
pub struct DiskFile(Mutex<File>);

impl DiskFile {
    /// 打开（或新建）磁盘镜像，一律撑到整盘大小
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len((NUM_SECTORS * SECTOR_SIZE) as u64)?;

        Ok(Self(Mutex::new(file)))
    }
}

impl BlockDevice for DiskFile {
    fn read_sector(&self, sector: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.read(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.write(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }
}
