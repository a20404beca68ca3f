use std::sync::{Arc, Mutex};

use sector_fs::{
    BlockDevice, Clock, FileSystem, FileType, Timestamp, NUM_SECTORS, SECTOR_SIZE,
};

use os::kernel::Kernel;
use os::memory::policy::PolicyKind;
use os::memory::PagingMode;
use os::noff::{NoffHeader, Segment};

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

/// 格式化好磁盘的内核
pub fn boot(paging: PagingMode, policy: PolicyKind) -> Kernel {
    let fs = FileSystem::new(MemDisk::new(), Arc::new(FixedClock), true);
    Kernel::new(fs, paging, policy)
}

/// 把指令与数据打包成 NOFF 镜像。
/// 数据段紧贴着代码段，返回 `(镜像, 数据段起始地址)`。
#[allow(dead_code)]
pub fn build_noff(code: &[u32], data: &[u8], uninit_size: u32) -> (Vec<u8>, u32) {
    let code_size = (code.len() * 4) as u32;
    let header = NoffHeader {
        code: Segment {
            virtual_addr: 0,
            in_file_addr: NoffHeader::SIZE as u32,
            size: code_size,
        },
        init_data: Segment {
            virtual_addr: code_size,
            in_file_addr: NoffHeader::SIZE as u32 + code_size,
            size: data.len() as u32,
        },
        uninit_data: Segment {
            virtual_addr: code_size + data.len() as u32,
            in_file_addr: 0,
            size: uninit_size,
        },
    };

    let mut image = header.to_bytes().to_vec();
    for word in code {
        image.extend_from_slice(&word.to_le_bytes());
    }
    image.extend_from_slice(data);
    (image, code_size)
}

/// 把镜像装进模拟文件系统
#[allow(dead_code)]
pub fn install(kernel: &Kernel, path: &str, image: &[u8]) {
    kernel.fs.create(path, FileType::Exe).unwrap();
    let file = kernel.fs.open(path).unwrap();
    assert_eq!(file.write_at(image, 0), image.len());
}
