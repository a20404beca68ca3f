//! # 文件系统门面
//!
//! 把文件名映射到文件上。每个文件由三部分组成：
//! 占一个扇区的文件头、若干数据块、父目录里的一个表项。
//! 空闲扇区位图与根目录自身也是普通文件，
//! 文件头分别固定在 0 号与 1 号扇区，开机即可定位，
//! 并在内核运行期间始终保持打开。
//!
//! create/remove 这类改动目录或位图的操作，成功时立即把改动写回磁盘；
//! 失败时直接丢弃内存里的快照，不留半点持久化的痕迹。
//! 所有元数据变更都串行化在一把全文件系统的锁后面，
//! 避免两个并发 create 各自基于过期的位图快照重复分配扇区。

use std::sync::{Arc, OnceLock};

use block_dev::BlockDevice;
use ksync::Lock;
use log::debug;

use crate::clock::Clock;
use crate::error::FsError;
use crate::layout::{Bitmap, Directory, FileHeader, FileType};
use crate::open_file::{OpenFile, Registry};
use crate::{
    DIRECTORY_FILE_SIZE, FREE_MAP_FILE_SIZE, FREE_MAP_SECTOR, NUM_SECTORS, ROOT_DIR_SECTOR,
};

pub(crate) struct FsInner {
    device: Arc<dyn BlockDevice>,
    clock: Arc<dyn Clock>,
    registry: Registry,
    /// 元数据变更的全局串行化锁
    meta_lock: Lock,
    free_map_file: OnceLock<OpenFile>,
    root_dir_file: OnceLock<OpenFile>,
}

pub struct FileSystem {
    inner: Arc<FsInner>,
}

impl FsInner {
    #[inline]
    pub(crate) fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    #[inline]
    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    #[inline]
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub(crate) fn meta_lock(&self) -> &Lock {
        &self.meta_lock
    }

    pub(crate) fn free_map_file(&self) -> &OpenFile {
        self.free_map_file.get().unwrap()
    }

    fn root_dir_file(&self) -> &OpenFile {
        self.root_dir_file.get().unwrap()
    }
}

impl FileSystem {
    /// 装载文件系统。`format` 为真时先在空磁盘上铺好
    /// 空闲扇区位图与空的根目录。
    pub fn new(device: Arc<dyn BlockDevice>, clock: Arc<dyn Clock>, format: bool) -> Self {
        debug!("initializing the file system");
        let inner = Arc::new(FsInner {
            device,
            clock,
            registry: Registry::new(),
            meta_lock: Lock::new(),
            free_map_file: OnceLock::new(),
            root_dir_file: OnceLock::new(),
        });

        let mut formatted = None;
        if format {
            debug!("formatting the file system");
            let mut free_map = Bitmap::new(NUM_SECTORS);
            // 自举：两个元文件的文件头先占住各自的保留扇区
            free_map.mark(FREE_MAP_SECTOR as usize);
            free_map.mark(ROOT_DIR_SECTOR as usize);

            let mut map_header = FileHeader::default();
            map_header
                .allocate(
                    &mut free_map,
                    FREE_MAP_FILE_SIZE,
                    FileType::Bit,
                    inner.clock(),
                    inner.device(),
                )
                .expect("a fresh disk must hold the free map");
            let mut dir_header = FileHeader::default();
            dir_header
                .allocate(
                    &mut free_map,
                    DIRECTORY_FILE_SIZE,
                    FileType::Dir,
                    inner.clock(),
                    inner.device(),
                )
                .expect("a fresh disk must hold the root directory");

            // 先把文件头写回磁盘，接下来的 open 要从磁盘上读它们
            map_header.write_back(FREE_MAP_SECTOR, inner.device());
            dir_header.write_back(ROOT_DIR_SECTOR, inner.device());
            formatted = Some(free_map);
        }

        assert!(inner
            .free_map_file
            .set(OpenFile::new(FREE_MAP_SECTOR, inner.clone()))
            .is_ok());
        assert!(inner
            .root_dir_file
            .set(OpenFile::new(ROOT_DIR_SECTOR, inner.clone()))
            .is_ok());

        if let Some(free_map) = formatted {
            // 元文件可写之后，位图与空根目录才落盘
            free_map.write_back(inner.free_map_file());
            Directory::new().write_back(inner.root_dir_file());
        }

        Self { inner }
    }

    /// 在 `path` 处创建一个文件或目录。
    /// 普通文件初始长度为零，目录则分配好整张空目录表。
    pub fn create(&self, path: &str, kind: FileType) -> Result<(), FsError> {
        debug!("creating file {path}");
        let (parent, leaf) = split_path(path)?;
        let dir_file = self.open_parent(parent)?;

        self.inner
            .meta_lock()
            .with(|| self.create_locked(&dir_file, leaf, kind))
    }

    pub fn make_dir(&self, path: &str) -> Result<(), FsError> {
        self.create(path, FileType::Dir)
    }

    /// 沿绝对路径逐级查找，途中的每一段都必须是目录
    pub fn open(&self, path: &str) -> Result<OpenFile, FsError> {
        debug!("opening file {path}");
        let (parent, leaf) = split_path(path)?;
        let dir_file = self.open_parent(parent)?;

        let directory = Directory::fetch_from(&dir_file);
        let sector = directory.find(leaf).ok_or(FsError::NotFound)?;
        Ok(OpenFile::new(sector, self.inner.clone()))
    }

    /// 删除 `path` 处的文件：归还数据块与文件头扇区，摘掉目录项。
    /// 非空目录、以及仍有句柄开着的文件，都拒绝删除。
    pub fn remove(&self, path: &str) -> Result<(), FsError> {
        debug!("removing file {path}");
        let (parent, leaf) = split_path(path)?;
        let dir_file = self.open_parent(parent)?;

        self.inner
            .meta_lock()
            .with(|| self.remove_locked(&dir_file, leaf))
    }

    /// 从根目录起递归列出整个文件树
    pub fn list(&self) {
        println!("--------List all files in the file system--------");
        println!("(dir) root");
        self.list_dir(self.inner.root_dir_file(), "|-----");
        println!();
    }

    /// 当前空闲扇区数
    pub fn num_free_sectors(&self) -> usize {
        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(self.inner.free_map_file());
        free_map.num_clear()
    }

    /// 打印文件系统的全部状态，调试用
    pub fn dump(&self) {
        let inner = &self.inner;

        println!("-------------------Bit map file: -----------------------");
        FileHeader::fetch_from(FREE_MAP_SECTOR, inner.device()).print(inner.device());

        println!("----------------Root directory file: -------------------");
        FileHeader::fetch_from(ROOT_DIR_SECTOR, inner.device()).print(inner.device());

        println!("-------------------Sectors bitmap: ---------------------");
        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(inner.free_map_file());
        free_map.print();

        println!("-------------------Root directory: ---------------------");
        self.print_dir(inner.root_dir_file());
    }
}

impl FileSystem {
    fn create_locked(&self, dir_file: &OpenFile, leaf: &str, kind: FileType) -> Result<(), FsError> {
        let mut directory = Directory::fetch_from(dir_file);
        if directory.find(leaf).is_some() {
            return Err(FsError::NameTaken);
        }

        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(self.inner.free_map_file());

        // 文件头扇区、数据块、目录项三者都到位，这次创建才算数
        let sector = free_map.find().ok_or(FsError::NoSpace)? as u32;
        let mut header = FileHeader::default();
        let size = if kind == FileType::Dir {
            DIRECTORY_FILE_SIZE
        } else {
            0
        };
        header.allocate(
            &mut free_map,
            size,
            kind,
            self.inner.clock(),
            self.inner.device(),
        )?;
        directory.add(leaf, sector)?;

        // 按文件头 -> 父目录 -> 位图的顺序持久化
        header.write_back(sector, self.inner.device());
        directory.write_back(dir_file);
        free_map.write_back(self.inner.free_map_file());

        if kind == FileType::Dir {
            // 新目录的数据块里铺一张空目录表
            let new_dir_file = OpenFile::new(sector, self.inner.clone());
            Directory::new().write_back(&new_dir_file);
        }
        Ok(())
    }

    fn remove_locked(&self, dir_file: &OpenFile, leaf: &str) -> Result<(), FsError> {
        let mut directory = Directory::fetch_from(dir_file);
        let sector = directory.find(leaf).ok_or(FsError::NotFound)?;

        // 还有句柄开着就释放扇区，会腐蚀之后在这些扇区上新建的文件
        if self.inner.registry().is_open(sector) {
            return Err(FsError::Busy);
        }

        let mut header = FileHeader::fetch_from(sector, self.inner.device());
        if header.kind() == FileType::Dir {
            let removed = OpenFile::new(sector, self.inner.clone());
            if !Directory::fetch_from(&removed).is_empty() {
                log::warn!("unable to remove the non-empty directory {leaf}");
                return Err(FsError::NotEmpty);
            }
        }

        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(self.inner.free_map_file());
        header.deallocate(&mut free_map, self.inner.device());
        free_map.clear(sector as usize);
        directory.remove(leaf)?;

        free_map.write_back(self.inner.free_map_file());
        directory.write_back(dir_file);
        Ok(())
    }

    /// 打开 `parent` 指示的目录；空串代表根目录
    fn open_parent(&self, parent: &str) -> Result<OpenFile, FsError> {
        if parent.is_empty() {
            return Ok(OpenFile::new(ROOT_DIR_SECTOR, self.inner.clone()));
        }

        let mut dir_file = OpenFile::new(ROOT_DIR_SECTOR, self.inner.clone());
        for component in parent[1..].split('/') {
            let directory = Directory::fetch_from(&dir_file);
            let sector = directory.find(component).ok_or(FsError::NotFound)?;
            let next = OpenFile::new(sector, self.inner.clone());
            if next.kind() != FileType::Dir {
                return Err(FsError::NotADirectory);
            }
            dir_file = next;
        }
        Ok(dir_file)
    }

    fn list_dir(&self, dir_file: &OpenFile, leading: &str) {
        for (name, sector) in Directory::fetch_from(dir_file).entries() {
            let file = OpenFile::new(sector, self.inner.clone());
            if file.kind() == FileType::Dir {
                println!("{leading}(dir) {name}");
                self.list_dir(&file, &format!("{leading}-----"));
            } else {
                println!("{leading}{name}");
            }
        }
    }

    fn print_dir(&self, dir_file: &OpenFile) {
        println!("Directory contents:");
        for (name, sector) in Directory::fetch_from(dir_file).entries() {
            println!("Name: {name}, Sector: {sector}");
            FileHeader::fetch_from(sector, self.inner.device()).print(self.inner.device());
        }
        println!();
    }
}

/// 把绝对路径拆成 `(父目录路径, 末段名)`。
/// 必须以 `/` 开头、不以 `/` 结尾、不含空路径段。
fn split_path(path: &str) -> Result<(&str, &str), FsError> {
    if path.len() < 2 || !path.starts_with('/') || path.ends_with('/') {
        return Err(FsError::BadPath);
    }
    if path[1..].split('/').any(|component| component.is_empty()) {
        return Err(FsError::BadPath);
    }

    Ok(path.rsplit_once('/').unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_splitting() {
        assert_eq!(split_path("/a.txt"), Ok(("", "a.txt")));
        assert_eq!(split_path("/d/e/f.cc"), Ok(("/d/e", "f.cc")));

        for bad in ["", "/", "a.txt", "/d/", "//a", "/d//f"] {
            assert_eq!(split_path(bad), Err(FsError::BadPath), "path={bad:?}");
        }
    }
}
