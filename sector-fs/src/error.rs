use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// 空闲扇区不够
    NoSpace,
    /// 目录里已有同名项
    NameTaken,
    /// 目录槽位用尽
    DirectoryFull,
    NotFound,
    /// 路径中途撞上了非目录文件
    NotADirectory,
    /// 目录非空，拒绝删除
    NotEmpty,
    /// 路径不合语法
    BadPath,
    /// 文件仍被打开着
    Busy,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::NoSpace => "no free sectors left",
            Self::NameTaken => "name already exists",
            Self::DirectoryFull => "no free directory entries left",
            Self::NotFound => "no such file or directory",
            Self::NotADirectory => "not a directory",
            Self::NotEmpty => "directory is not empty",
            Self::BadPath => "malformed path",
            Self::Busy => "file is still open",
        };
        f.write_str(message)
    }
}

impl std::error::Error for FsError {}
