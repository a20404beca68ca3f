use core::fmt;

/// 时间戳串长度："yyyy-mm-dd hh:mm:ss" 加上结尾的 \0
pub const TIME_STR_LEN: usize = 20;

/// 文件头里的定长时间戳
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Timestamp([u8; TIME_STR_LEN]);

/// 挂钟接口。
///
/// 文件系统只在创建与读写时向它要一次当前时间，
/// 宿主机驱动与测试各自提供实现。
pub trait Clock: Send + Sync {
    fn stamp(&self) -> Timestamp;
}

impl Timestamp {
    pub fn from_civil(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        let text = format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
        let mut bytes = [0; TIME_STR_LEN];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        Self(bytes)
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; TIME_STR_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; TIME_STR_LEN] {
        &self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self([0; TIME_STR_LEN])
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(TIME_STR_LEN);
        f.write_str(core::str::from_utf8(&self.0[..len]).unwrap_or("?"))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({self})")
    }
}
