use enumflags2::{bitflags, BitFlags};

/// 翻译条目的保护位
/// - V(Valid)：仅当位 V 为 1 时，条目才是合法的；
/// - R(ReadOnly)：对应页面拒绝写入；
/// - U(Use)：自上次清零以来页面是否被访问过；
/// - D(Dirty)：自上次清零以来页面是否被修改过。
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFlag {
    V = 0b0000_0001,
    R = 0b0000_0010,
    U = 0b0000_0100,
    D = 0b0000_1000,
}

/// 一条虚拟页到物理页的翻译，快表与线性页表共用此形
#[derive(Debug, Default, Clone, Copy)]
pub struct TranslationEntry {
    pub virtual_page: u32,
    pub physical_page: u32,
    pub flags: BitFlags<EntryFlag>,
}

/// 倒排页表的条目，每个物理页帧一条；
/// 物理页号即下标，归属线程以 `tid` 表示，`-1` 为无主
#[derive(Debug, Clone, Copy)]
pub struct FrameEntry {
    pub virtual_page: u32,
    pub flags: BitFlags<EntryFlag>,
    pub tid: i32,
}

impl TranslationEntry {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.flags.contains(EntryFlag::V)
    }
}

impl Default for FrameEntry {
    fn default() -> Self {
        Self {
            virtual_page: 0,
            flags: BitFlags::empty(),
            tid: -1,
        }
    }
}

impl FrameEntry {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.flags.contains(EntryFlag::V)
    }
}
