//! # 虚存子系统
//!
//! - 翻译条目与倒排页表（`translation`、`frame_table`）
//! - 置换策略（`policy`）
//! - 地址空间的装载与销毁（`address_space`）
//! - 缺页处理（`fault`）

mod address_space;
pub mod fault;
mod frame_table;
pub mod policy;
pub mod translation;

pub use address_space::{AddrSpace, FdTable, PagingMode};
pub use frame_table::FrameTable;
