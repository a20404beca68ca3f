//! 线程身份。
//!
//! 调度器本体不在模拟器核心之内，核心只关心线程的身份：
//! 线程号圈定倒排页表里的归属、交换文件的名字，
//! 退出码留在登记表里供 Join 查询。线程号用完回收。

use std::collections::HashMap;

use crate::config::MAX_THREADS;

#[derive(Default)]
pub struct ThreadTable {
    next: usize,
    recycled: Vec<usize>,
    live: usize,
    exit_codes: HashMap<usize, i32>,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 领一个线程号；活着的线程到了上限就领不到
    pub fn spawn(&mut self) -> Option<usize> {
        if self.live == MAX_THREADS {
            return None;
        }
        self.live += 1;

        Some(self.recycled.pop().unwrap_or_else(|| {
            let tid = self.next;
            self.next += 1;
            tid
        }))
    }

    /// 线程谢幕：记下退出码，线程号重新入池
    pub fn exited(&mut self, tid: usize, code: i32) {
        assert!(self.live > 0);
        assert!(
            !self.recycled.contains(&tid),
            "tid={tid} exited twice"
        );
        self.live -= 1;
        self.exit_codes.insert(tid, code);
        self.recycled.push(tid);
    }

    pub fn exit_code(&self, tid: usize) -> Option<i32> {
        self.exit_codes.get(&tid).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_recycle_and_cap_out() {
        let mut threads = ThreadTable::new();
        let ids: Vec<usize> = (0..MAX_THREADS).map(|_| threads.spawn().unwrap()).collect();
        assert_eq!(ids, (0..MAX_THREADS).collect::<Vec<_>>());
        assert_eq!(threads.spawn(), None);

        threads.exited(ids[3], 42);
        assert_eq!(threads.exit_code(ids[3]), Some(42));
        assert_eq!(threads.spawn(), Some(ids[3]));
        assert_eq!(threads.exit_code(99), None);
    }
}
