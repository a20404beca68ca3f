use std::sync::Condvar;
use std::sync::Mutex;

/// 内核互斥锁。
///
/// 与RAII风格的 `std::sync::Mutex` 不同，加锁与解锁是两次独立调用，
/// 临界区可以横跨多个函数（打开文件表的读者计数就是这么用的）。
#[derive(Debug, Default)]
pub struct Lock {
    locked: Mutex<bool>,
    lock_freed: Condvar,
}

impl Lock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) {
        let mut locked = self.locked.lock().unwrap();
        while *locked {
            locked = self.lock_freed.wait(locked).unwrap();
        }
        *locked = true;
    }

    pub fn release(&self) {
        let mut locked = self.locked.lock().unwrap();
        // 必须是上锁状态
        assert!(*locked, "released an unheld Lock");
        *locked = false;
        self.lock_freed.notify_one();
    }

    /// 把临界区写成闭包，防止早返回漏掉 release
    pub fn with<V>(&self, f: impl FnOnce() -> V) -> V {
        self.acquire();
        let value = f();
        self.release();
        value
    }
}
