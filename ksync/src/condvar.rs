use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Condvar as Notify;
use std::sync::Mutex;

use crate::Lock;

/// 条件变量，FIFO等待队列
#[derive(Debug, Default)]
pub struct Condvar {
    wait_queue: Mutex<VecDeque<Arc<Waiter>>>,
}

#[derive(Debug, Default)]
struct Waiter {
    woken: Mutex<bool>,
    wakeup: Notify,
}

impl Condvar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        while let Some(waiter) = self.wait_queue.lock().unwrap().pop_front() {
            let mut woken = waiter.woken.lock().unwrap();
            *woken = true;
            waiter.wakeup.notify_one();
        }
    }

    /// 释放`lock`并睡眠，被唤醒后重新拿回`lock`
    pub fn wait(&self, lock: &Lock) {
        let waiter = Arc::new(Waiter::default());
        self.wait_queue.lock().unwrap().push_back(waiter.clone());

        lock.release();
        let mut woken = waiter.woken.lock().unwrap();
        while !*woken {
            woken = waiter.wakeup.wait(woken).unwrap();
        }
        drop(woken);
        lock.acquire();
    }
}
