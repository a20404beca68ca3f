use std::sync::Condvar;
use std::sync::Mutex;

#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    permit_granted: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            permit_granted: Condvar::new(),
        }
    }

    /// Verhogen 增加
    pub fn up(&self) {
        let mut permits = self.permits.lock().unwrap();
        *permits += 1;
        self.permit_granted.notify_one();
    }

    /// Proberen 尝试
    pub fn down(&self) {
        let mut permits = self.permits.lock().unwrap();
        // 若资源派发完，则去排队
        while *permits == 0 {
            permits = self.permit_granted.wait(permits).unwrap();
        }
        *permits -= 1;
    }
}
