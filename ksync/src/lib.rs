//! # 内核同步原语
//!
//! 内核各层（文件系统、虚存）约定只使用这三种原语协调并发：
//! 互斥锁 [`Lock`]、信号量 [`Semaphore`]、条件变量 [`Condvar`]。
//! 在裸机内核里它们经由调度器的等待队列实现；
//! 模拟器是宿主机程序，底下换成 `std::sync` 的阻塞与唤醒，
//! 对外接口维持内核式的显式 acquire/release 纪律不变。
//!
//! 没有超时，没有取消：阻塞的线程一直阻塞到被唤醒为止。

mod condvar;
mod mutex;
mod semaphore;

pub use condvar::Condvar;
pub use mutex::Lock;
pub use semaphore::Semaphore;
