//! 可阻塞的同步原语
//!
//! 短临界区一律使用[`spin::Mutex`]，持有自旋锁期间绝不阻塞；
//! 需要跨越 I/O 持有的锁由这里的原语提供，阻塞与唤醒交给[`Scheduler`](crate::Scheduler)。

mod reentrant;
mod wait_queue;

pub use self::{
    reentrant::{ReentrantGuard, ReentrantLock},
    wait_queue::WaitQueue,
};
