//! 调度器与时钟协作者
//!
//! 文件系统本身不调度任务，只在资源争用时请求阻塞与唤醒。

use derive_more::{Display, From, Into};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, From, Into)]
#[repr(transparent)]
pub struct TaskId(usize);

pub trait Scheduler: Send + Sync {
    fn current_task(&self) -> TaskId;

    /// 阻塞当前任务直到被[`Scheduler::unblock`]。
    ///
    /// 若唤醒先于阻塞到达，本次阻塞立即返回；允许虚假返回，
    /// 调用者总会重新检查等待条件。
    fn block_current(&self);

    fn unblock(&self, task: TaskId);
}

pub trait Clock: Send + Sync {
    /// 自纪元起的秒数
    fn now(&self) -> u32;
}
