use alloc::collections::VecDeque;

use spin::Mutex;

use crate::{Scheduler, TaskId};

/// 等待队列，每次释放只唤醒一个等待者。
///
/// 登记必须与检查等待条件处于同一个临界区内，
/// 否则唤醒可能在登记之前发生而丢失。
#[derive(Debug, Default)]
pub struct WaitQueue {
    tasks: Mutex<VecDeque<TaskId>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    pub fn enqueue(&self, task: TaskId) {
        let mut tasks = self.tasks.lock();
        if !tasks.contains(&task) {
            tasks.push_back(task);
        }
    }

    /// 唤醒最早登记的任务，返回是否有任务被唤醒
    pub fn wake_one(&self, scheduler: &dyn Scheduler) -> bool {
        let next = self.tasks.lock().pop_front();
        match next {
            Some(task) => {
                scheduler.unblock(task);
                true
            }
            None => false,
        }
    }

    /// 撤销登记，等待条件已满足的任务调用
    pub fn remove(&self, task: TaskId) {
        self.tasks.lock().retain(|&t| t != task);
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
