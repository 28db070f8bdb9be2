use alloc::collections::VecDeque;

use spin::Mutex;

use crate::{Scheduler, TaskId};

/// 可重入锁：同一任务可以多次获取，其它任务在释放前阻塞。
///
/// 缓冲区与索引节点各带一把，嵌套调用（如跨挂载点的目录查找）
/// 会再次进入同一对象。
#[derive(Debug)]
pub struct ReentrantLock {
    state: Mutex<LockState>,
}

#[derive(Debug)]
struct LockState {
    owner: Option<TaskId>,
    /// 持有者的重入深度
    depth: usize,
    waiters: VecDeque<TaskId>,
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReentrantGuard<'a> {
    lock: &'a ReentrantLock,
    scheduler: &'a dyn Scheduler,
}

impl ReentrantLock {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
                waiters: VecDeque::new(),
            }),
        }
    }

    pub fn lock<'a>(&'a self, scheduler: &'a dyn Scheduler) -> ReentrantGuard<'a> {
        let current = scheduler.current_task();
        loop {
            let mut state = self.state.lock();
            match state.owner {
                None => {
                    state.owner = Some(current);
                    state.depth = 1;
                    // 虚假返回后取得锁的任务可能还在队列中
                    state.waiters.retain(|&task| task != current);
                    break;
                }
                Some(owner) if owner == current => {
                    state.depth += 1;
                    break;
                }
                Some(_) => {
                    if !state.waiters.contains(&current) {
                        state.waiters.push_back(current);
                    }
                }
            }
            drop(state);
            scheduler.block_current();
        }

        ReentrantGuard {
            lock: self,
            scheduler,
        }
    }

    /// 是否被某个任务持有
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    fn unlock(&self, scheduler: &dyn Scheduler) {
        let mut state = self.state.lock();
        assert_eq!(
            state.owner,
            Some(scheduler.current_task()),
            "unlocking a lock held by another task"
        );

        state.depth -= 1;
        if state.depth > 0 {
            return;
        }
        state.owner = None;
        let next = state.waiters.pop_front();
        drop(state);

        if let Some(task) = next {
            scheduler.unblock(task);
        }
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReentrantGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock(self.scheduler);
    }
}
