#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use minix_fs::{Config, DeviceId, FileSystem, Process, Scheduler, TaskId};
use minix_fs_fuse::{MemDisk, ThreadScheduler, host_fs};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `blocks`块的内存盘，尚未格式化
pub fn disk(fs: &FileSystem, blocks: usize) -> (Arc<MemDisk>, DeviceId) {
    let disk = Arc::new(MemDisk::new(blocks * 2));
    let dev = fs.devices().install_block(disk.clone());
    (disk, dev)
}

/// 格式化并挂载为根文件系统
pub fn setup(
    config: Config,
    blocks: usize,
    inodes: usize,
) -> (Arc<FileSystem>, Arc<MemDisk>, DeviceId) {
    init_logger();
    let fs = host_fs(config);
    let (disk, dev) = disk(&fs, blocks);
    fs.format(dev, inodes).unwrap();
    fs.mount_root(dev).unwrap();
    (fs, disk, dev)
}

pub fn root_process(blocks: usize, inodes: usize) -> (Process, Arc<MemDisk>, DeviceId) {
    let (fs, disk, dev) = setup(Config::default(), blocks, inodes);
    (Process::new(&fs).unwrap(), disk, dev)
}

/// 推迟指定任务的唤醒，其余任务照常
///
/// 用来制造“被唤醒者尚未运行，别的任务已虚假返回并抢到资源”的交错。
pub struct SlowWake {
    inner: Arc<ThreadScheduler>,
    slow: Mutex<Option<TaskId>>,
    delay: Duration,
}

impl SlowWake {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(ThreadScheduler::new()),
            slow: Mutex::new(None),
            delay,
        })
    }

    pub fn slow_down(&self, task: TaskId) {
        *self.slow.lock().unwrap() = Some(task);
    }
}

impl Scheduler for SlowWake {
    fn current_task(&self) -> TaskId {
        self.inner.current_task()
    }

    fn block_current(&self) {
        self.inner.block_current();
    }

    fn unblock(&self, task: TaskId) {
        if *self.slow.lock().unwrap() != Some(task) {
            self.inner.unblock(task);
            return;
        }
        let (inner, delay) = (self.inner.clone(), self.delay);
        thread::spawn(move || {
            thread::sleep(delay);
            inner.unblock(task);
        });
    }
}
