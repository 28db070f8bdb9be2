//! 宿主机上的协作者：文件与内存块设备、以线程为任务的调度器、系统时钟。

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, Thread, ThreadId};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use block_dev::{BlockDevice, IoError, SECTOR_SIZE};
use minix_fs::{Clock, Config, FileSystem, Scheduler, TaskId};

/// 以宿主机文件为后端的块设备
pub struct BlockFile(pub Mutex<File>);

impl BlockDevice for BlockFile {
    fn sector_count(&self) -> usize {
        let file = self.0.lock().unwrap();
        file.metadata().map_or(0, |meta| meta.len() as usize / SECTOR_SIZE)
    }

    fn read_sectors(&self, start_sector: usize, buf: &mut [u8]) -> Result<(), IoError> {
        check_request(start_sector, buf.len(), self.sector_count())?;
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((start_sector * SECTOR_SIZE) as u64))
            .map_err(|_| IoError::Device)?;
        file.read_exact(buf).map_err(|_| IoError::Device)
    }

    fn write_sectors(&self, start_sector: usize, buf: &[u8]) -> Result<(), IoError> {
        check_request(start_sector, buf.len(), self.sector_count())?;
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((start_sector * SECTOR_SIZE) as u64))
            .map_err(|_| IoError::Device)?;
        file.write_all(buf).map_err(|_| IoError::Device)
    }
}

/// 内存盘，记录收到的请求个数
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    /// 每次读请求的延迟，用来让并发的请求相互重叠
    latency: Option<Duration>,
}

impl MemDisk {
    /// 容量为`sectors`个扇区的空盘
    pub fn new(sectors: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; sectors * SECTOR_SIZE]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 已完成的读请求个数
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// 已完成的写请求个数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// 直接读取盘上的字节，不经过请求接口
    pub fn peek(&self, offset: usize, len: usize) -> Vec<u8> {
        self.data.lock().unwrap()[offset..offset + len].to_vec()
    }
}

impl BlockDevice for MemDisk {
    fn sector_count(&self) -> usize {
        self.data.lock().unwrap().len() / SECTOR_SIZE
    }

    fn read_sectors(&self, start_sector: usize, buf: &mut [u8]) -> Result<(), IoError> {
        check_request(start_sector, buf.len(), self.sector_count())?;
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        let start = start_sector * SECTOR_SIZE;
        buf.copy_from_slice(&self.data.lock().unwrap()[start..start + buf.len()]);
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_sectors(&self, start_sector: usize, buf: &[u8]) -> Result<(), IoError> {
        check_request(start_sector, buf.len(), self.sector_count())?;
        let start = start_sector * SECTOR_SIZE;
        self.data.lock().unwrap()[start..start + buf.len()].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn check_request(start_sector: usize, len: usize, sectors: usize) -> Result<(), IoError> {
    if len % SECTOR_SIZE != 0 {
        return Err(IoError::Misaligned);
    }
    if start_sector + len / SECTOR_SIZE > sectors {
        return Err(IoError::OutOfRange);
    }
    Ok(())
}

/// 每个宿主线程是一个任务，阻塞与唤醒即`park`与`unpark`
#[derive(Default)]
pub struct ThreadScheduler {
    registry: Mutex<Registry>,
    next: AtomicUsize,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<ThreadId, TaskId>,
    threads: HashMap<TaskId, Thread>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for ThreadScheduler {
    fn current_task(&self) -> TaskId {
        let current = thread::current();
        let mut registry = self.registry.lock().unwrap();
        if let Some(&task) = registry.tasks.get(&current.id()) {
            return task;
        }

        let task = TaskId::from(self.next.fetch_add(1, Ordering::Relaxed));
        registry.tasks.insert(current.id(), task);
        registry.threads.insert(task, current);
        task
    }

    fn block_current(&self) {
        thread::park();
    }

    fn unblock(&self, task: TaskId) {
        let thread = self.registry.lock().unwrap().threads.get(&task).cloned();
        if let Some(thread) = thread {
            thread.unpark();
        }
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as u32)
    }
}

/// 以宿主线程与系统时钟为协作者的文件系统上下文
pub fn host_fs(config: Config) -> Arc<FileSystem> {
    FileSystem::new(config, Arc::new(ThreadScheduler::new()), Arc::new(SystemClock))
}
