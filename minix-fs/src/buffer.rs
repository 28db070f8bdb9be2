//! # 块缓冲层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟缓冲区，
//! 把即将操作的块复制到内存中，所有对块设备的操作都经过这一层。
//!
//! - 查找：按`(设备号, 块号)`哈希到固定数量的桶中；
//! - 分配：未达上限时新建缓冲区，否则从空闲队列头部取最早释放的一个，
//!   都没有时阻塞，直到某次释放唤醒一个等待者；
//! - 释放：引用计数归零即移出查找表、写回脏块、清除身份并放入空闲队列尾部。
//!
//! 普通数据块的写入是延迟的（仅标记为脏），索引节点与目录的元数据由上层显式写穿。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::layout::Plain;
use crate::sync::{ReentrantLock, WaitQueue};
use crate::{BLOCK_SIZE, Config, DeviceId, DeviceTable, Scheduler};

/// 缓冲区中的数据，按 8 字节对齐以便映射磁盘结构
#[derive(Clone)]
#[repr(C, align(8))]
pub struct BlockData(pub [u8; BLOCK_SIZE]);

impl BlockData {
    pub const fn zeroed() -> Self {
        Self([0; BLOCK_SIZE])
    }
}

pub struct BufferCache {
    devices: Arc<DeviceTable>,
    scheduler: Arc<dyn Scheduler>,
    /// 缓冲区个数的上限
    capacity: usize,
    inner: Mutex<CacheInner>,
    /// 因缓冲区耗尽而阻塞的任务
    starving: WaitQueue,
}

struct CacheInner {
    slots: Vec<Arc<Slot>>,
    meta: Vec<Meta>,
    buckets: Vec<Vec<usize>>,
    /// 引用计数为 0 的缓冲区，头部是最早释放的
    free: VecDeque<usize>,
}

/// 缓冲区的身份与计数，由缓存的锁保护
#[derive(Debug, Default)]
struct Meta {
    /// 在查找表中时为`Some`
    dev: Option<DeviceId>,
    block: u32,
    count: usize,
    /// 每次清除身份后递增，用于识别延迟写回期间缓冲区是否已被回收
    generation: u64,
}

struct Slot {
    /// 读盘、写回期间持有
    lock: ReentrantLock,
    data: Mutex<BlockData>,
    /// 内容已从设备读入
    valid: AtomicBool,
    /// 内容与设备不一致
    dirty: AtomicBool,
}

/// 对一个缓冲区的引用，析构时释放。
pub struct Buffer {
    cache: Arc<BufferCache>,
    slot: Arc<Slot>,
    index: usize,
    dev: DeviceId,
    block: u32,
}

impl BufferCache {
    pub fn new(
        devices: Arc<DeviceTable>,
        scheduler: Arc<dyn Scheduler>,
        config: &Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            devices,
            scheduler,
            capacity: config.buffers,
            inner: Mutex::new(CacheInner {
                slots: Vec::new(),
                meta: Vec::new(),
                buckets: vec![Vec::new(); config.buckets],
                free: VecDeque::new(),
            }),
            starving: WaitQueue::new(),
        })
    }

    /// 返回内容有效的缓冲区，未缓存时从设备读入。
    ///
    /// 并发读取同一未缓存块时只有一个任务发出请求，其余任务等待其完成。
    pub fn read(self: &Arc<Self>, dev: DeviceId, block: u32) -> Buffer {
        let buffer = self.get(dev, block);
        {
            let _guard = buffer.slot.lock.lock(&*self.scheduler);
            if !buffer.slot.valid.load(Ordering::Acquire) {
                let mut data = BlockData::zeroed();
                self.devices.read_block(dev, block, &mut data.0);
                *buffer.slot.data.lock() = data;
                buffer.slot.valid.store(true, Ordering::Release);
            }
        }
        buffer
    }

    /// 返回清零的缓冲区而不读盘，供新分配的块使用
    pub fn zeroed(self: &Arc<Self>, dev: DeviceId, block: u32) -> Buffer {
        let buffer = self.get(dev, block);
        {
            let _guard = buffer.slot.lock.lock(&*self.scheduler);
            let mut data = buffer.slot.data.lock();
            data.0.fill(0);
            buffer.slot.dirty.store(true, Ordering::Release);
            buffer.slot.valid.store(true, Ordering::Release);
        }
        buffer
    }

    /// 块在查找表中时返回其引用计数
    pub fn ref_count(&self, dev: DeviceId, block: u32) -> Option<usize> {
        let inner = self.inner.lock();
        inner.lookup(dev, block).map(|index| inner.meta[index].count)
    }

    /// 已创建的缓冲区个数
    pub fn allocated(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// 空闲队列的长度
    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// 写回全部脏块
    pub fn sync(self: &Arc<Self>) {
        self.sync_where(|_| true);
    }

    /// 写回某个设备的全部脏块
    pub fn sync_device(self: &Arc<Self>, dev: DeviceId) {
        self.sync_where(|d| d == dev);
    }

    fn sync_where(self: &Arc<Self>, pred: impl Fn(DeviceId) -> bool) {
        let dirty: Vec<_> = {
            let inner = self.inner.lock();
            inner
                .meta
                .iter()
                .zip(&inner.slots)
                .filter_map(|(meta, slot)| {
                    let dev = meta.dev.filter(|&dev| pred(dev))?;
                    slot.dirty
                        .load(Ordering::Acquire)
                        .then_some((dev, meta.block))
                })
                .collect()
        };

        for (dev, block) in dirty {
            let buffer = self.get(dev, block);
            let _guard = buffer.slot.lock.lock(&*self.scheduler);
            self.flush(&buffer.slot, dev, block);
        }
    }

    /// 取得`(dev, block)`的缓冲区并增加引用计数，内容未必有效
    fn get(self: &Arc<Self>, dev: DeviceId, block: u32) -> Buffer {
        let current = self.scheduler.current_task();
        loop {
            let mut inner = self.inner.lock();
            if let Some(index) = inner.lookup(dev, block) {
                inner.meta[index].count += 1;
                self.starving.remove(current);
                log::trace!("buffer {dev}:{block} hit");
                return self.handle(&inner, index, dev, block);
            }

            if let Some(index) = inner.take_free(self.capacity) {
                inner.insert(index, dev, block);
                self.starving.remove(current);
                log::trace!("buffer {dev}:{block} miss, using #{index}");
                return self.handle(&inner, index, dev, block);
            }

            // 登记与检查处于同一临界区
            self.starving.enqueue(current);
            drop(inner);
            log::debug!("buffer cache exhausted, waiting for {dev}:{block}");
            self.scheduler.block_current();
        }
    }

    fn handle(
        self: &Arc<Self>,
        inner: &CacheInner,
        index: usize,
        dev: DeviceId,
        block: u32,
    ) -> Buffer {
        Buffer {
            cache: self.clone(),
            slot: inner.slots[index].clone(),
            index,
            dev,
            block,
        }
    }

    fn release(&self, buffer: &Buffer) {
        let slot = &buffer.slot;
        let (index, dev, block) = (buffer.index, buffer.dev, buffer.block);

        let generation = {
            let mut inner = self.inner.lock();
            let meta = &mut inner.meta[index];
            assert!(meta.count > 0, "release of unreferenced buffer {dev}:{block}");
            meta.count -= 1;
            if meta.count > 0 {
                return;
            }
            if !slot.dirty.load(Ordering::Acquire) {
                inner.evict(index);
                drop(inner);
                self.starving.wake_one(&*self.scheduler);
                return;
            }
            meta.generation
        };

        // 写回期间缓冲区仍在查找表中，此时再被取用不会重新读盘
        let _guard = slot.lock.lock(&*self.scheduler);
        if self.inner.lock().meta[index].generation != generation {
            return;
        }
        self.flush(slot, dev, block);

        let mut inner = self.inner.lock();
        let meta = &inner.meta[index];
        if meta.generation != generation || meta.count > 0 {
            return;
        }
        inner.evict(index);
        drop(inner);
        self.starving.wake_one(&*self.scheduler);
    }

    /// 调用者持有缓冲区的锁
    fn flush(&self, slot: &Slot, dev: DeviceId, block: u32) {
        let data = {
            let data = slot.data.lock();
            if !slot.dirty.swap(false, Ordering::AcqRel) {
                return;
            }
            data.clone()
        };
        self.devices.write_block(dev, block, &data.0);
    }
}

impl CacheInner {
    fn bucket(&self, dev: DeviceId, block: u32) -> usize {
        (u32::from(dev) ^ block) as usize % self.buckets.len()
    }

    fn lookup(&self, dev: DeviceId, block: u32) -> Option<usize> {
        self.buckets[self.bucket(dev, block)]
            .iter()
            .copied()
            .find(|&index| {
                let meta = &self.meta[index];
                meta.dev == Some(dev) && meta.block == block
            })
    }

    /// 新建缓冲区，到达上限后改为回收空闲队列头部的缓冲区
    fn take_free(&mut self, capacity: usize) -> Option<usize> {
        if self.slots.len() < capacity {
            self.slots.push(Arc::new(Slot::new()));
            self.meta.push(Meta::default());
            return Some(self.slots.len() - 1);
        }
        self.free.pop_front()
    }

    fn insert(&mut self, index: usize, dev: DeviceId, block: u32) {
        let meta = &mut self.meta[index];
        debug_assert!(meta.dev.is_none() && meta.count == 0);
        meta.dev = Some(dev);
        meta.block = block;
        meta.count = 1;
        let bucket = self.bucket(dev, block);
        self.buckets[bucket].push(index);
    }

    /// 移出查找表、清除身份并放入空闲队列
    fn evict(&mut self, index: usize) {
        let meta = &mut self.meta[index];
        let Some(dev) = meta.dev.take() else {
            return;
        };
        let block = mem::take(&mut meta.block);
        meta.generation += 1;

        let slot = &self.slots[index];
        debug_assert!(!slot.dirty.load(Ordering::Acquire));
        slot.valid.store(false, Ordering::Release);
        slot.dirty.store(false, Ordering::Release);

        let bucket = self.bucket(dev, block);
        self.buckets[bucket].retain(|&i| i != index);
        self.free.push_back(index);
    }
}

impl Slot {
    fn new() -> Self {
        Self {
            lock: ReentrantLock::new(),
            data: Mutex::new(BlockData::zeroed()),
            valid: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }
}

impl Buffer {
    #[inline]
    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    #[inline]
    pub fn block(&self) -> u32 {
        self.block
    }

    pub fn is_dirty(&self) -> bool {
        self.slot.dirty.load(Ordering::Acquire)
    }

    pub fn ref_count(&self) -> usize {
        self.cache.inner.lock().meta[self.index].count
    }

    #[inline]
    pub fn map<T: Plain, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        let data = self.slot.data.lock();
        let addr = data.0.as_ptr().wrapping_add(checked_offset::<T>(offset));
        f(unsafe { &*addr.cast::<T>() })
    }

    /// 修改缓冲区内容并标记为脏
    #[inline]
    pub fn map_mut<T: Plain, V>(&self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        let mut data = self.slot.data.lock();
        self.slot.dirty.store(true, Ordering::Release);
        let addr = data.0.as_mut_ptr().wrapping_add(checked_offset::<T>(offset));
        f(unsafe { &mut *addr.cast::<T>() })
    }

    /// 同步写回当前内容，不影响引用计数
    pub fn write_back(&self) {
        let _guard = self.slot.lock.lock(&*self.cache.scheduler);
        let data = {
            let data = self.slot.data.lock();
            self.slot.dirty.store(false, Ordering::Release);
            data.clone()
        };
        self.cache.devices.write_block(self.dev, self.block, &data.0);
    }
}

/// `T`必须完整落在块内且满足对齐要求
#[inline]
fn checked_offset<T>(offset: usize) -> usize {
    assert!(offset + mem::size_of::<T>() <= BLOCK_SIZE);
    assert!(mem::align_of::<T>() <= mem::align_of::<BlockData>());
    assert_eq!(offset % mem::align_of::<T>(), 0);
    offset
}

impl Clone for Buffer {
    fn clone(&self) -> Self {
        self.cache.inner.lock().meta[self.index].count += 1;
        Self {
            cache: self.cache.clone(),
            slot: self.slot.clone(),
            index: self.index,
            dev: self.dev,
            block: self.block,
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.cache.release(self);
    }
}
