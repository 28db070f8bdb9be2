//! # 索引节点层
//!
//! 活动索引节点表：对磁盘索引节点的带引用计数的缓存。
//! 每个活动索引节点持有其所在索引节点表块的缓冲区，
//! 对描述符的修改总是立即写回。
//!
//! 文件数据通过 [`Inode::map_block`] 到达磁盘，
//! 它是逻辑块号到物理块号的唯一出入口。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem::{self, ManuallyDrop};
use core::ptr;

use spin::Mutex;
use vfs::mode::{self, IFIFO};
use vfs::{DirEntryType, Error, Stat};

use crate::layout::*;
use crate::pipe::Pipe;
use crate::sync::{ReentrantGuard, ReentrantLock};
use crate::{BLOCK_SIZE, Buffer, DeviceId, FileSystem, Superblock, TaskId, spans};

pub(crate) struct InodeTable {
    meta: Mutex<Vec<InodeMeta>>,
    slots: Vec<InodeSlot>,
}

/// 活动索引节点的身份与计数，由表的锁保护
#[derive(Debug, Default, Clone, Copy)]
struct InodeMeta {
    /// 空闲的表项为`None`
    dev: Option<DeviceId>,
    nr: u32,
    count: usize,
    /// 挂载在此目录上的设备
    mount: Option<DeviceId>,
}

#[derive(Default)]
struct InodeSlot {
    /// 读写数据、修改目录期间持有
    lock: ReentrantLock,
    inner: Mutex<InodeInner>,
}

#[derive(Default)]
struct InodeInner {
    /// 所在设备的超级块，管道为空
    sb: Option<Arc<Superblock>>,
    /// 描述符所在的索引节点表块，管道为空
    buf: Option<Buffer>,
    /// 描述符的块内偏移
    offset: usize,
    /// 管道的描述符只在内存中
    mem: DiskInode,
    atime: u32,
    ctime: u32,
    pipe: Option<Box<Pipe>>,
}

impl InodeInner {
    /// 磁盘上的索引节点已无链接但尚未回收
    fn unlinked(&self) -> bool {
        self.buf.as_ref().is_some_and(|buf| {
            buf.map(self.offset, |d: &DiskInode| d.nlinks == 0 && d.mode != 0)
        })
    }
}

impl InodeTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            meta: Mutex::new(alloc::vec![InodeMeta::default(); capacity]),
            slots: (0..capacity).map(|_| InodeSlot::default()).collect(),
        }
    }

    pub fn ref_count(&self, index: usize) -> usize {
        self.meta.lock()[index].count
    }

    pub fn set_mounted(&self, index: usize, dev: Option<DeviceId>) {
        self.meta.lock()[index].mount = dev;
    }

    /// 存活的索引节点个数
    pub fn live(&self) -> usize {
        self.meta.lock().iter().filter(|meta| meta.count > 0).count()
    }

    /// 占用一个空闲表项
    fn claim(
        &self,
        meta: &mut [InodeMeta],
        dev: DeviceId,
        nr: u32,
        count: usize,
    ) -> Result<usize, Error> {
        let Some(index) = meta.iter().position(|m| m.dev.is_none()) else {
            log::warn!("inode table full");
            return Err(Error::TableFull);
        };
        meta[index] = InodeMeta {
            dev: Some(dev),
            nr,
            count,
            mount: None,
        };
        Ok(index)
    }

    /// 减少引用计数，归零时清除身份并交出内存中的状态。
    ///
    /// 最后一个引用指向已断开所有链接的索引节点时不减少计数，
    /// 由调用者先回收再重新释放。
    fn put(&self, index: usize) -> Put {
        let mut meta = self.meta.lock();
        let entry = &mut meta[index];
        assert!(entry.count > 0, "put of free inode #{index}");

        let mut inner = self.slots[index].inner.lock();
        if entry.count == 1 && inner.unlinked() {
            return Put::Reclaim;
        }
        entry.count -= 1;
        if entry.count > 0 {
            // 管道的另一端关闭，唤醒可能在等待它的任务
            return Put::Alive(inner.pipe.as_mut().map(|pipe| pipe.take_waiters()));
        }

        *entry = InodeMeta::default();
        let state = mem::take(&mut *inner);
        if let Some(sb) = &state.sb {
            sb.remove_live(index);
        }
        Put::Freed(state)
    }
}

enum Put {
    Alive(Option<[Option<TaskId>; 2]>),
    /// 链接数为 0，须回收磁盘上的索引节点
    Reclaim,
    /// 缓冲区与超级块的引用在所有锁之外释放
    Freed(InodeInner),
}

impl FileSystem {
    /// 取得设备上的索引节点并增加引用计数。
    ///
    /// 若该索引节点是挂载点，返回的是被挂载文件系统的根目录。
    pub fn get_inode(self: &Arc<Self>, dev: DeviceId, nr: u32) -> Result<Inode, Error> {
        let sb = self.super_block(dev).ok_or(Error::InvalidArgument)?;
        if nr == 0 || nr > sb.desc().inodes as u32 {
            return Err(Error::InvalidArgument);
        }

        let index = {
            let mut meta = self.inodes.meta.lock();
            match meta.iter().position(|m| m.dev == Some(dev) && m.nr == nr) {
                Some(index) => {
                    meta[index].count += 1;
                    index
                }
                None => {
                    let index = self.inodes.claim(&mut meta, dev, nr, 1)?;
                    sb.add_live(index);
                    index
                }
            }
        };
        let inode = Inode {
            fs: self.clone(),
            index,
        };

        let slot = inode.slot();
        if slot.inner.lock().buf.is_none() {
            // 只有读入描述符时持有锁
            let _guard = slot.lock.lock(self.scheduler());
            if slot.inner.lock().buf.is_none() {
                let (block, offset) = sb.desc().inode_pos(nr);
                let buf = self.cache().read(dev, block);
                let mtime = buf.map(offset, |disk_inode: &DiskInode| disk_inode.mtime);

                let mut inner = slot.inner.lock();
                inner.sb = Some(sb);
                inner.buf = Some(buf);
                inner.offset = offset;
                inner.atime = mtime;
                inner.ctime = mtime;
            }
        }

        match inode.mounted() {
            Some(mounted) => {
                drop(inode);
                self.mounted_root(mounted)
            }
            None => Ok(inode),
        }
    }

    /// 新建管道索引节点，引用计数为 2：读端与写端各一个
    pub fn new_pipe(self: &Arc<Self>) -> Result<(Inode, Inode), Error> {
        let pipe = Box::new(Pipe::new());
        let index = {
            let mut meta = self.inodes.meta.lock();
            let index = self.inodes.claim(&mut meta, DeviceId::PIPE, 0, 2)?;
            meta[index].nr = index as u32 + 1;
            index
        };

        let now = self.now();
        let mut inner = self.inodes.slots[index].inner.lock();
        inner.mem.init((IFIFO | 0o600) as u16, 0, 0, now);
        inner.atime = now;
        inner.ctime = now;
        inner.pipe = Some(pipe);
        drop(inner);

        let reader = Inode {
            fs: self.clone(),
            index,
        };
        let writer = Inode {
            fs: self.clone(),
            index,
        };
        Ok((reader, writer))
    }

    /// 存活的索引节点个数
    pub fn live_inodes(&self) -> usize {
        self.inodes.live()
    }
}

/// 对一个活动索引节点的引用，析构时释放。
///
/// 最后一个引用释放时，若链接数已为 0，截断并回收磁盘上的索引节点。
pub struct Inode {
    fs: Arc<FileSystem>,
    index: usize,
}

impl Inode {
    #[inline]
    fn slot(&self) -> &InodeSlot {
        &self.fs.inodes.slots[self.index]
    }

    fn meta(&self) -> InodeMeta {
        self.fs.inodes.meta.lock()[self.index]
    }

    #[inline]
    pub fn fs(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    pub fn dev(&self) -> DeviceId {
        self.meta()
            .dev
            .unwrap_or_else(|| panic!("inode #{} used after release", self.index))
    }

    pub fn nr(&self) -> u32 {
        self.meta().nr
    }

    pub fn ref_count(&self) -> usize {
        self.meta().count
    }

    /// 挂载在此目录上的设备
    pub fn mounted(&self) -> Option<DeviceId> {
        self.meta().mount
    }

    pub(crate) fn set_mounted(&self, dev: Option<DeviceId>) {
        self.fs.inodes.set_mounted(self.index, dev);
    }

    pub fn is_pipe(&self) -> bool {
        self.dev() == DeviceId::PIPE
    }

    /// 是否是同一个活动索引节点
    #[inline]
    pub fn same(&self, other: &Inode) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs) && self.index == other.index
    }

    /// 获取索引节点的可重入锁
    pub fn lock(&self) -> ReentrantGuard<'_> {
        self.slot().lock.lock(self.fs.scheduler())
    }

    fn location(&self) -> Option<(Buffer, usize)> {
        let inner = self.slot().inner.lock();
        inner.buf.clone().map(|buf| (buf, inner.offset))
    }

    /// 读取磁盘上的描述符并处理
    pub fn on_disk<V>(&self, f: impl FnOnce(&DiskInode) -> V) -> V {
        match self.location() {
            Some((buf, offset)) => buf.map(offset, f),
            None => f(&self.slot().inner.lock().mem),
        }
    }

    /// 修改描述符并立即写回
    pub fn on_disk_mut<V>(&self, f: impl FnOnce(&mut DiskInode) -> V) -> V {
        let now = self.fs.now();
        let value = match self.location() {
            Some((buf, offset)) => {
                let value = buf.map_mut(offset, f);
                buf.write_back();
                value
            }
            None => f(&mut self.slot().inner.lock().mem),
        };
        self.slot().inner.lock().ctime = now;
        value
    }

    /// 在管道的临界区内处理，同时给出当前的引用计数。
    ///
    /// 计数与管道状态在同一临界区内读取，另一端的关闭不会被错过。
    pub(crate) fn with_pipe<V>(&self, f: impl FnOnce(&mut Pipe, usize) -> V) -> V {
        let meta = self.fs.inodes.meta.lock();
        let mut inner = self.slot().inner.lock();
        let pipe = inner.pipe.as_mut().expect("not a pipe inode");
        f(pipe, meta[self.index].count)
    }

    #[inline]
    pub fn mode(&self) -> u32 {
        self.on_disk(|disk_inode| disk_inode.mode as u32)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.on_disk(|disk_inode| disk_inode.size as usize)
    }

    #[inline]
    pub fn nlinks(&self) -> u8 {
        self.on_disk(|disk_inode| disk_inode.nlinks)
    }

    #[inline]
    pub fn uid(&self) -> u16 {
        self.on_disk(|disk_inode| disk_inode.uid)
    }

    /// 设备文件所代表的设备
    pub fn rdev(&self) -> Option<DeviceId> {
        self.on_disk(|disk_inode| {
            disk_inode
                .is_device()
                .then(|| DeviceId::from(disk_inode.zone[0] as u32))
        })
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        mode::is_dir(self.mode())
    }

    #[inline]
    pub fn kind(&self) -> DirEntryType {
        DirEntryType::from_mode(self.mode())
    }

    /// 更新访问时间
    pub fn touch(&self) {
        let now = self.fs.now();
        self.slot().inner.lock().atime = now;
    }

    pub fn stat(&self) -> Stat {
        let (atime, ctime) = {
            let inner = self.slot().inner.lock();
            (inner.atime, inner.ctime)
        };
        let rdev = self.rdev().map_or(0, |dev| u32::from(dev) as u64);
        let InodeMeta { dev, nr, .. } = self.meta();
        let dev = dev.map_or(0, |dev| u32::from(dev) as u64);
        self.on_disk(|disk_inode| Stat {
            dev,
            ino: nr as u64,
            kind: DirEntryType::from_mode(disk_inode.mode as u32),
            mode: disk_inode.mode as u32,
            nlinks: disk_inode.nlinks as u32,
            uid: disk_inode.uid as u32,
            gid: disk_inode.gid as u32,
            rdev,
            size: disk_inode.size as u64,
            atime: atime as u64,
            mtime: disk_inode.mtime as u64,
            ctime: ctime as u64,
        })
    }

    /// 从`offset`处读取，读到文件末尾为止；空洞读出全 0
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, Error> {
        let _guard = self.lock();
        let size = self.size();
        if offset >= size {
            return Ok(0);
        }
        let len = buf.len().min(size - offset);
        let dev = self.dev();

        for span in spans(offset, len) {
            let dst = &mut buf[span.done..span.done + span.len];
            match self.map_block(span.block, false)? {
                Some(block) => {
                    let buffer = self.fs.cache().read(dev, block);
                    buffer.map(0, |data: &[u8; BLOCK_SIZE]| {
                        dst.copy_from_slice(&data[span.start..span.start + span.len])
                    });
                }
                None => dst.fill(0),
            }
        }

        self.touch();
        Ok(len)
    }

    /// 从`offset`处写入，必要时分配新块并扩大文件。
    ///
    /// 中途空间耗尽时返回已写入的字节数。
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, Error> {
        let _guard = self.lock();
        let dev = self.dev();

        let mut written = 0;
        for span in spans(offset, buf.len()) {
            let block = match self.map_block(span.block, true) {
                Ok(Some(block)) => block,
                Ok(None) => unreachable!("mapping with create always yields a block"),
                Err(err) if written == 0 => return Err(err),
                Err(err) => {
                    log::debug!("short write at {}: {err}", offset + written);
                    break;
                }
            };

            // 整块覆盖时无需读盘
            let buffer = if span.len == BLOCK_SIZE {
                self.fs.cache().zeroed(dev, block)
            } else {
                self.fs.cache().read(dev, block)
            };
            buffer.map_mut(0, |data: &mut [u8; BLOCK_SIZE]| {
                data[span.start..span.start + span.len]
                    .copy_from_slice(&buf[span.done..span.done + span.len])
            });
            written = span.done + span.len;
        }

        if written > 0 {
            let end = (offset + written) as u32;
            let now = self.fs.now();
            self.on_disk_mut(|disk_inode| {
                disk_inode.size = disk_inode.size.max(end);
                disk_inode.mtime = now;
            });
        }
        Ok(written)
    }

    /// 释放全部数据块，长度归零。只对普通文件与目录生效，对空文件是空操作。
    pub fn truncate(&self) {
        let _guard = self.lock();
        if !self.on_disk(|disk_inode| disk_inode.has_data()) {
            return;
        }

        let zones = self.on_disk(|disk_inode| disk_inode.zone);
        if zones == [0; ZONES] && self.size() == 0 {
            return;
        }
        let now = self.fs.now();
        self.on_disk_mut(|disk_inode| {
            disk_inode.zone = [0; ZONES];
            disk_inode.size = 0;
            disk_inode.mtime = now;
        });

        let dev = self.dev();
        for &zone in zones[..DIRECT_ZONES].iter().filter(|&&zone| zone != 0) {
            self.fs.free_block(dev, zone as u32);
        }
        if zones[INDIRECT1_ZONE] != 0 {
            self.free_index(dev, zones[INDIRECT1_ZONE] as u32, 1);
        }
        if zones[INDIRECT2_ZONE] != 0 {
            self.free_index(dev, zones[INDIRECT2_ZONE] as u32, 2);
        }
    }

    /// 释放索引块及其指向的全部块，`depth`为其下的间接层数
    fn free_index(&self, dev: DeviceId, block: u32, depth: usize) {
        let entries = self
            .fs
            .cache()
            .read(dev, block)
            .map(0, |index: &IndexBlock| *index);
        for &entry in entries.iter().filter(|&&entry| entry != 0) {
            if depth > 1 {
                self.free_index(dev, entry as u32, depth - 1);
            } else {
                self.fs.free_block(dev, entry as u32);
            }
        }
        self.fs.free_block(dev, block);
    }

    /// 逻辑块号到物理块号的映射。
    ///
    /// `create`为真时沿途补齐缺失的块（新块全 0）；否则遇到空指针返回空。
    pub fn map_block(&self, logical: usize, create: bool) -> Result<Option<u32>, Error> {
        if logical < DIRECT_ZONES {
            return self.zone(logical, create);
        }

        let logical = logical - DIRECT_ZONES;
        if logical < INDEX_ENTRIES {
            let Some(index) = self.zone(INDIRECT1_ZONE, create)? else {
                return Ok(None);
            };
            return self.index_entry(index, logical, create);
        }

        let logical = logical - INDEX_ENTRIES;
        if logical < INDEX_ENTRIES * INDEX_ENTRIES {
            let Some(outer) = self.zone(INDIRECT2_ZONE, create)? else {
                return Ok(None);
            };
            let Some(inner) = self.index_entry(outer, logical / INDEX_ENTRIES, create)? else {
                return Ok(None);
            };
            return self.index_entry(inner, logical % INDEX_ENTRIES, create);
        }

        Err(Error::FileTooLarge)
    }

    /// 描述符中的第`i`个块指针
    fn zone(&self, i: usize, create: bool) -> Result<Option<u32>, Error> {
        let zone = self.on_disk(|disk_inode| disk_inode.zone[i]);
        if zone != 0 {
            return Ok(Some(zone as u32));
        }
        if !create {
            return Ok(None);
        }

        let block = self.fs.allocate_block(self.dev()).ok_or(Error::NoSpace)?;
        self.on_disk_mut(|disk_inode| disk_inode.zone[i] = block as u16);
        Ok(Some(block))
    }

    /// 索引块中的第`i`项，修改后立即写回索引块
    fn index_entry(&self, index_block: u32, i: usize, create: bool) -> Result<Option<u32>, Error> {
        let dev = self.dev();
        let buffer = self.fs.cache().read(dev, index_block);
        let zone = buffer.map(0, |index: &IndexBlock| index[i]);
        if zone != 0 {
            return Ok(Some(zone as u32));
        }
        if !create {
            return Ok(None);
        }

        let block = self.fs.allocate_block(dev).ok_or(Error::NoSpace)?;
        buffer.map_mut(0, |index: &mut IndexBlock| index[i] = block as u16);
        buffer.write_back();
        Ok(Some(block))
    }

    /// 转为表下标，引用计数原样保留
    pub(crate) fn into_raw(self) -> usize {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this`不会再被析构，`fs`只被取出这一次
        drop(unsafe { ptr::read(&this.fs) });
        this.index
    }

    /// 接管由 [`Inode::into_raw`] 保留的一个引用
    pub(crate) fn from_raw(fs: Arc<FileSystem>, index: usize) -> Self {
        Self { fs, index }
    }

    /// 由表下标新建一个引用
    pub(crate) fn dup_raw(fs: Arc<FileSystem>, index: usize) -> Self {
        fs.inodes.meta.lock()[index].count += 1;
        Self { fs, index }
    }

    /// 回收链接数为 0 的索引节点，只在持有最后一个引用时进行
    fn reclaim_if_unlinked(&self) {
        let _guard = self.lock();
        if self.ref_count() > 1 || !self.on_disk(|d| d.nlinks == 0 && d.mode != 0) {
            return;
        }

        let (dev, nr) = (self.dev(), self.nr());
        self.truncate();
        self.on_disk_mut(|disk_inode| *disk_inode = DiskInode::default());
        self.fs.free_inode(dev, nr);
        log::debug!("dev {dev}: inode {nr} reclaimed");
    }
}

impl Clone for Inode {
    fn clone(&self) -> Self {
        Self::dup_raw(self.fs.clone(), self.index)
    }
}

impl Drop for Inode {
    fn drop(&mut self) {
        loop {
            match self.fs.inodes.put(self.index) {
                Put::Reclaim => self.reclaim_if_unlinked(),
                Put::Alive(Some(waiters)) => {
                    for task in waiters.into_iter().flatten() {
                        self.fs.scheduler().unblock(task);
                    }
                    return;
                }
                Put::Alive(None) => return,
                Put::Freed(state) => {
                    drop(state);
                    return;
                }
            }
        }
    }
}
