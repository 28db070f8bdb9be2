//! # 超级块层
//!
//! 每个读入的设备对应一个[`Superblock`]：描述符、常驻的位图缓冲区、
//! 引用计数、该设备上存活的索引节点，以及根目录与挂载点。
//!
//! 挂载时挂载点的索引节点记下被挂载的设备号，此后每次取得该索引节点
//! 都会被替换为被挂载文件系统的根目录。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;
use vfs::Error;
use vfs::mode::IFDIR;

use crate::layout::*;
use crate::{BLOCK_SIZE, Buffer, DeviceId, FileSystem, Inode, KERNEL_UID, ROOT_INO};

pub struct Superblock {
    dev: DeviceId,
    desc: SuperDesc,
    /// 超级块所在的缓冲区，读入期间常驻
    _buf: Buffer,
    pub(crate) imaps: Vec<Buffer>,
    pub(crate) zmaps: Vec<Buffer>,
    pub(crate) imap: Bitmap,
    pub(crate) zmap: Bitmap,
    state: Mutex<SuperState>,
}

#[derive(Debug, Default)]
struct SuperState {
    count: usize,
    /// 该设备上存活的索引节点在索引节点表中的下标
    live: Vec<usize>,
    /// 根目录，持有一个引用
    root: Option<usize>,
    /// 挂载点（在另一设备上），持有一个引用；根文件系统没有
    mount_point: Option<usize>,
}

impl Superblock {
    #[inline]
    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    #[inline]
    pub fn desc(&self) -> &SuperDesc {
        &self.desc
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().count
    }

    /// 该设备上存活的索引节点个数
    pub fn live_inodes(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_mounted(&self) -> bool {
        self.state.lock().mount_point.is_some()
    }

    pub(crate) fn add_live(&self, index: usize) {
        self.state.lock().live.push(index);
    }

    pub(crate) fn remove_live(&self, index: usize) {
        self.state.lock().live.retain(|&i| i != index);
    }

    pub(crate) fn root(&self) -> Option<usize> {
        self.state.lock().root
    }

    fn mount_point(&self) -> Option<usize> {
        self.state.lock().mount_point
    }
}

/// 已读入的超级块
pub(crate) struct SuperTable {
    capacity: usize,
    supers: Mutex<Vec<Arc<Superblock>>>,
}

impl SuperTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            supers: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn find(&self, dev: DeviceId) -> Option<Arc<Superblock>> {
        self.supers.lock().iter().find(|sb| sb.dev == dev).cloned()
    }

    /// 找到时增加引用计数
    fn acquire(&self, dev: DeviceId) -> Option<Arc<Superblock>> {
        let supers = self.supers.lock();
        let sb = supers.iter().find(|sb| sb.dev == dev)?;
        sb.state.lock().count += 1;
        Some(sb.clone())
    }
}

impl FileSystem {
    /// 取得设备的超级块而不改变引用计数
    pub fn super_block(&self, dev: DeviceId) -> Option<Arc<Superblock>> {
        self.supers.find(dev)
    }

    /// 读入设备的超级块并增加引用计数，已读入时直接返回
    pub fn read_super(&self, dev: DeviceId) -> Result<Arc<Superblock>, Error> {
        if let Some(sb) = self.supers.acquire(dev) {
            return Ok(sb);
        }
        if self.devices().block_device(dev).is_none() {
            return Err(Error::NotBlockDevice);
        }

        let buf = self.cache().read(dev, SUPER_BLOCK);
        let desc = buf.map(0, |desc: &SuperDesc| *desc);
        if !desc.is_valid()
            || desc.imap_blocks == 0
            || desc.zmap_blocks == 0
            || desc.imap_blocks as usize > IMAP_MAX
            || desc.zmap_blocks as usize > ZMAP_MAX
            || desc.firstdatazone as u32 <= desc.inode_table_start()
            || desc.firstdatazone >= desc.zones
        {
            log::warn!("dev {dev}: no valid filesystem (magic {:#x})", desc.magic);
            return Err(Error::InvalidFilesystem);
        }

        let imaps = (0..desc.imap_blocks as u32)
            .map(|i| self.cache().read(dev, IMAP_START + i))
            .collect();
        let zmaps = (0..desc.zmap_blocks as u32)
            .map(|i| self.cache().read(dev, desc.zmap_start() + i))
            .collect();
        let sb = Arc::new(Superblock {
            dev,
            desc,
            _buf: buf,
            imaps,
            zmaps,
            imap: Bitmap::new(0, desc.inodes as usize + 1),
            zmap: Bitmap::new(
                desc.zone_base(),
                (desc.zones - desc.firstdatazone) as usize + 1,
            ),
            state: Mutex::new(SuperState {
                count: 1,
                ..Default::default()
            }),
        });

        // 读盘期间可能有其它任务读入了同一设备
        let mut supers = self.supers.supers.lock();
        if let Some(existing) = supers.iter().find(|s| s.dev == dev) {
            existing.state.lock().count += 1;
            let existing = existing.clone();
            drop(supers);
            return Ok(existing);
        }
        if supers.len() >= self.supers.capacity {
            drop(supers);
            log::warn!("superblock table full");
            return Err(Error::TableFull);
        }
        supers.push(sb.clone());
        drop(supers);

        log::debug!("dev {dev}: superblock read, {desc:?}");
        Ok(sb)
    }

    /// 减少引用计数，归零时释放根目录、挂载点与全部位图缓冲区
    pub fn put_super(self: &Arc<Self>, sb: Arc<Superblock>) {
        let (root, mount_point) = {
            let mut supers = self.supers.supers.lock();
            let mut state = sb.state.lock();
            assert!(state.count > 0, "dev {}: put of free superblock", sb.dev);
            state.count -= 1;
            if state.count > 0 {
                return;
            }
            supers.retain(|s| !Arc::ptr_eq(s, &sb));
            (state.root.take(), state.mount_point.take())
        };

        log::debug!("dev {}: superblock released", sb.dev);
        for index in root.into_iter().chain(mount_point) {
            drop(Inode::from_raw(self.clone(), index));
        }
    }

    /// 在设备上建立空的文件系统：位图、超级块以及只含`.`与`..`的根目录。
    ///
    /// `inode_count`为 0 时取总块数的三分之一。
    pub fn format(self: &Arc<Self>, dev: DeviceId, inode_count: usize) -> Result<(), Error> {
        if self.supers.find(dev).is_some() {
            return Err(Error::Busy);
        }
        let blocks = self
            .devices()
            .block_count(dev)
            .ok_or(Error::NotBlockDevice)?
            .min(u16::MAX as usize);
        let inodes = match inode_count {
            0 => blocks / 3,
            n => n,
        }
        .min(u16::MAX as usize - 1);

        let imap_blocks = Bitmap::blocks_for(inodes + 1);
        let inode_blocks = inodes.div_ceil(INODES_PER_BLOCK);
        let zones = blocks.saturating_sub(2 + imap_blocks + inode_blocks);
        let zmap_blocks = Bitmap::blocks_for(zones + 1);
        let firstdatazone = 2 + imap_blocks + zmap_blocks + inode_blocks;
        if inodes == 0 || firstdatazone >= blocks {
            return Err(Error::NoSpace);
        }

        let desc = SuperDesc::new(
            inodes as u16,
            blocks as u16,
            imap_blocks as u16,
            zmap_blocks as u16,
            firstdatazone as u16,
            (MAX_FILE_BLOCKS * BLOCK_SIZE) as u32,
        );
        log::info!(
            "dev {dev}: formatting {blocks} blocks, {inodes} inodes, first data zone {firstdatazone}"
        );

        // 引导块与全部元数据块清零
        for block in 0..firstdatazone as u32 {
            let buffer = self.cache().zeroed(dev, block);
            if block == SUPER_BLOCK {
                buffer.map_mut(0, |sd: &mut SuperDesc| *sd = desc);
            }
            buffer.write_back();
        }

        let sb = self.read_super(dev)?;
        sb.imap.reserve(&sb.imaps);
        sb.zmap.reserve(&sb.zmaps);
        let result = self.make_root(dev);
        self.put_super(sb);
        self.cache().sync_device(dev);

        result
    }

    fn make_root(self: &Arc<Self>, dev: DeviceId) -> Result<(), Error> {
        let nr = self.allocate_inode(dev).ok_or(Error::NoSpace)?;
        assert_eq!(nr, ROOT_INO, "dev {dev}: root must be the first inode");

        let root = self.get_inode(dev, nr)?;
        let now = self.now();
        root.on_disk_mut(|disk_inode| disk_inode.init((IFDIR | 0o755) as u16, KERNEL_UID, 0, now));
        root.init_dir(ROOT_INO)
    }

    /// 挂载根文件系统，此后它常驻至内核结束
    pub fn mount_root(self: &Arc<Self>, dev: DeviceId) -> Result<(), Error> {
        if self.root_dev().is_some() {
            return Err(Error::Busy);
        }
        let sb = self.read_super(dev)?;
        if sb.root().is_some() {
            self.put_super(sb);
            return Err(Error::Busy);
        }
        let root = match self.get_inode(dev, ROOT_INO) {
            Ok(root) => root,
            Err(err) => {
                self.put_super(sb);
                return Err(err);
            }
        };

        sb.state.lock().root = Some(root.into_raw());
        if !self.set_root_dev(dev) {
            self.put_super(sb);
            return Err(Error::Busy);
        }
        log::info!("dev {dev}: mounted as root filesystem");
        Ok(())
    }

    /// 把设备上的文件系统挂载到目录`dir`上，`dir`须无其它引用且未被挂载
    pub(crate) fn mount(self: &Arc<Self>, dev: DeviceId, dir: Inode) -> Result<(), Error> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        if dir.ref_count() > 1 || dir.mounted().is_some() {
            return Err(Error::Busy);
        }

        let sb = self.read_super(dev)?;
        if Some(dev) == self.root_dev() || sb.root().is_some() {
            self.put_super(sb);
            return Err(Error::Busy);
        }
        let root = match self.get_inode(dev, ROOT_INO) {
            Ok(root) => root,
            Err(err) => {
                self.put_super(sb);
                return Err(err);
            }
        };

        dir.set_mounted(Some(dev));
        let mut state = sb.state.lock();
        state.root = Some(root.into_raw());
        state.mount_point = Some(dir.into_raw());
        drop(state);

        log::info!("dev {dev}: mounted");
        Ok(())
    }

    /// 卸载设备，文件系统中除根目录外不能有存活的索引节点
    pub(crate) fn unmount(self: &Arc<Self>, dev: DeviceId) -> Result<(), Error> {
        if Some(dev) == self.root_dev() {
            return Err(Error::Busy);
        }
        let sb = self.supers.find(dev).ok_or(Error::InvalidArgument)?;

        let (root, mount_point) = {
            let state = sb.state.lock();
            let (Some(root), Some(mount_point)) = (state.root, state.mount_point) else {
                return Err(Error::InvalidArgument);
            };
            if state.live.iter().any(|&index| index != root) {
                return Err(Error::Busy);
            }
            (root, mount_point)
        };
        if self.inodes.ref_count(root) > 1 {
            return Err(Error::Busy);
        }

        self.inodes.set_mounted(mount_point, None);
        self.put_super(sb);
        self.cache().sync_device(dev);

        log::info!("dev {dev}: unmounted");
        Ok(())
    }

    /// 被挂载文件系统的根目录
    pub(crate) fn mounted_root(self: &Arc<Self>, dev: DeviceId) -> Result<Inode, Error> {
        let sb = self.supers.find(dev).ok_or(Error::NotFound)?;
        let root = sb.root().ok_or(Error::NotFound)?;
        Ok(Inode::dup_raw(self.clone(), root))
    }

    /// 设备被挂载到的目录
    pub(crate) fn mount_point_of(self: &Arc<Self>, dev: DeviceId) -> Option<Inode> {
        let index = self.supers.find(dev)?.mount_point()?;
        Some(Inode::dup_raw(self.clone(), index))
    }
}
