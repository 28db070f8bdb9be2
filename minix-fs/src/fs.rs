//! # 文件系统上下文
//!
//! 缓冲区、超级块表、索引节点表以及设备表都归[`FileSystem`]所有，
//! 通过`Arc`在各层之间传递，不存在隐藏的全局状态。

use alloc::sync::Arc;

use spin::Once;

use crate::inode::InodeTable;
use crate::super_block::SuperTable;
use crate::{BufferCache, Clock, Config, DeviceId, DeviceTable, Inode, Scheduler};

pub struct FileSystem {
    config: Config,
    devices: Arc<DeviceTable>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    cache: Arc<BufferCache>,
    pub(crate) supers: SuperTable,
    pub(crate) inodes: InodeTable,
    /// 根文件系统所在设备，挂载后不再改变
    root_dev: Once<DeviceId>,
}

impl FileSystem {
    pub fn new(config: Config, scheduler: Arc<dyn Scheduler>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let devices = Arc::new(DeviceTable::new());
        let cache = BufferCache::new(devices.clone(), scheduler.clone(), &config);

        Arc::new(Self {
            supers: SuperTable::new(config.supers),
            inodes: InodeTable::new(config.inodes),
            config,
            devices,
            scheduler,
            clock,
            cache,
            root_dev: Once::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    #[inline]
    pub fn cache(&self) -> &Arc<BufferCache> {
        &self.cache
    }

    #[inline]
    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.scheduler
    }

    #[inline]
    pub(crate) fn now(&self) -> u32 {
        self.clock.now()
    }

    pub fn root_dev(&self) -> Option<DeviceId> {
        self.root_dev.get().copied()
    }

    pub(crate) fn set_root_dev(&self, dev: DeviceId) -> bool {
        let mut installed = false;
        self.root_dev.call_once(|| {
            installed = true;
            dev
        });
        installed
    }

    /// 根文件系统的根目录
    pub fn root_inode(self: &Arc<Self>) -> Result<Inode, vfs::Error> {
        let dev = self.root_dev().ok_or(vfs::Error::NotFound)?;
        self.mounted_root(dev)
    }

    /// 写回全部脏块
    pub fn sync(&self) {
        self.cache.sync();
    }
}
