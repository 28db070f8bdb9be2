//! # 空闲空间分配层
//!
//! 位图常驻于超级块中，分配与释放都会立即写回对应的位图块。

use alloc::sync::Arc;

use crate::{DeviceId, FileSystem, Superblock};

impl FileSystem {
    /// 分配一个数据块并清零，空间耗尽时返回空
    pub fn allocate_block(&self, dev: DeviceId) -> Option<u32> {
        let sb = self.mapped_super(dev);
        let Some(block) = sb.zmap.alloc(&sb.zmaps) else {
            log::warn!("dev {dev}: no free zones");
            return None;
        };
        assert!(
            block < sb.desc().zones as u32,
            "dev {dev}: zone {block} out of range"
        );

        // 新块的内容总是全 0，析构时写回
        drop(self.cache().zeroed(dev, block));
        log::trace!("dev {dev}: allocated zone {block}");
        Some(block)
    }

    pub fn free_block(&self, dev: DeviceId, block: u32) {
        let sb = self.mapped_super(dev);
        sb.zmap.dealloc(&sb.zmaps, block);
        log::trace!("dev {dev}: freed zone {block}");
    }

    /// 分配一个索引节点号，磁盘上的内容由调用者初始化
    pub fn allocate_inode(&self, dev: DeviceId) -> Option<u32> {
        let sb = self.mapped_super(dev);
        let Some(nr) = sb.imap.alloc(&sb.imaps) else {
            log::warn!("dev {dev}: no free inodes");
            return None;
        };
        log::trace!("dev {dev}: allocated inode {nr}");
        Some(nr)
    }

    pub fn free_inode(&self, dev: DeviceId, nr: u32) {
        let sb = self.mapped_super(dev);
        sb.imap.dealloc(&sb.imaps, nr);
        log::trace!("dev {dev}: freed inode {nr}");
    }

    /// 数据块是否已被占用
    pub fn block_in_use(&self, dev: DeviceId, block: u32) -> bool {
        let sb = self.mapped_super(dev);
        sb.zmap.test(&sb.zmaps, block)
    }

    /// 调用者持有该设备上的索引节点，超级块必然已读入
    fn mapped_super(&self, dev: DeviceId) -> Arc<Superblock> {
        self.supers
            .find(dev)
            .unwrap_or_else(|| panic!("dev {dev}: no superblock"))
    }
}
