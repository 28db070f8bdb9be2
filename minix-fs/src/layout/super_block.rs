use crate::MAGIC;
use crate::layout::{IMAP_START, INODE_SIZE, INODES_PER_BLOCK};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SuperDesc {
    /// 索引节点总数
    pub inodes: u16,
    /// 设备总块数
    pub zones: u16,
    pub imap_blocks: u16,
    pub zmap_blocks: u16,
    /// 第一个数据块
    pub firstdatazone: u16,
    pub log_zone_size: u16,
    /// 文件长度上限
    pub max_size: u32,
    /// 魔数：用于校验文件系统合法性
    pub magic: u16,
    /// 补齐到 4 字节对齐，磁盘上不使用
    reserved: u16,
}

impl SuperDesc {
    pub fn new(
        inodes: u16,
        zones: u16,
        imap_blocks: u16,
        zmap_blocks: u16,
        firstdatazone: u16,
        max_size: u32,
    ) -> Self {
        Self {
            inodes,
            zones,
            imap_blocks,
            zmap_blocks,
            firstdatazone,
            log_zone_size: 0,
            max_size,
            magic: MAGIC,
            reserved: 0,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    #[inline]
    pub fn zmap_start(&self) -> u32 {
        IMAP_START + self.imap_blocks as u32
    }

    #[inline]
    pub fn inode_table_start(&self) -> u32 {
        self.zmap_start() + self.zmap_blocks as u32
    }

    /// 数据区位图 0 号位所描述的块，该位保留不用
    #[inline]
    pub fn zone_base(&self) -> u32 {
        self.firstdatazone as u32 - 1
    }

    /// 通过编号获取索引节点在磁盘上的位置：**块号**以及**块内偏移**
    pub fn inode_pos(&self, nr: u32) -> (u32, usize) {
        debug_assert!(nr > 0);
        let index = (nr - 1) as usize;
        let block = self.inode_table_start() + (index / INODES_PER_BLOCK) as u32;
        (block, index % INODES_PER_BLOCK * INODE_SIZE)
    }
}
