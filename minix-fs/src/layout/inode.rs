//! 块指针
//! - 直接：前 7 个指针直接指向数据块
//! - 一级：第 8 个指针指向一个索引块，其中每个块号都指向数据块
//! - 二级：第 9 个指针指向一个索引块，其中每个块号都指向一个一级索引块

use vfs::mode;

use crate::layout::ZONES;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    /// 类型位与权限位
    pub mode: u16,
    pub uid: u16,
    pub size: u32,
    /// 最后修改时间
    pub mtime: u32,
    pub gid: u8,
    /// 硬链接个数
    pub nlinks: u8,
    /// 块指针；设备文件的 0 号指针保存设备号
    pub zone: [u16; ZONES],
}

impl DiskInode {
    /// 新建的索引节点：一个链接，没有数据块
    #[inline]
    pub fn init(&mut self, mode: u16, uid: u16, gid: u8, now: u32) {
        *self = Self {
            mode,
            uid,
            gid,
            mtime: now,
            nlinks: 1,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        mode::is_dir(self.mode as u32)
    }

    #[inline]
    pub fn is_reg(&self) -> bool {
        mode::is_reg(self.mode as u32)
    }

    /// 是否以块指针组织数据，设备文件与管道不是
    #[inline]
    pub fn has_data(&self) -> bool {
        self.is_dir() || self.is_reg()
    }

    #[inline]
    pub fn is_device(&self) -> bool {
        let mode = self.mode as u32;
        mode::is_blk(mode) || mode::is_chr(mode)
    }
}
