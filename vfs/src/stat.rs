use crate::DirEntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C, align(32))]
pub struct Stat {
    /// 所在设备
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    pub kind: DirEntryType,
    /// 类型位与权限位
    pub mode: u32,
    /// 硬链接个数
    pub nlinks: u32,
    pub uid: u32,
    pub gid: u32,
    /// 设备文件所代表的设备
    pub rdev: u64,
    /// File size
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}
