//! Unix 模式字：高位为文件类型，低 12 位为特殊位与权限位。

pub const IFMT: u32 = 0o170000;
pub const IFLNK: u32 = 0o120000;
pub const IFREG: u32 = 0o100000;
pub const IFBLK: u32 = 0o060000;
pub const IFDIR: u32 = 0o040000;
pub const IFCHR: u32 = 0o020000;
pub const IFIFO: u32 = 0o010000;

/// 粘滞位：目录中的项只能由其所有者删除
pub const ISVTX: u32 = 0o1000;

/// 权限位
pub const PERMISSION: u32 = 0o777;

/// 权限三元组中的各位
pub const READ: u32 = 0o4;
pub const WRITE: u32 = 0o2;
pub const EXEC: u32 = 0o1;

#[inline]
pub fn is_dir(mode: u32) -> bool {
    mode & IFMT == IFDIR
}

#[inline]
pub fn is_reg(mode: u32) -> bool {
    mode & IFMT == IFREG
}

#[inline]
pub fn is_blk(mode: u32) -> bool {
    mode & IFMT == IFBLK
}

#[inline]
pub fn is_chr(mode: u32) -> bool {
    mode & IFMT == IFCHR
}
