use alloc::string::String;

use crate::mode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number
    pub inode: u64,
    pub ty: DirEntryType,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    Block,
    Char,
    Directory,
    Fifo,
    SymLink,
    #[default]
    Regular,
}

impl DirEntryType {
    /// 由模式字中的类型位得到目录项类型，无法识别的类型视为普通文件
    pub fn from_mode(mode: u32) -> Self {
        match mode & mode::IFMT {
            mode::IFBLK => Self::Block,
            mode::IFCHR => Self::Char,
            mode::IFDIR => Self::Directory,
            mode::IFIFO => Self::Fifo,
            mode::IFLNK => Self::SymLink,
            _ => Self::Regular,
        }
    }
}
