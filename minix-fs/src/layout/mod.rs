//! # 磁盘数据结构层
//!
//! Minix v1 的磁盘布局：
//! 引导块 | 超级块 | 索引节点位图 | 数据区位图 | 索引节点表 | 数据区
//!
//! 结构体按`repr(C)`直接映射到块缓冲区上，字段为小端主机序。

use core::mem;

use crate::BLOCK_SIZE;

mod super_block;
pub use super_block::SuperDesc;

mod bitmap;
pub use bitmap::{Bitmap, BitmapBlock};

mod inode;
pub use inode::DiskInode;

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

/// 超级块所在的块
pub const SUPER_BLOCK: u32 = 1;
/// 索引节点位图的起始块
pub const IMAP_START: u32 = 2;
/// 位图块数的上限
pub const IMAP_MAX: usize = 8;
pub const ZMAP_MAX: usize = 8;

/// 块指针个数
pub const ZONES: usize = 9;
/// 直接索引的块指针个数
pub const DIRECT_ZONES: usize = 7;
/// 指向一级索引块的指针下标
pub const INDIRECT1_ZONE: usize = 7;
/// 指向二级索引块的指针下标
pub const INDIRECT2_ZONE: usize = 8;
/// 索引块可容纳的块号个数
pub const INDEX_ENTRIES: usize = BLOCK_SIZE / mem::size_of::<u16>();
/// 单个文件最多占用的块数
pub const MAX_FILE_BLOCKS: usize = DIRECT_ZONES + INDEX_ENTRIES + INDEX_ENTRIES * INDEX_ENTRIES;

pub const INODE_SIZE: usize = mem::size_of::<DiskInode>();
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
pub const DIR_ENTRY_SIZE: usize = mem::size_of::<DirEntry>();
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

/// 索引块：整个块连续存储块号
pub type IndexBlock = [u16; INDEX_ENTRIES];
/// 目录数据块：整个块连续存储目录项
pub type DirBlock = [DirEntry; DIR_ENTRIES_PER_BLOCK];

/// 可以直接映射到磁盘字节上的类型。
///
/// # Safety
///
/// 实现者必须对任意字节序列都是合法值，且不含指针。
pub unsafe trait Plain: Sized {}

unsafe impl Plain for u8 {}
unsafe impl Plain for u16 {}
unsafe impl Plain for u32 {}
unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}
unsafe impl Plain for SuperDesc {}
unsafe impl Plain for DiskInode {}
unsafe impl Plain for DirEntry {}
