//! # Minix 文件系统
//!
//! 单体内核中的磁盘文件系统与块缓冲层，磁盘格式与 Minix v1 兼容：
//! 引导块 | 超级块 | 索引节点位图 | 数据区位图 | 索引节点表 | 数据区
//!
//! 所有表都挂在显式的上下文 [`FileSystem`] 上，而不是全局变量；
//! 调度器与时钟作为协作者由使用者注入。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* 整体架构，自上而下 */

// 进程层：文件描述符表、当前目录与根目录
mod process;

// 打开文件层：偏移量、读写权限与按文件类型分派
mod file;

// 路径解析与目录操作层
mod namei;
mod path;

// 目录项的查找与追加
mod dir;

// 索引节点层：活动索引节点、逻辑块映射、截断
mod inode;
mod pipe;

// 超级块层：挂载、卸载、格式化
mod super_block;

// 空闲空间分配层
mod allocator;

// 磁盘数据结构层
pub mod layout;

// 块缓冲层：带引用计数的磁盘块缓存
mod buffer;

// 设备层：设备号与驱动的登记
mod device;

mod config;
mod fs;
mod sync;
mod task;

pub use self::{
    buffer::{BlockData, Buffer, BufferCache},
    config::Config,
    device::{Device, DeviceId, DeviceTable},
    file::{OpenFile, OpenFlag, Whence},
    fs::FileSystem,
    inode::Inode,
    process::{Fd, Process},
    super_block::Superblock,
    sync::{ReentrantGuard, ReentrantLock, WaitQueue},
    task::{Clock, Scheduler, TaskId},
};
pub use block_dev::SECTOR_SIZE;

pub const BLOCK_SIZE: usize = 1024;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;
/// 每次块传输请求的扇区数
pub const SECTORS_PER_BLOCK: usize = BLOCK_SIZE / SECTOR_SIZE;
pub const MAGIC: u16 = 0x137F;
/// 目录项中文件名的最大长度
pub const NAME_LEN: usize = 14;
/// 根目录的索引节点号
pub const ROOT_INO: u32 = 1;
/// 内核用户，绕过一切权限检查
pub const KERNEL_UID: u16 = 0;
/// 管道缓冲区占用一页
pub const PAGE_SIZE: usize = 4096;

/// 把字节区间`[offset, offset + len)`切分为逐块的片段
fn spans(offset: usize, len: usize) -> impl Iterator<Item = Span> {
    let end = offset + len;
    let mut pos = offset;
    core::iter::from_fn(move || {
        if pos >= end {
            return None;
        }
        let start = pos % BLOCK_SIZE;
        let span = Span {
            block: pos / BLOCK_SIZE,
            start,
            len: (BLOCK_SIZE - start).min(end - pos),
            done: pos - offset,
        };
        pos += span.len;
        Some(span)
    })
}

/// 落在单个块内的一段字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    /// 逻辑块号
    block: usize,
    /// 块内起始偏移
    start: usize,
    len: usize,
    /// 此前已经处理的字节数，即在用户缓冲区中的偏移
    done: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_split_on_block_boundaries() {
        let spans: Vec<_> = spans(1000, 2100).collect();
        assert_eq!(
            spans,
            [
                Span { block: 0, start: 1000, len: 24, done: 0 },
                Span { block: 1, start: 0, len: 1024, done: 24 },
                Span { block: 2, start: 0, len: 1024, done: 1048 },
                Span { block: 3, start: 0, len: 28, done: 2072 },
            ]
        );
    }

    #[test]
    fn empty_range_has_no_spans() {
        assert_eq!(spans(4096, 0).count(), 0);
    }
}
