//! # 打开文件层
//!
//! 一个 [`OpenFile`] 表示进程打开的文件或目录：读写属性、共享的偏移量，
//! 以及按索引节点类型的读写分派：
//! 管道、字符设备、块设备（经由块缓冲层，任意偏移）、普通文件与目录。

use alloc::string::String;
use alloc::sync::Arc;

use block_dev::CharDevice;
use enumflags2::{BitFlags, bitflags};
use spin::Mutex;
use vfs::mode::{self, READ, WRITE};
use vfs::{DirEntry, DirEntryType, Error, Stat};

use crate::layout::DIR_ENTRY_SIZE;
use crate::{BLOCK_SIZE, DeviceId, Inode, spans};

#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 只写
    WRONLY = 0o1,
    /// 读写兼备
    RDWR   = 0o2,
    /// 文件不存在时创建
    CREATE = 0o100,
    /// 与`CREATE`同用，文件已存在时失败
    EXCL   = 0o200,
    /// 先清空文件，再交给用户
    TRUNC  = 0o1000,
    /// 每次写入都追加到文件末尾
    APPEND = 0o2000,
}

impl OpenFlag {
    // enumflags2拒绝值为0的标志
    /// 只读
    pub const RDONLY: u32 = 0;

    #[inline]
    pub fn read_only() -> BitFlags<OpenFlag> {
        BitFlags::from_bits_truncate(Self::RDONLY)
    }

    /// 可读、可写；只读打开时要求截断视为读写
    fn readable_writable(flags: BitFlags<OpenFlag>) -> [bool; 2] {
        if flags.contains(OpenFlag::RDWR) {
            [true, true]
        } else if flags.contains(OpenFlag::WRONLY) {
            [false, true]
        } else if flags.contains(OpenFlag::TRUNC) {
            [true, true]
        } else {
            [true, false]
        }
    }

    /// 打开方式所要求的访问权限
    pub fn access(flags: BitFlags<OpenFlag>) -> u32 {
        let [readable, writable] = Self::readable_writable(flags);
        let mut access = 0;
        if readable {
            access |= READ;
        }
        if writable {
            access |= WRITE;
        }
        access
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

pub struct OpenFile {
    readable: bool,
    writable: bool,
    append: bool,
    inode: Inode,
    /// **文件**内的偏移量
    offset: Mutex<usize>,
}

impl OpenFile {
    pub fn new(inode: Inode, flags: BitFlags<OpenFlag>) -> Self {
        let [readable, writable] = OpenFlag::readable_writable(flags);
        Self {
            readable,
            writable,
            append: flags.contains(OpenFlag::APPEND),
            inode,
            offset: Mutex::new(0),
        }
    }

    pub fn offset(&self) -> usize {
        *self.offset.lock()
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        if !self.readable {
            return Err(Error::BadDescriptor);
        }
        if self.inode.is_pipe() {
            return self.inode.pipe_read(buf);
        }

        let mode = self.inode.mode();
        if mode::is_chr(mode) {
            return Ok(self.char_device()?.read(buf));
        }

        let offset = self.offset();
        let n = if mode::is_blk(mode) {
            self.read_block_device(offset, buf)?
        } else {
            self.inode.read_at(offset, buf)?
        };

        *self.offset.lock() = offset + n;
        Ok(n)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        if !self.writable {
            return Err(Error::BadDescriptor);
        }
        if self.inode.is_pipe() {
            return self.inode.pipe_write(buf);
        }

        let mode = self.inode.mode();
        if mode::is_chr(mode) {
            return Ok(self.char_device()?.write(buf));
        }

        let _guard = self.inode.lock();
        let offset = if self.append && !mode::is_blk(mode) {
            self.inode.size()
        } else {
            self.offset()
        };
        let n = if mode::is_blk(mode) {
            self.write_block_device(offset, buf)?
        } else {
            self.inode.write_at(offset, buf)?
        };

        *self.offset.lock() = offset + n;
        Ok(n)
    }

    /// 移动偏移量，返回新的偏移量
    pub fn seek(&self, offset: i64, whence: Whence) -> Result<usize, Error> {
        if self.inode.is_pipe() {
            return Err(Error::Unsupported);
        }
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => self.offset() as i64,
            Whence::End => self.inode.size() as i64,
        };
        let target = base
            .checked_add(offset)
            .filter(|&target| target >= 0)
            .ok_or(Error::InvalidArgument)?;

        *self.offset.lock() = target as usize;
        Ok(target as usize)
    }

    pub fn stat(&self) -> Stat {
        self.inode.stat()
    }

    /// 读出下一个有效的目录项，已删除的目录项被跳过，到末尾时返回空
    pub fn readdir(&self) -> Result<Option<DirEntry>, Error> {
        if !self.inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        if !self.readable {
            return Err(Error::BadDescriptor);
        }

        loop {
            let i = self.offset().div_ceil(DIR_ENTRY_SIZE);
            let Some(entry) = self.inode.entry_at(i)? else {
                return Ok(None);
            };
            *self.offset.lock() = (i + 1) * DIR_ENTRY_SIZE;
            if entry.is_free() {
                continue;
            }

            let ty = match self.inode.fs().get_inode(self.inode.dev(), entry.nr as u32) {
                Ok(inode) => inode.kind(),
                Err(_) => DirEntryType::default(),
            };
            return Ok(Some(DirEntry {
                inode: entry.nr as u64,
                ty,
                name: String::from_utf8_lossy(entry.name()).into_owned(),
            }));
        }
    }

    fn char_device(&self) -> Result<Arc<dyn CharDevice>, Error> {
        let dev = self.device();
        self.inode
            .fs()
            .devices()
            .char_device(dev)
            .ok_or(Error::NotFound)
    }

    fn device(&self) -> DeviceId {
        self.inode.rdev().expect("device file without device id")
    }

    /// 块设备的容量（字节）
    fn device_size(&self, dev: DeviceId) -> Result<usize, Error> {
        let blocks = self
            .inode
            .fs()
            .devices()
            .block_count(dev)
            .ok_or(Error::NotFound)?;
        Ok(blocks * BLOCK_SIZE)
    }

    fn read_block_device(&self, offset: usize, buf: &mut [u8]) -> Result<usize, Error> {
        let dev = self.device();
        let size = self.device_size(dev)?;
        if offset >= size {
            return Ok(0);
        }
        let len = buf.len().min(size - offset);

        let cache = self.inode.fs().cache();
        for span in spans(offset, len) {
            let buffer = cache.read(dev, span.block as u32);
            buffer.map(0, |data: &[u8; BLOCK_SIZE]| {
                buf[span.done..span.done + span.len]
                    .copy_from_slice(&data[span.start..span.start + span.len])
            });
        }
        Ok(len)
    }

    fn write_block_device(&self, offset: usize, buf: &[u8]) -> Result<usize, Error> {
        let dev = self.device();
        let size = self.device_size(dev)?;
        if offset >= size && !buf.is_empty() {
            return Err(Error::NoSpace);
        }
        let len = buf.len().min(size.saturating_sub(offset));

        let cache = self.inode.fs().cache();
        for span in spans(offset, len) {
            let buffer = if span.len == BLOCK_SIZE {
                cache.zeroed(dev, span.block as u32)
            } else {
                cache.read(dev, span.block as u32)
            };
            buffer.map_mut(0, |data: &mut [u8; BLOCK_SIZE]| {
                data[span.start..span.start + span.len]
                    .copy_from_slice(&buf[span.done..span.done + span.len])
            });
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_follows_open_mode() {
        assert_eq!(OpenFlag::access(OpenFlag::read_only()), READ);
        assert_eq!(OpenFlag::access(OpenFlag::WRONLY.into()), WRITE);
        assert_eq!(OpenFlag::access(OpenFlag::RDWR | OpenFlag::CREATE), READ | WRITE);
    }

    #[test]
    fn read_only_truncate_becomes_read_write() {
        assert_eq!(OpenFlag::access(OpenFlag::TRUNC.into()), READ | WRITE);
        assert_eq!(
            OpenFlag::access(OpenFlag::WRONLY | OpenFlag::TRUNC),
            WRITE
        );
    }
}
