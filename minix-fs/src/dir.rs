//! 目录：由 16 字节目录项组成的线性数组
//!
//! 新的目录项总是追加在末尾，被删除的目录项只清零，不回收也不压缩，
//! 目录长度因此只增不减。

use vfs::Error;

use crate::layout::{DIR_ENTRIES_PER_BLOCK, DIR_ENTRY_SIZE, DirBlock, DirEntry};
use crate::{Buffer, Inode};

/// 目录数据块中的一个目录项，持有所在块的缓冲区
pub(crate) struct DirSlot {
    buf: Buffer,
    index: usize,
}

impl DirSlot {
    pub fn nr(&self) -> u32 {
        self.buf
            .map(self.index * DIR_ENTRY_SIZE, |entry: &DirEntry| entry.nr as u32)
    }

    /// 清零目录项并立即写回
    pub fn clear(&self) {
        self.buf
            .map_mut(self.index * DIR_ENTRY_SIZE, |entry: &mut DirEntry| {
                *entry = DirEntry::default()
            });
        self.buf.write_back();
    }
}

impl Inode {
    /// 目录项个数，含已删除的
    pub(crate) fn entry_count(&self) -> usize {
        self.size() / DIR_ENTRY_SIZE
    }

    /// 按名字线性查找目录项，已删除的目录项不参与匹配
    pub(crate) fn find_entry(&self, name: &[u8]) -> Result<Option<DirSlot>, Error> {
        let _guard = self.lock();
        let count = self.entry_count();
        let dev = self.dev();

        for block_index in 0..count.div_ceil(DIR_ENTRIES_PER_BLOCK) {
            let Some(block) = self.map_block(block_index, false)? else {
                continue;
            };
            let in_block = (count - block_index * DIR_ENTRIES_PER_BLOCK).min(DIR_ENTRIES_PER_BLOCK);

            let buf = self.fs().cache().read(dev, block);
            let found = buf.map(0, |entries: &DirBlock| {
                entries[..in_block]
                    .iter()
                    .position(|entry| entry.matches(name))
            });
            if let Some(index) = found {
                return Ok(Some(DirSlot { buf, index }));
            }
        }

        Ok(None)
    }

    /// 第`i`个目录项，超出目录长度时返回空
    pub(crate) fn entry_at(&self, i: usize) -> Result<Option<DirEntry>, Error> {
        let _guard = self.lock();
        if i >= self.entry_count() {
            return Ok(None);
        }
        let Some(block) = self.map_block(i / DIR_ENTRIES_PER_BLOCK, false)? else {
            return Ok(Some(DirEntry::default()));
        };

        let buf = self.fs().cache().read(self.dev(), block);
        let entry = buf.map(i % DIR_ENTRIES_PER_BLOCK * DIR_ENTRY_SIZE, |entry: &DirEntry| *entry);
        Ok(Some(entry))
    }

    /// 在目录末尾追加目录项，必要时扩展一个块；目录项与描述符都立即写回
    pub(crate) fn add_entry(&self, name: &[u8], nr: u32) -> Result<DirSlot, Error> {
        let _guard = self.lock();
        let size = self.size();
        let i = size / DIR_ENTRY_SIZE;
        let block = self
            .map_block(i / DIR_ENTRIES_PER_BLOCK, true)?
            .ok_or(Error::NoSpace)?;

        let buf = self.fs().cache().read(self.dev(), block);
        let index = i % DIR_ENTRIES_PER_BLOCK;
        buf.map_mut(index * DIR_ENTRY_SIZE, |entry: &mut DirEntry| {
            *entry = DirEntry::new(name, nr as u16)
        });
        buf.write_back();

        let now = self.fs().now();
        self.on_disk_mut(|disk_inode| {
            disk_inode.size = (size + DIR_ENTRY_SIZE) as u32;
            disk_inode.mtime = now;
        });
        Ok(DirSlot { buf, index })
    }

    /// 目录中是否只剩`.`与`..`
    pub(crate) fn is_empty_dir(&self) -> Result<bool, Error> {
        let _guard = self.lock();
        for i in 0..self.entry_count() {
            let Some(entry) = self.entry_at(i)? else {
                break;
            };
            if !entry.is_free() && entry.name() != b"." && entry.name() != b".." {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 写入`.`与`..`，链接数为 2
    pub(crate) fn init_dir(&self, parent: u32) -> Result<(), Error> {
        self.add_entry(b".", self.nr())?;
        self.add_entry(b"..", parent)?;
        self.on_disk_mut(|disk_inode| disk_inode.nlinks = 2);
        Ok(())
    }
}
