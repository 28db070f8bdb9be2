//! # 进程层
//!
//! 一个进程可以访问多个文件，并通过**文件描述符表**管理。
//! 除描述符表外，进程还携带用户身份、创建掩码、根目录与当前目录，
//! 路径解析都相对于它们进行。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use enumflags2::BitFlags;
use vfs::mode::{self, EXEC};
use vfs::{DirEntry, Error, Stat};

use crate::path::Path;
use crate::{DeviceId, FileSystem, Inode, KERNEL_UID, OpenFile, OpenFlag, ROOT_INO, Whence};

/// 文件描述符
pub type Fd = usize;

pub struct Process {
    fs: Arc<FileSystem>,
    pub uid: u16,
    pub gid: u8,
    /// 新建文件时从权限位中去掉的位
    pub umask: u32,
    pub(crate) root: Inode,
    pub(crate) cwd: Inode,
    /// 当前目录的规范路径
    cwd_path: String,
    fd_table: Vec<Option<Arc<OpenFile>>>,
}

impl Process {
    /// 以内核用户身份新建进程，根目录与当前目录都是根文件系统的根目录
    pub fn new(fs: &Arc<FileSystem>) -> Result<Self, Error> {
        let root = fs.root_inode()?;
        Ok(Self {
            fs: fs.clone(),
            uid: KERNEL_UID,
            gid: 0,
            umask: 0o022,
            cwd: root.clone(),
            root,
            cwd_path: String::from("/"),
            fd_table: vec![None; fs.config().task_files],
        })
    }

    pub fn with_credentials(mut self, uid: u16, gid: u8) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// 子进程继承全部打开的文件，与父进程共享偏移量
    pub fn fork(&self) -> Self {
        Self {
            fs: self.fs.clone(),
            uid: self.uid,
            gid: self.gid,
            umask: self.umask,
            root: self.root.clone(),
            cwd: self.cwd.clone(),
            cwd_path: self.cwd_path.clone(),
            fd_table: self.fd_table.clone(),
        }
    }

    #[inline]
    pub fn fs(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    fn file(&self, fd: Fd) -> Result<&Arc<OpenFile>, Error> {
        self.fd_table
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(Error::BadDescriptor)
    }

    fn free_fd(&self) -> Result<Fd, Error> {
        self.fd_table
            .iter()
            .position(Option::is_none)
            .ok_or(Error::TableFull)
    }

    fn alloc_fd(&mut self, file: Arc<OpenFile>) -> Result<Fd, Error> {
        let fd = self.free_fd()?;
        self.fd_table[fd] = Some(file);
        Ok(fd)
    }

    pub fn open(&mut self, path: &str, flags: BitFlags<OpenFlag>, mode: u32) -> Result<Fd, Error> {
        // 描述符表已满时不应留下新建的文件
        self.free_fd()?;
        let inode = self.open_inode(path, flags, mode)?;
        self.alloc_fd(Arc::new(OpenFile::new(inode, flags)))
    }

    pub fn creat(&mut self, path: &str, mode: u32) -> Result<Fd, Error> {
        self.open(
            path,
            OpenFlag::CREATE | OpenFlag::WRONLY | OpenFlag::TRUNC,
            mode,
        )
    }

    pub fn close(&mut self, fd: Fd) -> Result<(), Error> {
        self.fd_table
            .get_mut(fd)
            .and_then(Option::take)
            .map(drop)
            .ok_or(Error::BadDescriptor)
    }

    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize, Error> {
        self.file(fd)?.read(buf)
    }

    pub fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize, Error> {
        self.file(fd)?.write(buf)
    }

    pub fn lseek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<usize, Error> {
        self.file(fd)?.seek(offset, whence)
    }

    pub fn stat(&self, path: &str) -> Result<Stat, Error> {
        Ok(self.resolve(path)?.stat())
    }

    pub fn fstat(&self, fd: Fd) -> Result<Stat, Error> {
        Ok(self.file(fd)?.stat())
    }

    pub fn readdir(&self, fd: Fd) -> Result<Option<DirEntry>, Error> {
        self.file(fd)?.readdir()
    }

    pub fn dup(&mut self, fd: Fd) -> Result<Fd, Error> {
        let file = self.file(fd)?.clone();
        self.alloc_fd(file)
    }

    /// 让`new`指向`fd`的打开文件，`new`原先打开的文件被关闭
    pub fn dup2(&mut self, fd: Fd, new: Fd) -> Result<Fd, Error> {
        let file = self.file(fd)?.clone();
        let slot = self.fd_table.get_mut(new).ok_or(Error::BadDescriptor)?;
        *slot = Some(file);
        Ok(new)
    }

    /// 返回`(读端, 写端)`
    pub fn pipe(&mut self) -> Result<(Fd, Fd), Error> {
        let read_fd = self.free_fd()?;
        if self.fd_table.iter().filter(|file| file.is_none()).count() < 2 {
            return Err(Error::TableFull);
        }

        let (reader, writer) = self.fs.new_pipe()?;
        writer.on_disk_mut(|d| {
            d.uid = self.uid;
            d.gid = self.gid;
        });
        self.fd_table[read_fd] = Some(Arc::new(OpenFile::new(reader, OpenFlag::read_only())));
        let write_fd = self.alloc_fd(Arc::new(OpenFile::new(writer, OpenFlag::WRONLY.into())))?;
        Ok((read_fd, write_fd))
    }

    #[inline]
    pub fn getcwd(&self) -> &str {
        &self.cwd_path
    }

    pub fn chdir(&mut self, path: &str) -> Result<(), Error> {
        let inode = self.resolve(path)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        if !self.permitted(&inode, EXEC) {
            return Err(Error::PermissionDenied);
        }

        self.cwd = inode;
        self.cwd_path = path.canonicalize(&self.cwd_path);
        Ok(())
    }

    pub fn chroot(&mut self, path: &str) -> Result<(), Error> {
        if self.uid != KERNEL_UID {
            return Err(Error::PermissionDenied);
        }
        let inode = self.resolve(path)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }

        self.root = inode;
        Ok(())
    }

    /// 把块设备文件`dev_path`上的文件系统挂载到目录`dir_path`
    pub fn mount(&self, dev_path: &str, dir_path: &str) -> Result<(), Error> {
        if self.uid != KERNEL_UID {
            return Err(Error::PermissionDenied);
        }
        let dev = self.block_device_of(dev_path)?;
        let dir = self.resolve(dir_path)?;
        self.fs.mount(dev, dir)
    }

    /// 按块设备文件，或被挂载文件系统的根目录卸载
    pub fn umount(&self, path: &str) -> Result<(), Error> {
        if self.uid != KERNEL_UID {
            return Err(Error::PermissionDenied);
        }
        let inode = self.resolve(path)?;
        let dev = if mode::is_blk(inode.mode()) {
            inode.rdev().ok_or(Error::NotBlockDevice)?
        } else if inode.is_dir() && inode.nr() == ROOT_INO {
            inode.dev()
        } else {
            return Err(Error::InvalidArgument);
        };

        drop(inode);
        self.fs.unmount(dev)
    }

    /// 在块设备文件`dev_path`上建立文件系统
    pub fn mkfs(&self, dev_path: &str, inode_count: usize) -> Result<(), Error> {
        if self.uid != KERNEL_UID {
            return Err(Error::PermissionDenied);
        }
        let dev = self.block_device_of(dev_path)?;
        self.fs.format(dev, inode_count)
    }

    pub fn sync(&self) {
        self.fs.sync();
    }

    fn block_device_of(&self, path: &str) -> Result<DeviceId, Error> {
        let inode = self.resolve(path)?;
        if !mode::is_blk(inode.mode()) {
            return Err(Error::NotBlockDevice);
        }
        inode.rdev().ok_or(Error::NotBlockDevice)
    }
}
