//! # 路径解析与目录操作层
//!
//! 路径逐项解析：绝对路径从进程的根目录出发，相对路径从当前目录出发。
//! 每进入一个目录都要求它是目录且有执行权限；
//! 文件系统根目录下的`..`经由挂载点回到上层文件系统。

use enumflags2::BitFlags;
use vfs::Error;
use vfs::mode::{self, EXEC, IFDIR, IFMT, IFREG, ISVTX, PERMISSION, WRITE};

use crate::path::Path;
use crate::{DeviceId, Inode, KERNEL_UID, NAME_LEN, OpenFlag, Process, ROOT_INO};

impl Process {
    /// 以`mask`（读 4、写 2、执行 1 的组合）访问索引节点是否被允许
    pub(crate) fn permitted(&self, inode: &Inode, mask: u32) -> bool {
        let (mode, uid, gid, nlinks) =
            inode.on_disk(|d| (d.mode as u32, d.uid, d.gid, d.nlinks));
        if nlinks == 0 {
            return false;
        }
        if self.uid == KERNEL_UID {
            return true;
        }

        let triplet = if self.uid == uid {
            mode >> 6
        } else if self.gid == gid {
            mode >> 3
        } else {
            mode
        };
        triplet & mask & 0o7 == mask
    }

    /// 解析到路径的父目录，返回父目录与最后一项的名字
    pub(crate) fn resolve_parent<'p>(&self, path: &'p str) -> Result<(Inode, &'p str), Error> {
        if path.is_empty() {
            return Err(Error::NotFound);
        }
        let mut dir = if path.is_absolute() {
            self.root.clone()
        } else {
            self.cwd.clone()
        };

        let (parent, name) = path.parent_file();
        for cmp in parent.components() {
            dir = self.lookup(&dir, cmp)?.ok_or_else(|| {
                log::debug!("{path}: `{cmp}` not found");
                Error::NotFound
            })?;
        }

        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok((dir, name))
    }

    /// 在目录中查找一项，空名字与`.`即目录本身
    pub(crate) fn lookup(&self, dir: &Inode, name: &str) -> Result<Option<Inode>, Error> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        if !self.permitted(dir, EXEC) {
            return Err(Error::PermissionDenied);
        }
        if name.len() > NAME_LEN {
            return Err(Error::NameTooLong);
        }

        match name {
            "" | "." => return Ok(Some(dir.clone())),
            ".." if dir.same(&self.root) => return Ok(Some(dir.clone())),
            ".." if dir.nr() == ROOT_INO => {
                // 被挂载文件系统的根目录，回到挂载点所在的目录
                if let Some(mount_point) = dir.fs().mount_point_of(dir.dev()) {
                    return self.lookup(&mount_point, "..");
                }
            }
            _ => (),
        }

        let _guard = dir.lock();
        let Some(entry) = dir.find_entry(name.as_bytes())? else {
            return Ok(None);
        };
        let nr = entry.nr();
        drop(entry);
        dir.fs().get_inode(dir.dev(), nr).map(Some)
    }

    pub(crate) fn resolve(&self, path: &str) -> Result<Inode, Error> {
        let (dir, name) = self.resolve_parent(path)?;
        self.lookup(&dir, name)?.ok_or(Error::NotFound)
    }

    /// 打开路径对应的索引节点，按标志创建或截断
    pub(crate) fn open_inode(
        &self,
        path: &str,
        flags: BitFlags<OpenFlag>,
        mode: u32,
    ) -> Result<Inode, Error> {
        let (dir, name) = self.resolve_parent(path)?;
        let inode = match self.lookup(&dir, name)? {
            Some(_) if flags.contains(OpenFlag::CREATE | OpenFlag::EXCL) => {
                return Err(Error::AlreadyExists);
            }
            Some(inode) => inode,
            // 新建的文件不再检查权限
            None if flags.contains(OpenFlag::CREATE) => {
                return self.create(&dir, name, IFREG | self.masked(mode), |_| Ok(()));
            }
            None => return Err(Error::NotFound),
        };
        drop(dir);

        let access = OpenFlag::access(flags);
        if inode.is_dir() && access != mode::READ {
            return Err(Error::IsADirectory);
        }
        if !self.permitted(&inode, access) {
            return Err(Error::PermissionDenied);
        }
        if flags.contains(OpenFlag::TRUNC) && mode::is_reg(inode.mode()) {
            inode.truncate();
        }
        Ok(inode)
    }

    fn masked(&self, mode: u32) -> u32 {
        mode & PERMISSION & !self.umask
    }

    /// 在`dir`中新建名为`name`的索引节点，`init`在加入目录前调用。
    ///
    /// 任一步失败时新索引节点的链接数为 0，释放时被回收。
    fn create(
        &self,
        dir: &Inode,
        name: &str,
        mode: u32,
        init: impl FnOnce(&Inode) -> Result<(), Error>,
    ) -> Result<Inode, Error> {
        check_name(name)?;
        if !self.permitted(dir, WRITE) {
            return Err(Error::PermissionDenied);
        }

        let _guard = dir.lock();
        if dir.find_entry(name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let fs = dir.fs();
        let dev = dir.dev();
        let nr = fs.allocate_inode(dev).ok_or(Error::NoSpace)?;
        let inode = match fs.get_inode(dev, nr) {
            Ok(inode) => inode,
            Err(err) => {
                fs.free_inode(dev, nr);
                return Err(err);
            }
        };
        let now = fs.now();
        inode.on_disk_mut(|d| d.init(mode as u16, self.uid, self.gid, now));

        if let Err(err) = init(&inode).and_then(|()| dir.add_entry(name.as_bytes(), nr).map(drop)) {
            log::debug!("creating `{name}` failed: {err}");
            inode.on_disk_mut(|d| d.nlinks = 0);
            return Err(err);
        }
        Ok(inode)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<(), Error> {
        let (dir, name) = self.resolve_parent(path)?;
        let _guard = dir.lock();
        if dir.nlinks() == u8::MAX {
            return Err(Error::TooManyLinks);
        }

        let parent = dir.nr();
        let mode = IFDIR | (mode & (ISVTX | PERMISSION) & !self.umask);
        self.create(&dir, name, mode, |inode| inode.init_dir(parent))?;
        dir.on_disk_mut(|d| d.nlinks += 1);
        Ok(())
    }

    /// 删除空目录；所有检查都在清除目录项之前完成
    pub fn rmdir(&self, path: &str) -> Result<(), Error> {
        let (dir, name) = self.resolve_parent(path)?;
        if matches!(name, "" | "." | "..") {
            return Err(Error::InvalidArgument);
        }
        check_name(name)?;
        if !self.permitted(&dir, WRITE | EXEC) {
            return Err(Error::PermissionDenied);
        }

        let _guard = dir.lock();
        let entry = dir.find_entry(name.as_bytes())?.ok_or(Error::NotFound)?;
        let inode = dir.fs().get_inode(dir.dev(), entry.nr())?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        // 挂载点被替换成了另一个设备上的根目录
        if inode.dev() != dir.dev() {
            return Err(Error::Busy);
        }
        self.check_sticky(&dir, &inode)?;
        if inode.ref_count() > 1 {
            return Err(Error::Busy);
        }
        if !inode.is_empty_dir()? {
            return Err(Error::DirectoryNotEmpty);
        }

        entry.clear();
        inode.on_disk_mut(|d| d.nlinks = 0);
        dir.on_disk_mut(|d| d.nlinks -= 1);
        Ok(())
    }

    /// 为`old`建立新的硬链接`new`，两者须在同一设备上
    pub fn link(&self, old: &str, new: &str) -> Result<(), Error> {
        let inode = self.resolve(old)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        if inode.nlinks() == u8::MAX {
            return Err(Error::TooManyLinks);
        }

        let (dir, name) = self.resolve_parent(new)?;
        if dir.dev() != inode.dev() {
            return Err(Error::CrossDevice);
        }
        check_name(name)?;
        if !self.permitted(&dir, WRITE) {
            return Err(Error::PermissionDenied);
        }

        let _guard = dir.lock();
        if dir.find_entry(name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists);
        }
        dir.add_entry(name.as_bytes(), inode.nr())?;
        inode.on_disk_mut(|d| d.nlinks += 1);
        Ok(())
    }

    /// 删除目录项；链接数归零的索引节点在最后一个引用释放时回收
    pub fn unlink(&self, path: &str) -> Result<(), Error> {
        let (dir, name) = self.resolve_parent(path)?;
        if matches!(name, "" | "." | "..") {
            return Err(Error::IsADirectory);
        }
        check_name(name)?;
        if !self.permitted(&dir, WRITE | EXEC) {
            return Err(Error::PermissionDenied);
        }

        let _guard = dir.lock();
        let entry = dir.find_entry(name.as_bytes())?.ok_or(Error::NotFound)?;
        let inode = dir.fs().get_inode(dir.dev(), entry.nr())?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        self.check_sticky(&dir, &inode)?;

        entry.clear();
        inode.on_disk_mut(|d| d.nlinks = d.nlinks.saturating_sub(1));
        Ok(())
    }

    /// 新建设备文件，设备号保存在 0 号块指针中
    pub fn mknod(&self, path: &str, mode: u32, dev: DeviceId) -> Result<(), Error> {
        if self.uid != KERNEL_UID {
            return Err(Error::PermissionDenied);
        }
        if !(mode::is_blk(mode) || mode::is_chr(mode)) {
            return Err(Error::InvalidArgument);
        }
        let zone = u16::try_from(u32::from(dev)).map_err(|_| Error::InvalidArgument)?;

        let (dir, name) = self.resolve_parent(path)?;
        let mode = (mode & IFMT) | self.masked(mode);
        self.create(&dir, name, mode, |inode| {
            inode.on_disk_mut(|d| d.zone[0] = zone);
            Ok(())
        })?;
        Ok(())
    }

    /// 带粘滞位的目录中，只有项的所有者能删除它
    fn check_sticky(&self, dir: &Inode, inode: &Inode) -> Result<(), Error> {
        if dir.mode() & ISVTX != 0 && self.uid != KERNEL_UID && self.uid != inode.uid() {
            return Err(Error::PermissionDenied);
        }
        Ok(())
    }
}

/// 新目录项的名字
fn check_name(name: &str) -> Result<(), Error> {
    match name {
        "" | "." | ".." => Err(Error::AlreadyExists),
        name if name.len() > NAME_LEN => Err(Error::NameTooLong),
        _ => Ok(()),
    }
}
