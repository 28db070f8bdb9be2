use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    AlreadyExists,
    NotFound,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    Unsupported,
    PermissionDenied,
    /// 磁盘上没有空闲的块或索引节点
    NoSpace,
    /// 内存中的表（索引节点、超级块、文件描述符）已满
    TableFull,
    Busy,
    InvalidArgument,
    BadDescriptor,
    NameTooLong,
    CrossDevice,
    TooManyLinks,
    NotBlockDevice,
    FileTooLarge,
    /// 设备上没有可识别的文件系统
    InvalidFilesystem,
    BrokenPipe,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::AlreadyExists => "entity already exists",
            Error::NotFound => "entity not found",
            Error::IsADirectory => "is a directory",
            Error::NotADirectory => "not a directory",
            Error::DirectoryNotEmpty => "directory not empty",
            Error::Unsupported => "unsupported",
            Error::PermissionDenied => "permission denied",
            Error::NoSpace => "no space left on device",
            Error::TableFull => "table full",
            Error::Busy => "resource busy",
            Error::InvalidArgument => "invalid argument",
            Error::BadDescriptor => "bad file descriptor",
            Error::NameTooLong => "file name too long",
            Error::CrossDevice => "cross-device link",
            Error::TooManyLinks => "too many links",
            Error::NotBlockDevice => "block device required",
            Error::FileTooLarge => "file too large",
            Error::InvalidFilesystem => "invalid filesystem",
            Error::BrokenPipe => "broken pipe",
        };
        f.write_str(msg)
    }
}
