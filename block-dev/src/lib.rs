//! # 设备接口层
//!
//! 块设备是以**扇区**为单位存储数据的设备，例如磁盘、内存盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 请求是同步的：排队、电梯调度与完成通知都由驱动负责，
//! 调用者在请求完成之前不会返回。

#![no_std]

use core::any::Any;
use core::fmt;

/// 扇区大小，请求的缓冲区长度必须是它的整数倍
pub const SECTOR_SIZE: usize = 512;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 设备的扇区总数
    fn sector_count(&self) -> usize;

    /// 从`start_sector`起读取`buf.len() / SECTOR_SIZE`个扇区
    fn read_sectors(&self, start_sector: usize, buf: &mut [u8]) -> Result<(), IoError>;

    /// 从`start_sector`起写入`buf.len() / SECTOR_SIZE`个扇区
    fn write_sectors(&self, start_sector: usize, buf: &[u8]) -> Result<(), IoError>;

    fn handle_irq(&self) {}
}

/// 字符设备驱动特质，按字节流读写
pub trait CharDevice: Send + Sync + Any {
    fn read(&self, buf: &mut [u8]) -> usize;
    fn write(&self, buf: &[u8]) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// 请求越过了设备末尾
    OutOfRange,
    /// 缓冲区长度不是扇区大小的整数倍
    Misaligned,
    /// 驱动报告的硬件错误
    Device,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IoError::OutOfRange => "request beyond end of device",
            IoError::Misaligned => "buffer is not a whole number of sectors",
            IoError::Device => "device error",
        };
        f.write_str(msg)
    }
}
