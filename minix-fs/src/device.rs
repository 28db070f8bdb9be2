//! # 设备层
//!
//! 设备号到驱动的登记表。设备文件的索引节点在 0 号块指针里保存设备号，
//! 块传输统一经由这里发出，每块恰好一次请求、[`SECTORS_PER_BLOCK`]个扇区。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use block_dev::{BlockDevice, CharDevice};
use derive_more::{Display, From, Into};
use spin::Mutex;

use crate::{BLOCK_SIZE, SECTORS_PER_BLOCK};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    /// 管道索引节点所在的虚拟设备，不对应任何驱动
    pub const PIPE: Self = Self(u32::MAX - 1);
}

#[derive(Clone)]
pub enum Device {
    Block(Arc<dyn BlockDevice>),
    Char(Arc<dyn CharDevice>),
}

pub struct DeviceTable {
    devices: Mutex<BTreeMap<DeviceId, Device>>,
    next: AtomicU32,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(BTreeMap::new()),
            next: AtomicU32::new(1),
        }
    }

    pub fn install_block(&self, device: Arc<dyn BlockDevice>) -> DeviceId {
        self.install(Device::Block(device))
    }

    pub fn install_char(&self, device: Arc<dyn CharDevice>) -> DeviceId {
        self.install(Device::Char(device))
    }

    pub fn get(&self, id: DeviceId) -> Option<Device> {
        self.devices.lock().get(&id).cloned()
    }

    pub fn block_device(&self, id: DeviceId) -> Option<Arc<dyn BlockDevice>> {
        match self.get(id)? {
            Device::Block(device) => Some(device),
            Device::Char(_) => None,
        }
    }

    pub fn char_device(&self, id: DeviceId) -> Option<Arc<dyn CharDevice>> {
        match self.get(id)? {
            Device::Char(device) => Some(device),
            Device::Block(_) => None,
        }
    }

    /// 块设备的总块数
    pub fn block_count(&self, id: DeviceId) -> Option<usize> {
        self.block_device(id)
            .map(|device| device.sector_count() / SECTORS_PER_BLOCK)
    }

    pub(crate) fn read_block(&self, id: DeviceId, block: u32, buf: &mut [u8; BLOCK_SIZE]) {
        let device = self.expect_block(id);
        let sector = block as usize * SECTORS_PER_BLOCK;
        log::trace!("dev {id}: read block {block} at sector {sector}");
        if let Err(err) = device.read_sectors(sector, buf) {
            panic!("dev {id}: reading block {block} failed: {err}");
        }
    }

    pub(crate) fn write_block(&self, id: DeviceId, block: u32, buf: &[u8; BLOCK_SIZE]) {
        let device = self.expect_block(id);
        let sector = block as usize * SECTORS_PER_BLOCK;
        log::trace!("dev {id}: write block {block} at sector {sector}");
        if let Err(err) = device.write_sectors(sector, buf) {
            panic!("dev {id}: writing block {block} failed: {err}");
        }
    }

    fn install(&self, device: Device) -> DeviceId {
        let id = DeviceId(self.next.fetch_add(1, Ordering::Relaxed));
        self.devices.lock().insert(id, device);
        id
    }

    fn expect_block(&self, id: DeviceId) -> Arc<dyn BlockDevice> {
        self.block_device(id)
            .unwrap_or_else(|| panic!("dev {id}: no block device installed"))
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}
