use crate::NAME_LEN;

/// 目录项：索引节点号为 0 表示空闲
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DirEntry {
    pub nr: u16,
    /// 不足长度时以 0 填充，满长度时没有结尾的 0
    name: [u8; NAME_LEN],
}

impl DirEntry {
    /// `name`须已经过长度检查
    pub fn new(name: &[u8], nr: u16) -> Self {
        debug_assert!(name.len() <= NAME_LEN);
        let mut entry = Self {
            nr,
            name: [0; NAME_LEN],
        };
        entry.name[..name.len()].copy_from_slice(name);
        entry
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.nr == 0
    }

    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        &self.name[..len]
    }

    /// 仅匹配被占用的目录项
    #[inline]
    pub fn matches(&self, name: &[u8]) -> bool {
        !self.is_free() && self.name() == name
    }
}
