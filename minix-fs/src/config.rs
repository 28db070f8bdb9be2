/// 各张内存表的容量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// 缓冲区个数的上限，耗尽后回收最早释放的缓冲区
    pub buffers: usize,
    /// 缓冲区查找表的哈希桶数
    pub buckets: usize,
    /// 同时存活的索引节点个数
    pub inodes: usize,
    /// 同时读入的超级块个数
    pub supers: usize,
    /// 每个进程的文件描述符个数
    pub task_files: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffers: 64,
            buckets: 31,
            inodes: 64,
            supers: 16,
            task_files: 16,
        }
    }
}
