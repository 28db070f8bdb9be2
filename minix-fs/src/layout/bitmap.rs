use crate::{BLOCK_BITS, BLOCK_SIZE, Buffer};

/// 位图区域内块的结构。按字节、低位在前编址，与主机字节序无关。
pub type BitmapBlock = [u8; BLOCK_SIZE];

/// 位图，记录其指示区域的分配情况。
///
/// 第`k`位描述编号`base + k`；0 号位保留，格式化时即被置位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitmap {
    /// 0 号位所描述的编号
    base: u32,
    /// 有意义的位数（含保留位）
    bits: usize,
}

impl Bitmap {
    #[inline]
    pub fn new(base: u32, bits: usize) -> Self {
        Self { base, bits }
    }

    /// 容纳这么多位所需的块数
    #[inline]
    pub fn blocks_for(bits: usize) -> usize {
        bits.div_ceil(BLOCK_BITS)
    }

    /// 在指示区域内分配新的编号。
    /// 若位图的空间用尽，则返回空。
    ///
    /// 找到空闲位后立即同步写回其所在的位图块。
    pub fn alloc(&self, blocks: &[Buffer]) -> Option<u32> {
        for (block_index, buffer) in blocks.iter().enumerate() {
            let first = block_index * BLOCK_BITS;
            if first >= self.bits {
                break;
            }
            let limit = (self.bits - first).min(BLOCK_BITS);

            // 查找与置位在同一临界区内完成
            let Some(bit) = buffer.map_mut(0, |bitmap: &mut BitmapBlock| {
                let bit = first_clear(bitmap).filter(|&bit| bit < limit)?;
                bitmap[bit / 8] |= 1 << (bit % 8);
                Some(bit)
            }) else {
                continue;
            };

            buffer.write_back();
            return Some(self.base + (first + bit) as u32);
        }

        None
    }

    pub fn dealloc(&self, blocks: &[Buffer], number: u32) {
        assert!(
            number > self.base && ((number - self.base) as usize) < self.bits,
            "freeing {number} outside of bitmap range"
        );
        let index = (number - self.base) as usize;
        let buffer = &blocks[index / BLOCK_BITS];
        let bit = index % BLOCK_BITS;

        buffer.map_mut(0, |bitmap: &mut BitmapBlock| {
            // 编号一定得有对应的位
            assert_ne!(bitmap[bit / 8] & (1 << (bit % 8)), 0, "double free of {number}");
            bitmap[bit / 8] &= !(1 << (bit % 8));
        });
        buffer.write_back();
    }

    /// 编号是否已被占用
    pub fn test(&self, blocks: &[Buffer], number: u32) -> bool {
        let index = (number - self.base) as usize;
        let bit = index % BLOCK_BITS;
        blocks[index / BLOCK_BITS].map(0, |bitmap: &BitmapBlock| {
            bitmap[bit / 8] & (1 << (bit % 8)) != 0
        })
    }

    /// 置位保留的 0 号位以及超出范围的尾部位，使其永不被分配
    pub fn reserve(&self, blocks: &[Buffer]) {
        for (block_index, buffer) in blocks.iter().enumerate() {
            let first = block_index * BLOCK_BITS;
            buffer.map_mut(0, |bitmap: &mut BitmapBlock| {
                for bit in 0..BLOCK_BITS {
                    let index = first + bit;
                    if index == 0 || index >= self.bits {
                        bitmap[bit / 8] |= 1 << (bit % 8);
                    }
                }
            });
            buffer.write_back();
        }
    }
}

/// 块内第一个为 0 的位
fn first_clear(bitmap: &BitmapBlock) -> Option<usize> {
    bitmap
        .iter()
        .enumerate()
        .find_map(|(byte, &bits)| {
            (bits != u8::MAX).then(|| byte * 8 + bits.trailing_ones() as usize)
        })
}
