use crate::layout::INODES_PER_BLOCK;
use crate::{BLOCK_BITS, MAGIC};

/// Block 0. Describes the four regions that follow it.
///
/// All fields are little-endian u32; offsets are in blocks.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SuperBlock {
    magic: u32,
    pub inode_num_tot: u32,
    pub inode_num_free: u32,
    pub inode_bitmap_offset: u32,
    pub inode_block_offset: u32,
    pub data_block_num_tot: u32,
    pub data_block_num_free: u32,
    pub data_block_bitmap_offset: u32,
    pub data_block_offset: u32,
}

impl SuperBlock {
    /// Compute the layout for a device of `total_blocks` blocks.
    ///
    /// One inode is provisioned per device block, rounded down to whole
    /// inode-table blocks; each bitmap is sized to cover its region. The
    /// regions tile the device exactly.
    pub fn init(&mut self, total_blocks: u32) {
        let mut avail = total_blocks - 1;
        let inode_blocks = avail / INODES_PER_BLOCK as u32;
        let inode_num_tot = inode_blocks * INODES_PER_BLOCK as u32;
        let inode_bitmap_blocks = inode_num_tot.div_ceil(BLOCK_BITS as u32);
        let inode_bitmap_offset = 1;
        let data_block_bitmap_offset = inode_bitmap_offset + inode_bitmap_blocks;
        avail -= inode_blocks + inode_bitmap_blocks;
        let data_block_bitmap_blocks = avail.div_ceil(BLOCK_BITS as u32);
        let data_block_num_tot = avail - data_block_bitmap_blocks;
        let inode_block_offset = data_block_bitmap_offset + data_block_bitmap_blocks;
        let data_block_offset = inode_block_offset + inode_blocks;

        *self = Self {
            magic: MAGIC,
            inode_num_tot,
            inode_num_free: inode_num_tot,
            inode_bitmap_offset,
            inode_block_offset,
            data_block_num_tot,
            data_block_num_free: data_block_num_tot,
            data_block_bitmap_offset,
            data_block_offset,
        };
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_for(total_blocks: u32) -> SuperBlock {
        let mut sb = SuperBlock {
            magic: 0,
            inode_num_tot: 0,
            inode_num_free: 0,
            inode_bitmap_offset: 0,
            inode_block_offset: 0,
            data_block_num_tot: 0,
            data_block_num_free: 0,
            data_block_bitmap_offset: 0,
            data_block_offset: 0,
        };
        sb.init(total_blocks);
        sb
    }

    #[test]
    fn regions_tile_the_device() {
        for total in [256, 1024, 2048, 65536] {
            let sb = layout_for(total);
            assert!(sb.is_valid());
            assert_eq!(sb.inode_bitmap_offset, 1);
            assert!(sb.inode_bitmap_offset < sb.data_block_bitmap_offset);
            assert!(sb.data_block_bitmap_offset < sb.inode_block_offset);
            assert!(sb.inode_block_offset < sb.data_block_offset);
            assert_eq!(sb.data_block_offset + sb.data_block_num_tot, total);
            assert_eq!(sb.inode_num_free, sb.inode_num_tot);
            assert_eq!(sb.data_block_num_free, sb.data_block_num_tot);
        }
    }

    #[test]
    fn small_disk_layout() {
        let sb = layout_for(1024);
        // 1023 usable blocks: 7 inode-table blocks of 128 inodes each,
        // one block per bitmap.
        assert_eq!(sb.inode_num_tot, 896);
        assert_eq!(sb.data_block_bitmap_offset, 2);
        assert_eq!(sb.inode_block_offset, 3);
        assert_eq!(sb.data_block_offset, 10);
        assert_eq!(sb.data_block_num_tot, 1014);
    }
}
