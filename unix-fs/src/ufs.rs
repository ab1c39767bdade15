//! The filesystem coordinator: region layout, the two allocators, format
//! and open.

use std::io;
use std::sync::Arc;

use crate::data::FileData;
use crate::dir::Directory;
use crate::layout::{Bitmap, BitmapBlock, InodeKind, SuperBlock};
use crate::proxy::{BlockProxy, InodeProxy};
use crate::{unix_now, BlockDevice, FsError, Result};

pub struct UnixFileSystem {
    pub(crate) device: Arc<dyn BlockDevice>,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) data_bitmap: Bitmap,
    pub(crate) inode_block_offset: u32,
    pub(crate) data_block_offset: u32,
    // Scan hints, raised on allocation and lowered on free to bound the
    // first-zero scan. Plain fields: request handling is serialized.
    inode_hint: u32,
    data_hint: u32,
}

impl UnixFileSystem {
    /// The root directory, created by [`format`](Self::format).
    pub const ROOT_INO: u32 = 0;

    /// Write a fresh filesystem onto `device` and return it mounted.
    ///
    /// Lays down the superblock, clears both bitmap regions and creates
    /// inode 0 as the root directory.
    pub fn format(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let total_blocks = device.num_blocks() as u32;
        log::info!("formatting {total_blocks} blocks");

        let mut header = BlockProxy::<SuperBlock>::new(device.clone(), 0)?;
        header.init(total_blocks);
        let inode_block_offset = header.inode_block_offset;
        header.commit()?;

        // Both bitmap regions sit in [1, inode_block_offset).
        for block_id in 1..inode_block_offset {
            let mut bitmap = BlockProxy::<BitmapBlock>::new(device.clone(), block_id as usize)?;
            bitmap.fill_zero();
            bitmap.commit()?;
        }

        let mut fs = Self::open(device)?;

        let root = fs.alloc_inode()?;
        assert_eq!(root, Self::ROOT_INO);
        let mut inode = fs.inode(root)?;
        inode.init(InodeKind::Directory, unix_now());
        inode.commit()?;

        Ok(fs)
    }

    /// Mount an already formatted device.
    pub fn open(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let header = BlockProxy::<SuperBlock>::new(device.clone(), 0)?;
        if !header.is_valid() {
            header.discard();
            return Err(FsError::Disk(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad filesystem magic",
            )));
        }
        let sb = *header;
        header.discard();

        Ok(Self {
            device,
            inode_bitmap: Bitmap::new(sb.inode_bitmap_offset, sb.data_block_bitmap_offset),
            data_bitmap: Bitmap::new(sb.data_block_bitmap_offset, sb.inode_block_offset),
            inode_block_offset: sb.inode_block_offset,
            data_block_offset: sb.data_block_offset,
            inode_hint: 0,
            data_hint: 0,
        })
    }

    pub(crate) fn header(&self) -> io::Result<BlockProxy<SuperBlock>> {
        BlockProxy::new(self.device.clone(), 0)
    }

    /// Read-modify-write cell for one inode.
    pub fn inode(&self, ino: u32) -> io::Result<InodeProxy> {
        InodeProxy::new(self.device.clone(), self.inode_block_offset, ino)
    }

    /// Byte-level view of one file's data.
    pub fn data(&mut self, ino: u32) -> FileData<'_> {
        FileData::new(self, ino)
    }

    /// Entry-level view of one directory.
    pub fn dir(&mut self, ino: u32) -> Directory<'_> {
        Directory::new(self, ino)
    }

    /// Allocate an inode number, or `NoSpace` when the table is full.
    ///
    /// The bitmap block is committed before the superblock counter, so a
    /// crash between the two leaks the inode rather than handing it out
    /// twice.
    pub fn alloc_inode(&mut self) -> Result<u32> {
        let header = self.header()?;
        let free = header.inode_num_free;
        header.discard();
        if free == 0 {
            return Err(FsError::NoSpace);
        }

        let ino = self
            .inode_bitmap
            .first_zero(&self.device, self.inode_hint)?
            .expect("inode bitmap full but free counter non-zero");
        self.inode_bitmap.set(&self.device, ino)?;

        let mut header = self.header()?;
        header.inode_num_free -= 1;
        header.commit()?;

        self.inode_hint = self.inode_hint.max(ino);
        log::debug!("alloc inode {ino}");
        Ok(ino)
    }

    /// Release an inode number. Freeing a free inode is a caller bug.
    pub fn free_inode(&mut self, ino: u32) -> Result<()> {
        log::debug!("free inode {ino}");
        assert!(
            self.inode_bitmap.get(&self.device, ino)?,
            "inode {ino} double free"
        );
        self.inode_bitmap.clear(&self.device, ino)?;

        let mut header = self.header()?;
        header.inode_num_free += 1;
        header.commit()?;

        self.inode_hint = self.inode_hint.min(ino);
        Ok(())
    }

    /// Allocate a data block and return its absolute block number.
    pub fn alloc_data(&mut self) -> Result<u32> {
        let header = self.header()?;
        let free = header.data_block_num_free;
        header.discard();
        if free == 0 {
            return Err(FsError::NoSpace);
        }

        let pos = self
            .data_bitmap
            .first_zero(&self.device, self.data_hint)?
            .expect("data bitmap full but free counter non-zero");
        self.data_bitmap.set(&self.device, pos)?;

        let mut header = self.header()?;
        header.data_block_num_free -= 1;
        header.commit()?;

        self.data_hint = self.data_hint.max(pos);
        log::debug!("alloc data block {}", pos + self.data_block_offset);
        Ok(pos + self.data_block_offset)
    }

    /// Release a data block by absolute block number. Freeing a block
    /// that is free or outside the data region is a caller bug.
    pub fn free_data(&mut self, block_id: u32) -> Result<()> {
        log::debug!("free data block {block_id}");
        assert!(
            block_id >= self.data_block_offset,
            "block {block_id} below the data region"
        );
        let pos = block_id - self.data_block_offset;
        assert!(
            self.data_bitmap.get(&self.device, pos)?,
            "data block {block_id} double free"
        );
        self.data_bitmap.clear(&self.device, pos)?;

        let mut header = self.header()?;
        header.data_block_num_free += 1;
        header.commit()?;

        self.data_hint = self.data_hint.min(pos);
        Ok(())
    }
}
