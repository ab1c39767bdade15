//! Scoped read-modify-write cells over single blocks and single inodes.
//!
//! A proxy reads its target on construction and holds a private in-memory
//! copy. Nothing reaches the disk until [`commit`](BlockProxy::commit);
//! [`discard`](BlockProxy::discard) abandons the copy instead. Letting a
//! proxy fall out of scope without either panics, so a forgotten
//! write-back cannot pass silently.

use std::io;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::layout::{DiskInode, InodeBlock, INODES_PER_BLOCK};
use crate::BlockDevice;
use crate::BLOCK_SIZE;

/// Buffer aligned for every block view (the widest is `[u64; _]`).
#[repr(C, align(8))]
struct AlignedBlock([u8; BLOCK_SIZE]);

/// One block held in memory, viewed as a `T` with `size_of::<T>()` at
/// most [`BLOCK_SIZE`].
pub struct BlockProxy<T> {
    device: Arc<dyn BlockDevice>,
    block_id: usize,
    data: Box<AlignedBlock>,
    open: bool,
    _view: PhantomData<T>,
}

impl<T> BlockProxy<T> {
    pub fn new(device: Arc<dyn BlockDevice>, block_id: usize) -> io::Result<Self> {
        assert!(mem::size_of::<T>() <= BLOCK_SIZE);
        assert!(mem::align_of::<T>() <= mem::align_of::<AlignedBlock>());
        assert!(
            block_id < device.num_blocks(),
            "block {block_id} out of range"
        );

        let mut data = Box::new(AlignedBlock([0; BLOCK_SIZE]));
        device.read_block(block_id, &mut data.0)?;
        Ok(Self {
            device,
            block_id,
            data,
            open: true,
            _view: PhantomData,
        })
    }

    /// Write the bytes back to disk; only now does the change persist.
    pub fn commit(mut self) -> io::Result<()> {
        self.open = false;
        self.device.write_block(self.block_id, &self.data.0)
    }

    /// Close the proxy without writing anything back.
    pub fn discard(mut self) {
        self.open = false;
    }

    /// Zero the in-memory copy.
    pub fn fill_zero(&mut self) {
        self.data.0.fill(0);
    }
}

impl<T> Deref for BlockProxy<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.data.0.as_ptr().cast() }
    }
}

impl<T> DerefMut for BlockProxy<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.data.0.as_mut_ptr().cast() }
    }
}

impl<T> Drop for BlockProxy<T> {
    fn drop(&mut self) {
        if self.open && !std::thread::panicking() {
            log::error!(
                "block {} proxy dropped without commit or discard",
                self.block_id
            );
            panic!("block proxy dropped without commit or discard");
        }
    }
}

/// One inode held in memory, addressed by inode number.
///
/// Construction locates the inode-table block at
/// `ino / INODES_PER_BLOCK + inode_block_offset` and copies the record at
/// index `ino % INODES_PER_BLOCK` out of it; `commit` writes it back
/// through the same indexing. The commit-or-discard discipline of
/// [`BlockProxy`] applies unchanged.
pub struct InodeProxy {
    device: Arc<dyn BlockDevice>,
    block_id: usize,
    index: usize,
    inode: DiskInode,
    open: bool,
}

impl InodeProxy {
    pub(crate) fn new(
        device: Arc<dyn BlockDevice>,
        inode_block_offset: u32,
        ino: u32,
    ) -> io::Result<Self> {
        let block_id = inode_block_offset as usize + ino as usize / INODES_PER_BLOCK;
        let index = ino as usize % INODES_PER_BLOCK;

        let block = BlockProxy::<InodeBlock>::new(device.clone(), block_id)?;
        let inode = block[index];
        block.discard();

        Ok(Self {
            device,
            block_id,
            index,
            inode,
            open: true,
        })
    }

    /// Write the inode back into its table block.
    pub fn commit(mut self) -> io::Result<()> {
        self.open = false;
        let mut block = BlockProxy::<InodeBlock>::new(self.device.clone(), self.block_id)?;
        block[self.index] = self.inode;
        block.commit()
    }

    /// Close the proxy without writing anything back.
    pub fn discard(mut self) {
        self.open = false;
    }
}

impl Deref for InodeProxy {
    type Target = DiskInode;

    fn deref(&self) -> &DiskInode {
        &self.inode
    }
}

impl DerefMut for InodeProxy {
    fn deref_mut(&mut self) -> &mut DiskInode {
        &mut self.inode
    }
}

impl Drop for InodeProxy {
    fn drop(&mut self) {
        if self.open && !std::thread::panicking() {
            log::error!(
                "inode proxy for block {} slot {} dropped without commit or discard",
                self.block_id,
                self.index
            );
            panic!("inode proxy dropped without commit or discard");
        }
    }
}
