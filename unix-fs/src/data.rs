//! The file data engine: logical-block mapping, resize with rollback,
//! byte-level read and write for one inode.

use crate::layout::{DataBlock, DiskInode, IndirectBlock};
use crate::proxy::{BlockProxy, InodeProxy};
use crate::{unix_now, FsError, Result, UnixFileSystem, BLOCK_SIZE, POINTERS_PER_BLOCK};

const P: u32 = POINTERS_PER_BLOCK as u32;

/// Byte-level view of one file, addressed by inode number.
pub struct FileData<'a> {
    fs: &'a mut UnixFileSystem,
    ino: u32,
}

impl<'a> FileData<'a> {
    pub(crate) fn new(fs: &'a mut UnixFileSystem, ino: u32) -> Self {
        Self { fs, ino }
    }

    fn table(&self, block_id: u32) -> Result<BlockProxy<IndirectBlock>> {
        Ok(BlockProxy::new(self.fs.device.clone(), block_id as usize)?)
    }

    /// Number of leading non-zero entries in one pointer table.
    fn table_occupancy(&self, block_id: u32) -> Result<u32> {
        let table = self.table(block_id)?;
        let filled = table
            .iter()
            .position(|&p| p == 0)
            .unwrap_or(POINTERS_PER_BLOCK);
        table.discard();
        Ok(filled as u32)
    }

    /// Count of allocated logical blocks, by walking the pointer tree.
    ///
    /// This is the authoritative count; `size / BLOCK_SIZE` only
    /// approximates it because the final block may be partial.
    pub fn block_count(&self) -> Result<u32> {
        let inode = self.fs.inode(self.ino)?;
        let (direct, indirect1, indirect2) = (inode.direct, inode.indirect1, inode.indirect2);
        inode.discard();

        if direct == 0 {
            return Ok(0);
        }
        let mut count = 1;

        if indirect1 == 0 {
            return Ok(count);
        }
        let filled = self.table_occupancy(indirect1)?;
        count += filled;
        if filled < P || indirect2 == 0 {
            return Ok(count);
        }

        let top = self.table(indirect2)?;
        let tables = top
            .iter()
            .position(|&p| p == 0)
            .unwrap_or(POINTERS_PER_BLOCK) as u32;
        let last = if tables > 0 {
            top[tables as usize - 1]
        } else {
            0
        };
        top.discard();
        if tables == 0 {
            return Ok(count);
        }
        // Every full second-level table contributes P blocks; the last
        // non-zero one may be partial and is scanned for its occupancy.
        count += (tables - 1) * P + self.table_occupancy(last)?;
        Ok(count)
    }

    /// Physical block holding logical block `index`.
    ///
    /// Every pointer on the path must already be allocated; a zero
    /// pointer here means the caller asked for an unallocated block.
    pub fn block_at(&self, index: u32) -> Result<u32> {
        let inode = self.fs.inode(self.ino)?;
        let (direct, indirect1, indirect2) = (inode.direct, inode.indirect1, inode.indirect2);
        inode.discard();

        if index == 0 {
            assert_ne!(direct, 0, "inode {}: direct block unallocated", self.ino);
            return Ok(direct);
        }
        if index < 1 + P {
            assert_ne!(
                indirect1, 0,
                "inode {}: indirect table unallocated",
                self.ino
            );
            let table = self.table(indirect1)?;
            let block = table[(index - 1) as usize];
            table.discard();
            assert_ne!(block, 0, "inode {}: block {index} unallocated", self.ino);
            return Ok(block);
        }

        assert_ne!(
            indirect2, 0,
            "inode {}: double-indirect table unallocated",
            self.ino
        );
        let offset = index - (1 + P);
        let (hi, lo) = (offset / P, offset % P);
        let top = self.table(indirect2)?;
        let second = top[hi as usize];
        top.discard();
        assert_ne!(
            second, 0,
            "inode {}: second-level table {hi} unallocated",
            self.ino
        );
        let table = self.table(second)?;
        let block = table[lo as usize];
        table.discard();
        assert_ne!(block, 0, "inode {}: block {index} unallocated", self.ino);
        Ok(block)
    }

    /// Grow or shrink the file to hold exactly `new_size` bytes.
    ///
    /// Runs one block at a time. When an allocation fails mid-grow, the
    /// pointer state reached so far is committed and the file is shrunk
    /// back to its original size before `NoSpace` is returned. The
    /// shrink path only frees, so the rollback itself cannot run out of
    /// space.
    pub fn resize(&mut self, new_size: u32) -> Result<()> {
        let need = DiskInode::count_data_blocks(new_size);
        let mut now = self.block_count()?;

        let mut inode = self.fs.inode(self.ino)?;
        inode.ctime = unix_now();
        let orig_size = inode.size;

        while now != need {
            let step = if now < need {
                self.grow_one(&mut inode, now)
            } else {
                self.shrink_one(&mut inode, now)
            };
            match step {
                Ok(()) => now = if now < need { now + 1 } else { now - 1 },
                Err(FsError::NoSpace) => {
                    log::error!(
                        "inode {}: resize to {new_size} out of space, rolling back",
                        self.ino
                    );
                    inode.commit()?;
                    self.resize(orig_size)?;
                    return Err(FsError::NoSpace);
                }
                Err(err) => {
                    inode.discard();
                    return Err(err);
                }
            }
        }

        inode.size = new_size;
        inode.commit()?;
        Ok(())
    }

    /// Allocate and install the next logical block, given the current
    /// count `k`. Pointer tables are allocated lazily and zeroed before
    /// first use; a failed allocation unwinds any table created by this
    /// step before reporting `NoSpace`.
    fn grow_one(&mut self, inode: &mut InodeProxy, k: u32) -> Result<()> {
        if k == 0 {
            inode.direct = self.fs.alloc_data()?;
        } else if k < 1 + P {
            let slot = k - 1;
            let mut fresh_table = false;
            if slot == 0 {
                let table_block = self.fs.alloc_data()?;
                self.zero_block(table_block)?;
                inode.indirect1 = table_block;
                fresh_table = true;
            }
            let data = match self.fs.alloc_data() {
                Ok(block) => block,
                Err(err) => {
                    if fresh_table {
                        self.fs.free_data(inode.indirect1)?;
                        inode.indirect1 = 0;
                    }
                    return Err(err);
                }
            };
            let mut table = self.table(inode.indirect1)?;
            table[slot as usize] = data;
            table.commit()?;
        } else {
            let offset = k - (1 + P);
            let (hi, lo) = (offset / P, offset % P);
            let mut fresh_top = false;
            let mut fresh_second = false;
            if lo == 0 {
                if hi == 0 {
                    let top_block = self.fs.alloc_data()?;
                    self.zero_block(top_block)?;
                    inode.indirect2 = top_block;
                    fresh_top = true;
                }
                let second = match self.fs.alloc_data() {
                    Ok(block) => block,
                    Err(err) => {
                        if fresh_top {
                            self.fs.free_data(inode.indirect2)?;
                            inode.indirect2 = 0;
                        }
                        return Err(err);
                    }
                };
                self.zero_block(second)?;
                let mut top = self.table(inode.indirect2)?;
                top[hi as usize] = second;
                top.commit()?;
                fresh_second = true;
            }
            let data = match self.fs.alloc_data() {
                Ok(block) => block,
                Err(err) => {
                    if fresh_second {
                        let mut top = self.table(inode.indirect2)?;
                        let second = top[hi as usize];
                        top[hi as usize] = 0;
                        top.commit()?;
                        self.fs.free_data(second)?;
                    }
                    if fresh_top {
                        self.fs.free_data(inode.indirect2)?;
                        inode.indirect2 = 0;
                    }
                    return Err(err);
                }
            };
            let top = self.table(inode.indirect2)?;
            let second = top[hi as usize];
            top.discard();
            let mut table = self.table(second)?;
            table[lo as usize] = data;
            table.commit()?;
        }
        Ok(())
    }

    /// Free the last allocated logical block, given the current count
    /// `k`, collapsing pointer tables that become empty.
    fn shrink_one(&mut self, inode: &mut InodeProxy, k: u32) -> Result<()> {
        let last = k - 1;
        if last == 0 {
            self.fs.free_data(inode.direct)?;
            inode.direct = 0;
        } else if last < 1 + P {
            let slot = last - 1;
            let mut table = self.table(inode.indirect1)?;
            let block = table[slot as usize];
            table[slot as usize] = 0;
            table.commit()?;
            self.fs.free_data(block)?;
            if slot == 0 {
                self.fs.free_data(inode.indirect1)?;
                inode.indirect1 = 0;
            }
        } else {
            let offset = last - (1 + P);
            let (hi, lo) = (offset / P, offset % P);
            let top = self.table(inode.indirect2)?;
            let second = top[hi as usize];
            top.discard();

            let mut table = self.table(second)?;
            let block = table[lo as usize];
            table[lo as usize] = 0;
            table.commit()?;
            self.fs.free_data(block)?;

            if lo == 0 {
                self.fs.free_data(second)?;
                let mut top = self.table(inode.indirect2)?;
                top[hi as usize] = 0;
                top.commit()?;
                if hi == 0 {
                    self.fs.free_data(inode.indirect2)?;
                    inode.indirect2 = 0;
                }
            }
        }
        Ok(())
    }

    fn zero_block(&self, block_id: u32) -> Result<()> {
        let mut block = BlockProxy::<DataBlock>::new(self.fs.device.clone(), block_id as usize)?;
        block.fill_zero();
        block.commit()?;
        Ok(())
    }

    /// Read into `buf` from byte `offset`, clamped at end of file.
    /// Returns the number of bytes copied.
    pub fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let mut inode = self.fs.inode(self.ino)?;
        inode.atime = unix_now();
        let size = inode.size;
        inode.commit()?;

        let start = offset as usize;
        let end = (start + buf.len()).min(size as usize);
        if start >= end {
            return Ok(0);
        }

        let mut pos = start;
        while pos < end {
            let index = pos / BLOCK_SIZE;
            let block_end = ((index + 1) * BLOCK_SIZE).min(end);
            let in_block = pos % BLOCK_SIZE;
            let len = block_end - pos;

            let block_id = self.block_at(index as u32)?;
            let block = BlockProxy::<DataBlock>::new(self.fs.device.clone(), block_id as usize)?;
            buf[pos - start..block_end - start].copy_from_slice(&block[in_block..in_block + len]);
            block.discard();

            pos = block_end;
        }
        Ok(end - start)
    }

    /// Write `buf` at byte `offset`. Bytes past the current end of file
    /// are silently dropped; growth happens in `resize`, not here.
    pub fn write(&mut self, offset: u32, buf: &[u8]) -> Result<usize> {
        let mut inode = self.fs.inode(self.ino)?;
        inode.mtime = unix_now();
        let size = inode.size;
        inode.commit()?;

        if offset as u64 + buf.len() as u64 > size as u64 {
            log::warn!("inode {}: write past end of file truncated", self.ino);
        }
        let start = (offset as usize).min(size as usize);
        let end = (offset as usize + buf.len()).min(size as usize);
        if start >= end {
            return Ok(0);
        }

        let mut pos = start;
        while pos < end {
            let index = pos / BLOCK_SIZE;
            let block_end = ((index + 1) * BLOCK_SIZE).min(end);
            let in_block = pos % BLOCK_SIZE;
            let len = block_end - pos;

            let block_id = self.block_at(index as u32)?;
            let mut block =
                BlockProxy::<DataBlock>::new(self.fs.device.clone(), block_id as usize)?;
            block[in_block..in_block + len].copy_from_slice(&buf[pos - start..block_end - start]);
            block.commit()?;

            pos = block_end;
        }
        Ok(end - start)
    }
}
