//! Directories as files of fixed-width entries.

use crate::layout::DirEntry;
use crate::{Result, UnixFileSystem};

/// Entry-level view of one directory inode.
///
/// `erase` swaps the last entry into the vacated slot, so entry order is
/// not preserved and callers must not rely on it. Name uniqueness is a
/// precondition maintained by the path layer, not checked here.
pub struct Directory<'a> {
    fs: &'a mut UnixFileSystem,
    ino: u32,
}

impl<'a> Directory<'a> {
    pub(crate) fn new(fs: &'a mut UnixFileSystem, ino: u32) -> Self {
        Self { fs, ino }
    }

    pub fn len(&self) -> Result<u32> {
        let inode = self.fs.inode(self.ino)?;
        let size = inode.size;
        inode.discard();
        Ok(size / DirEntry::SIZE as u32)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&mut self, index: u32) -> Result<DirEntry> {
        assert!(index < self.len()?);
        let mut entry = DirEntry::default();
        let read = self
            .fs
            .data(self.ino)
            .read(index * DirEntry::SIZE as u32, entry.as_bytes_mut())?;
        assert_eq!(read, DirEntry::SIZE);
        Ok(entry)
    }

    pub fn set(&mut self, index: u32, entry: &DirEntry) -> Result<()> {
        assert!(index < self.len()?);
        let written = self
            .fs
            .data(self.ino)
            .write(index * DirEntry::SIZE as u32, entry.as_bytes())?;
        assert_eq!(written, DirEntry::SIZE);
        Ok(())
    }

    /// Append an entry. On `NoSpace` the directory is left unchanged.
    pub fn push(&mut self, entry: &DirEntry) -> Result<()> {
        let len = self.len()?;
        self.fs
            .data(self.ino)
            .resize((len + 1) * DirEntry::SIZE as u32)?;
        self.set(len, entry)
    }

    /// Remove the entry at `index` by swapping the last entry into it.
    pub fn erase(&mut self, index: u32) -> Result<()> {
        let len = self.len()?;
        assert!(index < len);
        let tail = self.get(len - 1)?;
        self.set(index, &tail)?;
        self.fs
            .data(self.ino)
            .resize((len - 1) * DirEntry::SIZE as u32)
    }

    /// Index and entry of the child called `name`, if present.
    pub fn find(&mut self, name: &str) -> Result<Option<(u32, DirEntry)>> {
        for index in 0..self.len()? {
            let entry = self.get(index)?;
            if entry.name() == name {
                return Ok(Some((index, entry)));
            }
        }
        Ok(None)
    }
}
