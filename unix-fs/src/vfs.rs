//! Path resolution and the operation surface the userspace hook calls.
//!
//! Every operation reduces to a short sequence against the allocators,
//! the file data engine and the directory engine. Paths are absolute;
//! by-inode variants exist for the hook layer, which keeps inode-number
//! handles between `open` and `release`.

use crate::layout::{DirEntry, InodeKind, NAME_MAX_LEN};
use crate::{unix_now, FsError, Result, UnixFileSystem, BLOCK_SIZE};

/// Attributes reported for one inode.
///
/// Mode, link count and ownership are the hook layer's business: it
/// reports 0755 for directories, 0644 for files, a link count of one and
/// the mounting process's uid/gid.
#[derive(Debug, Clone, Copy)]
pub struct FileAttr {
    pub ino: u32,
    pub kind: InodeKind,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

/// Filesystem-wide usage counters.
#[derive(Debug, Clone, Copy)]
pub struct FsStat {
    pub block_size: u32,
    pub data_blocks: u32,
    pub data_blocks_free: u32,
    pub inodes: u32,
    pub inodes_free: u32,
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Split a path into its parent directory and final component.
fn parent_file(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, name)) if !name.is_empty() => Ok((parent, name)),
        _ => Err(FsError::NotFound),
    }
}

impl UnixFileSystem {
    /// Inode of the child `name` inside directory `dir`.
    pub fn lookup(&mut self, dir: u32, name: &str) -> Result<Option<u32>> {
        Ok(self.dir(dir).find(name)?.map(|(_, entry)| entry.inode_id()))
    }

    /// Walk an absolute path from the root. Empty segments are ignored.
    pub fn resolve(&mut self, path: &str) -> Result<u32> {
        let mut ino = Self::ROOT_INO;
        for name in components(path) {
            ino = self.lookup(ino, name)?.ok_or(FsError::NotFound)?;
        }
        Ok(ino)
    }

    pub fn getattr(&mut self, path: &str) -> Result<FileAttr> {
        let ino = self.resolve(path)?;
        self.attr_of(ino)
    }

    pub fn attr_of(&self, ino: u32) -> Result<FileAttr> {
        let inode = self.inode(ino)?;
        let attr = FileAttr {
            ino,
            kind: inode.kind,
            size: inode.size,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        };
        inode.discard();
        Ok(attr)
    }

    /// Create a regular file at `path`.
    pub fn mknod(&mut self, path: &str) -> Result<()> {
        self.make_node(path, InodeKind::File)
    }

    /// Create a directory at `path`. No `.` or `..` entries are stored.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.make_node(path, InodeKind::Directory)
    }

    fn make_node(&mut self, path: &str, kind: InodeKind) -> Result<()> {
        let (parent, name) = parent_file(path)?;
        let dir = self.resolve(parent)?;
        self.create(dir, name, kind).map(|_| ())
    }

    /// Create a child of directory `dir` and return its inode number.
    /// An existing child of the same name is returned as-is.
    pub fn create(&mut self, dir: u32, name: &str, kind: InodeKind) -> Result<u32> {
        log::info!("create {kind:?} {name:?} in inode {dir}");
        if name.len() > NAME_MAX_LEN {
            return Err(FsError::NoSpace);
        }
        if let Some(existing) = self.lookup(dir, name)? {
            return Ok(existing);
        }

        let ino = self.alloc_inode()?;
        let mut inode = self.inode(ino)?;
        inode.init(kind, unix_now());
        inode.commit()?;

        let entry = DirEntry::new(name, ino);
        if let Err(err) = self.dir(dir).push(&entry) {
            // The freshly allocated inode must not leak.
            self.free_inode(ino)?;
            return Err(err);
        }
        Ok(ino)
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, name) = parent_file(path)?;
        let dir = self.resolve(parent)?;
        self.remove(dir, name, false)
    }

    /// Remove a directory. Non-empty directories are refused.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = parent_file(path)?;
        let dir = self.resolve(parent)?;
        self.remove(dir, name, true)
    }

    /// Remove the child `name` of directory `dir`, releasing its data
    /// blocks and its inode.
    pub fn remove(&mut self, dir: u32, name: &str, require_empty: bool) -> Result<()> {
        log::info!("remove {name:?} from inode {dir}");
        let (index, entry) = self.dir(dir).find(name)?.ok_or(FsError::NotFound)?;
        let target = entry.inode_id();

        if require_empty {
            let inode = self.inode(target)?;
            let is_dir = inode.is_dir();
            inode.discard();
            if is_dir && !self.dir(target).is_empty()? {
                return Err(FsError::NotEmpty);
            }
        }

        self.data(target).resize(0)?;
        self.dir(dir).erase(index)?;
        self.free_inode(target)
    }

    /// Move `old` to `new`. Fails with `AlreadyExists` when `new`
    /// already names anything; there are no overwrite semantics.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        log::info!("rename {old:?} -> {new:?}");
        let (old_parent, old_name) = parent_file(old)?;
        let (new_parent, new_name) = parent_file(new)?;
        let old_dir = self.resolve(old_parent)?;
        let new_dir = self.resolve(new_parent)?;
        self.rename_at(old_dir, old_name, new_dir, new_name)
    }

    /// Rename within or across directories. Within one directory the
    /// entry's name field is rewritten in place; across directories the
    /// entry is pushed into the destination first, so a failed push
    /// leaves both directories untouched.
    pub fn rename_at(
        &mut self,
        old_dir: u32,
        old_name: &str,
        new_dir: u32,
        new_name: &str,
    ) -> Result<()> {
        if new_name.len() > NAME_MAX_LEN {
            return Err(FsError::NoSpace);
        }
        let (index, mut entry) = self
            .dir(old_dir)
            .find(old_name)?
            .ok_or(FsError::NotFound)?;
        if self.lookup(new_dir, new_name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        entry.set_name(new_name);
        if old_dir == new_dir {
            self.dir(old_dir).set(index, &entry)
        } else {
            self.dir(new_dir).push(&entry)?;
            self.dir(old_dir).erase(index)
        }
    }

    pub fn truncate(&mut self, path: &str, size: u32) -> Result<()> {
        let ino = self.resolve(path)?;
        self.resize_ino(ino, size)
    }

    pub fn resize_ino(&mut self, ino: u32, size: u32) -> Result<()> {
        self.data(ino).resize(size)
    }

    /// Set access and modification times; `ctime` becomes now.
    pub fn utime(&mut self, path: &str, atime: u32, mtime: u32) -> Result<()> {
        let ino = self.resolve(path)?;
        self.set_times(ino, atime, mtime)
    }

    pub fn set_times(&mut self, ino: u32, atime: u32, mtime: u32) -> Result<()> {
        let mut inode = self.inode(ino)?;
        inode.atime = atime;
        inode.mtime = mtime;
        inode.ctime = unix_now();
        inode.commit()?;
        Ok(())
    }

    /// Open a file or directory, returning the inode-number handle used
    /// by subsequent reads and writes. Release is a no-op.
    pub fn open(&mut self, path: &str) -> Result<u32> {
        self.resolve(path)
    }

    pub fn read_ino(&mut self, ino: u32, offset: u32, buf: &mut [u8]) -> Result<usize> {
        self.data(ino).read(offset, buf)
    }

    /// Write through a handle, growing the file first when the write
    /// extends past the current end.
    pub fn write_ino(&mut self, ino: u32, offset: u32, buf: &[u8]) -> Result<usize> {
        let inode = self.inode(ino)?;
        let size = inode.size;
        inode.discard();

        let end = offset as u64 + buf.len() as u64;
        if end > u32::MAX as u64 {
            return Err(FsError::NoSpace);
        }
        if end > size as u64 {
            self.data(ino).resize(end as u32)?;
        }
        self.data(ino).write(offset, buf)
    }

    /// Directory listing as `(name, inode)` pairs, in storage order.
    pub fn entries(&mut self, dir: u32) -> Result<Vec<(String, u32)>> {
        let mut directory = self.dir(dir);
        let len = directory.len()?;
        let mut out = Vec::with_capacity(len as usize);
        for index in 0..len {
            let entry = directory.get(index)?;
            out.push((entry.name().to_owned(), entry.inode_id()));
        }
        Ok(out)
    }

    pub fn statfs(&self) -> Result<FsStat> {
        let header = self.header()?;
        let stat = FsStat {
            block_size: BLOCK_SIZE as u32,
            data_blocks: header.data_block_num_tot,
            data_blocks_free: header.data_block_num_free,
            inodes: header.inode_num_tot,
            inodes_free: header.inode_num_free,
        };
        header.discard();
        Ok(stat)
    }
}
