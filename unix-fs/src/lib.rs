//! A Unix-style filesystem stored inside a single fixed-size block image.
//!
//! Layered bottom-up:
//! 1. block device interface: whole-block reads and writes ([`BlockDevice`])
//! 2. block proxies: scoped read-modify-write cells over one block or one
//!    inode, with an explicit commit-or-discard discipline
//! 3. on-disk structures: superblock, bitmaps, inode table, directory entries
//! 4. the filesystem coordinator: region layout, allocators, format and open
//! 5. file data and directory engines, path resolution, and the operation
//!    surface the userspace hook calls

mod block_dev;
mod data;
mod dir;
mod error;
mod layout;
mod proxy;
mod ufs;
mod vfs;


pub use self::block_dev::BlockDevice;
pub use self::data::FileData;
pub use self::dir::Directory;
pub use self::error::FsError;
pub use self::layout::{DirEntry, DiskInode, InodeKind, SuperBlock, NAME_MAX_LEN};
pub use self::proxy::{BlockProxy, InodeProxy};
pub use self::ufs::UnixFileSystem;
pub use self::vfs::{FileAttr, FsStat};

/// Magic number identifying a formatted image.
pub const MAGIC: u32 = 0x1926_0817;
/// Unit of device I/O in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// Bits held by one bitmap block.
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;
/// Pointer entries held by one indirect block.
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;

pub(crate) type Result<T> = core::result::Result<T, FsError>;

/// Seconds since the epoch, as stored in inode timestamps.
pub(crate) fn unix_now() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
