//! FUSE adapter: translates kernel requests into engine calls.
//!
//! FUSE numbers the root inode 1 while the engine numbers it 0, so inode
//! numbers are shifted by one across this boundary. The engine stores no
//! `.` or `..` entries; directory listings synthesize them. Handles
//! returned by `open`/`opendir` are the (FUSE) inode numbers themselves
//! and `release`/`releasedir` are no-ops.

use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use unix_fs::{FsError, InodeKind, UnixFileSystem, BLOCK_SIZE, NAME_MAX_LEN};

const TTL: Duration = Duration::from_secs(1);

pub struct UnixFuse {
    fs: UnixFileSystem,
}

fn engine_ino(ino: u64) -> u32 {
    (ino - 1) as u32
}

fn timestamp(secs: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs as u64)
}

fn unix_secs(time: SystemTime) -> u32 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn resolve_time(requested: Option<TimeOrNow>, current: u32) -> u32 {
    match requested {
        None => current,
        Some(TimeOrNow::Now) => unix_secs(SystemTime::now()),
        Some(TimeOrNow::SpecificTime(time)) => unix_secs(time),
    }
}

impl UnixFuse {
    pub fn new(fs: UnixFileSystem) -> Self {
        Self { fs }
    }

    fn attr(&self, ino: u32, uid: u32, gid: u32) -> Result<FileAttr, FsError> {
        let attr = self.fs.attr_of(ino)?;
        let kind = match attr.kind {
            InodeKind::Directory => FileType::Directory,
            InodeKind::File => FileType::RegularFile,
        };
        Ok(FileAttr {
            ino: ino as u64 + 1,
            size: attr.size as u64,
            blocks: (attr.size as u64).div_ceil(BLOCK_SIZE as u64),
            atime: timestamp(attr.atime),
            mtime: timestamp(attr.mtime),
            ctime: timestamp(attr.ctime),
            crtime: timestamp(attr.ctime),
            kind,
            perm: if kind == FileType::Directory {
                0o755
            } else {
                0o644
            },
            nlink: 1,
            uid,
            gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        })
    }

    fn make_node(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        kind: InodeKind,
        reply: ReplyEntry,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.create(engine_ino(parent), name, kind) {
            Ok(ino) => match self.attr(ino, req.uid(), req.gid()) {
                Ok(attr) => reply.entry(&TTL, &attr, 0),
                Err(err) => reply.error(err.errno()),
            },
            Err(err) => reply.error(err.errno()),
        }
    }

    fn remove_node(&mut self, parent: u64, name: &OsStr, require_empty: bool, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.remove(engine_ino(parent), name, require_empty) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }
}

impl Filesystem for UnixFuse {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.lookup(engine_ino(parent), name) {
            Ok(Some(ino)) => match self.attr(ino, req.uid(), req.gid()) {
                Ok(attr) => reply.entry(&TTL, &attr, 0),
                Err(err) => reply.error(err.errno()),
            },
            Ok(None) => reply.error(libc::ENOENT),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.attr(engine_ino(ino), req.uid(), req.gid()) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let ino = engine_ino(ino);
        if let Some(size) = size {
            if size > u32::MAX as u64 {
                reply.error(libc::EFBIG);
                return;
            }
            if let Err(err) = self.fs.resize_ino(ino, size as u32) {
                reply.error(err.errno());
                return;
            }
        }
        if atime.is_some() || mtime.is_some() {
            let current = match self.fs.attr_of(ino) {
                Ok(attr) => attr,
                Err(err) => {
                    reply.error(err.errno());
                    return;
                }
            };
            let atime = resolve_time(atime, current.atime);
            let mtime = resolve_time(mtime, current.mtime);
            if let Err(err) = self.fs.set_times(ino, atime, mtime) {
                reply.error(err.errno());
                return;
            }
        }
        match self.attr(ino, req.uid(), req.gid()) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        self.make_node(req, parent, name, InodeKind::File, reply);
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        self.make_node(req, parent, name, InodeKind::Directory, reply);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.remove_node(parent, name, false, reply);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.remove_node(parent, name, true, reply);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(name), Some(newname)) = (name.to_str(), newname.to_str()) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self
            .fs
            .rename_at(engine_ino(parent), name, engine_ino(newparent), newname)
        {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(ino, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 || offset > u32::MAX as i64 {
            reply.error(libc::EINVAL);
            return;
        }
        let mut buf = vec![0u8; size as usize];
        match self.fs.read_ino(engine_ino(ino), offset as u32, &mut buf) {
            Ok(read) => reply.data(&buf[..read]),
            Err(err) => reply.error(err.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 || offset > u32::MAX as i64 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.fs.write_ino(engine_ino(ino), offset as u32, data) {
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(ino, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.fs.entries(engine_ino(ino)) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        // `..` points at the directory itself; the engine does not track
        // parents and the kernel only needs the name to exist
        let mut listing: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_owned()),
            (ino, FileType::Directory, "..".to_owned()),
        ];
        for (name, child) in entries {
            let kind = match self.fs.attr_of(child) {
                Ok(attr) if attr.kind == InodeKind::Directory => FileType::Directory,
                Ok(_) => FileType::RegularFile,
                Err(err) => {
                    reply.error(err.errno());
                    return;
                }
            };
            listing.push((child as u64 + 1, kind, name));
        }

        for (cursor, (child, kind, name)) in
            listing.into_iter().enumerate().skip(offset as usize)
        {
            if reply.add(child, (cursor + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match self.fs.statfs() {
            Ok(stat) => reply.statfs(
                stat.data_blocks as u64,
                stat.data_blocks_free as u64,
                stat.data_blocks_free as u64,
                stat.inodes as u64,
                stat.inodes_free as u64,
                stat.block_size,
                NAME_MAX_LEN as u32,
                stat.block_size,
            ),
            Err(err) => reply.error(err.errno()),
        }
    }
}
