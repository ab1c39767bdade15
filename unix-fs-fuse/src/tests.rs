use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use unix_fs::{UnixFileSystem, BLOCK_SIZE};

use crate::BlockFile;

fn image_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("unix-fs-test-{name}-{}.img", std::process::id()))
}

fn image(path: &PathBuf, blocks: usize) -> BlockFile {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .unwrap();
    file.set_len((blocks * BLOCK_SIZE) as u64).unwrap();
    BlockFile::new(file).unwrap()
}

#[test]
fn format_then_reopen_from_disk() {
    let path = image_path("reopen");
    {
        let device = Arc::new(image(&path, 256));
        let mut fs = UnixFileSystem::format(device).unwrap();
        fs.mknod("/hello").unwrap();
        let ino = fs.open("/hello").unwrap();
        fs.write_ino(ino, 0, b"hi").unwrap();
    }
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let device = Arc::new(BlockFile::new(file).unwrap());
        let mut fs = UnixFileSystem::open(device).unwrap();
        let ino = fs.open("/hello").unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(fs.read_ino(ino, 0, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");
    }
    let _ = std::fs::remove_file(path);
}

#[test]
fn block_file_round_trips_blocks() {
    use unix_fs::BlockDevice;

    let path = image_path("blocks");
    let device = image(&path, 8);

    let payload = [0xA5u8; BLOCK_SIZE];
    device.write_block(3, &payload).unwrap();
    let mut buf = [0u8; BLOCK_SIZE];
    device.read_block(3, &mut buf).unwrap();
    assert_eq!(buf, payload);

    device.read_block(4, &mut buf).unwrap();
    assert_eq!(buf, [0u8; BLOCK_SIZE]);
    assert_eq!(device.num_blocks(), 8);
    let _ = std::fs::remove_file(path);
}
