use std::fs::File;
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use unix_fs::{BlockDevice, BLOCK_SIZE};

/// A [`BlockDevice`] backed by a regular file, one block per
/// [`BLOCK_SIZE`] slice of it.
pub struct BlockFile {
    file: Mutex<File>,
    blocks: usize,
}

impl BlockFile {
    /// The file length must be a whole number of blocks.
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len() as usize;
        assert_eq!(len % BLOCK_SIZE, 0, "image is not block aligned");
        Ok(Self {
            file: Mutex::new(file),
            blocks: len / BLOCK_SIZE,
        })
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))?;
        file.read_exact(buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))?;
        file.write_all(buf)
    }

    fn num_blocks(&self) -> usize {
        self.blocks
    }
}
