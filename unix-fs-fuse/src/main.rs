mod cli;

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fuser::MountOption;
use unix_fs::{UnixFileSystem, BLOCK_SIZE};
use unix_fs_fuse::{BlockFile, UnixFuse};

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut options = OpenOptions::new();
    options.read(true).write(true);
    if cli.format {
        options.create(true);
    }
    let file = options
        .open(&cli.image)
        .with_context(|| format!("opening image {:?}", cli.image))?;

    if cli.format {
        // enough blocks for the superblock, bitmaps and one inode-table
        // block even for absurdly small --size values
        let blocks = (cli.size.0 as usize / BLOCK_SIZE).max(256);
        file.set_len((blocks * BLOCK_SIZE) as u64)?;
    }

    let device = Arc::new(BlockFile::new(file)?);
    let fs = if cli.format {
        UnixFileSystem::format(device)?
    } else {
        UnixFileSystem::open(device)
            .context("not a unix-fs image (pass --format to create one)")?
    };

    log::info!("mounting {:?} on {:?}", cli.image, cli.mountpoint);
    let mount_options = [
        MountOption::FSName("unix-fs".to_owned()),
        MountOption::DefaultPermissions,
    ];
    fuser::mount2(UnixFuse::new(fs), &cli.mountpoint, &mount_options)?;
    Ok(())
}
