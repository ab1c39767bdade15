use std::path::PathBuf;

use clap::Parser;
use typed_bytesize::ByteSizeIec;

/// Mount a unix-fs image through FUSE.
#[derive(Parser)]
pub struct Cli {
    /// Backing image file
    pub image: PathBuf,

    /// Mount point
    pub mountpoint: PathBuf,

    /// Create the image if missing and write a fresh filesystem onto it
    #[arg(long)]
    pub format: bool,

    /// Image size used with --format, e.g. "64MiB"
    #[arg(long, default_value = "64MiB")]
    pub size: ByteSizeIec,
}
