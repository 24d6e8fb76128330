use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crate::{
    error::{Result, SimError},
    paging::PAGE_SIZE,
};

pub const BLOCK_SIZE: usize = PAGE_SIZE;

/// Block store backed by a local image file. The file is recreated, zeroed,
/// on every open.
#[derive(Debug)]
pub struct Disk {
    file: File,
    path: PathBuf,
    block_count: usize,
    pub reads: u64,
    pub writes: u64,
}

impl Disk {
    pub fn open(path: impl AsRef<Path>, block_count: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let init_err = |source| SimError::DiskInit {
            path: path.clone(),
            source,
        };

        let len = block_count
            .checked_mul(BLOCK_SIZE)
            .ok_or_else(|| init_err(io::Error::new(io::ErrorKind::InvalidInput, "disk too large")))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(init_err)?;
        file.set_len(len as u64).map_err(init_err)?;

        log::debug!("opened disk {} with {} blocks", path.display(), block_count);

        Ok(Self {
            file,
            path,
            block_count,
            reads: 0,
            writes: 0,
        })
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&mut self, block: usize, buf: &mut [u8]) -> Result<()> {
        self.seek_to(block, buf.len(), "read")?;
        self.file
            .read_exact(buf)
            .map_err(|source| SimError::DiskIo { op: "read", block, source })?;
        self.reads += 1;
        Ok(())
    }

    pub fn write(&mut self, block: usize, buf: &[u8]) -> Result<()> {
        self.seek_to(block, buf.len(), "write")?;
        self.file
            .write_all(buf)
            .map_err(|source| SimError::DiskIo { op: "write", block, source })?;
        self.writes += 1;
        Ok(())
    }

    /// Flushes the image to the filesystem.
    pub fn close(self) -> Result<()> {
        self.file.sync_all().map_err(|source| SimError::DiskClose {
            path: self.path.clone(),
            source,
        })
    }

    fn seek_to(&mut self, block: usize, len: usize, op: &'static str) -> Result<()> {
        if block >= self.block_count || len != BLOCK_SIZE {
            return Err(SimError::DiskIo {
                op,
                block,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("expected a {BLOCK_SIZE}-byte buffer within {} blocks", self.block_count),
                ),
            });
        }
        self.file
            .seek(SeekFrom::Start((block * BLOCK_SIZE) as u64))
            .map_err(|source| SimError::DiskIo { op, block, source })?;
        Ok(())
    }
}
