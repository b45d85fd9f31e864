//! # File-Backed Shared Regions
//!
//! Each region is a file of exactly `capacity` bytes inside one directory
//! (typically on a tmpfs such as `/dev/shm`). Any process that opens the
//! same directory can map a region from its descriptor name alone.
//!
//! Region names carry a per-provider random prefix, so two servers sharing
//! a directory never collide.

use crate::ports::outbound::{RegionError, RegionMemory, RegionProvider, RegionView};
use memmap2::{MmapOptions, MmapRaw};
use shared_types::{AccessMode, RegionDescriptor};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

struct MmapMemory {
    raw: MmapRaw,
}

// SAFETY: `MmapRaw` keeps the mapping alive until dropped.
unsafe impl RegionMemory for MmapMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.raw.as_mut_ptr()
    }

    fn mapped_len(&self) -> usize {
        self.raw.len()
    }
}

/// Regions as memory-mapped files under one directory.
#[derive(Debug)]
pub struct MmapRegionProvider {
    dir: PathBuf,
    prefix: String,
    next_region: AtomicU64,
}

impl MmapRegionProvider {
    /// Opens (and creates if needed) the region directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RegionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir.display().to_string(), e))?;
        let mut prefix = uuid::Uuid::new_v4().simple().to_string();
        prefix.truncate(12);
        Ok(Self {
            dir,
            prefix: format!("os-{}", prefix),
            next_region: AtomicU64::new(0),
        })
    }

    /// Directory holding the region files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, region: &RegionDescriptor) -> Result<PathBuf, RegionError> {
        // Names come from the wire; never let one escape the directory.
        if region.name.is_empty()
            || region.name.contains(['/', '\\'])
            || region.name.starts_with('.')
        {
            return Err(RegionError::NotFound {
                name: region.name.clone(),
            });
        }
        Ok(self.dir.join(&region.name))
    }
}

fn io_error(name: &str, err: io::Error) -> RegionError {
    if err.kind() == io::ErrorKind::NotFound {
        RegionError::NotFound {
            name: name.to_string(),
        }
    } else {
        RegionError::Io {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

impl RegionProvider for MmapRegionProvider {
    fn create_region(&self, capacity: usize) -> Result<RegionDescriptor, RegionError> {
        let id = self.next_region.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.prefix, id);
        let path = self.dir.join(&name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| io_error(&name, e))?;
        file.set_len(capacity as u64).map_err(|e| io_error(&name, e))?;

        debug!(region = %name, capacity, "region created");
        Ok(RegionDescriptor { name, capacity })
    }

    fn map(&self, region: &RegionDescriptor, mode: AccessMode) -> Result<RegionView, RegionError> {
        let path = self.path_of(region)?;
        let file: File = OpenOptions::new()
            .read(true)
            .write(mode == AccessMode::Write)
            .open(&path)
            .map_err(|e| io_error(&region.name, e))?;

        let on_disk = file
            .metadata()
            .map_err(|e| io_error(&region.name, e))?
            .len();
        if on_disk < region.capacity as u64 {
            return Err(RegionError::OutOfBounds {
                offset: 0,
                len: region.capacity,
                capacity: on_disk as usize,
            });
        }
        if region.capacity == 0 {
            return Err(RegionError::Io {
                name: region.name.clone(),
                message: "cannot map an empty region".to_string(),
            });
        }

        let mut options = MmapOptions::new();
        options.len(region.capacity);
        let raw = match mode {
            AccessMode::Write => options.map_raw(&file),
            AccessMode::Read => options.map_raw_read_only(&file),
        }
        .map_err(|e| io_error(&region.name, e))?;

        Ok(RegionView::new(
            region.clone(),
            mode,
            Arc::new(MmapMemory { raw }),
        ))
    }

    fn destroy_region(&self, region: &RegionDescriptor) -> Result<(), RegionError> {
        let path = self.path_of(region)?;
        fs::remove_file(&path).map_err(|e| io_error(&region.name, e))?;
        debug!(region = %region.name, "region destroyed");
        Ok(())
    }
}
