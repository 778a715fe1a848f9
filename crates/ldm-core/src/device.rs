//! Positional, length-exact reads against an opened device.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::os::unix::fs::{FileExt, FileTypeExt};
use std::path::Path;

use ldm_types::{LdmError, Result};

/// Sector size assumed when the device doesn't tell us otherwise.
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// An opened device (or image file) with its geometry.
#[derive(Debug)]
pub struct Device {
    file: File,
    path: String,
    sector_size: u32,
    len: u64,
}

impl Device {
    /// Open `path` read-only and probe its sector size and byte length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| LdmError::io(format!("opening {} for reading", path.display()), e))?;

        let sector_size = probe_sector_size(path, &file).unwrap_or_else(|| {
            tracing::warn!(
                path = %path.display(),
                "unable to determine sector size, assuming {DEFAULT_SECTOR_SIZE} byte sectors"
            );
            DEFAULT_SECTOR_SIZE
        });

        Self::from_file(file, sector_size, path.display().to_string())
    }

    /// Wrap an already-opened descriptor. The caller supplies the sector
    /// size; `path` is retained for diagnostics and DM table bodies.
    pub fn from_file(mut file: File, sector_size: u32, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        // Regular files and block devices both report their byte length
        // through a seek to the end; positional reads don't use the cursor.
        let len = file
            .seek(SeekFrom::End(0))
            .map_err(|e| LdmError::io(format!("sizing {path}"), e))?;

        Ok(Self {
            file,
            path,
            sector_size,
            len,
        })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Device length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fill `buf` from `offset`, accumulating short reads.
    ///
    /// Hitting end-of-device mid-read is `Invalid` (the metadata pointed
    /// outside the device); any other failure is `Io`.
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut done = 0_usize;
        while done < buf.len() {
            match self.file.read_at(&mut buf[done..], offset + done as u64) {
                Ok(0) => {
                    return Err(LdmError::Invalid(format!(
                        "{} contains invalid LDM metadata (unexpected end of device)",
                        self.path
                    )))
                }
                Ok(n) => done += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(LdmError::io(format!("reading from {}", self.path), e)),
            }
        }
        Ok(())
    }
}

/// Best-effort sector-size discovery through sysfs.
///
/// Whole-disk block devices expose `queue/logical_block_size`; partitions
/// and regular files don't, and fall back to the 512-byte default.
fn probe_sector_size(path: &Path, file: &File) -> Option<u32> {
    let meta = file.metadata().ok()?;
    if !meta.file_type().is_block_device() {
        return Some(DEFAULT_SECTOR_SIZE);
    }

    let name = path.file_name()?.to_str()?;
    let sysfs = format!("/sys/class/block/{name}/queue/logical_block_size");
    let text = std::fs::read_to_string(sysfs).ok()?;
    text.trim().parse().ok()
}
