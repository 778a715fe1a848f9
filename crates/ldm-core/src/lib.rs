#![forbid(unsafe_code)]
//! Discovery and assembly of Windows LDM (dynamic disk) disk groups.
//!
//! Feed each member device to [`Ldm::add`] (or [`Ldm::add_file`] with an
//! already-opened descriptor); the handle merges the metadata found on every
//! disk into per-group topologies, available through
//! [`Ldm::disk_groups`]. Reading is the only thing this crate ever does to
//! a device.
//!
//! ```no_run
//! use ldm_core::Ldm;
//!
//! let mut ldm = Ldm::new();
//! ldm.add("/dev/sda")?;
//! ldm.add("/dev/sdb")?;
//! for dg in ldm.disk_groups() {
//!     println!("{} ({})", dg.name, dg.guid);
//! }
//! # Ok::<(), ldm_types::LdmError>(())
//! ```

pub mod device;
pub mod gpt;
pub mod group;
pub mod mbr;
pub mod probe;

use std::fs::File;
use std::path::Path;

use ldm_ondisk::privhead::PrivHead;
use ldm_ondisk::{toc, vblk};
use ldm_types::{LdmError, Result};

pub use device::Device;
pub use group::{Component, Disk, DiskDevice, DiskGroup, Partition, Volume};
pub use ldm_ondisk::{ComponentKind, VolumeKind};
pub use ldm_types::LdmError as Error;

/// A set of disk groups assembled from the devices added so far.
#[derive(Debug, Default)]
pub struct Ldm {
    disk_groups: Vec<DiskGroup>,
}

impl Ldm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The disk groups seen so far, in the order first encountered.
    #[must_use]
    pub fn disk_groups(&self) -> &[DiskGroup] {
        &self.disk_groups
    }

    #[must_use]
    pub fn disk_group_by_guid(&self, guid: uuid::Uuid) -> Option<&DiskGroup> {
        self.disk_groups.iter().find(|g| g.guid == guid)
    }

    /// Open `path` and merge its LDM metadata into the handle.
    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.add_device(Device::open(path)?)
    }

    /// Merge the LDM metadata of an already-opened device.
    ///
    /// `path` is what DM tables will name as the underlying device.
    pub fn add_file(&mut self, file: File, sector_size: u32, path: impl Into<String>) -> Result<()> {
        self.add_device(Device::from_file(file, sector_size, path)?)
    }

    /// On failure the handle is left exactly as it was: a new group is only
    /// installed after its whole VBLK stream assembles, and the disk's
    /// device fields are only refreshed on the success path.
    fn add_device(&mut self, dev: Device) -> Result<()> {
        let ph = probe::read_privhead(&dev)?;
        let config = read_config(&dev, &ph)?;
        let (vmdb, vmdb_offset) = toc::find_vmdb(&config, dev.sector_size())?;

        let group_idx = match self
            .disk_groups
            .iter()
            .position(|g| g.guid == ph.disk_group_guid)
        {
            Some(idx) => {
                // Already parsed from another member; this disk only has to
                // agree on the committed sequence.
                let dg = &self.disk_groups[idx];
                if vmdb.committed_seq != dg.sequence {
                    return Err(LdmError::Inconsistent(format!(
                        "members of disk group {} are inconsistent: disk {} has committed \
                         sequence {}, group has committed sequence {}",
                        dg.guid,
                        dev.path(),
                        vmdb.committed_seq,
                        dg.sequence
                    )));
                }
                idx
            }
            None => {
                tracing::debug!(guid = %ph.disk_group_guid, "found new disk group");
                let records = vblk::parse_records(&config, vmdb_offset, &vmdb)?;
                let dg = DiskGroup::assemble(ph.disk_group_guid, &vmdb, records)?;
                self.disk_groups.push(dg);
                self.disk_groups.len() - 1
            }
        };

        // Locate this physical disk's record and fill in where it lives.
        let attached = self.disk_groups[group_idx].attach_device(
            ph.disk_guid,
            group::DiskDevice {
                path: dev.path().to_string(),
                data_start: ph.logical_disk_start,
                data_size: ph.logical_disk_size,
                metadata_start: ph.ldm_config_start,
                metadata_size: ph.ldm_config_size,
            },
        );
        if !attached {
            tracing::warn!(
                path = dev.path(),
                disk_guid = %ph.disk_guid,
                "device matches no disk record of its disk group"
            );
        }

        Ok(())
    }
}

/// Read the whole LDM config region into memory.
fn read_config(dev: &Device, ph: &PrivHead) -> Result<Vec<u8>> {
    let sector_size = u64::from(dev.sector_size());
    let start = ph
        .ldm_config_start
        .checked_mul(sector_size)
        .ok_or_else(|| LdmError::Invalid("LDM config start overflows".into()))?;
    let size = ph
        .ldm_config_size
        .checked_mul(sector_size)
        .ok_or_else(|| LdmError::Invalid("LDM config size overflows".into()))?;

    if start > dev.len() {
        return Err(LdmError::Invalid(format!(
            "LDM config start ({start:#x}) is outside the device {}",
            dev.path()
        )));
    }
    if start.checked_add(size).map_or(true, |end| end > dev.len()) {
        return Err(LdmError::Invalid(format!(
            "LDM config end ({start:#x}+{size:#x}) is outside the device {}",
            dev.path()
        )));
    }

    let len = usize::try_from(size)
        .map_err(|_| LdmError::Invalid("LDM config size exceeds address space".into()))?;
    let mut config = vec![0_u8; len];
    dev.read_exact_at(&mut config, start)?;
    Ok(config)
}
