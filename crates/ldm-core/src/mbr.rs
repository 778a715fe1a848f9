//! Minimal MBR reader: just enough to classify the disk.

use ldm_types::{read_le_u32, LdmError, Result};

use crate::device::Device;

/// Partition type byte of a Windows LDM data partition.
pub const PART_TYPE_WINDOWS_LDM: u8 = 0x42;
/// Partition type byte of an EFI protective partition.
pub const PART_TYPE_EFI_PROTECTIVE: u8 = 0xEE;

const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
const PART_TABLE_OFFSET: usize = 446;
const PART_ENTRY_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrPartition {
    pub boot_flag: u8,
    /// Partition type byte.
    pub kind: u8,
    pub first_lba: u32,
    pub sectors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mbr {
    pub partitions: [MbrPartition; 4],
}

/// Read and validate the MBR in sector 0.
pub fn read(dev: &Device) -> Result<Mbr> {
    let mut sector = [0_u8; 512];
    dev.read_exact_at(&mut sector, 0)?;

    if sector[510..512] != BOOT_SIGNATURE {
        return Err(LdmError::Invalid(
            "didn't detect a partition table".into(),
        ));
    }

    let mut partitions = [MbrPartition {
        boot_flag: 0,
        kind: 0,
        first_lba: 0,
        sectors: 0,
    }; 4];
    for (i, part) in partitions.iter_mut().enumerate() {
        let off = PART_TABLE_OFFSET + i * PART_ENTRY_LEN;
        *part = MbrPartition {
            boot_flag: sector[off],
            kind: sector[off + 4],
            first_lba: read_le_u32(&sector, off + 8)?,
            sectors: read_le_u32(&sector, off + 12)?,
        };
    }

    Ok(Mbr { partitions })
}
