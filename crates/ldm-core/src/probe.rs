//! Locate and read the PRIVHEAD, whichever partition-table style the disk
//! uses.

use ldm_ondisk::privhead::{PrivHead, PRIVHEAD_LEN};
use ldm_types::{LdmError, Result};
use uuid::Uuid;

use crate::device::Device;
use crate::{gpt, mbr};

/// GPT partition type of the LDM metadata partition.
pub const LDM_METADATA_GUID: Uuid = Uuid::from_bytes([
    0x58, 0x08, 0xC8, 0xAA, 0x7E, 0x8F, 0x42, 0xE0, 0x85, 0xD2, 0xE1, 0xE9, 0x04, 0x34, 0xCF,
    0xB3,
]);

/// On an MBR disk, the first PRIVHEAD is in sector 6.
const PRIVHEAD_MBR_SECTOR: u64 = 6;

/// Read and parse this disk's PRIVHEAD.
///
/// Whether the disk is MBR or GPT, an MBR is expected at the beginning: a
/// type `0x42` first partition means MBR-style LDM, an EFI protective
/// partition means the LDM metadata partition must be found in the GPT.
/// Anything else is not an LDM disk.
pub fn read_privhead(dev: &Device) -> Result<PrivHead> {
    let mbr = mbr::read(dev)?;

    match mbr.partitions[0].kind {
        mbr::PART_TYPE_WINDOWS_LDM => {
            privhead_at(dev, PRIVHEAD_MBR_SECTOR * u64::from(dev.sector_size()))
        }

        mbr::PART_TYPE_EFI_PROTECTIVE => {
            for pte in gpt::read(dev)? {
                if pte.type_guid == LDM_METADATA_GUID {
                    // PRIVHEAD is in the last LBA of the metadata partition.
                    return privhead_at(dev, pte.last_lba * u64::from(dev.sector_size()));
                }
            }
            Err(LdmError::NotLdm(format!(
                "{} does not contain LDM metadata",
                dev.path()
            )))
        }

        _ => Err(LdmError::NotLdm(format!(
            "{} does not contain LDM metadata",
            dev.path()
        ))),
    }
}

fn privhead_at(dev: &Device, byte_offset: u64) -> Result<PrivHead> {
    let mut buf = [0_u8; PRIVHEAD_LEN];
    dev.read_exact_at(&mut buf, byte_offset)?;
    PrivHead::parse(&buf)
}
