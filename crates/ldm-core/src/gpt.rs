//! Minimal GPT reader: the header at LBA 1 and the partition entry array.

use ldm_types::{read_le_u32, read_le_u64, LdmError, Result};
use uuid::Uuid;

use crate::device::Device;

const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
const MIN_ENTRY_LEN: u32 = 128;
// A generous cap; real headers declare 128 entries.
const MAX_ENTRIES: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptPartition {
    pub type_guid: Uuid,
    pub first_lba: u64,
    pub last_lba: u64,
}

/// Read the GPT header and return every partition entry.
///
/// Type GUIDs are normalised from their on-disk mixed-endian encoding to
/// canonical form.
pub fn read(dev: &Device) -> Result<Vec<GptPartition>> {
    let sector_size = u64::from(dev.sector_size());
    let mut header = vec![0_u8; dev.sector_size() as usize];
    dev.read_exact_at(&mut header, sector_size)?;

    if &header[..8] != GPT_SIGNATURE {
        return Err(LdmError::Invalid(format!(
            "{} contains an invalid GPT header",
            dev.path()
        )));
    }

    let entries_lba = read_le_u64(&header, 72)?;
    let entry_count = read_le_u32(&header, 80)?;
    let entry_len = read_le_u32(&header, 84)?;

    if entry_len < MIN_ENTRY_LEN || entry_count > MAX_ENTRIES {
        return Err(LdmError::Invalid(format!(
            "GPT header declares {entry_count} entries of {entry_len} bytes"
        )));
    }

    let mut table = vec![0_u8; entry_count as usize * entry_len as usize];
    dev.read_exact_at(&mut table, entries_lba * sector_size)?;

    let mut partitions = Vec::with_capacity(entry_count as usize);
    for i in 0..entry_count as usize {
        let entry = &table[i * entry_len as usize..(i + 1) * entry_len as usize];
        let mut type_raw = [0_u8; 16];
        type_raw.copy_from_slice(&entry[..16]);
        partitions.push(GptPartition {
            type_guid: Uuid::from_bytes_le(type_raw),
            first_lba: read_le_u64(entry, 32)?,
            last_lba: read_le_u64(entry, 40)?,
        });
    }

    Ok(partitions)
}
