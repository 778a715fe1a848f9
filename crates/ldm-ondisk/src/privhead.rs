//! The PRIVHEAD private header.
//!
//! Every LDM disk carries a PRIVHEAD identifying the disk, the disk group
//! it belongs to, and the location of the data and metadata (config) areas.
//! On an MBR disk it sits at sector 6; on a GPT disk, at the last LBA of the
//! LDM metadata partition.

use ldm_types::{
    parse_guid_ascii, read_be_u16, read_be_u64, read_fixed, trim_nul_padded, LdmError, Result,
};
use serde::Serialize;
use uuid::Uuid;

pub const PRIVHEAD_MAGIC: &[u8; 8] = b"PRIVHEAD";

/// Number of bytes a PRIVHEAD read must cover.
pub const PRIVHEAD_LEN: usize = 391;

/// Parsed PRIVHEAD fields consumed downstream.
///
/// The structure also carries timestamps, TOC/log geometry and a disk-set
/// GUID pair; nothing in the read path needs them, so they are not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivHead {
    pub version_major: u16,
    pub version_minor: u16,
    pub disk_guid: Uuid,
    pub disk_group_guid: Uuid,
    pub disk_group_name: String,
    /// Start sector of the data area.
    pub logical_disk_start: u64,
    /// Size of the data area in sectors.
    pub logical_disk_size: u64,
    /// Start sector of the LDM config area.
    pub ldm_config_start: u64,
    /// Size of the LDM config area in sectors.
    pub ldm_config_size: u64,
}

impl PrivHead {
    /// Parse a PRIVHEAD from a buffer of at least [`PRIVHEAD_LEN`] bytes.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let magic = read_fixed::<8>(buf, 0)?;
        if &magic != PRIVHEAD_MAGIC {
            return Err(LdmError::Invalid("PRIVHEAD magic not found".into()));
        }

        let version_major = read_be_u16(buf, 12)?;
        let version_minor = read_be_u16(buf, 14)?;

        let disk_guid_raw = read_fixed::<64>(buf, 48)?;
        let disk_guid = parse_guid_ascii(&disk_guid_raw)
            .map_err(|_| invalid_guid("disk", &disk_guid_raw))?;

        let dg_guid_raw = read_fixed::<64>(buf, 176)?;
        let disk_group_guid = parse_guid_ascii(&dg_guid_raw)
            .map_err(|_| invalid_guid("disk group", &dg_guid_raw))?;

        let disk_group_name = trim_nul_padded(&read_fixed::<32>(buf, 240)?);

        Ok(Self {
            version_major,
            version_minor,
            disk_guid,
            disk_group_guid,
            disk_group_name,
            logical_disk_start: read_be_u64(buf, 283)?,
            logical_disk_size: read_be_u64(buf, 291)?,
            ldm_config_start: read_be_u64(buf, 299)?,
            ldm_config_size: read_be_u64(buf, 307)?,
        })
    }
}

fn invalid_guid(what: &str, raw: &[u8]) -> LdmError {
    LdmError::Invalid(format!(
        "PRIVHEAD contains invalid GUID for {what}: {}",
        trim_nul_padded(raw)
    ))
}
