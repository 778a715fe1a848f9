//! TOCBLOCK and VMDB: the index structures of the LDM config area.

use ldm_types::{
    read_be_u16, read_be_u32, read_be_u64, read_fixed, trim_nul_padded, LdmError, Result,
};
use serde::Serialize;

pub const TOCBLOCK_MAGIC: &[u8; 8] = b"TOCBLOCK";
pub const VMDB_MAGIC: &[u8; 4] = b"VMDB";

pub const TOCBLOCK_LEN: usize = 104;
pub const VMDB_LEN: usize = 197;

/// A named region descriptor inside the TOCBLOCK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocBitmap {
    pub name: String,
    pub flags: u16,
    /// Start sector, relative to the beginning of the config area.
    pub start: u64,
    pub size: u64,
}

/// The table-of-contents block, 2 sectors into the config area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocBlock {
    pub seq1: u32,
    pub seq2: u32,
    pub bitmaps: [TocBitmap; 2],
}

impl TocBlock {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let magic = read_fixed::<8>(buf, 0)?;
        if &magic != TOCBLOCK_MAGIC {
            return Err(LdmError::Invalid(
                "TOCBLOCK not found 2 sectors into the config area".into(),
            ));
        }

        let bitmap = |off: usize| -> Result<TocBitmap> {
            Ok(TocBitmap {
                name: trim_nul_padded(&read_fixed::<8>(buf, off)?),
                flags: read_be_u16(buf, off + 8)?,
                start: read_be_u64(buf, off + 10)?,
                size: read_be_u64(buf, off + 18)?,
            })
        };

        Ok(Self {
            seq1: read_be_u32(buf, 8)?,
            seq2: read_be_u32(buf, 16)?,
            bitmaps: [bitmap(36)?, bitmap(70)?],
        })
    }
}

/// Committed or pending VBLK counts, by record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub volumes: u32,
    pub components: u32,
    pub partitions: u32,
    pub disks: u32,
}

/// The VMDB header describing the VBLK array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vmdb {
    pub vblk_last: u32,
    /// VBLK cell size in bytes.
    pub vblk_size: u32,
    /// Byte offset of the first VBLK cell, relative to the VMDB.
    pub vblk_first_offset: u32,
    pub update_status: u16,
    pub version_major: u16,
    pub version_minor: u16,
    pub disk_group_name: String,
    pub committed_seq: u64,
    pub pending_seq: u64,
    pub committed: RecordCounts,
    pub pending: RecordCounts,
}

impl Vmdb {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let magic = read_fixed::<4>(buf, 0)?;
        if &magic != VMDB_MAGIC {
            return Err(LdmError::Invalid("VMDB magic not found".into()));
        }

        let counts = |off: usize| -> Result<RecordCounts> {
            Ok(RecordCounts {
                volumes: read_be_u32(buf, off)?,
                components: read_be_u32(buf, off + 4)?,
                partitions: read_be_u32(buf, off + 8)?,
                disks: read_be_u32(buf, off + 12)?,
            })
        };

        Ok(Self {
            vblk_last: read_be_u32(buf, 4)?,
            vblk_size: read_be_u32(buf, 8)?,
            vblk_first_offset: read_be_u32(buf, 12)?,
            update_status: read_be_u16(buf, 16)?,
            version_major: read_be_u16(buf, 18)?,
            version_minor: read_be_u16(buf, 20)?,
            disk_group_name: trim_nul_padded(&read_fixed::<31>(buf, 22)?),
            committed_seq: read_be_u64(buf, 117)?,
            pending_seq: read_be_u64(buf, 125)?,
            committed: counts(133)?,
            pending: counts(161)?,
        })
    }
}

/// Locate and parse the VMDB within a config-area image.
///
/// The TOCBLOCK sits exactly 2 sectors into the config area; its `config`
/// bitmap gives the VMDB's start sector relative to the config begin.
/// Returns the parsed VMDB and its byte offset within `config`.
pub fn find_vmdb(config: &[u8], sector_size: u32) -> Result<(Vmdb, usize)> {
    let toc_off = sector_size as usize * 2;
    let toc = TocBlock::parse(config.get(toc_off..).ok_or_else(|| {
        LdmError::Invalid("config area too small to hold a TOCBLOCK".into())
    })?)?;

    let bitmap = toc
        .bitmaps
        .iter()
        .find(|b| b.name == "config")
        .ok_or_else(|| LdmError::Invalid("TOCBLOCK doesn't contain a config bitmap".into()))?;

    let vmdb_off = bitmap
        .start
        .checked_mul(u64::from(sector_size))
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| LdmError::Invalid("config bitmap start overflows".into()))?;

    let vmdb = Vmdb::parse(config.get(vmdb_off..).ok_or_else(|| {
        LdmError::Invalid(format!("config bitmap points past the config area ({vmdb_off:#x})"))
    })?)
    .map_err(|_| LdmError::Invalid(format!("didn't find VMDB at config offset {vmdb_off:#x}")))?;

    Ok((vmdb, vmdb_off))
}
