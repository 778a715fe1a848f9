//! VBLK record decoders over the tag-length-value substrate.
//!
//! A record body is a sequence of fields in fixed order. Variable-width
//! fields carry a 1-byte length prefix; fixed-width fields are read bare.
//! Malformed inputs may claim lengths past the record end, so every read
//! checks its bounds against the payload before advancing.

use ldm_types::{parse_guid_ascii, LdmError, Result};
use serde::Serialize;
use uuid::Uuid;

// ── TLV cursor ──────────────────────────────────────────────────────────────

/// Read-only walker over a record payload.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(LdmError::Invalid(format!(
                "record field of {n} bytes runs past the end of its payload"
            ))),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn be_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Length-prefixed big-endian integer of at most `max` bytes.
    fn var_int(&mut self, max: usize, field: &'static str) -> Result<u64> {
        let len = self.u8()? as usize;
        if len > max {
            return Err(LdmError::Internal(format!(
                "found {len} byte integer for {field}"
            )));
        }
        let bytes = self.take(len)?;
        let mut out = 0_u64;
        for &b in bytes {
            out = (out << 8) | u64::from(b);
        }
        Ok(out)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn var_u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(self.var_int(4, field)? as u32)
    }

    fn var_u64(&mut self, field: &'static str) -> Result<u64> {
        self.var_int(8, field)
    }

    /// Length-prefixed string.
    fn var_string(&mut self) -> Result<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Length-prefixed field we don't interpret.
    fn var_skip(&mut self) -> Result<()> {
        let len = self.u8()? as usize;
        self.skip(len)
    }
}

// ── Record types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    Gen,
    Raid5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Striped,
    Spanned,
    Raid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRecord {
    pub id: u32,
    pub name: String,
    pub kind: VolumeKind,
    /// Raw flags byte from the record body; meaning unclear, retained as-is.
    pub flags: u8,
    pub n_comps: u32,
    /// Volume size in sectors.
    pub size: u64,
    /// 1-byte content descriptor with MBR partition-type semantics.
    pub part_type: u8,
    pub id1: Option<String>,
    pub id2: Option<String>,
    pub size2: Option<u64>,
    /// Windows drive-letter hint.
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub id: u32,
    pub name: String,
    pub kind: ComponentKind,
    pub n_parts: u32,
    /// Id of the parent volume.
    pub parent_id: u32,
    /// Stripe size in sectors; present for striped and raid components.
    pub stripe_size: Option<u64>,
    pub n_columns: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRecord {
    pub id: u32,
    pub name: String,
    /// Start sector on the disk's data area.
    pub start: u64,
    /// Offset of this partition from the start of the volume, in sectors.
    pub vol_offset: u64,
    pub size: u64,
    /// Id of the parent component.
    pub parent_id: u32,
    pub disk_id: u32,
    /// Column position within the parent component.
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRecord {
    pub id: u32,
    pub name: String,
    pub guid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskGroupRecord {
    pub id: u32,
    pub name: String,
}

// ── Decoders ────────────────────────────────────────────────────────────────
//
// Gating flags come from the VBLK record header, not from any field inside
// the body.

pub(crate) fn decode_volume(revision: u8, flags: u8, body: &[u8]) -> Result<VolumeRecord> {
    if revision != 5 {
        return Err(LdmError::NotSupported(format!(
            "unsupported volume VBLK revision {revision}"
        )));
    }

    let mut c = Cursor::new(body);
    let id = c.var_u32("volume id")?;
    let name = c.var_string()?;

    // Volume type tag ("gen"/"raid5"); the type byte below is authoritative.
    c.var_skip()?;
    // Documented as a single zero, but observed as a variable-length string.
    c.var_skip()?;
    // Volume state.
    c.skip(14)?;

    let kind = match c.u8()? {
        3 => VolumeKind::Gen,
        4 => VolumeKind::Raid5,
        other => {
            return Err(LdmError::NotSupported(format!(
                "unsupported volume VBLK type {other}"
            )))
        }
    };

    // Unknown byte, volume number, zeroes.
    c.skip(1 + 1 + 3)?;

    let body_flags = c.u8()?;
    let n_comps = c.var_u32("volume n_children")?;

    // Commit id, then a second id.
    c.skip(8 + 8)?;

    let size = c.var_u64("volume size")?;
    c.skip(4)?;
    let part_type = c.u8()?;
    // Volume GUID.
    c.skip(16)?;

    let id1 = if flags & 0x08 != 0 {
        Some(c.var_string()?)
    } else {
        None
    };
    let id2 = if flags & 0x20 != 0 {
        Some(c.var_string()?)
    } else {
        None
    };
    let size2 = if flags & 0x80 != 0 {
        Some(c.var_u64("volume size2")?)
    } else {
        None
    };
    let hint = if flags & 0x02 != 0 {
        Some(c.var_string()?)
    } else {
        None
    };

    Ok(VolumeRecord {
        id,
        name,
        kind,
        flags: body_flags,
        n_comps,
        size,
        part_type,
        id1,
        id2,
        size2,
        hint,
    })
}

pub(crate) fn decode_component(revision: u8, flags: u8, body: &[u8]) -> Result<ComponentRecord> {
    if revision != 3 {
        return Err(LdmError::NotSupported(format!(
            "unsupported component VBLK revision {revision}"
        )));
    }

    let mut c = Cursor::new(body);
    let id = c.var_u32("component id")?;
    let name = c.var_string()?;

    // Volume state.
    c.var_skip()?;

    let kind = match c.u8()? {
        1 => ComponentKind::Striped,
        2 => ComponentKind::Spanned,
        3 => ComponentKind::Raid,
        other => {
            return Err(LdmError::NotSupported(format!(
                "component VBLK {id} has unsupported type {other}"
            )))
        }
    };

    c.skip(4)?;
    let n_parts = c.var_u32("component n_parts")?;
    // Log commit id, zeroes.
    c.skip(8 + 8)?;
    let parent_id = c.var_u32("component parent_id")?;
    c.skip(1)?;

    let (stripe_size, n_columns) = if flags & 0x10 != 0 {
        (
            Some(c.var_u64("component stripe_size")?),
            Some(c.var_u32("component n_columns")?),
        )
    } else {
        (None, None)
    };

    Ok(ComponentRecord {
        id,
        name,
        kind,
        n_parts,
        parent_id,
        stripe_size,
        n_columns,
    })
}

pub(crate) fn decode_partition(revision: u8, flags: u8, body: &[u8]) -> Result<PartitionRecord> {
    if revision != 3 {
        return Err(LdmError::NotSupported(format!(
            "unsupported partition VBLK revision {revision}"
        )));
    }

    let mut c = Cursor::new(body);
    let id = c.var_u32("partition id")?;
    let name = c.var_string()?;

    // Zeroes, then the log commit id.
    c.skip(4 + 8)?;

    let start = c.be_u64()?;
    let vol_offset = c.be_u64()?;
    let size = c.var_u64("partition size")?;
    let parent_id = c.var_u32("partition parent_id")?;
    let disk_id = c.var_u32("partition disk_id")?;

    let index = if flags & 0x08 != 0 {
        c.var_u32("partition index")?
    } else {
        0
    };

    Ok(PartitionRecord {
        id,
        name,
        start,
        vol_offset,
        size,
        parent_id,
        disk_id,
        index,
    })
}

pub(crate) fn decode_disk(revision: u8, _flags: u8, body: &[u8]) -> Result<DiskRecord> {
    let mut c = Cursor::new(body);
    let id = c.var_u32("disk id")?;
    let name = c.var_string()?;

    let guid = match revision {
        3 => {
            let text = c.var_string()?;
            parse_guid_ascii(text.as_bytes())
                .map_err(|_| LdmError::Invalid(format!("disk {id} has invalid GUID: {text}")))?
        }
        4 => {
            let raw = c.take(16)?;
            let mut bytes = [0_u8; 16];
            bytes.copy_from_slice(raw);
            Uuid::from_bytes(bytes)
        }
        other => {
            return Err(LdmError::NotSupported(format!(
                "unsupported disk VBLK revision {other}"
            )))
        }
    };

    // The remainder of the record is not needed.

    Ok(DiskRecord { id, name, guid })
}

pub(crate) fn decode_disk_group(revision: u8, _flags: u8, body: &[u8]) -> Result<DiskGroupRecord> {
    if revision != 3 && revision != 4 {
        return Err(LdmError::NotSupported(format!(
            "unsupported disk group VBLK revision {revision}"
        )));
    }

    let mut c = Cursor::new(body);
    let id = c.var_u32("disk group id")?;
    let name = c.var_string()?;

    Ok(DiskGroupRecord { id, name })
}

// ── Tests ───────────────────────────────────────────────────────────────────
