//! The VBLK stream: fixed-size metadata cells holding the records of a
//! disk group.
//!
//! Cells are iterated from `VMDB + vblk_first_offset` until a cell no longer
//! begins with the `VBLK` magic. A record whose payload exceeds one cell is
//! split across several cells sharing a record id; the fragments may appear
//! in any order and are reassembled by `(record_id, entry)` before decoding.

use ldm_types::{read_be_u16, read_be_u32, read_fixed, LdmError, Result};

use crate::record::{
    decode_component, decode_disk, decode_disk_group, decode_partition, decode_volume,
    ComponentRecord, DiskGroupRecord, DiskRecord, PartitionRecord, VolumeRecord,
};
use crate::toc::Vmdb;

pub const VBLK_MAGIC: &[u8; 4] = b"VBLK";

/// Size of the per-cell header.
pub const VBLK_HEADER_LEN: usize = 16;

/// Size of the per-record header that follows (once per record, not per
/// cell).
pub const RECORD_HEADER_LEN: usize = 8;

/// Header of a single VBLK cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VblkHead {
    pub seq: u32,
    pub record_id: u32,
    pub entry: u16,
    pub entries_total: u16,
}

impl VblkHead {
    fn parse(buf: &[u8]) -> Result<Option<Self>> {
        let magic = read_fixed::<4>(buf, 0)?;
        if &magic != VBLK_MAGIC {
            return Ok(None);
        }
        Ok(Some(Self {
            seq: read_be_u32(buf, 4)?,
            record_id: read_be_u32(buf, 8)?,
            entry: read_be_u16(buf, 12)?,
            entries_total: read_be_u16(buf, 14)?,
        }))
    }
}

/// Every record decoded from one disk's VBLK stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    pub volumes: Vec<VolumeRecord>,
    pub components: Vec<ComponentRecord>,
    pub partitions: Vec<PartitionRecord>,
    pub disks: Vec<DiskRecord>,
    pub disk_group: Option<DiskGroupRecord>,
}

/// A multi-cell record being reassembled.
struct SpannedRec {
    record_id: u32,
    entries_total: u16,
    entries_found: u16,
    /// Config offset of the first fragment seen, for diagnostics.
    offset: usize,
    data: Vec<u8>,
}

/// Walk the VBLK stream of `config` and decode every committed record.
pub fn parse_records(config: &[u8], vmdb_offset: usize, vmdb: &Vmdb) -> Result<RecordSet> {
    let cell_size = vmdb.vblk_size as usize;
    if cell_size <= VBLK_HEADER_LEN {
        return Err(LdmError::Invalid(format!(
            "VMDB declares VBLK cell size {cell_size}"
        )));
    }
    let payload_size = cell_size - VBLK_HEADER_LEN;

    let mut set = RecordSet::default();
    let mut spanned: Vec<SpannedRec> = Vec::new();

    let mut pos = vmdb_offset + vmdb.vblk_first_offset as usize;
    while pos + cell_size <= config.len() {
        let Some(head) = VblkHead::parse(&config[pos..])? else {
            break;
        };

        if head.entries_total > 0 && head.entry >= head.entries_total {
            return Err(LdmError::Invalid(format!(
                "VBLK {} has entry {} >= total entries {}",
                head.seq, head.entry, head.entries_total
            )));
        }

        let payload = &config[pos + VBLK_HEADER_LEN..pos + cell_size];

        if head.entries_total > 1 {
            let slot = head.entry as usize * payload_size;
            match spanned.iter_mut().find(|r| r.record_id == head.record_id) {
                Some(rec) => {
                    if slot + payload_size > rec.data.len() {
                        return Err(LdmError::Invalid(format!(
                            "VBLK {} of record {} lies outside its reassembly buffer",
                            head.seq, head.record_id
                        )));
                    }
                    rec.entries_found += 1;
                    rec.data[slot..slot + payload_size].copy_from_slice(payload);
                }
                None => {
                    let mut data = vec![0_u8; head.entries_total as usize * payload_size];
                    data[slot..slot + payload_size].copy_from_slice(payload);
                    spanned.push(SpannedRec {
                        record_id: head.record_id,
                        entries_total: head.entries_total,
                        entries_found: 1,
                        offset: pos,
                        data,
                    });
                }
            }
        } else {
            dispatch_record(payload, pos, &mut set)?;
        }

        pos += cell_size;
    }

    // Complete buffers dispatch in first-seen order; anything incomplete is
    // structural corruption.
    for rec in &spanned {
        if rec.entries_found != rec.entries_total {
            return Err(LdmError::Invalid(format!(
                "expected {} entries for record {}, but found {}",
                rec.entries_total, rec.record_id, rec.entries_found
            )));
        }
        dispatch_record(&rec.data, rec.offset, &mut set)?;
    }

    Ok(set)
}

/// Decode one reassembled record payload and file it by kind.
fn dispatch_record(payload: &[u8], offset: usize, set: &mut RecordSet) -> Result<()> {
    if payload.len() < RECORD_HEADER_LEN {
        return Err(LdmError::Invalid(format!(
            "VBLK record at config offset {offset:#x} is shorter than its header"
        )));
    }

    let flags = payload[2];
    let type_byte = payload[3];
    let type_code = type_byte & 0x0F;
    let revision = type_byte >> 4;
    let body = &payload[RECORD_HEADER_LEN..];

    match type_code {
        0x00 => {} // blank cell
        0x01 => set.volumes.push(decode_volume(revision, flags, body)?),
        0x02 => set.components.push(decode_component(revision, flags, body)?),
        0x03 => set.partitions.push(decode_partition(revision, flags, body)?),
        0x04 => set.disks.push(decode_disk(revision, flags, body)?),
        0x05 => set.disk_group = Some(decode_disk_group(revision, flags, body)?),
        other => {
            return Err(LdmError::NotSupported(format!(
                "unknown VBLK record type {other:#x} at config offset {offset:#x}"
            )))
        }
    }

    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────
