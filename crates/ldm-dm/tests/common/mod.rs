//! Builder for minimal synthetic LDM disk images.
//!
//! Lays out a device the way Windows does, shrunk to a few dozen sectors:
//! an MBR (or protective MBR + GPT) in front, the PRIVHEAD at sector 6, and
//! a config area holding TOCBLOCK, VMDB and the VBLK stream.

use uuid::Uuid;

pub const SECTOR: usize = 512;

const CONFIG_START_SECTOR: u64 = 16;
const CONFIG_SECTORS: u64 = 32;
const VMDB_SECTOR_IN_CONFIG: u64 = 4;
const VBLK_FIRST_OFFSET: u32 = 512;
const CELL: usize = 128;
const CELL_PAYLOAD: usize = CELL - 16;

const LDM_METADATA_GUID: &str = "5808c8aa-7e8f-42e0-85d2-e1e90434cfb3";

// ── TLV encoders ────────────────────────────────────────────────────────────

pub fn var_u32(out: &mut Vec<u8>, v: u32) {
    var_bytes(out, &v.to_be_bytes());
}

pub fn var_u64(out: &mut Vec<u8>, v: u64) {
    var_bytes(out, &v.to_be_bytes());
}

fn var_bytes(out: &mut Vec<u8>, be: &[u8]) {
    let first = be.iter().position(|&b| b != 0).unwrap_or(be.len());
    let trimmed = &be[first..];
    out.push(trimmed.len() as u8);
    out.extend_from_slice(trimmed);
}

pub fn var_str(out: &mut Vec<u8>, s: &str) {
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

pub fn zeros(out: &mut Vec<u8>, n: usize) {
    out.resize(out.len() + n, 0);
}

/// Record header + body: status, flags, `(revision << 4) | type`, size.
pub fn record(flags: u8, revision: u8, type_code: u8, body: &[u8]) -> Vec<u8> {
    let mut rec = vec![0_u8; 8];
    rec[2] = flags;
    rec[3] = (revision << 4) | type_code;
    rec[4..8].copy_from_slice(&(body.len() as u32).to_be_bytes());
    rec.extend_from_slice(body);
    rec
}

// ── Record builders ─────────────────────────────────────────────────────────

pub fn disk_group_record(id: u32, name: &str) -> Vec<u8> {
    let mut b = Vec::new();
    var_u32(&mut b, id);
    var_str(&mut b, name);
    record(0, 3, 0x05, &b)
}

pub fn disk_record(id: u32, name: &str, guid: Uuid) -> Vec<u8> {
    let mut b = Vec::new();
    var_u32(&mut b, id);
    var_str(&mut b, name);
    b.extend_from_slice(guid.as_bytes());
    record(0, 4, 0x04, &b)
}

pub fn gen_volume_record(id: u32, name: &str, n_comps: u32, size: u64, part_type: u8) -> Vec<u8> {
    let mut b = Vec::new();
    var_u32(&mut b, id);
    var_str(&mut b, name);
    var_str(&mut b, "gen");
    var_str(&mut b, "8000000000000000");
    zeros(&mut b, 14); // volume state
    b.push(3); // Gen
    zeros(&mut b, 1 + 1 + 3);
    b.push(0); // flags byte in body
    var_u32(&mut b, n_comps);
    zeros(&mut b, 8 + 8);
    var_u64(&mut b, size);
    zeros(&mut b, 4);
    b.push(part_type);
    zeros(&mut b, 16); // volume GUID
    record(0, 5, 0x01, &b)
}

pub fn component_record(
    id: u32,
    name: &str,
    kind: u8,
    n_parts: u32,
    parent_id: u32,
    stripe: Option<(u64, u32)>,
) -> Vec<u8> {
    let mut b = Vec::new();
    var_u32(&mut b, id);
    var_str(&mut b, name);
    var_str(&mut b, ""); // volume state
    b.push(kind);
    zeros(&mut b, 4);
    var_u32(&mut b, n_parts);
    zeros(&mut b, 8 + 8);
    var_u32(&mut b, parent_id);
    zeros(&mut b, 1);
    let mut flags = 0_u8;
    if let Some((stripe_size, n_columns)) = stripe {
        var_u64(&mut b, stripe_size);
        var_u32(&mut b, n_columns);
        flags = 0x10;
    }
    record(flags, 3, 0x02, &b)
}

#[allow(clippy::too_many_arguments)]
pub fn partition_record(
    id: u32,
    name: &str,
    start: u64,
    vol_offset: u64,
    size: u64,
    parent_id: u32,
    disk_id: u32,
    index: u32,
) -> Vec<u8> {
    let mut b = Vec::new();
    var_u32(&mut b, id);
    var_str(&mut b, name);
    zeros(&mut b, 4 + 8);
    b.extend_from_slice(&start.to_be_bytes());
    b.extend_from_slice(&vol_offset.to_be_bytes());
    var_u64(&mut b, size);
    var_u32(&mut b, parent_id);
    var_u32(&mut b, disk_id);
    var_u32(&mut b, index);
    record(0x08, 3, 0x03, &b)
}

// ── Image assembly ──────────────────────────────────────────────────────────

pub struct ImageSpec {
    pub disk_guid: Uuid,
    pub dg_guid: Uuid,
    pub dg_name: String,
    pub committed_seq: u64,
    /// Committed counts: volumes, components, partitions, disks.
    pub counts: [u32; 4],
    /// Full record payloads (header + body), one per record.
    pub records: Vec<Vec<u8>>,
    pub data_start: u64,
    /// Use a GPT layout instead of MBR-style LDM.
    pub gpt: bool,
}

impl ImageSpec {
    pub fn build(&self) -> Vec<u8> {
        let total = (CONFIG_START_SECTOR + CONFIG_SECTORS) as usize * SECTOR;
        let mut image = vec![0_u8; total];

        self.write_partition_table(&mut image);
        self.write_privhead(&mut image);
        self.write_config(&mut image);

        image
    }

    fn write_partition_table(&self, image: &mut [u8]) {
        image[510] = 0x55;
        image[511] = 0xAA;
        image[446 + 4] = if self.gpt { 0xEE } else { 0x42 };

        if self.gpt {
            // Header at LBA 1, three entries at LBA 2; the LDM metadata
            // partition is deliberately not the first entry.
            image[512..520].copy_from_slice(b"EFI PART");
            image[512 + 72..512 + 80].copy_from_slice(&2_u64.to_le_bytes());
            image[512 + 80..512 + 84].copy_from_slice(&3_u32.to_le_bytes());
            image[512 + 84..512 + 88].copy_from_slice(&128_u32.to_le_bytes());

            let ldm_type = Uuid::parse_str(LDM_METADATA_GUID).unwrap();
            let entry = 1024 + 2 * 128;
            image[entry..entry + 16].copy_from_slice(&ldm_type.to_bytes_le());
            image[entry + 32..entry + 40].copy_from_slice(&3_u64.to_le_bytes());
            image[entry + 40..entry + 48].copy_from_slice(&6_u64.to_le_bytes());
        }
    }

    fn write_privhead(&self, image: &mut [u8]) {
        let off = 6 * SECTOR;
        image[off..off + 8].copy_from_slice(b"PRIVHEAD");
        image[off + 12..off + 14].copy_from_slice(&2_u16.to_be_bytes());
        image[off + 14..off + 16].copy_from_slice(&12_u16.to_be_bytes());

        let disk_guid = self.disk_guid.to_string();
        image[off + 48..off + 48 + 36].copy_from_slice(disk_guid.as_bytes());
        let dg_guid = self.dg_guid.to_string();
        image[off + 176..off + 176 + 36].copy_from_slice(dg_guid.as_bytes());
        image[off + 240..off + 240 + self.dg_name.len()]
            .copy_from_slice(self.dg_name.as_bytes());

        image[off + 283..off + 291].copy_from_slice(&self.data_start.to_be_bytes());
        image[off + 291..off + 299].copy_from_slice(&100_000_u64.to_be_bytes());
        image[off + 299..off + 307].copy_from_slice(&CONFIG_START_SECTOR.to_be_bytes());
        image[off + 307..off + 315].copy_from_slice(&CONFIG_SECTORS.to_be_bytes());
    }

    fn write_config(&self, image: &mut [u8]) {
        let config = CONFIG_START_SECTOR as usize * SECTOR;

        // TOCBLOCK, 2 sectors in.
        let toc = config + 2 * SECTOR;
        image[toc..toc + 8].copy_from_slice(b"TOCBLOCK");
        image[toc + 36..toc + 42].copy_from_slice(b"config");
        image[toc + 46..toc + 54].copy_from_slice(&VMDB_SECTOR_IN_CONFIG.to_be_bytes());
        image[toc + 54..toc + 62].copy_from_slice(&8_u64.to_be_bytes());
        image[toc + 70..toc + 73].copy_from_slice(b"log");

        // VMDB.
        let vmdb = config + VMDB_SECTOR_IN_CONFIG as usize * SECTOR;
        image[vmdb..vmdb + 4].copy_from_slice(b"VMDB");
        image[vmdb + 8..vmdb + 12].copy_from_slice(&(CELL as u32).to_be_bytes());
        image[vmdb + 12..vmdb + 16].copy_from_slice(&VBLK_FIRST_OFFSET.to_be_bytes());
        image[vmdb + 18..vmdb + 20].copy_from_slice(&4_u16.to_be_bytes());
        image[vmdb + 20..vmdb + 22].copy_from_slice(&10_u16.to_be_bytes());
        image[vmdb + 22..vmdb + 22 + self.dg_name.len()]
            .copy_from_slice(self.dg_name.as_bytes());
        image[vmdb + 117..vmdb + 125].copy_from_slice(&self.committed_seq.to_be_bytes());
        for (i, count) in self.counts.iter().enumerate() {
            let at = vmdb + 133 + i * 4;
            image[at..at + 4].copy_from_slice(&count.to_be_bytes());
        }

        // VBLK cells.
        let mut pos = vmdb + VBLK_FIRST_OFFSET as usize;
        for (n, rec) in self.records.iter().enumerate() {
            let record_id = 0x100 + n as u32;
            let entries_total = rec.len().div_ceil(CELL_PAYLOAD).max(1) as u16;
            for entry in 0..entries_total {
                image[pos..pos + 4].copy_from_slice(b"VBLK");
                image[pos + 4..pos + 8]
                    .copy_from_slice(&(record_id * 8 + u32::from(entry)).to_be_bytes());
                image[pos + 8..pos + 12].copy_from_slice(&record_id.to_be_bytes());
                image[pos + 12..pos + 14].copy_from_slice(&entry.to_be_bytes());
                image[pos + 14..pos + 16].copy_from_slice(&entries_total.to_be_bytes());

                let from = entry as usize * CELL_PAYLOAD;
                let to = (from + CELL_PAYLOAD).min(rec.len());
                image[pos + 16..pos + 16 + (to - from)].copy_from_slice(&rec[from..to]);
                pos += CELL;
            }
        }
    }
}

/// Write an image to a temp file and reopen it read-only.
pub fn image_file(image: &[u8]) -> std::fs::File {
    use std::io::Write;
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(image).unwrap();
    tmp.flush().unwrap();
    let (file, path) = tmp.keep().unwrap();
    drop(file);
    std::fs::File::open(path).unwrap()
}
