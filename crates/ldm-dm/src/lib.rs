#![forbid(unsafe_code)]
//! Device-mapper table synthesis for assembled LDM volumes.
//!
//! [`volume_tables`] renders one textual DM table per device needed to
//! expose a volume, ordered so that every table's dependencies appear
//! before it: the caller can create the devices front to back.
//!
//! Mirrored and RAID5 volumes tolerate absent disks by emitting `-`
//! placeholder slots (RAID5 at most one); linear, spanned and striped
//! layouts cannot degrade and fail with `MissingDisk` instead.

use ldm_core::{Component, ComponentKind, DiskGroup, Partition, Volume, VolumeKind};
use ldm_types::{LdmError, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// One device-mapper target description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmTable {
    /// DM device name, `ldm_<dgname>_<name>` with both parts escaped.
    pub name: String,
    /// Multi-line table body, newline terminated.
    pub table: String,
}

/// Everything except the characters allowed in a URI path segment.
const DM_NAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// DM names end up as nodes under `/dev/mapper`, so both halves are
/// percent-escaped against the path-segment reserved set.
fn dm_name(dgname: &str, name: &str) -> String {
    format!(
        "ldm_{}_{}",
        utf8_percent_encode(dgname, DM_NAME_ESCAPE),
        utf8_percent_encode(name, DM_NAME_ESCAPE)
    )
}

/// Generate the DM tables exposing `vol`, dependencies first.
pub fn volume_tables(dg: &DiskGroup, vol: &Volume) -> Result<Vec<DmTable>> {
    let mut out = Vec::new();

    match vol.kind {
        VolumeKind::Gen => {
            if vol.components.len() > 1 {
                mirrored_tables(dg, vol, &mut out)?;
                return Ok(out);
            }

            let comp = component_of(dg, vol, 0)?;
            match comp.kind {
                ComponentKind::Spanned => spanned_tables(dg, vol, comp, &mut out)?,
                ComponentKind::Striped => striped_tables(dg, vol, comp, &mut out)?,
                ComponentKind::Raid => {
                    return Err(LdmError::NotSupported(
                        "unsupported configuration: volume is type GEN, component is neither \
                         SPANNED nor STRIPED"
                            .into(),
                    ))
                }
            }
            Ok(out)
        }

        VolumeKind::Raid5 => {
            raid5_tables(dg, vol, &mut out)?;
            Ok(out)
        }
    }
}

// ── Per-shape emitters ──────────────────────────────────────────────────────

/// Linear table over a single partition. The building block for mirror and
/// raid5 legs.
fn partition_table(dg: &DiskGroup, part: &Partition) -> Result<DmTable> {
    let disk = dg
        .disk_by_id(part.disk_id)
        .ok_or_else(|| unresolved("disk", part.disk_id))?;
    let device = disk.device.as_ref().ok_or_else(|| {
        LdmError::MissingDisk(format!(
            "disk {} required by partition {} is missing",
            disk.name, part.name
        ))
    })?;

    Ok(DmTable {
        name: dm_name(&disk.dgname, &part.name),
        table: format!(
            "0 {} linear {} {}\n",
            part.size,
            device.path,
            device.data_start + part.start
        ),
    })
}

fn spanned_tables(
    dg: &DiskGroup,
    vol: &Volume,
    comp: &Component,
    out: &mut Vec<DmTable>,
) -> Result<()> {
    let mut table = String::new();
    let mut pos = 0_u64;

    for part in partitions_of(dg, comp) {
        let part = part?;
        let disk = dg
            .disk_by_id(part.disk_id)
            .ok_or_else(|| unresolved("disk", part.disk_id))?;
        let device = disk.device.as_ref().ok_or_else(|| {
            LdmError::MissingDisk(format!(
                "disk {} required by spanned volume {} is missing",
                disk.name, vol.name
            ))
        })?;

        // Adding up the sizes of the preceding partitions must land exactly
        // on this partition's volume offset.
        if pos != part.vol_offset {
            return Err(LdmError::Invalid(format!(
                "partition {} volume offset {} does not match the sizes of preceding \
                 partitions ({pos})",
                part.name, part.vol_offset
            )));
        }

        table.push_str(&format!(
            "{} {} linear {} {}\n",
            pos,
            pos + part.size,
            device.path,
            device.data_start + part.start
        ));
        pos += part.size;
    }

    out.push(DmTable {
        name: dm_name(&vol.dgname, &vol.name),
        table,
    });
    Ok(())
}

fn striped_tables(
    dg: &DiskGroup,
    vol: &Volume,
    comp: &Component,
    out: &mut Vec<DmTable>,
) -> Result<()> {
    let (stripe_size, n_columns) = stripe_geometry(comp)?;
    let mut table = format!("0 {} striped {} {}", vol.size, n_columns, stripe_size);

    for part in partitions_of(dg, comp) {
        let part = part?;
        let disk = dg
            .disk_by_id(part.disk_id)
            .ok_or_else(|| unresolved("disk", part.disk_id))?;
        // Losing a column loses the whole volume: striping cannot degrade.
        let device = disk.device.as_ref().ok_or_else(|| {
            LdmError::MissingDisk(format!(
                "disk {} required by striped volume {} is missing",
                disk.name, vol.name
            ))
        })?;

        table.push_str(&format!(
            " {} {}",
            device.path,
            device.data_start + part.start
        ));
    }
    table.push('\n');

    out.push(DmTable {
        name: dm_name(&vol.dgname, &vol.name),
        table,
    });
    Ok(())
}

fn mirrored_tables(dg: &DiskGroup, vol: &Volume, out: &mut Vec<DmTable>) -> Result<()> {
    let mut body = format!("0 {} raid raid1 1 128 {}", vol.size, vol.components.len());
    let mut children = Vec::new();

    for i in 0..vol.components.len() {
        let comp = component_of(dg, vol, i)?;
        if comp.kind != ComponentKind::Spanned || comp.partitions.len() != 1 {
            return Err(LdmError::NotSupported(
                "unsupported configuration: mirrored volume must contain only simple \
                 partitions"
                    .into(),
            ));
        }

        let part = dg
            .partition_by_id(comp.partitions[0])
            .ok_or_else(|| unresolved("partition", comp.partitions[0]))?;
        match partition_table(dg, part) {
            Ok(child) => {
                body.push_str(&format!(" - /dev/mapper/{}", child.name));
                children.push(child);
            }
            Err(LdmError::MissingDisk(msg)) => {
                tracing::warn!("{msg}");
                body.push_str(" - -");
            }
            Err(e) => return Err(e),
        }
    }

    if children.is_empty() {
        return Err(LdmError::MissingDisk(format!(
            "mirrored volume {} is missing all components",
            vol.name
        )));
    }
    body.push('\n');

    children.reverse();
    out.extend(children);
    out.push(DmTable {
        name: dm_name(&vol.dgname, &vol.name),
        table: body,
    });
    Ok(())
}

fn raid5_tables(dg: &DiskGroup, vol: &Volume, out: &mut Vec<DmTable>) -> Result<()> {
    if vol.components.len() != 1 {
        return Err(LdmError::NotSupported(
            "unsupported configuration: volume type RAID5 should have a single child \
             component"
                .into(),
        ));
    }
    let comp = component_of(dg, vol, 0)?;
    if comp.kind != ComponentKind::Raid {
        return Err(LdmError::NotSupported(
            "unsupported configuration: child component of a RAID5 volume must be of type \
             RAID"
                .into(),
        ));
    }

    let (stripe_size, n_columns) = stripe_geometry(comp)?;
    let mut body = format!(
        "0 {} raid raid5_ls 1 {} {}",
        vol.size, stripe_size, n_columns
    );
    let mut children = Vec::new();

    for part in partitions_of(dg, comp) {
        let part = part?;
        match partition_table(dg, part) {
            Ok(child) => {
                body.push_str(&format!(" - /dev/mapper/{}", child.name));
                children.push(child);
            }
            Err(LdmError::MissingDisk(msg)) => {
                tracing::warn!("{msg}");
                body.push_str(" - -");
            }
            Err(e) => return Err(e),
        }
    }

    // Parity covers a single absent column, no more.
    if children.len() + 1 < n_columns as usize {
        return Err(LdmError::MissingDisk(format!(
            "RAID5 volume {} is missing more than 1 component",
            vol.name
        )));
    }
    body.push('\n');

    children.reverse();
    out.extend(children);
    out.push(DmTable {
        name: dm_name(&vol.dgname, &vol.name),
        table: body,
    });
    Ok(())
}

// ── Lookup helpers ──────────────────────────────────────────────────────────
//
// Assembly guarantees every cross-reference resolves; a failed lookup here
// means the disk group was built by hand and wired up wrong.

fn component_of<'a>(dg: &'a DiskGroup, vol: &Volume, i: usize) -> Result<&'a Component> {
    let id = *vol
        .components
        .get(i)
        .ok_or_else(|| LdmError::Invalid(format!("volume {} has no component", vol.name)))?;
    dg.component_by_id(id)
        .ok_or_else(|| unresolved("component", id))
}

fn partitions_of<'a>(
    dg: &'a DiskGroup,
    comp: &'a Component,
) -> impl Iterator<Item = Result<&'a Partition>> {
    comp.partitions.iter().map(move |&id| {
        dg.partition_by_id(id)
            .ok_or_else(|| unresolved("partition", id))
    })
}

fn unresolved(kind: &str, id: u32) -> LdmError {
    LdmError::Internal(format!("unresolved {kind} id {id} in assembled disk group"))
}

fn stripe_geometry(comp: &Component) -> Result<(u64, u32)> {
    match (comp.stripe_size, comp.n_columns) {
        (Some(stripe), Some(columns)) => Ok((stripe, columns)),
        _ => Err(LdmError::Invalid(format!(
            "component {} lacks stripe geometry",
            comp.name
        ))),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
