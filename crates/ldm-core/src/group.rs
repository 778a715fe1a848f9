//! The assembled disk-group topology.
//!
//! A [`DiskGroup`] owns flat, id-keyed collections of disks, partitions,
//! components and volumes. Parent-to-child ordered lists (volume →
//! components, component → partitions in column order) are wired up once by
//! [`DiskGroup::assemble`] and read-only afterwards. Children refer to
//! parents and to disks by id only, so the ownership graph stays acyclic.

use std::collections::HashMap;

use ldm_ondisk::{ComponentKind, RecordSet, Vmdb, VolumeKind};
use ldm_types::{LdmError, Result};
use serde::Serialize;
use uuid::Uuid;

/// Where an observed disk lives, and its geometry from the PRIVHEAD.
///
/// Absent until the physical disk has been added; a disk group can be
/// assembled from any one member disk, with the others missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskDevice {
    pub path: String,
    /// Start sector of the data area.
    pub data_start: u64,
    pub data_size: u64,
    /// Start sector of the metadata (config) area.
    pub metadata_start: u64,
    pub metadata_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disk {
    pub id: u32,
    pub name: String,
    pub dgname: String,
    pub guid: Uuid,
    pub device: Option<DiskDevice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub id: u32,
    pub name: String,
    /// Id of the parent component.
    pub parent_id: u32,
    pub disk_id: u32,
    /// Start sector within the disk's data area.
    pub start: u64,
    /// Offset from the start of the volume, in sectors.
    pub vol_offset: u64,
    pub size: u64,
    /// Column position within the parent component.
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub id: u32,
    pub name: String,
    /// Id of the parent volume.
    pub parent_id: u32,
    pub kind: ComponentKind,
    /// Declared partition count; equals `partitions.len()` after assembly.
    pub n_parts: u32,
    pub stripe_size: Option<u64>,
    pub n_columns: Option<u32>,
    /// Member partition ids, in column index order.
    pub partitions: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub id: u32,
    pub name: String,
    pub dgname: String,
    pub kind: VolumeKind,
    /// Volume size in sectors.
    pub size: u64,
    /// 1-byte content descriptor with MBR partition-type semantics.
    pub part_type: u8,
    /// Windows drive-letter hint.
    pub hint: Option<String>,
    /// Declared component count; equals `components.len()` after assembly.
    pub n_comps: u32,
    pub components: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskGroup {
    pub guid: Uuid,
    pub id: u32,
    pub name: String,
    /// Committed sequence all member disks must agree on.
    pub sequence: u64,
    pub disks: Vec<Disk>,
    pub volumes: Vec<Volume>,
    pub components: Vec<Component>,
    pub partitions: Vec<Partition>,
}

impl DiskGroup {
    #[must_use]
    pub fn disk_by_id(&self, id: u32) -> Option<&Disk> {
        self.disks.iter().find(|d| d.id == id)
    }

    #[must_use]
    pub fn partition_by_id(&self, id: u32) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn component_by_id(&self, id: u32) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn volume_by_id(&self, id: u32) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.id == id)
    }

    #[must_use]
    pub fn volume_by_name(&self, name: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.name == name)
    }

    /// Cross-link and validate one disk's decoded records into a disk group.
    pub(crate) fn assemble(guid: Uuid, vmdb: &Vmdb, records: RecordSet) -> Result<Self> {
        let declared = vmdb.committed;
        check_count("volume", declared.volumes, records.volumes.len())?;
        check_count("component", declared.components, records.components.len())?;
        check_count("partition", declared.partitions, records.partitions.len())?;
        check_count("disk", declared.disks, records.disks.len())?;

        // The disk group's own record carries its id and name; fall back to
        // the VMDB copy of the name if the record is absent.
        let (id, name) = match records.disk_group {
            Some(dg) => (dg.id, dg.name),
            None => (0, vmdb.disk_group_name.clone()),
        };

        let disks: Vec<Disk> = records
            .disks
            .into_iter()
            .map(|d| Disk {
                id: d.id,
                name: d.name,
                dgname: name.clone(),
                guid: d.guid,
                device: None,
            })
            .collect();

        let mut volumes: Vec<Volume> = records
            .volumes
            .into_iter()
            .map(|v| Volume {
                id: v.id,
                name: v.name,
                dgname: name.clone(),
                kind: v.kind,
                size: v.size,
                part_type: v.part_type,
                hint: v.hint,
                n_comps: v.n_comps,
                components: Vec::new(),
            })
            .collect();

        let mut components: Vec<Component> = records
            .components
            .into_iter()
            .map(|c| Component {
                id: c.id,
                name: c.name,
                parent_id: c.parent_id,
                kind: c.kind,
                n_parts: c.n_parts,
                stripe_size: c.stripe_size,
                n_columns: c.n_columns,
                partitions: Vec::new(),
            })
            .collect();

        let partitions: Vec<Partition> = records
            .partitions
            .into_iter()
            .map(|p| Partition {
                id: p.id,
                name: p.name,
                parent_id: p.parent_id,
                disk_id: p.disk_id,
                start: p.start,
                vol_offset: p.vol_offset,
                size: p.size,
                index: p.index,
            })
            .collect();

        // Partition → disk and partition → component.
        for part in &partitions {
            if !disks.iter().any(|d| d.id == part.disk_id) {
                return Err(LdmError::Invalid(format!(
                    "partition {} references unknown disk {}",
                    part.id, part.disk_id
                )));
            }

            let comp = components
                .iter_mut()
                .find(|c| c.id == part.parent_id)
                .ok_or_else(|| {
                    LdmError::Invalid(format!(
                        "didn't find parent component {} for partition {}",
                        part.parent_id, part.id
                    ))
                })?;
            comp.partitions.push(part.id);
        }

        // Component → volume, with partitions sorted into column order. The
        // striped and raid emitters use that order directly.
        let column_of: HashMap<u32, u32> =
            partitions.iter().map(|p| (p.id, p.index)).collect();
        for comp in &mut components {
            if comp.partitions.len() != comp.n_parts as usize {
                return Err(LdmError::Invalid(format!(
                    "component {} expected {} partitions, but found {}",
                    comp.id,
                    comp.n_parts,
                    comp.partitions.len()
                )));
            }

            comp.partitions.sort_by_key(|id| column_of[id]);
            for pair in comp.partitions.windows(2) {
                if column_of[&pair[0]] == column_of[&pair[1]] {
                    return Err(LdmError::Invalid(format!(
                        "component {} has duplicate column index {}",
                        comp.id, column_of[&pair[0]]
                    )));
                }
            }

            let vol = volumes
                .iter_mut()
                .find(|v| v.id == comp.parent_id)
                .ok_or_else(|| {
                    LdmError::Invalid(format!(
                        "didn't find parent volume {} for component {}",
                        comp.parent_id, comp.id
                    ))
                })?;
            vol.components.push(comp.id);
        }

        for vol in &volumes {
            if vol.components.len() != vol.n_comps as usize {
                return Err(LdmError::Invalid(format!(
                    "volume {} expected {} components, but only found {}",
                    vol.id,
                    vol.n_comps,
                    vol.components.len()
                )));
            }
        }

        Ok(Self {
            guid,
            id,
            name,
            sequence: vmdb.committed_seq,
            disks,
            volumes,
            components,
            partitions,
        })
    }

    /// Record where a member disk lives. Returns false when no disk record
    /// matches `disk_guid` (the device belongs to no record of this group).
    pub(crate) fn attach_device(&mut self, disk_guid: Uuid, device: DiskDevice) -> bool {
        match self.disks.iter_mut().find(|d| d.guid == disk_guid) {
            Some(disk) => {
                disk.device = Some(device);
                true
            }
            None => false,
        }
    }
}

fn check_count(kind: &str, declared: u32, found: usize) -> Result<()> {
    if declared as usize != found {
        return Err(LdmError::Invalid(format!(
            "expected {declared} {kind} VBLKs, but found {found}"
        )));
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────
