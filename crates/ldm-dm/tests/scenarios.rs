//! End-to-end scenarios over synthetic disk images: probe, parse, assemble,
//! merge, and synthesise DM tables.

mod common;

use common::*;
use ldm_core::Ldm;
use ldm_types::LdmError;
use uuid::Uuid;

fn guid(n: u8) -> Uuid {
    Uuid::from_bytes([n; 16])
}

/// One Gen volume wrapping one spanned component wrapping one partition.
fn simple_volume_spec(disk_guid: Uuid) -> ImageSpec {
    ImageSpec {
        disk_guid,
        dg_guid: guid(9),
        dg_name: "WinDg0".into(),
        committed_seq: 42,
        counts: [1, 1, 1, 1],
        records: vec![
            disk_group_record(1, "WinDg0"),
            disk_record(30, "Disk1", disk_guid),
            gen_volume_record(7, "Volume1", 1, 1000, 0x07),
            component_record(12, "Volume1-01", 2, 1, 7, None),
            partition_record(20, "Disk1-01", 2048, 0, 1000, 12, 30, 0),
        ],
        data_start: 34,
        gpt: false,
    }
}

#[test]
fn simple_volume_yields_one_linear_table() {
    let spec = simple_volume_spec(guid(1));
    let mut ldm = Ldm::new();
    ldm.add_file(image_file(&spec.build()), 512, "/dev/sda").unwrap();

    let dg = &ldm.disk_groups()[0];
    assert_eq!(dg.name, "WinDg0");
    assert_eq!(dg.guid, guid(9));
    assert_eq!(dg.sequence, 42);

    let disk = dg.disk_by_id(30).unwrap();
    let device = disk.device.as_ref().expect("device attached");
    assert_eq!(device.path, "/dev/sda");
    assert_eq!(device.data_start, 34);
    assert_eq!(device.metadata_size, 32);

    let vol = dg.volume_by_name("Volume1").unwrap();
    assert_eq!(vol.part_type, 0x07);

    let tables = ldm_dm::volume_tables(dg, vol).unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "ldm_WinDg0_Volume1");
    assert_eq!(tables[0].table, "0 1000 linear /dev/sda 2082\n");
}

#[test]
fn gpt_disk_probes_through_the_entry_array() {
    // The LDM metadata partition is the third GPT entry; an implementation
    // that keeps re-reading entry 0 never finds it.
    let mut spec = simple_volume_spec(guid(1));
    spec.gpt = true;

    let mut ldm = Ldm::new();
    ldm.add_file(image_file(&spec.build()), 512, "/dev/sda").unwrap();

    let dg = &ldm.disk_groups()[0];
    let tables = ldm_dm::volume_tables(dg, dg.volume_by_name("Volume1").unwrap()).unwrap();
    assert_eq!(tables[0].table, "0 1000 linear /dev/sda 2082\n");
}

#[test]
fn foreign_partition_type_is_not_ldm() {
    let mut image = simple_volume_spec(guid(1)).build();
    image[446 + 4] = 0x07; // NTFS, not LDM

    let mut ldm = Ldm::new();
    let err = ldm.add_file(image_file(&image), 512, "/dev/sda").unwrap_err();
    assert!(matches!(err, LdmError::NotLdm(_)));
    assert!(ldm.disk_groups().is_empty());
}

#[test]
fn records_spanning_multiple_cells_reassemble() {
    let long_name = "V".repeat(150);
    let mut spec = simple_volume_spec(guid(1));
    spec.records[2] = gen_volume_record(7, &long_name, 1, 1000, 0x07);

    let mut ldm = Ldm::new();
    ldm.add_file(image_file(&spec.build()), 512, "/dev/sda").unwrap();

    let dg = &ldm.disk_groups()[0];
    assert!(dg.volume_by_name(&long_name).is_some());
}

/// Two-disk mirror: one volume, two spanned components, one partition each.
fn mirror_spec(disk_guid: Uuid) -> ImageSpec {
    ImageSpec {
        disk_guid,
        dg_guid: guid(9),
        dg_name: "WinDg0".into(),
        committed_seq: 7,
        counts: [1, 2, 2, 2],
        records: vec![
            disk_group_record(1, "WinDg0"),
            disk_record(30, "Disk1", guid(1)),
            disk_record(31, "Disk2", guid(2)),
            gen_volume_record(7, "Volume1", 2, 1000, 0x07),
            component_record(12, "Volume1-01", 2, 1, 7, None),
            component_record(13, "Volume1-02", 2, 1, 7, None),
            partition_record(20, "Disk1-01", 100, 0, 1000, 12, 30, 0),
            partition_record(21, "Disk2-01", 200, 0, 1000, 13, 31, 0),
        ],
        data_start: 0,
        gpt: false,
    }
}

#[test]
fn mirror_with_absent_disk_degrades_to_placeholder() {
    // Only disk A is ever added; disk B exists in metadata alone.
    let mut ldm = Ldm::new();
    ldm.add_file(image_file(&mirror_spec(guid(1)).build()), 512, "/dev/sda")
        .unwrap();

    let dg = &ldm.disk_groups()[0];
    assert!(dg.disk_by_id(31).unwrap().device.is_none());

    let tables = ldm_dm::volume_tables(dg, dg.volume_by_name("Volume1").unwrap()).unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].name, "ldm_WinDg0_Disk1-01");
    assert_eq!(tables[0].table, "0 1000 linear /dev/sda 100\n");
    assert_eq!(
        tables[1].table,
        "0 1000 raid raid1 1 128 2 - /dev/mapper/ldm_WinDg0_Disk1-01 - -\n"
    );
}

#[test]
fn second_disk_of_a_group_merges_without_reparse() {
    let mut ldm = Ldm::new();
    ldm.add_file(image_file(&mirror_spec(guid(1)).build()), 512, "/dev/sda")
        .unwrap();
    ldm.add_file(image_file(&mirror_spec(guid(2)).build()), 512, "/dev/sdb")
        .unwrap();

    assert_eq!(ldm.disk_groups().len(), 1);
    let dg = &ldm.disk_groups()[0];
    assert_eq!(dg.disk_by_id(30).unwrap().device.as_ref().unwrap().path, "/dev/sda");
    assert_eq!(dg.disk_by_id(31).unwrap().device.as_ref().unwrap().path, "/dev/sdb");

    // With both legs present the mirror is whole.
    let tables = ldm_dm::volume_tables(dg, dg.volume_by_name("Volume1").unwrap()).unwrap();
    assert_eq!(tables.len(), 3);
    assert!(tables[2].table.ends_with("- /dev/mapper/ldm_WinDg0_Disk2-01\n"));
}

#[test]
fn re_adding_the_same_disk_only_refreshes_device_fields() {
    let spec = simple_volume_spec(guid(1));
    let image = spec.build();

    let mut ldm = Ldm::new();
    ldm.add_file(image_file(&image), 512, "/dev/sda").unwrap();
    ldm.add_file(image_file(&image), 512, "/dev/sdx").unwrap();

    assert_eq!(ldm.disk_groups().len(), 1);
    let dg = &ldm.disk_groups()[0];
    assert_eq!(dg.partitions.len(), 1);
    assert_eq!(dg.volumes.len(), 1);
    assert_eq!(dg.disk_by_id(30).unwrap().device.as_ref().unwrap().path, "/dev/sdx");
}

#[test]
fn disagreeing_committed_sequences_are_inconsistent() {
    let mut ldm = Ldm::new();
    ldm.add_file(image_file(&mirror_spec(guid(1)).build()), 512, "/dev/sda")
        .unwrap();

    let mut newer = mirror_spec(guid(2));
    newer.committed_seq = 8;
    let err = ldm
        .add_file(image_file(&newer.build()), 512, "/dev/sdb")
        .unwrap_err();
    assert!(matches!(err, LdmError::Inconsistent(_)));

    // State is exactly as after the first add: one group, disk B unattached.
    assert_eq!(ldm.disk_groups().len(), 1);
    let dg = &ldm.disk_groups()[0];
    assert_eq!(dg.sequence, 7);
    assert!(dg.disk_by_id(31).unwrap().device.is_none());
}

#[test]
fn device_matching_no_disk_record_is_ignored() {
    let mut ldm = Ldm::new();
    ldm.add_file(image_file(&mirror_spec(guid(1)).build()), 512, "/dev/sda")
        .unwrap();
    // Same group, but a disk GUID no record mentions.
    ldm.add_file(image_file(&mirror_spec(guid(5)).build()), 512, "/dev/sdz")
        .unwrap();

    let dg = &ldm.disk_groups()[0];
    assert!(dg.disks.iter().all(|d| d
        .device
        .as_ref()
        .map_or(true, |dev| dev.path != "/dev/sdz")));
}

#[test]
fn declared_count_mismatch_fails_the_add() {
    let mut spec = simple_volume_spec(guid(1));
    spec.counts = [1, 1, 2, 1]; // one more partition than the stream holds

    let mut ldm = Ldm::new();
    let err = ldm
        .add_file(image_file(&spec.build()), 512, "/dev/sda")
        .unwrap_err();
    assert!(matches!(err, LdmError::Invalid(_)));
    assert!(ldm.disk_groups().is_empty());
}
