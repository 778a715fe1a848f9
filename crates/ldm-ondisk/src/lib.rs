#![forbid(unsafe_code)]
//! Byte-level parsing of Windows LDM (dynamic disk) on-disk metadata.
//!
//! This crate is pure: every parser takes a byte slice and produces a typed
//! structure or an error. Locating those bytes on a device is the job of
//! `ldm-core`.
//!
//! The metadata chain, in the order a reader encounters it:
//!
//! - **PRIVHEAD** — per-disk private header; identifies the disk and locates
//!   the config area ([`privhead`]).
//! - **TOCBLOCK** — table of contents 2 sectors into the config area; its
//!   `config` bitmap locates the VMDB ([`toc`]).
//! - **VMDB** — describes the VBLK array: cell size, first-cell offset,
//!   commit sequence and committed record counts ([`toc`]).
//! - **VBLK** stream — fixed-size cells carrying the volume, component,
//!   partition, disk and disk-group records, possibly spanning multiple
//!   cells ([`vblk`], decoded by [`record`]).
//!
//! All integers are big-endian. Sizes and offsets inside records are in
//! sectors unless noted.

pub mod privhead;
pub mod record;
pub mod toc;
pub mod vblk;

pub use privhead::PrivHead;
pub use record::{
    ComponentKind, ComponentRecord, DiskGroupRecord, DiskRecord, PartitionRecord, VolumeKind,
    VolumeRecord,
};
pub use toc::{RecordCounts, TocBlock, Vmdb};
pub use vblk::RecordSet;
