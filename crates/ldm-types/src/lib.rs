#![forbid(unsafe_code)]
//! Shared substrate for the LDM reader: the error type and bounds-checked
//! big-endian primitives used by every on-disk parser.
//!
//! All integers in LDM metadata are big-endian. Offsets into fixed
//! structures are byte offsets from the start of the structure.

use std::io;

use thiserror::Error;
use uuid::Uuid;

// ── Errors ──────────────────────────────────────────────────────────────────

/// Everything that can go wrong while reading LDM metadata or synthesising
/// device-mapper tables.
#[derive(Debug, Error)]
pub enum LdmError {
    /// An underlying read or stat failed.
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The device is readable but carries no LDM metadata.
    #[error("not an LDM disk: {0}")]
    NotLdm(String),

    /// Structural corruption: bad magic, out-of-range offsets, count
    /// mismatches, unresolved cross-references.
    #[error("invalid LDM metadata: {0}")]
    Invalid(String),

    /// Disks of the same disk group disagree on the committed sequence.
    #[error("inconsistent disk group: {0}")]
    Inconsistent(String),

    /// Well-formed metadata using a revision or layout we don't handle.
    #[error("unsupported LDM configuration: {0}")]
    NotSupported(String),

    /// A disk required by the requested operation has not been added.
    #[error("missing disk: {0}")]
    MissingDisk(String),

    /// Logic violation; not expected on well-formed input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LdmError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        LdmError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LdmError>;

// ── Big-endian readers ──────────────────────────────────────────────────────

/// Borrow `len` bytes at `offset`, or fail `Invalid`.
pub fn ensure_slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| LdmError::Invalid(format!("offset overflow at {offset:#x}")))?;
    buf.get(offset..end).ok_or_else(|| {
        LdmError::Invalid(format!(
            "need {len} bytes at offset {offset:#x}, have {}",
            buf.len().saturating_sub(offset)
        ))
    })
}

pub fn read_be_u16(buf: &[u8], offset: usize) -> Result<u16> {
    let b = ensure_slice(buf, offset, 2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

pub fn read_be_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let b = ensure_slice(buf, offset, 4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_be_u64(buf: &[u8], offset: usize) -> Result<u64> {
    let b = ensure_slice(buf, offset, 8)?;
    Ok(u64::from_be_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

// The MBR and GPT collaborators read little-endian fields; everything in
// LDM metadata proper is big-endian.

pub fn read_le_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let b = ensure_slice(buf, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_le_u64(buf: &[u8], offset: usize) -> Result<u64> {
    let b = ensure_slice(buf, offset, 8)?;
    Ok(u64::from_le_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

/// Copy a fixed-width field out of `buf`.
pub fn read_fixed<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let b = ensure_slice(buf, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(b);
    Ok(out)
}

/// Interpret a NUL-padded byte region as a string, trimming at the first NUL.
#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// ── GUIDs ───────────────────────────────────────────────────────────────────

/// Parse an ASCII GUID field (hyphenated form, NUL-padded) into a [`Uuid`].
///
/// LDM stores GUIDs as ASCII in the private header and in revision 3 disk
/// records; revision 4 disk records carry the raw 16 bytes instead.
pub fn parse_guid_ascii(bytes: &[u8]) -> Result<Uuid> {
    let text = trim_nul_padded(bytes);
    Uuid::parse_str(text.trim())
        .map_err(|_| LdmError::Invalid(format!("malformed GUID string {text:?}")))
}

// ── Tests ───────────────────────────────────────────────────────────────────
