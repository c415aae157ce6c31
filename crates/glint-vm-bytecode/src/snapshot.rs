//! On-disk snapshot header.
//!
//! A snapshot is a magic header followed by one or more function
//! sections. This module only defines the header shape and its
//! validation; reading/writing the function sections themselves is the
//! embedding engine's job (`glint-engine::snapshot`), since it needs the
//! full compiler/interpreter to reconstruct literal pools.

use thiserror::Error;

/// Magic bytes identifying a Glint bytecode snapshot.
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"GLINTBC\0";

/// Snapshot format version. Bumped whenever the header or section layout
/// changes in a way old readers cannot tolerate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Endianness marker so a reader can refuse a snapshot built for the
/// other byte order rather than silently misinterpreting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Endianness {
    /// Least-significant byte first.
    Little = 0,
    /// Most-significant byte first.
    Big = 1,
}

impl Endianness {
    /// The endianness of the host this binary was built for.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }
}

/// Width of a compact pointer in the runtime that produced a snapshot.
/// Matches [`glint_vm_gc::CompactPtr`]'s 16-bit width today; kept
/// explicit in the header so a future wider-heap build can refuse older
/// snapshots instead of corrupting pointers silently.
pub const COMPACT_PTR_BITS: u8 = 16;

/// The fixed-size header every snapshot begins with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Format version the snapshot was written with.
    pub version: u32,
    /// Endianness the snapshot's multi-byte fields were written in.
    pub endianness: Endianness,
    /// Compact pointer width (bits) the snapshot assumes.
    pub compact_ptr_bits: u8,
    /// Total number of function sections following the header.
    pub function_count: u32,
}

/// Errors validating a snapshot header before trusting its body.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    /// The first 8 bytes were not [`SNAPSHOT_MAGIC`].
    #[error("not a glint bytecode snapshot")]
    BadMagic,
    /// `version` is newer or older than this build understands.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    /// The snapshot's endianness does not match this runtime's.
    #[error("snapshot endianness does not match this runtime")]
    EndiannessMismatch,
    /// The snapshot's compact pointer width does not match this runtime's.
    #[error("snapshot compact-pointer width does not match this runtime")]
    PointerWidthMismatch,
    /// The buffer was shorter than a header requires.
    #[error("truncated snapshot header")]
    Truncated,
}

impl SnapshotHeader {
    /// Parse and validate the fixed header from the front of `bytes`.
    ///
    /// A snapshot is accepted only if its endianness and compact-pointer
    /// width match the running build; everything else about version
    /// skew is left to the caller (e.g. the embedder may choose to
    /// recompile from source on a version mismatch rather than treating
    /// it as fatal).
    pub fn parse(bytes: &[u8]) -> Result<Self, SnapshotError> {
        const HEADER_LEN: usize = 8 + 4 + 1 + 1 + 4;
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::Truncated);
        }
        if bytes[0..8] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let endianness = match bytes[12] {
            0 => Endianness::Little,
            1 => Endianness::Big,
            _ => return Err(SnapshotError::BadMagic),
        };
        let compact_ptr_bits = bytes[13];
        let function_count = u32::from_le_bytes(bytes[14..18].try_into().unwrap());

        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        if endianness != Endianness::native() {
            return Err(SnapshotError::EndiannessMismatch);
        }
        if compact_ptr_bits != COMPACT_PTR_BITS {
            return Err(SnapshotError::PointerWidthMismatch);
        }

        Ok(Self {
            version,
            endianness,
            compact_ptr_bits,
            function_count,
        })
    }

    /// Serialize the header to bytes, ready to prefix the function
    /// sections.
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18);
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.endianness as u8);
        out.push(self.compact_ptr_bits);
        out.extend_from_slice(&self.function_count.to_le_bytes());
        out
    }

    /// Build a header describing the current build, for `function_count`
    /// functions.
    pub fn for_native_build(function_count: u32) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            endianness: Endianness::native(),
            compact_ptr_bits: COMPACT_PTR_BITS,
            function_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = SnapshotHeader::for_native_build(3);
        let bytes = header.write();
        let parsed = SnapshotHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = SnapshotHeader::for_native_build(0).write();
        bytes[0] = b'X';
        assert_eq!(SnapshotHeader::parse(&bytes), Err(SnapshotError::BadMagic));
    }

    #[test]
    fn rejects_mismatched_endianness() {
        let mut bytes = SnapshotHeader::for_native_build(0).write();
        bytes[12] = 1 - bytes[12];
        assert_eq!(
            SnapshotHeader::parse(&bytes),
            Err(SnapshotError::EndiannessMismatch)
        );
    }

    #[test]
    fn rejects_truncated_buffers() {
        assert_eq!(SnapshotHeader::parse(&[1, 2, 3]), Err(SnapshotError::Truncated));
    }
}
