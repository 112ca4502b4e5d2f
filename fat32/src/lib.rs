//! Read-only FAT32 file system driver.
//!
//! Translates hierarchical paths into block-device sector reads and decodes
//! the FAT32 on-disk structures, with no operating system underneath. The
//! caller supplies a [`BlockDevice`] implementation; everything else is pure
//! decoding and cluster arithmetic.
//!
//! # Subsystems
//!
//! - **block** - block-device collaborator boundary: disk handles, partition
//!   descriptors, sector reads
//! - **bpb** - boot sector and FS-information sector decoding
//! - **dir** - 32-byte directory entries and 8.3 short names
//! - **fat** - File Allocation Table entry classification
//! - **file** - the driver itself: geometry cache, chain walking, path
//!   resolution, directory listing, file reading
//!
//! # Posture
//!
//! The driver never panics on bad media and never propagates a failure to
//! the caller: every public operation degrades to an empty or zero result on
//! device errors, corrupt chains, or missing entries. Internally the failure
//! kinds are kept apart as [`FatError`].
//!
//! Writing, FAT12/16, and long-name (VFAT) decoding are out of scope; a
//! long-name entry surfaces in listings under the fixed placeholder name
//! `LONG`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod block;
pub mod bpb;
pub mod dir;
pub mod fat;
pub mod file;

pub use block::{BlockDevice, DiskHandle, PartitionDescriptor, SECTOR_SIZE};
pub use bpb::{BootSector, FsInfoSector};
pub use dir::{DirectoryEntry, FileAttributes};
pub use file::{Fat32Driver, ResolvedFile, SharedDriver};

/// Internal failure classification.
///
/// Public operations collapse all three kinds into their benign empty/zero
/// results; the enum exists so intermediate layers can propagate failures
/// with `?` without losing the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    /// A block-device read failed.
    Io,
    /// A path segment or file name was not present, or a directory chain
    /// ended before a match was found.
    NotFound,
    /// A FAT chain led to the bad-cluster sentinel (0x0FFFFFF7).
    CorruptChain,
}
