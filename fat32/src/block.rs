//! Block Device Collaborator Boundary
//!
//! The driver performs no hardware access of its own. Every sector arrives
//! through the [`BlockDevice`] trait, implemented by the embedding kernel's
//! storage stack (ATA, AHCI, virtio, a RAM disk, ...). Disks and partitions
//! are identified by opaque ids handed out by the disk/partition-discovery
//! layers, which are likewise outside this crate.

/// Sector size in bytes. FAT32 cluster and FAT arithmetic in this driver is
/// defined in terms of 512-byte sectors.
pub const SECTOR_SIZE: usize = 512;

/// Handle to a physical disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskHandle {
    /// Unique id assigned by the disk identification layer.
    pub uuid: u64,
}

/// Descriptor for one partition of a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    /// Unique id assigned by the partition discovery layer.
    pub uuid: u64,
    /// First LBA of the partition.
    pub start: u64,
}

/// Sector-granular read access to disks.
///
/// One implementation serves all disks; the handle selects which disk a read
/// targets.
pub trait BlockDevice {
    /// Read `count` consecutive 512-byte sectors starting at `lba` into
    /// `buffer`, which must hold exactly `count * 512` bytes.
    ///
    /// Returns `false` on any failure. There is no partial-success
    /// signaling: on `false` the buffer contents are unspecified.
    fn read_sectors(&self, disk: DiskHandle, lba: u64, count: u32, buffer: &mut [u8]) -> bool;
}
