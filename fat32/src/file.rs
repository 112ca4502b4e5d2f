//! FAT32 Driver Operations
//!
//! Ties the decoded on-disk structures together into the public surface:
//! free-space queries, directory listings, and whole-file reads. The driver
//! owns the block device and a geometry cache for the most recently used
//! (disk, partition) pair.
//!
//! Every operation is synchronous and performs direct sector reads. No
//! failure ever propagates out: a device error, a missing name, and a
//! corrupt FAT chain all collapse to the empty or zero result of the
//! operation in progress.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};
use spin::Mutex;

use crate::block::{BlockDevice, DiskHandle, PartitionDescriptor, SECTOR_SIZE};
use crate::bpb::{BootSector, FsInfoSector};
use crate::dir::{DirectoryEntry, DIR_ENTRY_SIZE, LONG_NAME_PLACEHOLDER};
use crate::fat;
use crate::FatError;

/// One record of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Short name, or `LONG` for a long-name entry.
    pub name: String,
    pub hidden: bool,
    pub system: bool,
    pub directory: bool,
    /// Size in bytes. Directories report one cluster's byte capacity, since
    /// FAT32 tracks no aggregate size for them.
    pub size: u64,
}

fn resolved_file(entry: &DirectoryEntry, boot: &BootSector) -> ResolvedFile {
    let name = if entry.is_long_name() {
        String::from(LONG_NAME_PLACEHOLDER)
    } else {
        String::from(entry.display_name())
    };

    let directory = entry.is_directory();
    let size = if directory {
        boot.cluster_size_bytes() as u64
    } else {
        entry.size() as u64
    };

    ResolvedFile {
        name,
        hidden: (entry.attributes & 0x01) != 0,
        system: (entry.attributes & 0x02) != 0,
        directory,
        size,
    }
}

/// Read-only FAT32 driver over a block device.
///
/// The driver caches the boot and FS-information sectors of the most
/// recently used (disk, partition) identity; supplying a different pair
/// replaces the cache. The cache is not synchronized: one `Fat32Driver`
/// must not be used from more than one context at a time. Use
/// [`SharedDriver`] where that cannot be guaranteed.
pub struct Fat32Driver<B: BlockDevice> {
    device: B,
    cached_identity: Option<(u64, u64)>,
    partition_start: u64,
    boot: Option<BootSector>,
    fs_info: Option<FsInfoSector>,
}

impl<B: BlockDevice> Fat32Driver<B> {
    pub fn new(device: B) -> Self {
        Self {
            device,
            cached_identity: None,
            partition_start: 0,
            boot: None,
            fs_info: None,
        }
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Free space in bytes, from the FS-information sector's free-cluster
    /// count. Returns 0 when the volume's metadata cannot be cached.
    pub fn free_size(&mut self, disk: DiskHandle, partition: &PartitionDescriptor) -> u64 {
        if !self.ensure_cached(disk, partition) {
            return 0;
        }
        let (boot, fs_info) = match (self.boot, self.fs_info) {
            (Some(boot), Some(fs_info)) => (boot, fs_info),
            _ => return 0,
        };

        fs_info.free_clusters as u64 * boot.sectors_per_cluster as u64 * SECTOR_SIZE as u64
    }

    /// List the directory reached by walking `path` from the root. Results
    /// follow on-disk entry order. Any failure yields an empty listing.
    pub fn list(
        &mut self,
        disk: DiskHandle,
        partition: &PartitionDescriptor,
        path: &[&str],
    ) -> Vec<ResolvedFile> {
        if !self.ensure_cached(disk, partition) {
            return Vec::new();
        }
        let boot = match self.boot {
            Some(boot) => boot,
            None => return Vec::new(),
        };

        self.list_directory(&boot, disk, path).unwrap_or_default()
    }

    /// Read the whole content of `file_name` inside the directory reached
    /// by `path`. An empty result means failure or a genuinely empty file;
    /// the two are not distinguished.
    pub fn read_file(
        &mut self,
        disk: DiskHandle,
        partition: &PartitionDescriptor,
        path: &[&str],
        file_name: &str,
    ) -> Vec<u8> {
        if !self.ensure_cached(disk, partition) {
            return Vec::new();
        }
        let boot = match self.boot {
            Some(boot) => boot,
            None => return Vec::new(),
        };

        self.read_file_contents(&boot, disk, path, file_name)
            .unwrap_or_default()
    }

    // ========================================================================
    // Geometry cache
    // ========================================================================

    /// Make the cached boot/FS-information sectors match (disk, partition).
    ///
    /// The cache is keyed on the identity pair alone: a lookup for the
    /// cached pair performs no reads, even when the previous attempt
    /// failed. A failed attempt stays failed until a different pair is
    /// requested.
    fn ensure_cached(&mut self, disk: DiskHandle, partition: &PartitionDescriptor) -> bool {
        if self.cached_identity != Some((disk.uuid, partition.uuid)) {
            self.partition_start = partition.start;
            self.boot = self.read_boot_sector(disk, partition);
            self.fs_info = match self.boot {
                Some(boot) => self.read_fs_info(disk, partition, &boot),
                None => None,
            };
            self.cached_identity = Some((disk.uuid, partition.uuid));

            if self.boot.is_some() && self.fs_info.is_some() {
                debug!(
                    "cached FAT32 volume (disk {}, partition {})",
                    disk.uuid, partition.uuid
                );
            }
        }

        self.boot.is_some() && self.fs_info.is_some()
    }

    fn read_boot_sector(
        &self,
        disk: DiskHandle,
        partition: &PartitionDescriptor,
    ) -> Option<BootSector> {
        let mut buffer = [0u8; SECTOR_SIZE];
        if !self.device.read_sectors(disk, partition.start, 1, &mut buffer) {
            warn!("failed to read boot sector at LBA {}", partition.start);
            return None;
        }

        let boot = BootSector::from_bytes(&buffer);
        if !boot.is_valid() {
            warn!("no valid FAT32 boot sector at LBA {}", partition.start);
            return None;
        }

        Some(boot)
    }

    fn read_fs_info(
        &self,
        disk: DiskHandle,
        partition: &PartitionDescriptor,
        boot: &BootSector,
    ) -> Option<FsInfoSector> {
        let lba = partition.start + boot.fs_info_sector as u64;

        let mut buffer = [0u8; SECTOR_SIZE];
        if !self.device.read_sectors(disk, lba, 1, &mut buffer) {
            warn!("failed to read FS information sector at LBA {}", lba);
            return None;
        }

        let info = FsInfoSector::from_bytes(&buffer);
        if !info.is_valid() {
            warn!("FS information sector at LBA {} has bad signatures", lba);
            return None;
        }

        Some(info)
    }

    // ========================================================================
    // Cluster addressing and FAT chains
    // ========================================================================

    /// Absolute sector of `cluster`'s first sector. Cluster numbers below 2
    /// are reserved and must not be passed here.
    fn cluster_to_sector(&self, boot: &BootSector, cluster: u32) -> u64 {
        let data_region = self.partition_start + boot.data_region_start();
        data_region + (cluster as u64 - 2) * boot.sectors_per_cluster as u64
    }

    /// Raw FAT entry for `cluster`, masked to its 28 significant bits.
    /// Returns 0 when the containing FAT block cannot be read.
    fn read_fat_entry(&self, boot: &BootSector, disk: DiskHandle, cluster: u32) -> u32 {
        let fat_region = self.partition_start + boot.fat_region_start();
        let cluster_size = boot.cluster_size_bytes() as u64;
        let entry_offset = cluster as u64 * 4;

        let fat_sector = fat_region + entry_offset / cluster_size;

        let mut table = vec![0u8; cluster_size as usize];
        if !self
            .device
            .read_sectors(disk, fat_sector, boot.sectors_per_cluster as u32, &mut table)
        {
            warn!("failed to read FAT block at LBA {}", fat_sector);
            return 0;
        }

        let offset = (entry_offset % cluster_size) as usize;
        let entry = u32::from_le_bytes([
            table[offset],
            table[offset + 1],
            table[offset + 2],
            table[offset + 3],
        ]);

        entry & fat::ENTRY_MASK
    }

    /// Successor of `cluster` in its FAT chain, or `None` at end of chain.
    ///
    /// The free value 0 and the bad-cluster sentinel are passed through;
    /// callers decide how to treat them.
    fn next_cluster(&self, boot: &BootSector, disk: DiskHandle, cluster: u32) -> Option<u32> {
        let value = self.read_fat_entry(boot, disk, cluster);
        if fat::is_end_of_chain(value) {
            None
        } else {
            Some(value)
        }
    }

    /// Read one whole cluster from the data region.
    fn read_cluster(
        &self,
        boot: &BootSector,
        disk: DiskHandle,
        cluster: u32,
    ) -> Result<Vec<u8>, FatError> {
        let lba = self.cluster_to_sector(boot, cluster);
        let mut buffer = vec![0u8; boot.cluster_size_bytes() as usize];
        if self
            .device
            .read_sectors(disk, lba, boot.sectors_per_cluster as u32, &mut buffer)
        {
            Ok(buffer)
        } else {
            warn!("failed to read cluster {} at LBA {}", cluster, lba);
            Err(FatError::Io)
        }
    }

    // ========================================================================
    // Path resolution
    // ========================================================================

    /// Walk `path` from the root directory down to a cluster number. The
    /// empty path resolves to the root directory's start cluster.
    fn resolve(&self, boot: &BootSector, disk: DiskHandle, path: &[&str]) -> Result<u32, FatError> {
        let mut current = boot.root_dir_cluster;
        for segment in path {
            current = self.find_subdirectory(boot, disk, current, segment)?;
        }
        Ok(current)
    }

    /// Scan the directory starting at `dir_cluster`, following its chain,
    /// for a subdirectory entry named `name`. Entries that are deleted,
    /// long-name continuations, or plain files never match.
    fn find_subdirectory(
        &self,
        boot: &BootSector,
        disk: DiskHandle,
        dir_cluster: u32,
        name: &str,
    ) -> Result<u32, FatError> {
        let mut cluster = dir_cluster;
        loop {
            let buffer = self.read_cluster(boot, disk, cluster)?;

            for raw in buffer.chunks_exact(DIR_ENTRY_SIZE) {
                let entry = DirectoryEntry::from_bytes(raw);
                if entry.is_end_of_directory() {
                    return Err(FatError::NotFound);
                }
                if entry.is_used()
                    && !entry.is_long_name()
                    && entry.is_directory()
                    && entry.short_name_matches(name)
                {
                    return Ok(entry.first_cluster());
                }
            }

            cluster = self.next_directory_cluster(boot, disk, cluster)?;
        }
    }

    /// Advance a directory chain during a search. Chain end and the free
    /// value both mean the name is absent; the bad-cluster sentinel is a
    /// corrupt chain.
    fn next_directory_cluster(
        &self,
        boot: &BootSector,
        disk: DiskHandle,
        cluster: u32,
    ) -> Result<u32, FatError> {
        match self.next_cluster(boot, disk, cluster) {
            None | Some(fat::FREE) => Err(FatError::NotFound),
            Some(next) if fat::is_bad(next) => Err(FatError::CorruptChain),
            Some(next) => Ok(next),
        }
    }

    // ========================================================================
    // Directory listing
    // ========================================================================

    fn list_directory(
        &self,
        boot: &BootSector,
        disk: DiskHandle,
        path: &[&str],
    ) -> Result<Vec<ResolvedFile>, FatError> {
        let mut cluster = self.resolve(boot, disk, path)?;
        let mut files = Vec::new();

        loop {
            let buffer = match self.read_cluster(boot, disk, cluster) {
                Ok(buffer) => buffer,
                Err(_) => return Ok(files),
            };

            for raw in buffer.chunks_exact(DIR_ENTRY_SIZE) {
                let entry = DirectoryEntry::from_bytes(raw);
                if entry.is_end_of_directory() {
                    return Ok(files);
                }
                if entry.is_used() {
                    files.push(resolved_file(&entry, boot));
                }
            }

            match self.next_cluster(boot, disk, cluster) {
                None | Some(fat::FREE) => return Ok(files),
                Some(next) if fat::is_bad(next) => return Ok(files),
                Some(next) => cluster = next,
            }
        }
    }

    // ========================================================================
    // File reading
    // ========================================================================

    fn read_file_contents(
        &self,
        boot: &BootSector,
        disk: DiskHandle,
        path: &[&str],
        file_name: &str,
    ) -> Result<Vec<u8>, FatError> {
        let dir_cluster = self.resolve(boot, disk, path)?;

        // Only the first cluster of the containing directory is searched;
        // the directory's chain is not followed here.
        let buffer = self.read_cluster(boot, disk, dir_cluster)?;

        for raw in buffer.chunks_exact(DIR_ENTRY_SIZE) {
            let entry = DirectoryEntry::from_bytes(raw);
            if entry.is_end_of_directory() {
                break;
            }
            if entry.is_used()
                && !entry.is_long_name()
                && !entry.is_directory()
                && entry.short_name_matches(file_name)
            {
                return Ok(self.read_cluster_chain(boot, disk, entry.first_cluster(), entry.size()));
            }
        }

        Err(FatError::NotFound)
    }

    /// Concatenate cluster payloads along the chain from `first`, stopping
    /// after `size` bytes, on a failed read, at end of chain, or at the
    /// bad-cluster sentinel. Content gathered before a stop is kept.
    fn read_cluster_chain(
        &self,
        boot: &BootSector,
        disk: DiskHandle,
        first: u32,
        size: u32,
    ) -> Vec<u8> {
        let cluster_size = boot.cluster_size_bytes() as usize;
        let size = size as usize;
        let mut content = Vec::with_capacity(size);
        let mut cluster = first;

        while content.len() < size {
            let buffer = match self.read_cluster(boot, disk, cluster) {
                Ok(buffer) => buffer,
                Err(_) => break,
            };
            let remaining = size - content.len();
            content.extend_from_slice(&buffer[..cluster_size.min(remaining)]);

            if content.len() < size {
                match self.next_cluster(boot, disk, cluster) {
                    None | Some(fat::FREE) => break,
                    Some(next) if fat::is_bad(next) => break,
                    Some(next) => cluster = next,
                }
            }
        }

        content
    }
}

/// A driver shared between contexts.
///
/// The lock is held for the whole of each operation, so the identity check,
/// any cache replacement, and every dependent sector read happen without
/// interleaving.
pub struct SharedDriver<B: BlockDevice> {
    inner: Mutex<Fat32Driver<B>>,
}

impl<B: BlockDevice> SharedDriver<B> {
    pub fn new(device: B) -> Self {
        Self {
            inner: Mutex::new(Fat32Driver::new(device)),
        }
    }

    /// See [`Fat32Driver::free_size`].
    pub fn free_size(&self, disk: DiskHandle, partition: &PartitionDescriptor) -> u64 {
        self.inner.lock().free_size(disk, partition)
    }

    /// See [`Fat32Driver::list`].
    pub fn list(
        &self,
        disk: DiskHandle,
        partition: &PartitionDescriptor,
        path: &[&str],
    ) -> Vec<ResolvedFile> {
        self.inner.lock().list(disk, partition, path)
    }

    /// See [`Fat32Driver::read_file`].
    pub fn read_file(
        &self,
        disk: DiskHandle,
        partition: &PartitionDescriptor,
        path: &[&str],
        file_name: &str,
    ) -> Vec<u8> {
        self.inner.lock().read_file(disk, partition, path, file_name)
    }
}
