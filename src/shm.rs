// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared memory handle.
// Delegates to platform::PlatformShm.

use std::io;

use crate::platform::posix::ShmMode;
use crate::platform::PlatformShm;

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively; fail if it already exists.
    Create,
    /// Open existing; fail if it does not exist.
    Open,
    /// Create if missing, open if it already exists.
    CreateOrOpen,
}

/// A named, inter-process shared memory region.
///
/// The mapped region carries a trailing `AtomicI32` reference counter shared
/// between all processes mapping the same segment. By default the backing
/// object is unlinked when the last mapping is dropped; a persistent handle
/// leaves it in place until [`ShmHandle::unlink`] is called.
pub struct ShmHandle {
    inner: PlatformShm,
}

impl ShmHandle {
    /// Acquire a named shared memory region of `size` bytes (user-visible).
    ///
    /// The actual mapped region is slightly larger to hold the ref counter.
    pub fn acquire(name: &str, size: usize, mode: ShmOpenMode) -> io::Result<Self> {
        let platform_mode = match mode {
            ShmOpenMode::Create => ShmMode::Create,
            ShmOpenMode::Open => ShmMode::Open,
            ShmOpenMode::CreateOrOpen => ShmMode::CreateOrOpen,
        };

        let inner = PlatformShm::acquire(name, size, platform_mode)?;
        Ok(Self { inner })
    }

    /// Like [`acquire`](Self::acquire), but the segment survives the last
    /// mapping going away.
    pub fn acquire_persistent(name: &str, size: usize, mode: ShmOpenMode) -> io::Result<Self> {
        let mut shm = Self::acquire(name, size, mode)?;
        shm.inner.set_persistent(true);
        Ok(shm)
    }

    /// Pointer to the start of the user-visible shared memory region.
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Mutable pointer to the start of the user-visible shared memory region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Total mapped size (including the trailing ref counter).
    pub fn mapped_size(&self) -> usize {
        self.inner.mapped_size()
    }

    /// User-requested size (the usable portion).
    pub fn user_size(&self) -> usize {
        self.inner.user_size()
    }

    /// The platform name used to open the segment.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Whether this handle created the segment (no other live mapping existed).
    pub fn is_first_mapping(&self) -> bool {
        self.inner.prev_ref_count() == 0
    }

    /// Current reference count (number of processes/handles mapping this segment).
    pub fn ref_count(&self) -> i32 {
        self.inner.ref_count()
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.is_persistent()
    }

    /// Force-remove the backing object. Existing mappings stay valid; no new
    /// process can attach afterwards.
    pub fn unlink(&self) -> io::Result<()> {
        self.inner.unlink()
    }

    /// Remove a named shm segment by name without needing an open handle.
    pub fn unlink_by_name(name: &str) -> io::Result<()> {
        PlatformShm::unlink_by_name(name)
    }

    /// Remove the backing storage for a named shm segment, ignoring a
    /// segment that does not exist.
    pub fn clear_storage(name: &str) {
        let _ = PlatformShm::unlink_by_name(name);
    }
}
