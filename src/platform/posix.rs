// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX implementation of named shared memory segments
// (shm_open + ftruncate + mmap).

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::shm_name;

// ---------------------------------------------------------------------------
// Layout helpers
// ---------------------------------------------------------------------------

/// Rounds the user size up to the counter alignment, then appends an
/// `AtomicI32` reference counter shared by every mapping of the segment.
const ALIGN: usize = std::mem::align_of::<AtomicI32>();

pub(crate) fn calc_size(user_size: usize) -> usize {
    let aligned = ((user_size.wrapping_sub(1) / ALIGN) + 1) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// Returns a reference to the trailing `AtomicI32` ref-counter inside a mapped
/// region of `total_size` bytes starting at `mem`.
///
/// # Safety
/// `mem` must point to a valid mapped region of at least `total_size` bytes.
unsafe fn acc_of<'a>(mem: *mut u8, total_size: usize) -> &'a AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

// ---------------------------------------------------------------------------
// PlatformShm: POSIX shared memory
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,      // total mapped size (including ref counter)
    user_size: usize, // user-requested size
    name: String,     // POSIX name (with leading '/')
    prev_ref: i32,    // ref count *before* our fetch_add (0 means we were first)
    persistent: bool, // keep the backing object when the last mapping goes away
}

// Safety: the shared memory region is process-shared by design.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

/// Open mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

impl PlatformShm {
    /// Acquire a named shared memory region of `user_size` usable bytes.
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let posix_name = shm_name::make_shm_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let perms: libc::mode_t = 0o666;
        let total_size = calc_size(user_size);

        // For CreateOrOpen: try exclusive create first so we only call ftruncate
        // when we actually own the new object.
        let (fd, need_truncate) = match mode {
            ShmMode::Create => (Self::shm_open(&c_name, libc::O_CREAT | libc::O_EXCL, perms)?, true),
            ShmMode::Open => (Self::shm_open(&c_name, 0, perms)?, false),
            ShmMode::CreateOrOpen => match Self::shm_open(&c_name, libc::O_CREAT | libc::O_EXCL, perms) {
                Ok(f) => (f, true),
                Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                    (Self::shm_open(&c_name, 0, perms)?, false)
                }
                Err(e) => return Err(e),
            },
        };

        unsafe { libc::fchmod(fd, perms) };

        if need_truncate {
            let ret = unsafe { libc::ftruncate(fd, total_size as libc::off_t) };
            // macOS refuses a second ftruncate; an attacher may have sized it already.
            if ret != 0 {
                let err = io::Error::last_os_error();
                if Self::check_existing_size(fd, total_size).is_err() {
                    unsafe { libc::close(fd) };
                    return Err(err);
                }
            }
        } else if let Err(e) = Self::check_existing_size(fd, total_size) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        Self::mmap_and_finish(fd, total_size, user_size, posix_name)
    }

    fn shm_open(c_name: &CString, extra_flags: libc::c_int, perms: libc::mode_t) -> io::Result<i32> {
        let fd = unsafe {
            libc::shm_open(c_name.as_ptr(), libc::O_RDWR | extra_flags, perms as libc::c_uint)
        };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(fd)
    }

    /// Every mapping must agree on the size: the ref counter lives at the end,
    /// and mapping past the end of a smaller object faults on first touch.
    ///
    /// A zero-sized object belongs to a creator that has not reached its
    /// `ftruncate` yet (or died before it); size it here instead.
    fn check_existing_size(fd: i32, total_size: usize) -> io::Result<()> {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let existing = st.st_size as usize;
        if existing == 0 {
            if unsafe { libc::ftruncate(fd, total_size as libc::off_t) } != 0 {
                return Err(io::Error::last_os_error());
            }
            return Ok(());
        }
        // macOS reports shm objects rounded up to whole pages.
        #[cfg(target_os = "macos")]
        let mismatch = existing < total_size;
        #[cfg(not(target_os = "macos"))]
        let mismatch = existing != total_size;
        if mismatch {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "existing segment is {} bytes, {} expected",
                    st.st_size, total_size
                ),
            ));
        }
        Ok(())
    }

    fn mmap_and_finish(
        fd: i32,
        total_size: usize,
        user_size: usize,
        posix_name: String,
    ) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let prev = unsafe { acc_of(mem as *mut u8, total_size).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            mem: mem as *mut u8,
            size: total_size,
            user_size,
            name: posix_name,
            prev_ref: prev,
            persistent: false,
        })
    }

    /// Pointer to the user-visible region (excluding the trailing ref counter).
    pub fn as_ptr(&self) -> *const u8 {
        self.mem
    }

    /// Mutable pointer to the user-visible region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Total mapped size (including ref counter).
    pub fn mapped_size(&self) -> usize {
        self.size
    }

    /// User-requested size.
    pub fn user_size(&self) -> usize {
        self.user_size
    }

    /// POSIX name (with leading '/').
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ref count value *before* our own increment during acquire.
    /// Returns 0 if this handle was the first live mapping of the segment.
    pub fn prev_ref_count(&self) -> i32 {
        self.prev_ref
    }

    /// Current reference count.
    pub fn ref_count(&self) -> i32 {
        if self.mem.is_null() || self.size == 0 {
            return 0;
        }
        unsafe { acc_of(self.mem, self.size).load(Ordering::Acquire) }
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Force-remove the backing object (shm_unlink). Does NOT release the mapping.
    pub fn unlink(&self) -> io::Result<()> {
        Self::unlink_posix(&self.name)
    }

    /// Unlink a named shm segment by name (static helper).
    pub fn unlink_by_name(name: &str) -> io::Result<()> {
        Self::unlink_posix(&shm_name::make_shm_name(name))
    }

    fn unlink_posix(posix_name: &str) -> io::Result<()> {
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        // Decrement ref counter; if we're the last and not persistent, unlink.
        let prev = unsafe { acc_of(self.mem, self.size).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        if prev <= 1 && !self.persistent {
            let _ = self.unlink();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("posix_{tag}_{}", std::process::id())
    }

    /// Leave an object exactly as a creator does between shm_open and ftruncate.
    fn create_unsized(name: &str) {
        let c_name = CString::new(shm_name::make_shm_name(name)).unwrap();
        let fd = PlatformShm::shm_open(&c_name, libc::O_CREAT | libc::O_EXCL, 0o666).unwrap();
        unsafe { libc::close(fd) };
    }

    #[test]
    fn attach_to_unsized_object_succeeds() {
        let name = unique_name("unsized");
        let _ = PlatformShm::unlink_by_name(&name);
        create_unsized(&name);

        let shm = PlatformShm::acquire(&name, 260, ShmMode::CreateOrOpen).expect("attach");
        assert_eq!(shm.mapped_size(), calc_size(260));
        assert_eq!(shm.prev_ref_count(), 0);

        // The creator's own ftruncate to the same size changes nothing.
        let again = PlatformShm::acquire(&name, 260, ShmMode::Open).expect("second attach");
        assert_eq!(again.ref_count(), 2);
        drop(again);
        drop(shm);
        assert!(PlatformShm::acquire(&name, 260, ShmMode::Open).is_err());
    }

    #[test]
    fn nonzero_size_mismatch_still_rejected() {
        let name = unique_name("mismatch");
        let _ = PlatformShm::unlink_by_name(&name);
        let _first = PlatformShm::acquire(&name, 64, ShmMode::CreateOrOpen).unwrap();
        let err = PlatformShm::acquire(&name, 4096, ShmMode::Open).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
