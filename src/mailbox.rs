// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-slot mailbox over a named shared memory segment.
//
// Layout (user region of the segment):
//
//   [0 .. capacity)        NUL-terminated callback name, empty when byte 0 == 0
//   [seq_off .. seq_off+4) AtomicU32 sequence counter (odd while a write is
//                          in progress), seq_off = capacity rounded up to 4
//
// The segment is persistent: it outlives the registrar that wrote it and is
// only destroyed by `remove`.

use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use log::debug;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::identity::{CallbackIdentity, IdentityError};
use crate::{ShmHandle, ShmOpenMode};

/// Reference mailbox size.
pub const DEFAULT_CAPACITY: usize = 256;

/// Snapshot attempts before a reader gives up on a slot that keeps changing.
const READ_RETRIES: usize = 64;

/// Yields a writer waits on an odd counter before treating the previous
/// writer as dead.
const STALE_WRITER_SPINS: usize = 100_000;

/// A single-slot, last-write-wins mailbox carrying one [`CallbackIdentity`].
///
/// Any number of processes may attach with the same key. Only one writer at
/// a time is supported; concurrent registrars race on the slot.
pub struct Mailbox {
    shm: ShmHandle,
    capacity: usize,
}

fn seq_offset(capacity: usize) -> usize {
    let align = std::mem::align_of::<AtomicU32>();
    capacity.div_ceil(align) * align
}

impl Mailbox {
    /// Create the mailbox segment, or attach to it if it already exists.
    pub fn open(key: &str, capacity: usize) -> Result<Self> {
        if capacity < 2 {
            return Err(Error::ChannelAcquisition {
                op: "attach mailbox",
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("capacity {capacity} leaves no room for a name"),
                ),
            });
        }
        let size = seq_offset(capacity) + std::mem::size_of::<AtomicU32>();
        let shm = ShmHandle::acquire_persistent(key, size, ShmOpenMode::CreateOrOpen)
            .map_err(Error::acquire("attach mailbox"))?;
        debug!(
            "attached mailbox {} ({} bytes, {} mapping(s))",
            shm.name(),
            capacity,
            shm.ref_count()
        );
        Ok(Self { shm, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Platform name of the backing segment.
    pub fn name(&self) -> &str {
        self.shm.name()
    }

    /// Number of live mappings across all processes.
    pub fn attachments(&self) -> i32 {
        self.shm.ref_count()
    }

    fn seq(&self) -> &AtomicU32 {
        unsafe { &*(self.shm.as_ptr().add(seq_offset(self.capacity)) as *const AtomicU32) }
    }

    fn slot(&self) -> *mut u8 {
        self.shm.as_mut_ptr()
    }

    /// Claim the slot for writing by moving the counter from even to odd.
    /// Writers (registrar publish, invoker take/clear) exclude each other.
    fn begin_write(&self) -> u32 {
        let mut spins = 0usize;
        loop {
            let cur = self.seq().load(Ordering::Relaxed);
            if cur & 1 == 0 {
                if self.try_claim(cur) {
                    return cur.wrapping_add(1);
                }
            } else if spins >= STALE_WRITER_SPINS {
                // A writer that died mid-write leaves the counter odd.
                debug!("mailbox {}: adopting abandoned write", self.name());
                fence(Ordering::Release);
                return cur;
            }
            spins += 1;
            std::thread::yield_now();
        }
    }

    /// Move the counter from the even value `seen` to odd. Fails if any
    /// other writer got there first.
    fn try_claim(&self, seen: u32) -> bool {
        let claimed = self
            .seq()
            .compare_exchange(seen, seen.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if claimed {
            fence(Ordering::Release);
        }
        claimed
    }

    fn end_write(&self, odd: u32) {
        self.seq().store(odd.wrapping_add(1), Ordering::Release);
    }

    /// Copy the slot up to its terminator. `None` if no terminator fits.
    fn read_raw(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        for i in 0..self.capacity {
            let b = unsafe { std::ptr::read_volatile(self.slot().add(i)) };
            if b == 0 {
                return Some(out);
            }
            out.push(b);
        }
        None
    }

    fn decode(&self, raw: Option<Vec<u8>>) -> Result<Option<CallbackIdentity>> {
        match raw {
            Some(bytes) if bytes.is_empty() => Ok(None),
            Some(bytes) => Ok(Some(CallbackIdentity::from_bytes(&bytes)?)),
            None => Err(IdentityError::TooLong {
                len: self.capacity,
                max: self.capacity - 1,
            }
            .into()),
        }
    }

    /// Whether the slot currently holds no name.
    pub fn is_empty(&self) -> bool {
        unsafe { std::ptr::read_volatile(self.slot()) == 0 }
    }

    /// Write `identity` into the slot, replacing whatever was there.
    ///
    /// Fails before touching the segment if the name does not fit.
    pub fn publish(&self, identity: &CallbackIdentity) -> Result<()> {
        let bytes = identity.as_bytes();
        if bytes.len() > self.capacity - 1 {
            return Err(IdentityError::TooLong {
                len: bytes.len(),
                max: self.capacity - 1,
            }
            .into());
        }
        let odd = self.begin_write();
        unsafe {
            let dst = self.slot();
            for (i, &b) in bytes.iter().enumerate() {
                std::ptr::write_volatile(dst.add(i), b);
            }
            std::ptr::write_volatile(dst.add(bytes.len()), 0);
        }
        self.end_write(odd);
        Ok(())
    }

    /// Read the current name without clearing it.
    pub fn peek(&self) -> Result<Option<CallbackIdentity>> {
        for _ in 0..READ_RETRIES {
            let s1 = self.seq().load(Ordering::Acquire);
            if s1 & 1 == 1 {
                std::thread::yield_now();
                continue;
            }
            let raw = self.read_raw();
            fence(Ordering::Acquire);
            if self.seq().load(Ordering::Relaxed) == s1 {
                return self.decode(raw);
            }
        }
        // Still being written; the caller's next poll picks it up.
        Ok(None)
    }

    /// Read the current name and leave the slot empty.
    ///
    /// An empty slot is never written to. A name is cleared only if no
    /// publish happened since it was read; otherwise the read is retried,
    /// so a concurrent registration is either returned or left in place.
    pub fn take(&self) -> Result<Option<CallbackIdentity>> {
        for _ in 0..READ_RETRIES {
            let s1 = self.seq().load(Ordering::Acquire);
            if s1 & 1 == 1 {
                std::thread::yield_now();
                continue;
            }
            let raw = self.read_raw();
            fence(Ordering::Acquire);
            if self.seq().load(Ordering::Relaxed) != s1 {
                continue;
            }
            if matches!(&raw, Some(bytes) if bytes.is_empty()) {
                return Ok(None);
            }
            if !self.try_claim(s1) {
                continue;
            }
            unsafe { std::ptr::write_volatile(self.slot(), 0) };
            self.end_write(s1.wrapping_add(1));
            return self.decode(raw);
        }
        Ok(None)
    }

    /// Empty the slot.
    pub fn clear(&self) {
        let odd = self.begin_write();
        unsafe { std::ptr::write_volatile(self.slot(), 0) };
        self.end_write(odd);
    }

    /// Poll every `interval` until the slot holds a name.
    ///
    /// With `consume` the name is taken (slot cleared) on discovery. Returns
    /// [`Error::Cancelled`] when `cancel` fires and [`Error::TimedOut`] once
    /// `timeout` has elapsed.
    pub fn wait_for_identity(
        &self,
        interval: Duration,
        cancel: &CancelToken,
        timeout: Option<Duration>,
        consume: bool,
    ) -> Result<CallbackIdentity> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut polls = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let found = if consume { self.take()? } else { self.peek()? };
            if let Some(id) = found {
                debug!("mailbox {}: found `{id}` after {polls} poll(s)", self.name());
                return Ok(id);
            }
            polls += 1;
            let nap = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(Error::TimedOut);
                    }
                    interval.min(d - now)
                }
                None => interval,
            };
            if cancel.sleep(nap) {
                return Err(Error::Cancelled);
            }
        }
    }

    /// Unmap without destroying the segment or its content.
    pub fn detach(self) {
        debug!("detached mailbox {}", self.name());
    }

    /// Unmap and unlink: no process can attach to this segment afterwards.
    /// Existing mappings elsewhere stay valid until they detach.
    pub fn remove(self) -> Result<()> {
        match self.shm.unlink() {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {}
            Err(source) => {
                return Err(Error::ChannelAcquisition {
                    op: "remove mailbox",
                    source,
                })
            }
        }
        debug!("removed mailbox {}", self.name());
        Ok(())
    }
}
