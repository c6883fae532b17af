// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Tests for the named shared memory handle underneath the mailbox.

use std::sync::atomic::{AtomicUsize, Ordering};

use cbreg::{ShmHandle, ShmOpenMode};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_shm_{n}_{}", std::process::id())
}

#[test]
fn acquire_create() {
    let name = unique_name("acquire_create");
    ShmHandle::clear_storage(&name);

    let shm = ShmHandle::acquire(&name, 1024, ShmOpenMode::Create).expect("acquire create");
    assert!(shm.mapped_size() >= 1024);
    assert_eq!(shm.user_size(), 1024);
    assert!(shm.is_first_mapping());
    assert!(shm.name().starts_with('/'));
}

#[test]
fn acquire_open_nonexistent() {
    let name = unique_name("acquire_open_fail");
    ShmHandle::clear_storage(&name);

    assert!(ShmHandle::acquire(&name, 1024, ShmOpenMode::Open).is_err());
}

#[test]
fn create_exclusive_fails_if_exists() {
    let name = unique_name("create_excl");
    ShmHandle::clear_storage(&name);

    let _h1 = ShmHandle::acquire(&name, 256, ShmOpenMode::Create).expect("first create");
    assert!(ShmHandle::acquire(&name, 256, ShmOpenMode::Create).is_err());
}

#[test]
fn create_or_open_twice_shares_data() {
    let name = unique_name("shared_data");
    ShmHandle::clear_storage(&name);

    let h1 = ShmHandle::acquire(&name, 512, ShmOpenMode::CreateOrOpen).expect("acquire 1");
    let h2 = ShmHandle::acquire(&name, 512, ShmOpenMode::CreateOrOpen).expect("acquire 2");
    assert!(!h2.is_first_mapping());

    let payload = b"written through h1";
    unsafe {
        std::ptr::copy_nonoverlapping(payload.as_ptr(), h1.as_mut_ptr(), payload.len());
    }
    let read_back = unsafe { std::slice::from_raw_parts(h2.as_ptr(), payload.len()) };
    assert_eq!(read_back, payload);
}

#[test]
fn reference_count() {
    let name = unique_name("ref_count");
    ShmHandle::clear_storage(&name);

    let h1 = ShmHandle::acquire(&name, 512, ShmOpenMode::CreateOrOpen).unwrap();
    assert_eq!(h1.ref_count(), 1);

    let h2 = ShmHandle::acquire(&name, 512, ShmOpenMode::CreateOrOpen).unwrap();
    assert_eq!(h1.ref_count(), 2);
    assert_eq!(h2.ref_count(), 2);

    drop(h2);
    assert_eq!(h1.ref_count(), 1);
}

#[test]
fn last_drop_unlinks_by_default() {
    let name = unique_name("drop_unlinks");
    ShmHandle::clear_storage(&name);

    {
        let _shm = ShmHandle::acquire(&name, 256, ShmOpenMode::CreateOrOpen).expect("acquire");
    }
    assert!(ShmHandle::acquire(&name, 256, ShmOpenMode::Open).is_err());
}

#[test]
fn persistent_segment_survives_last_drop() {
    let name = unique_name("persistent");
    ShmHandle::clear_storage(&name);

    {
        let shm = ShmHandle::acquire_persistent(&name, 256, ShmOpenMode::CreateOrOpen).unwrap();
        assert!(shm.is_persistent());
        unsafe { *shm.as_mut_ptr() = 0x5a };
    }

    let again = ShmHandle::acquire(&name, 256, ShmOpenMode::Open).expect("still there");
    assert_eq!(unsafe { *again.as_ptr() }, 0x5a);
    // Counter went back to zero, so this mapping counts as the first again.
    assert!(again.is_first_mapping());
    again.unlink().expect("unlink");
    drop(again);

    assert!(ShmHandle::acquire(&name, 256, ShmOpenMode::Open).is_err());
}

#[test]
fn open_after_unlink_fails() {
    let name = unique_name("open_after_unlink");
    ShmHandle::clear_storage(&name);

    let shm = ShmHandle::acquire(&name, 256, ShmOpenMode::CreateOrOpen).expect("create");
    shm.unlink().expect("unlink");
    assert!(ShmHandle::acquire(&name, 256, ShmOpenMode::Open).is_err());
    // The existing mapping stays usable.
    unsafe { *shm.as_mut_ptr() = 1 };
}

#[test]
fn attach_with_different_size_fails() {
    let name = unique_name("too_small");
    ShmHandle::clear_storage(&name);

    let _small = ShmHandle::acquire(&name, 64, ShmOpenMode::CreateOrOpen).unwrap();
    let err = ShmHandle::acquire(&name, 4096, ShmOpenMode::CreateOrOpen)
        .err()
        .expect("larger attach must fail");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

    #[cfg(not(target_os = "macos"))]
    assert!(ShmHandle::acquire(&name, 16, ShmOpenMode::Open).is_err());
    // Sizes that round to the same layout are accepted.
    assert!(ShmHandle::acquire(&name, 62, ShmOpenMode::Open).is_ok());
}

#[test]
fn unlink_missing_reports_error() {
    let name = unique_name("unlink_missing");
    ShmHandle::clear_storage(&name);
    assert!(ShmHandle::unlink_by_name(&name).is_err());
}

#[test]
fn empty_name_fails() {
    assert!(ShmHandle::acquire("", 256, ShmOpenMode::CreateOrOpen).is_err());
}

#[test]
fn zero_size_fails() {
    assert!(ShmHandle::acquire("zero_size_test", 0, ShmOpenMode::CreateOrOpen).is_err());
}

#[test]
fn various_sizes() {
    for &size in &[1usize, 3, 4, 5, 255, 256, 257, 4096] {
        let name = unique_name(&format!("size_{size}"));
        ShmHandle::clear_storage(&name);

        let shm = ShmHandle::acquire(&name, size, ShmOpenMode::CreateOrOpen)
            .unwrap_or_else(|e| panic!("failed to acquire shm of size {size}: {e}"));
        assert!(shm.mapped_size() >= size + 4, "no room for the ref counter at {size}");
    }
}
