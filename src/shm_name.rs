// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX shm naming: leading-slash normalisation and the mailbox key that
// replaces System V `ftok(path, id)`.

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Convert a 64-bit value to a fixed-width 16-char lowercase hex string.
fn to_hex(val: u64) -> String {
    format!("{val:016x}")
}

/// Maximum length for POSIX shm names. Set to 0 to disable truncation.
///
/// On macOS `PSHMNAMLEN` is 31. On Linux the limit is typically 255.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0; // 0 = no truncation

/// Prefix shared by every mailbox segment name.
pub const MAILBOX_PREFIX: &str = "cbreg";

/// Produce a POSIX shm-safe name (with leading '/').
///
/// When `SHM_NAME_MAX > 0`, names whose POSIX form would exceed that limit
/// are shortened to `/<prefix>_<16-hex-FNV-1a-hash>` where `<prefix>` is a
/// truncated portion of the original name.
pub fn make_shm_name(name: &str) -> String {
    let result = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if SHM_NAME_MAX == 0 || result.len() <= SHM_NAME_MAX {
        return result;
    }

    // 1 (underscore) + 16 (hex hash)
    const HASH_SUFFIX_LEN: usize = 1 + 16;
    let prefix_len = SHM_NAME_MAX.saturating_sub(HASH_SUFFIX_LEN + 1);

    let hex = to_hex(fnv1a_64(result.as_bytes()));
    let body = &result[1..];
    let take = prefix_len.min(body.len());

    let mut shortened = String::with_capacity(SHM_NAME_MAX);
    shortened.push('/');
    shortened.push_str(&body[..take]);
    shortened.push('_');
    shortened.push_str(&hex);
    shortened
}

/// Derive the mailbox segment name from a path token and project id.
///
/// Plays the role of `ftok(path_token, project_id)`: every process using the
/// same pair lands on the same segment. The token need not exist on disk.
pub fn mailbox_key(path_token: &str, project_id: u8) -> String {
    let seed = format!("{path_token}:{project_id}");
    format!("{MAILBOX_PREFIX}_{}", to_hex(fnv1a_64(seed.as_bytes())))
}
