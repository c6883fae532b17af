// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Validated callback name carried from registrar to invoker.

use std::fmt;

/// Largest identity accepted anywhere: a 256-byte mailbox minus its terminator.
pub const MAX_IDENTITY_LEN: usize = 255;

/// Reasons a byte string is not a usable callback identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("callback identity is empty")]
    Empty,
    #[error("callback identity is {len} bytes, at most {max} allowed")]
    TooLong { len: usize, max: usize },
    #[error("callback identity contains a NUL byte at offset {offset}")]
    InteriorNul { offset: usize },
    #[error("callback identity is not valid UTF-8")]
    NotUtf8,
}

/// Name of a routine to resolve and invoke in the invoker process.
///
/// Non-empty, free of NUL bytes and at most [`MAX_IDENTITY_LEN`] bytes, so it
/// always fits a default mailbox together with its terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackIdentity(String);

impl CallbackIdentity {
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        Self::with_max_len(name.into(), MAX_IDENTITY_LEN)
    }

    /// Validate against a mailbox of `capacity` bytes (one is the terminator).
    pub fn for_capacity(name: impl Into<String>, capacity: usize) -> Result<Self, IdentityError> {
        let max = capacity.saturating_sub(1).min(MAX_IDENTITY_LEN);
        Self::with_max_len(name.into(), max)
    }

    /// Decode a wire or mailbox payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let s = std::str::from_utf8(bytes).map_err(|_| IdentityError::NotUtf8)?;
        Self::new(s)
    }

    fn with_max_len(name: String, max: usize) -> Result<Self, IdentityError> {
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        if let Some(offset) = name.bytes().position(|b| b == 0) {
            return Err(IdentityError::InteriorNul { offset });
        }
        if name.len() > max {
            return Err(IdentityError::TooLong { len: name.len(), max });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CallbackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CallbackIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for CallbackIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
