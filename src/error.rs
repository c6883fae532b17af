// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for the coordination layer.

use std::io;
use std::path::PathBuf;

use crate::frame::FrameError;
use crate::identity::IdentityError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Mailbox could not be created/attached, or the endpoint could not be
    /// bound/connected.
    #[error("{op}: {source}")]
    ChannelAcquisition {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Send/receive failed on an established channel.
    #[error("{op}: {source}")]
    TransportIo {
        op: &'static str,
        #[source]
        source: FrameError,
    },

    /// The loadable unit could not be opened.
    #[error("failed to load {}: {source}", path.display())]
    UnitLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The unit loaded but exports no routine with this name.
    #[error("failed to find routine `{name}`: {detail}")]
    SymbolResolution { name: String, detail: String },

    #[error(transparent)]
    InvalidIdentity(#[from] IdentityError),

    #[error("wait cancelled")]
    Cancelled,

    #[error("timed out waiting for a registration")]
    TimedOut,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn acquire(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Error::ChannelAcquisition { op, source }
    }

    pub(crate) fn transport(op: &'static str) -> impl FnOnce(FrameError) -> Self {
        move |source| Error::TransportIo { op, source }
    }

    /// Resolution failures end one invocation attempt but leave the channel usable.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Error::UnitLoad { .. } | Error::SymbolResolution { .. })
    }
}
