// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-process callback registration.
// A registrar publishes the name of a routine; an invoker discovers the
// name, resolves it in a dynamically loaded unit and calls it. Names travel
// over a shared-memory mailbox or a Unix domain socket endpoint.

pub mod shm_name;

mod platform;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

pub mod cancel;
pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod identity;
pub mod invoker;
pub mod mailbox;
pub mod registrar;
pub mod routine;

pub use cancel::CancelToken;
pub use channel::{Discover, EndpointDiscovery, MailboxDiscovery, Publish};
pub use config::Config;
pub use endpoint::{Connection, EndpointClient, EndpointListener};
pub use error::{Error, Result};
pub use identity::{CallbackIdentity, IdentityError, MAX_IDENTITY_LEN};
pub use invoker::{Invoker, Outcome, ServeSummary, State};
pub use mailbox::Mailbox;
pub use registrar::{Registrar, Registration};
pub use routine::{LoadableUnit, ResolvedRoutine, RoutinePool, RoutineSource, StaticRoutines, UnitPool};
