// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Coordination channel: the registrar-facing `Publish` side and the
// invoker-facing `Discover` side, with bindings for both transports.

use std::time::Duration;

use log::{debug, warn};

use crate::cancel::CancelToken;
use crate::endpoint::{Connection, EndpointClient, EndpointListener};
use crate::error::{Error, Result};
use crate::identity::CallbackIdentity;
use crate::invoker::Outcome;
use crate::mailbox::Mailbox;

/// Registrar side of a coordination channel.
pub trait Publish {
    /// Make `identity` observable to an invoker. Returns the invoker's
    /// acknowledgement for transports that have one.
    fn publish(&mut self, identity: &CallbackIdentity) -> Result<Option<String>>;

    fn describe(&self) -> String;
}

/// Invoker side of a coordination channel.
pub trait Discover {
    /// Per-registration state held between discovery and completion.
    type Pending;

    /// Block until a complete identity has been received.
    fn discover(&mut self, cancel: &CancelToken) -> Result<(CallbackIdentity, Self::Pending)>;

    /// Report the outcome of the attempt back to the registrar, if the
    /// transport allows it.
    fn complete(&mut self, pending: Self::Pending, outcome: &Outcome) -> Result<()>;

    /// Tear the channel down.
    fn release(self) -> Result<()>;

    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Shared-segment transport
// ---------------------------------------------------------------------------

impl Publish for Mailbox {
    fn publish(&mut self, identity: &CallbackIdentity) -> Result<Option<String>> {
        Mailbox::publish(self, identity)?;
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("mailbox {}", self.name())
    }
}

/// Polls a [`Mailbox`] at a fixed interval.
pub struct MailboxDiscovery {
    mailbox: Mailbox,
    interval: Duration,
    timeout: Option<Duration>,
    consume: bool,
}

impl MailboxDiscovery {
    pub fn new(mailbox: Mailbox, interval: Duration) -> Self {
        Self {
            mailbox,
            interval,
            timeout: None,
            consume: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `false` leaves the name in the slot after discovery.
    pub fn consume(mut self, consume: bool) -> Self {
        self.consume = consume;
        self
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}

impl Discover for MailboxDiscovery {
    type Pending = ();

    fn discover(&mut self, cancel: &CancelToken) -> Result<(CallbackIdentity, ())> {
        let id = self
            .mailbox
            .wait_for_identity(self.interval, cancel, self.timeout, self.consume)?;
        Ok((id, ()))
    }

    fn complete(&mut self, _pending: (), _outcome: &Outcome) -> Result<()> {
        Ok(())
    }

    fn release(self) -> Result<()> {
        self.mailbox.remove()
    }

    fn describe(&self) -> String {
        format!("mailbox {}", self.mailbox.name())
    }
}

// ---------------------------------------------------------------------------
// Stream-socket transport
// ---------------------------------------------------------------------------

impl Publish for EndpointClient {
    fn publish(&mut self, identity: &CallbackIdentity) -> Result<Option<String>> {
        self.register(identity).map(Some)
    }

    fn describe(&self) -> String {
        format!("endpoint {}", self.path().display())
    }
}

/// Accepts one registrar connection per discovery.
pub struct EndpointDiscovery {
    listener: EndpointListener,
    timeout: Option<Duration>,
}

impl EndpointDiscovery {
    pub fn new(listener: EndpointListener) -> Self {
        Self {
            listener,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn listener(&self) -> &EndpointListener {
        &self.listener
    }
}

impl Discover for EndpointDiscovery {
    type Pending = Connection;

    fn discover(&mut self, cancel: &CancelToken) -> Result<(CallbackIdentity, Connection)> {
        let mut conn = self.listener.accept(cancel, self.timeout)?;
        debug!("registrar connected");
        match conn.read_registration() {
            Ok(id) => Ok((id, conn)),
            Err(Error::InvalidIdentity(e)) => {
                if let Err(ack_err) = conn.acknowledge(&format!("rejected: {e}")) {
                    warn!("could not send rejection: {ack_err}");
                }
                Err(Error::InvalidIdentity(e))
            }
            Err(e) => Err(e),
        }
    }

    fn complete(&mut self, pending: Connection, outcome: &Outcome) -> Result<()> {
        pending.acknowledge(&outcome.acknowledgement())
    }

    fn release(self) -> Result<()> {
        debug!("closing endpoint {}", self.listener.path().display());
        drop(self.listener);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("endpoint {}", self.listener.path().display())
    }
}
