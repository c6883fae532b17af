// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Registrar: publishes one callback name on a coordination channel.

use log::info;

use crate::channel::Publish;
use crate::error::Result;
use crate::identity::CallbackIdentity;

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub identity: CallbackIdentity,
    /// Invoker's reply; always `None` on the mailbox transport, which
    /// neither waits for nor detects an invoker.
    pub acknowledgement: Option<String>,
}

pub struct Registrar<P: Publish> {
    channel: P,
}

impl<P: Publish> Registrar<P> {
    pub fn new(channel: P) -> Self {
        Self { channel }
    }

    /// Publish `identity`. A mailbox publish overwrites any name not yet
    /// picked up; there is no queue.
    pub fn register(&mut self, identity: &CallbackIdentity) -> Result<Registration> {
        let acknowledgement = self.channel.publish(identity)?;
        info!("registered callback `{identity}` on {}", self.channel.describe());
        if let Some(ack) = &acknowledgement {
            info!("acknowledged: {ack}");
        }
        Ok(Registration {
            identity: identity.clone(),
            acknowledgement,
        })
    }

    pub fn channel(&self) -> &P {
        &self.channel
    }

    pub fn into_inner(self) -> P {
        self.channel
    }
}
