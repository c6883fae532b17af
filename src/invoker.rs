// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Invoker: discover a published name, resolve it, call it.
//
//   Waiting -> Discovered -> Resolving -> Invoked | ResolutionFailed
//                                                  -> Terminal (finish)

use std::fmt;

use log::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::channel::Discover;
use crate::error::{Error, Result};
use crate::identity::CallbackIdentity;
use crate::routine::RoutinePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Waiting,
    Discovered,
    Resolving,
    Invoked,
    ResolutionFailed,
    Terminal,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Waiting => "WAITING",
            State::Discovered => "DISCOVERED",
            State::Resolving => "RESOLVING",
            State::Invoked => "INVOKED",
            State::ResolutionFailed => "RESOLUTION_FAILED",
            State::Terminal => "TERMINAL",
        };
        f.write_str(s)
    }
}

/// What happened to one discovered registration.
#[derive(Debug)]
pub enum Outcome {
    Invoked(CallbackIdentity),
    ResolutionFailed {
        identity: CallbackIdentity,
        error: Error,
    },
}

impl Outcome {
    pub fn identity(&self) -> &CallbackIdentity {
        match self {
            Outcome::Invoked(id) => id,
            Outcome::ResolutionFailed { identity, .. } => identity,
        }
    }

    pub fn is_invoked(&self) -> bool {
        matches!(self, Outcome::Invoked(_))
    }

    /// Text sent back to a socket registrar.
    pub fn acknowledgement(&self) -> String {
        match self {
            Outcome::Invoked(id) => format!("invoked {id}"),
            Outcome::ResolutionFailed { identity, error } => format!("failed {identity}: {error}"),
        }
    }
}

/// Tally of a [`Invoker::serve`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServeSummary {
    pub invoked: usize,
    pub failed: usize,
    pub dropped: usize,
}

pub struct Invoker<D: Discover, P: RoutinePool> {
    channel: D,
    pool: P,
    cancel: CancelToken,
    state: State,
    history: Vec<State>,
}

impl<D: Discover, P: RoutinePool> Invoker<D, P> {
    pub fn new(channel: D, pool: P) -> Self {
        Self::with_cancel(channel, pool, CancelToken::new())
    }

    pub fn with_cancel(channel: D, pool: P, cancel: CancelToken) -> Self {
        Self {
            channel,
            pool,
            cancel,
            state: State::Waiting,
            history: vec![State::Waiting],
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[State] {
        &self.history
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn channel(&self) -> &D {
        &self.channel
    }

    fn enter(&mut self, next: State) {
        if self.state != next {
            debug!("invoker: {} -> {next}", self.state);
        }
        self.state = next;
        if self.history.last() != Some(&next) {
            self.history.push(next);
        }
    }

    /// Handle exactly one registration.
    ///
    /// Channel failures before the attempt (including cancellation and
    /// timeout) are returned as `Err`; a failed acknowledgement afterwards is
    /// only logged. A unit or symbol that cannot be resolved is an
    /// [`Outcome::ResolutionFailed`]; the channel stays usable and must still
    /// be released with [`finish`](Self::finish).
    pub fn run_once(&mut self) -> Result<Outcome> {
        self.enter(State::Waiting);
        info!("waiting for callback registration on {}", self.channel.describe());
        let (identity, pending) = self.channel.discover(&self.cancel)?;

        self.enter(State::Discovered);
        info!("received callback name `{identity}`");

        self.enter(State::Resolving);
        let outcome = match self.resolve_and_invoke(&identity) {
            Ok(()) => {
                self.enter(State::Invoked);
                Outcome::Invoked(identity)
            }
            Err(e) if e.is_resolution_failure() => {
                warn!("{e}");
                self.enter(State::ResolutionFailed);
                Outcome::ResolutionFailed { identity, error: e }
            }
            Err(e) => return Err(e),
        };

        // The routine has already run; a registrar that hung up does not undo that.
        if let Err(e) = self.channel.complete(pending, &outcome) {
            warn!("could not acknowledge `{}`: {e}", outcome.identity());
        }
        Ok(outcome)
    }

    /// The source (and any loaded unit) is released before this returns,
    /// on success and on failure.
    fn resolve_and_invoke(&self, identity: &CallbackIdentity) -> Result<()> {
        let source = self.pool.open()?;
        let routine = source.resolve(identity)?;
        info!("calling `{}` from {}", routine.name(), source.describe());
        routine.invoke();
        Ok(())
    }

    /// Handle registrations one after another until `limit` have been seen,
    /// the wait is cancelled, or it times out.
    ///
    /// A registration whose connection breaks or whose name is malformed is
    /// counted as dropped and the next one is accepted.
    pub fn serve(&mut self, limit: Option<usize>) -> Result<ServeSummary> {
        let mut summary = ServeSummary::default();
        while limit.map_or(true, |n| summary.invoked + summary.failed + summary.dropped < n) {
            match self.run_once() {
                Ok(Outcome::Invoked(_)) => summary.invoked += 1,
                Ok(Outcome::ResolutionFailed { .. }) => summary.failed += 1,
                Err(Error::Cancelled) | Err(Error::TimedOut) => break,
                Err(e @ Error::TransportIo { .. }) | Err(e @ Error::InvalidIdentity(_)) => {
                    warn!("dropping registration: {e}");
                    summary.dropped += 1;
                }
                Err(e) => {
                    error!("{e}");
                    return Err(e);
                }
            }
        }
        Ok(summary)
    }

    /// Release the channel. For the mailbox this unlinks the segment.
    pub fn finish(mut self) -> Result<()> {
        self.enter(State::Terminal);
        let described = self.channel.describe();
        self.channel.release()?;
        info!("released {described}");
        Ok(())
    }
}
