// Copyright ⓒ 2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Claim, ClaimProcessor, ClientError, Error, Process, ReadinessGate, Result, Session};

/// Callbacks made by a [`crate::Client`] over the lifetime of each session
#[async_trait]
pub trait SessionHandler: fmt::Debug + Send + Sync {
    /// The session has started, before any claim
    async fn on_start(&self, session: &Session) -> Result<(), ClientError>;

    /// Consume one claim, returning when its record stream ends
    async fn on_claim(&self, session: &Session, claim: Claim) -> Result<(), ClientError>;

    /// The session has been revoked
    async fn on_end(&self, session: &Session) -> Result<(), ClientError>;
}

/// The lifecycle of a session within a [`Consumer`]
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Phase {
    #[default]
    Created,
    Active,
    Draining,
    Closed,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct State {
    phase: Phase,
    live_claims: usize,
}

/// A session handler that drains each claim with a claim processor
#[derive(Clone, Debug)]
pub struct Consumer<P> {
    processor: ClaimProcessor<P>,
    gate: ReadinessGate,
    sessions: Arc<Mutex<BTreeMap<i32, State>>>,
}

impl<P> Consumer<P>
where
    P: Process,
{
    pub fn new(process: P, gate: ReadinessGate) -> Self {
        Self {
            processor: ClaimProcessor::new(process),
            gate,
            sessions: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// The phase of the session with this generation, a closed session is
    /// forgotten
    pub fn phase(&self, generation_id: i32) -> Option<Phase> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(&generation_id).map(|state| state.phase))
    }

    fn transition(&self, generation_id: i32, f: impl FnOnce(&mut State)) -> Result<Phase> {
        let mut sessions = self.sessions.lock()?;

        let state = sessions
            .get_mut(&generation_id)
            .ok_or_else(|| Error::Message(format!("unknown generation: {generation_id}")))?;

        f(state);

        if state.phase == Phase::Draining && state.live_claims == 0 {
            state.phase = Phase::Closed;
        }

        let phase = state.phase;

        if phase == Phase::Closed {
            _ = sessions.remove(&generation_id);
        }

        debug!(generation_id, ?phase);

        Ok(phase)
    }
}

#[async_trait]
impl<P> SessionHandler for Consumer<P>
where
    P: Process,
{
    async fn on_start(&self, session: &Session) -> Result<(), ClientError> {
        let generation_id = session.generation_id();

        _ = self
            .sessions
            .lock()
            .map_err(Error::from)?
            .insert(generation_id, State::default());

        _ = self.transition(generation_id, |state| state.phase = Phase::Active)?;

        info!(
            generation_id,
            member_id = session.member_id(),
            assignment = ?session.assignment(),
            "session started"
        );

        self.gate.trip();

        Ok(())
    }

    async fn on_claim(&self, session: &Session, claim: Claim) -> Result<(), ClientError> {
        let generation_id = session.generation_id();
        let topic = claim.topic().to_owned();
        let partition = claim.partition();

        _ = self.transition(generation_id, |state| state.live_claims += 1)?;

        let summary = self.processor.drain(session, claim).await;

        info!(
            generation_id,
            topic,
            partition,
            processed = summary.processed,
            skipped = summary.skipped,
            process_errors = summary.process_errors,
            commit_errors = summary.commit_errors,
            last_offset = summary.last_offset,
            "claim ended"
        );

        self.transition(generation_id, |state| {
            state.live_claims = state.live_claims.saturating_sub(1)
        })
        .map(|_| ())
        .map_err(Into::into)
    }

    async fn on_end(&self, session: &Session) -> Result<(), ClientError> {
        let generation_id = session.generation_id();

        match self.transition(generation_id, |state| state.phase = Phase::Draining) {
            Ok(phase) => {
                info!(generation_id, ?phase, "session ended");
                Ok(())
            }

            Err(Error::Message(message)) => {
                warn!(generation_id, message);
                Ok(())
            }

            Err(otherwise) => Err(otherwise.into()),
        }
    }
}
