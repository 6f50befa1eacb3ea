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

//! An in-memory broker for a single topic consumer group

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{sync::watch, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Assignment, Claim, ClientError, Client, Commit, Record, Result, Session, SessionHandler};

const MEMBER_ID: &str = "memory-1";

#[derive(Clone, Debug, Default)]
struct Partition {
    start: i64,
    records: Vec<Record>,
}

impl Partition {
    fn next_offset(&self) -> i64 {
        self.start + i64::try_from(self.records.len()).unwrap_or(i64::MAX)
    }

    fn get(&self, offset: i64) -> Option<&Record> {
        offset
            .checked_sub(self.start)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.records.get(index))
    }
}

#[derive(Debug, Default)]
struct Inner {
    topic: String,
    logs: BTreeMap<i32, Partition>,
    committed: BTreeMap<i32, i64>,
    commits: Vec<(i32, i32, i64)>,
    generation_id: i32,
    session: Option<CancellationToken>,
    revoke_after: BTreeMap<i32, i64>,
    join_failures: VecDeque<ClientError>,
    join_attempts: u64,
    closes: u64,
    closed: bool,
    closed_during_session: bool,
}

/// A single topic broker with one member per group, recording every join
/// attempt, commit and close
#[derive(Clone, Debug)]
pub struct Broker {
    inner: Arc<Mutex<Inner>>,
    changes: Arc<watch::Sender<u64>>,
}

impl Broker {
    pub fn new(topic: &str, partitions: i32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                topic: topic.into(),
                logs: (0..partitions)
                    .map(|partition| (partition, Partition::default()))
                    .collect(),
                ..Default::default()
            })),
            changes: Arc::new(watch::Sender::new(0)),
        }
    }

    fn changed(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Result<T> {
        self.inner.lock().map(|mut inner| f(&mut inner)).map_err(Into::into)
    }

    /// The first offset of an empty partition
    pub fn log_start(self, partition: i32, offset: i64) -> Result<Self> {
        self.with_inner(|inner| {
            if let Some(log) = inner.logs.get_mut(&partition) {
                log.start = offset;
            }
        })
        .map(|()| self)
    }

    /// Append a value to a partition, returning its offset
    pub fn produce(&self, partition: i32, value: &'static [u8]) -> Result<Option<i64>> {
        let offset = self.with_inner(|inner| {
            let topic = inner.topic.clone();

            inner.logs.get_mut(&partition).map(|log| {
                let offset = log.next_offset();

                log.records.push(
                    Record::new(&topic, partition, offset)
                        .timestamp(offset)
                        .value(Some(Bytes::from_static(value))),
                );

                offset
            })
        })?;

        self.changed();
        Ok(offset)
    }

    /// Revoke the current session once this offset has been committed for a
    /// partition
    pub fn revoke_after(&self, partition: i32, offset: i64) -> Result<()> {
        self.with_inner(|inner| _ = inner.revoke_after.insert(partition, offset))
    }

    /// Revoke the current session
    pub fn rebalance(&self) -> Result<()> {
        self.with_inner(|inner| {
            if let Some(session) = inner.session.as_ref() {
                info!(generation_id = inner.generation_id, "rebalance");
                session.cancel();
            }
        })
    }

    /// Fail the next join with this error
    pub fn fail_next_join(&self, error: ClientError) -> Result<()> {
        self.with_inner(|inner| inner.join_failures.push_back(error))
    }

    /// The next offset to be consumed from a partition
    pub fn committed(&self, partition: i32) -> Result<Option<i64>> {
        self.with_inner(|inner| inner.committed.get(&partition).copied())
    }

    /// Every accepted commit as generation, partition and offset
    pub fn commits(&self) -> Result<Vec<(i32, i32, i64)>> {
        self.with_inner(|inner| inner.commits.clone())
    }

    pub fn generation_id(&self) -> Result<i32> {
        self.with_inner(|inner| inner.generation_id)
    }

    pub fn join_attempts(&self) -> Result<u64> {
        self.with_inner(|inner| inner.join_attempts)
    }

    pub fn closes(&self) -> Result<u64> {
        self.with_inner(|inner| inner.closes)
    }

    /// Whether a close happened while a session was still running
    pub fn closed_during_session(&self) -> Result<bool> {
        self.with_inner(|inner| inner.closed_during_session)
    }

    /// Wait until the committed offset of a partition reaches at least this offset
    pub async fn wait_for_commit(&self, partition: i32, offset: i64) -> Result<()> {
        let mut changes = self.changes.subscribe();

        loop {
            if self.committed(partition)?.is_some_and(|committed| committed >= offset) {
                return Ok(());
            }

            changes
                .changed()
                .await
                .map_err(|_| ClientError::Unavailable("memory".into()))?;
        }
    }

    fn join(&self, token: &CancellationToken) -> Result<Session, ClientError> {
        let mut inner = self.inner.lock().map_err(crate::Error::from)?;
        inner.join_attempts += 1;

        if inner.closed {
            return Err(ClientError::Closed);
        }

        if let Some(error) = inner.join_failures.pop_front() {
            debug!(?error, join_attempts = inner.join_attempts);
            return Err(error);
        }

        inner.generation_id += 1;
        inner.session = Some(token.child_token());

        let assignment = Assignment::from([(
            inner.topic.clone(),
            inner.logs.keys().copied().collect::<Vec<_>>(),
        )]);

        Ok(Session::new(
            inner.generation_id,
            MEMBER_ID,
            assignment,
            Arc::new(Committer {
                broker: self.clone(),
            }),
        ))
    }

    /// Deliver records to a claim from an offset, each record only after the
    /// previous has been committed
    async fn feed(
        self,
        partition: i32,
        mut offset: i64,
        sender: tokio::sync::mpsc::Sender<Record>,
        session: CancellationToken,
    ) -> Result<()> {
        let mut changes = self.changes.subscribe();

        loop {
            if session.is_cancelled() {
                return Ok(());
            }

            let record = self.with_inner(|inner| {
                inner
                    .logs
                    .get(&partition)
                    .and_then(|log| log.get(offset))
                    .cloned()
            })?;

            let Some(record) = record else {
                tokio::select! {
                    () = session.cancelled() => return Ok(()),
                    changed = changes.changed() => if changed.is_err() { return Ok(()) },
                }

                continue;
            };

            tokio::select! {
                () = session.cancelled() => return Ok(()),
                sent = sender.send(record) => if sent.is_err() { return Ok(()) },
            }

            while !self
                .committed(partition)?
                .is_some_and(|committed| committed > offset)
            {
                tokio::select! {
                    () = session.cancelled() => return Ok(()),
                    changed = changes.changed() => if changed.is_err() { return Ok(()) },
                }
            }

            offset += 1;
        }
    }
}

#[derive(Debug)]
struct Committer {
    broker: Broker,
}

#[async_trait]
impl Commit for Committer {
    async fn commit(
        &self,
        generation_id: i32,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), ClientError> {
        self.broker
            .with_inner(|inner| {
                if generation_id != inner.generation_id {
                    return Err(ClientError::Api(22));
                }

                if topic != inner.topic || !inner.logs.contains_key(&partition) {
                    return Err(ClientError::Api(3));
                }

                _ = inner.committed.insert(partition, offset);
                inner.commits.push((generation_id, partition, offset));

                if inner
                    .revoke_after
                    .get(&partition)
                    .is_some_and(|revoke_after| offset > *revoke_after)
                {
                    _ = inner.revoke_after.remove(&partition);

                    if let Some(session) = inner.session.as_ref() {
                        info!(generation_id, partition, offset, "revoke");
                        session.cancel();
                    }
                }

                Ok(())
            })??;

        self.broker.changed();
        Ok(())
    }
}

#[async_trait]
impl Client for Broker {
    async fn join_and_run(
        &self,
        handler: Arc<dyn SessionHandler>,
        token: CancellationToken,
    ) -> Result<(), ClientError> {
        let session = self.join(&token)?;

        let session_token = self
            .with_inner(|inner| inner.session.clone())?
            .ok_or(ClientError::Cancelled)?;

        debug!(generation_id = session.generation_id());

        if let Err(err) = handler.on_start(&session).await {
            warn!(%err, "start");
            session_token.cancel();
            self.with_inner(|inner| inner.session = None)?;
            return Err(err);
        }

        let mut feeders = JoinSet::new();
        let mut claims = JoinSet::new();

        for (topic, partitions) in session.assignment() {
            for partition in partitions {
                let initial_offset = self.with_inner(|inner| {
                    inner.committed.get(partition).copied().unwrap_or_else(|| {
                        inner.logs.get(partition).map_or(0, |log| log.start)
                    })
                })?;

                let (sender, claim) = Claim::channel(topic, *partition, initial_offset, 1);

                _ = feeders.spawn(self.clone().feed(
                    *partition,
                    initial_offset,
                    sender,
                    session_token.clone(),
                ));

                let handler = handler.clone();
                let session = session.clone();
                _ = claims.spawn(async move { handler.on_claim(&session, claim).await });
            }
        }

        session_token.cancelled().await;

        while let Some(fed) = feeders.join_next().await {
            debug!(?fed);
        }

        while let Some(claimed) = claims.join_next().await {
            match claimed {
                Ok(Ok(())) => (),
                Ok(Err(err)) => warn!(%err, "claim"),
                Err(err) => warn!(%err, "claim"),
            }
        }

        let closed = self.with_inner(|inner| {
            inner.session = None;
            inner.closed
        })?;

        handler.on_end(&session).await?;

        if closed {
            Err(ClientError::Closed)
        } else {
            Ok(())
        }
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.with_inner(|inner| {
            inner.closes += 1;
            inner.closed = true;

            if let Some(session) = inner.session.as_ref() {
                inner.closed_during_session = true;
                session.cancel();
            }
        })
        .map_err(Into::into)
    }
}
