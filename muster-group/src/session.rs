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

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ClientError;

/// Topic to the partitions assigned to this member
pub type Assignment = BTreeMap<String, Vec<i32>>;

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Header {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

/// A record delivered to a claim
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

impl Record {
    pub fn new(topic: &str, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            ..Default::default()
        }
    }

    pub fn timestamp(self, timestamp: i64) -> Self {
        Self { timestamp, ..self }
    }

    pub fn key(self, key: Option<Bytes>) -> Self {
        Self { key, ..self }
    }

    pub fn value(self, value: Option<Bytes>) -> Self {
        Self { value, ..self }
    }

    pub fn headers(self, headers: Vec<Header>) -> Self {
        Self { headers, ..self }
    }
}

/// Commit the next offset to be consumed for a partition
#[async_trait]
pub trait Commit: fmt::Debug + Send + Sync {
    async fn commit(
        &self,
        generation_id: i32,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), ClientError>;
}

/// One grant of group membership
#[derive(Clone, Debug)]
pub struct Session {
    generation_id: i32,
    member_id: String,
    assignment: Assignment,
    committer: Arc<dyn Commit>,
}

impl Session {
    pub fn new(
        generation_id: i32,
        member_id: &str,
        assignment: Assignment,
        committer: Arc<dyn Commit>,
    ) -> Self {
        Self {
            generation_id,
            member_id: member_id.into(),
            assignment,
            committer,
        }
    }

    pub fn generation_id(&self) -> i32 {
        self.generation_id
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Acknowledge a processed record by committing the offset that follows it
    pub async fn mark(&self, record: &Record) -> Result<(), ClientError> {
        debug!(
            generation_id = self.generation_id,
            topic = record.topic,
            partition = record.partition,
            offset = record.offset
        );

        self.committer
            .commit(
                self.generation_id,
                &record.topic,
                record.partition,
                record.offset + 1,
            )
            .await
    }
}

/// The records of one assigned partition within a session
#[derive(Debug)]
pub struct Claim {
    topic: String,
    partition: i32,
    initial_offset: i64,
    records: mpsc::Receiver<Record>,
    revoked: CancellationToken,
}

impl Claim {
    /// A claim together with the sender used to deliver its records, the claim
    /// ends when the sender is dropped
    pub fn channel(
        topic: &str,
        partition: i32,
        initial_offset: i64,
        capacity: usize,
    ) -> (mpsc::Sender<Record>, Self) {
        let (sender, records) = mpsc::channel(capacity.max(1));

        (
            sender,
            Self {
                topic: topic.into(),
                partition,
                initial_offset,
                records,
                revoked: CancellationToken::new(),
            },
        )
    }

    /// End this claim once revoked, dropping any records still buffered
    pub fn revoked_by(self, revoked: CancellationToken) -> Self {
        Self { revoked, ..self }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// The offset that delivery starts from
    pub fn initial_offset(&self) -> i64 {
        self.initial_offset
    }

    /// The next record, or none once the claim has ended
    pub async fn next(&mut self) -> Option<Record> {
        tokio::select! {
            biased;

            () = self.revoked.cancelled() => {
                debug!(
                    topic = self.topic,
                    partition = self.partition,
                    dropped = self.records.len(),
                    "revoked"
                );

                None
            }

            record = self.records.recv() => record,
        }
    }
}
