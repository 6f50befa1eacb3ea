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

//! The consumer protocol embedded in JoinGroup and SyncGroup

use std::collections::BTreeMap;

use bytes::{Buf as _, Bytes, BytesMut};
use tracing::debug;

use crate::{Decode, Encode, Error, JoinGroupResponseMember, Result, SyncGroupRequestAssignment};

/// JoinGroup protocol type for consumers
pub const CONSUMER: &str = "consumer";

/// The range assignor
pub const RANGE: &str = "range";

/// The version written, later versions are read as a prefix
const VERSION: i16 = 0;

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Subscription {
    pub version: i16,
    pub topics: Vec<String>,
    pub user_data: Option<Bytes>,
}

impl Subscription {
    pub fn new(topic: &str) -> Self {
        Self {
            version: VERSION,
            topics: vec![topic.into()],
            user_data: None,
        }
    }
}

impl TryFrom<&Subscription> for Bytes {
    type Error = Error;

    fn try_from(value: &Subscription) -> Result<Self, Self::Error> {
        let mut encoded = BytesMut::new();
        VERSION.encode(&mut encoded)?;
        value.topics.encode(&mut encoded)?;
        value.user_data.encode(&mut encoded)?;
        Ok(encoded.freeze())
    }
}

impl TryFrom<Bytes> for Subscription {
    type Error = Error;

    fn try_from(mut value: Bytes) -> Result<Self, Self::Error> {
        let subscription = Self {
            version: i16::decode(&mut value)?,
            topics: Vec::<String>::decode(&mut value)?,
            user_data: Option::<Bytes>::decode(&mut value)?,
        };

        if value.has_remaining() {
            debug!(version = subscription.version, remaining = value.remaining());
        }

        Ok(subscription)
    }
}

message!(TopicPartition {
    topic: String,
    partitions: Vec<i32>,
});

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Assignment {
    pub version: i16,
    pub assigned_partitions: Vec<TopicPartition>,
    pub user_data: Option<Bytes>,
}

impl Assignment {
    /// The partitions of a topic in this assignment
    pub fn partitions(&self, topic: &str) -> Vec<i32> {
        self.assigned_partitions
            .iter()
            .filter(|assigned| assigned.topic == topic)
            .flat_map(|assigned| assigned.partitions.iter().copied())
            .collect()
    }
}

impl TryFrom<&Assignment> for Bytes {
    type Error = Error;

    fn try_from(value: &Assignment) -> Result<Self, Self::Error> {
        let mut encoded = BytesMut::new();
        VERSION.encode(&mut encoded)?;
        value.assigned_partitions.encode(&mut encoded)?;
        value.user_data.encode(&mut encoded)?;
        Ok(encoded.freeze())
    }
}

impl TryFrom<Bytes> for Assignment {
    type Error = Error;

    fn try_from(mut value: Bytes) -> Result<Self, Self::Error> {
        // a member without any assignment may receive an empty assignment
        if !value.has_remaining() {
            return Ok(Self::default());
        }

        Ok(Self {
            version: i16::decode(&mut value)?,
            assigned_partitions: Vec::<TopicPartition>::decode(&mut value)?,
            user_data: Option::<Bytes>::decode(&mut value)?,
        })
    }
}

/// Assign contiguous ranges of partitions to members sorted by member id,
/// the first `partitions % members` receive one extra partition
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RangeAssignor;

impl RangeAssignor {
    pub fn assign(
        &self,
        topic: &str,
        partitions: &[i32],
        members: &[JoinGroupResponseMember],
    ) -> Result<Vec<SyncGroupRequestAssignment>> {
        let mut subscribed = BTreeMap::new();

        for member in members {
            let subscription = Subscription::try_from(member.metadata.clone())?;

            if subscription.topics.iter().any(|subscribed| subscribed == topic) {
                _ = subscribed.insert(member.member_id.clone(), subscription);
            } else {
                debug!(member_id = member.member_id, topic, "not subscribed");
            }
        }

        let mut partitions = partitions.to_vec();
        partitions.sort_unstable();

        let per_member = partitions.len() / subscribed.len().max(1);
        let extra = partitions.len() % subscribed.len().max(1);

        let mut remaining = &partitions[..];

        subscribed
            .keys()
            .enumerate()
            .map(|(index, member_id)| {
                let count = per_member + usize::from(index < extra);
                let (assigned, rest) = remaining.split_at(count.min(remaining.len()));
                remaining = rest;

                Bytes::try_from(&Assignment {
                    version: VERSION,
                    assigned_partitions: vec![TopicPartition {
                        topic: topic.into(),
                        partitions: assigned.to_vec(),
                    }],
                    user_data: None,
                })
                .map(|assignment| SyncGroupRequestAssignment {
                    member_id: member_id.clone(),
                    assignment,
                })
            })
            .collect()
    }
}
