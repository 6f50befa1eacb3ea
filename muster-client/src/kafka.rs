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
    marker::PhantomData,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use muster_group::{Assignment, Claim, ClientError, Commit, Header, Record, Session, SessionHandler};
use muster_wire::{
    CONSUMER_REPLICA_ID, DEFAULT_RETENTION_TIME_MS, EARLIEST_TIMESTAMP, ErrorCode, FetchPartition,
    FetchRequest, FetchTopic, FindCoordinatorRequest, GROUP_KEY_TYPE, HeartbeatRequest,
    JoinGroupRequest, JoinGroupRequestProtocol, JoinGroupResponse, LATEST_TIMESTAMP,
    LeaveGroupRequest, ListOffsetsPartition, ListOffsetsRequest, ListOffsetsResponse,
    ListOffsetsTopic,
    MetadataRequest, MetadataRequestTopic, MetadataResponse, OffsetCommitRequest,
    OffsetCommitRequestPartition, OffsetCommitRequestTopic, OffsetFetchRequest,
    OffsetFetchRequestTopic, READ_UNCOMMITTED, SyncGroupRequest,
    consumer::{self, RangeAssignor, Subscription},
    record::Batch,
};
use tokio::{sync::mpsc, task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, Level, debug, info, span, warn};
use url::Url;

use crate::{Connection, Error, Result};

/// Where to start consuming a partition without a committed offset
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AutoOffsetReset {
    Earliest,
    #[default]
    Latest,
}

impl AutoOffsetReset {
    fn timestamp(&self) -> i64 {
        match self {
            Self::Earliest => EARLIEST_TIMESTAMP,
            Self::Latest => LATEST_TIMESTAMP,
        }
    }
}

impl FromStr for AutoOffsetReset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest" => Ok(Self::Earliest),
            "latest" => Ok(Self::Latest),
            otherwise => Err(Error::Message(format!(
                "unknown auto offset reset: {otherwise}"
            ))),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Configuration {
    brokers: Vec<Url>,
    topic: String,
    group_id: String,
    client_id: Option<String>,
    session_timeout: Duration,
    rebalance_timeout: Duration,
    heartbeat_interval: Duration,
    max_wait: Duration,
    min_bytes: i32,
    partition_max_bytes: i32,
    auto_offset_reset: AutoOffsetReset,
    claim_capacity: usize,
}

impl Configuration {
    pub fn brokers(&self) -> &[Url] {
        &self.brokers
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

fn millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

fn broker_url(host: &str, port: i32) -> Result<Url> {
    Url::parse(&format!("tcp://{host}:{port}")).map_err(Into::into)
}

fn list_offsets(
    topic: &str,
    partition: i32,
    auto_offset_reset: AutoOffsetReset,
) -> ListOffsetsRequest {
    ListOffsetsRequest {
        replica_id: CONSUMER_REPLICA_ID,
        topics: vec![ListOffsetsTopic {
            name: topic.into(),
            partitions: vec![ListOffsetsPartition {
                partition_index: partition,
                timestamp: auto_offset_reset.timestamp(),
            }],
        }],
    }
}

fn listed_offset(response: ListOffsetsResponse, partition: i32) -> Result<i64> {
    response
        .topics
        .into_iter()
        .flat_map(|topic| topic.partitions)
        .find(|candidate| candidate.partition_index == partition)
        .ok_or_else(|| Error::Message(format!("no offset for partition: {partition}")))
        .and_then(|listed| {
            ErrorCode::ok(listed.error_code)
                .map(|()| listed.offset)
                .map_err(Into::into)
        })
}

/// A consumer group member of a Kafka cluster
#[derive(Debug)]
pub struct Kafka {
    configuration: Configuration,
    member_id: Mutex<String>,
    closed: CancellationToken,
}

/// The membership granted by a join and sync
#[derive(Debug)]
struct Membership {
    coordinator: Connection,
    generation_id: i32,
    member_id: String,
    partitions: Vec<i32>,
}

/// A membership with the starting offset and leader of each assigned partition
#[derive(Debug)]
struct Prepared {
    membership: Membership,
    offsets: BTreeMap<i32, i64>,
    leaders: BTreeMap<i32, Url>,
}

impl Kafka {
    pub fn builder()
    -> Builder<PhantomData<Vec<Url>>, PhantomData<String>, PhantomData<String>> {
        Builder::default()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn member_id(&self) -> Result<String> {
        self.member_id
            .lock()
            .map(|member_id| member_id.clone())
            .map_err(Into::into)
    }

    fn set_member_id(&self, member_id: &str) -> Result<()> {
        self.member_id
            .lock()
            .map(|mut current| {
                member_id.clone_into(&mut *current);
            })
            .map_err(Into::into)
    }

    async fn connect(&self, broker: &Url) -> Result<Connection> {
        Connection::connect(broker, self.configuration.client_id.clone()).await
    }

    /// The first reachable bootstrap broker
    async fn bootstrap(&self) -> Result<Connection> {
        for broker in &self.configuration.brokers {
            match self.connect(broker).await {
                Ok(connection) => return Ok(connection),
                Err(err) => warn!(%broker, %err, "bootstrap"),
            }
        }

        Err(Error::NoAvailableBroker(self.configuration.brokers.clone()))
    }

    async fn coordinator(&self, bootstrap: &mut Connection) -> Result<Connection> {
        let response = bootstrap
            .call(&FindCoordinatorRequest {
                key: self.configuration.group_id.clone(),
                key_type: GROUP_KEY_TYPE,
            })
            .await?;

        ErrorCode::ok(response.error_code)?;

        let coordinator = broker_url(&response.host, response.port)?;
        debug!(node_id = response.node_id, %coordinator);

        self.connect(&coordinator).await
    }

    async fn metadata(&self, bootstrap: &mut Connection) -> Result<MetadataResponse> {
        let metadata = bootstrap
            .call(&MetadataRequest {
                topics: Some(vec![MetadataRequestTopic {
                    name: self.configuration.topic.clone(),
                }]),
                allow_auto_topic_creation: false,
            })
            .await?;

        let topic = metadata
            .topic(&self.configuration.topic)
            .ok_or_else(|| Error::UnknownTopic(self.configuration.topic.clone()))?;

        ErrorCode::ok(topic.error_code)?;

        Ok(metadata)
    }

    /// The url of the leader of a partition
    fn leader(&self, metadata: &MetadataResponse, partition: i32) -> Result<Url> {
        let leader_id = metadata
            .topic(&self.configuration.topic)
            .and_then(|topic| {
                topic
                    .partitions
                    .iter()
                    .find(|candidate| candidate.partition_index == partition)
            })
            .map(|partition| partition.leader_id)
            .ok_or_else(|| Error::UnknownTopic(self.configuration.topic.clone()))?;

        metadata
            .broker(leader_id)
            .ok_or(Error::UnknownBroker(leader_id))
            .and_then(|broker| broker_url(&broker.host, broker.port))
    }

    async fn join_group(&self, coordinator: &mut Connection) -> Result<JoinGroupResponse> {
        let metadata = Bytes::try_from(&Subscription::new(&self.configuration.topic))?;

        let response = coordinator
            .call(&JoinGroupRequest {
                group_id: self.configuration.group_id.clone(),
                session_timeout_ms: millis(self.configuration.session_timeout),
                rebalance_timeout_ms: millis(self.configuration.rebalance_timeout),
                member_id: self.member_id()?,
                protocol_type: consumer::CONSUMER.into(),
                protocols: vec![JoinGroupRequestProtocol {
                    name: consumer::RANGE.into(),
                    metadata,
                }],
            })
            .await?;

        match ErrorCode::from(response.error_code) {
            ErrorCode::None => {
                self.set_member_id(&response.member_id)?;
                Ok(response)
            }

            ErrorCode::UnknownMemberId => {
                self.set_member_id("")?;
                Err(Error::Api(ErrorCode::UnknownMemberId))
            }

            ErrorCode::MemberIdRequired => {
                self.set_member_id(&response.member_id)?;
                Err(Error::Api(ErrorCode::MemberIdRequired))
            }

            otherwise => Err(Error::Api(otherwise)),
        }
    }

    async fn join(&self, bootstrap: &mut Connection, partitions: &[i32]) -> Result<Membership> {
        let mut coordinator = self.coordinator(bootstrap).await?;
        let joined = self.join_group(&mut coordinator).await?;

        info!(
            generation_id = joined.generation_id,
            member_id = joined.member_id,
            leader = joined.leader,
            members = joined.members.len(),
            "joined"
        );

        let assignments = if joined.leader == joined.member_id {
            if joined.protocol_name != consumer::RANGE {
                return Err(muster_wire::Error::UnknownAssignor(joined.protocol_name).into());
            }

            RangeAssignor.assign(&self.configuration.topic, partitions, &joined.members)?
        } else {
            vec![]
        };

        let synced = coordinator
            .call(&SyncGroupRequest {
                group_id: self.configuration.group_id.clone(),
                generation_id: joined.generation_id,
                member_id: joined.member_id.clone(),
                assignments,
            })
            .await?;

        ErrorCode::ok(synced.error_code)?;

        let assignment = consumer::Assignment::try_from(synced.assignment)?;

        Ok(Membership {
            coordinator,
            generation_id: joined.generation_id,
            member_id: joined.member_id,
            partitions: assignment.partitions(&self.configuration.topic),
        })
    }

    /// The offset to start consuming each assigned partition from
    async fn initial_offsets(
        &self,
        membership: &mut Membership,
        metadata: &MetadataResponse,
    ) -> Result<BTreeMap<i32, i64>> {
        let fetched = membership
            .coordinator
            .call(&OffsetFetchRequest {
                group_id: self.configuration.group_id.clone(),
                topics: vec![OffsetFetchRequestTopic {
                    name: self.configuration.topic.clone(),
                    partition_indexes: membership.partitions.clone(),
                }],
            })
            .await?;

        let mut offsets = BTreeMap::new();

        for partition in fetched
            .topics
            .into_iter()
            .filter(|topic| topic.name == self.configuration.topic)
            .flat_map(|topic| topic.partitions)
        {
            ErrorCode::ok(partition.error_code)?;

            if partition.committed_offset >= 0 {
                _ = offsets.insert(partition.partition_index, partition.committed_offset);
            }
        }

        for partition in &membership.partitions {
            if offsets.contains_key(partition) {
                continue;
            }

            let offset = self.list_offset(metadata, *partition).await?;
            debug!(partition, offset, auto_offset_reset = ?self.configuration.auto_offset_reset);
            _ = offsets.insert(*partition, offset);
        }

        Ok(offsets)
    }

    async fn list_offset(&self, metadata: &MetadataResponse, partition: i32) -> Result<i64> {
        let mut leader = self.connect(&self.leader(metadata, partition)?).await?;

        let response = leader
            .call(&list_offsets(
                &self.configuration.topic,
                partition,
                self.configuration.auto_offset_reset,
            ))
            .await?;

        listed_offset(response, partition)
    }

    /// Join the group and find where to start each assigned partition
    async fn prepare(&self) -> Result<Prepared> {
        let mut bootstrap = self.bootstrap().await?;
        let metadata = self.metadata(&mut bootstrap).await?;

        let partitions = metadata
            .topic(&self.configuration.topic)
            .map(|topic| {
                topic
                    .partitions
                    .iter()
                    .map(|partition| partition.partition_index)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut membership = self.join(&mut bootstrap, &partitions).await?;
        let offsets = self.initial_offsets(&mut membership, &metadata).await?;

        let leaders = offsets
            .keys()
            .map(|partition| {
                self.leader(&metadata, *partition)
                    .map(|leader| (*partition, leader))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Prepared {
            membership,
            offsets,
            leaders,
        })
    }

    async fn run(&self, handler: Arc<dyn SessionHandler>, token: CancellationToken) -> Result<()> {
        let prepared = tokio::select! {
            prepared = self.prepare() => prepared?,
            () = token.cancelled() => return Err(ClientError::Cancelled.into()),
            () = self.closed.cancelled() => return Err(ClientError::Closed.into()),
        };

        if token.is_cancelled() {
            return Err(ClientError::Cancelled.into());
        }

        let Prepared {
            membership:
                Membership {
                    coordinator,
                    generation_id,
                    member_id,
                    partitions,
                },
            offsets,
            leaders,
        } = prepared;

        let coordinator = Arc::new(tokio::sync::Mutex::new(coordinator));

        let session = Session::new(
            generation_id,
            &member_id,
            Assignment::from([(self.configuration.topic.clone(), partitions)]),
            Arc::new(Committer {
                coordinator: coordinator.clone(),
                group_id: self.configuration.group_id.clone(),
                member_id: member_id.clone(),
            }),
        );

        handler.on_start(&session).await?;

        let session_token = token.child_token();

        let heartbeat = tokio::spawn(
            Heartbeat {
                coordinator: coordinator.clone(),
                request: HeartbeatRequest {
                    group_id: self.configuration.group_id.clone(),
                    generation_id,
                    member_id: member_id.clone(),
                },
                interval: self.configuration.heartbeat_interval,
                session: session_token.clone(),
                closed: self.closed.clone(),
            }
            .run(),
        );

        let mut fetchers = JoinSet::new();
        let mut claims = JoinSet::new();

        for (partition, offset) in offsets {
            let (sender, claim) = Claim::channel(
                &self.configuration.topic,
                partition,
                offset,
                self.configuration.claim_capacity,
            );

            let claim = claim.revoked_by(session_token.clone());

            let Some(leader) = leaders.get(&partition).cloned() else {
                continue;
            };

            let fetcher = Fetcher {
                leader,
                client_id: self.configuration.client_id.clone(),
                request: FetchRequest {
                    replica_id: CONSUMER_REPLICA_ID,
                    max_wait_ms: millis(self.configuration.max_wait),
                    min_bytes: self.configuration.min_bytes,
                    max_bytes: self.configuration.partition_max_bytes,
                    isolation_level: READ_UNCOMMITTED,
                    topics: vec![FetchTopic {
                        topic: self.configuration.topic.clone(),
                        partitions: vec![FetchPartition {
                            partition,
                            fetch_offset: offset,
                            partition_max_bytes: self.configuration.partition_max_bytes,
                        }],
                    }],
                },
                auto_offset_reset: self.configuration.auto_offset_reset,
                sender,
                session: session_token.clone(),
            };

            let span = span!(Level::DEBUG, "fetch", partition);
            _ = fetchers.spawn(fetcher.run().instrument(span));

            let handler = handler.clone();
            let session = session.clone();
            _ = claims.spawn(async move { handler.on_claim(&session, claim).await });
        }

        session_token.cancelled().await;
        debug!(generation_id, "session ending");

        let mut failed = None;

        while let Some(fetched) = fetchers.join_next().await {
            match fetched {
                Ok(Ok(())) => (),
                Ok(Err(err)) => {
                    _ = failed.get_or_insert(err);
                }
                Err(err) => warn!(%err, "fetch"),
            }
        }

        while let Some(claimed) = claims.join_next().await {
            match claimed {
                Ok(Ok(())) => (),
                Ok(Err(err)) => warn!(%err, "claim"),
                Err(err) => warn!(%err, "claim"),
            }
        }

        if let Err(err) = heartbeat.await {
            warn!(%err, "heartbeat");
        }

        handler.on_end(&session).await?;

        if token.is_cancelled() || self.closed.is_cancelled() {
            let left = coordinator
                .lock()
                .await
                .call(&LeaveGroupRequest {
                    group_id: self.configuration.group_id.clone(),
                    member_id,
                })
                .await
                .and_then(|response| ErrorCode::ok(response.error_code).map_err(Into::into));

            match left {
                Ok(()) => info!(generation_id, "left group"),
                Err(err) => warn!(%err, "leave"),
            }

            self.set_member_id("")?;
        }

        failed.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl muster_group::Client for Kafka {
    async fn join_and_run(
        &self,
        handler: Arc<dyn SessionHandler>,
        token: CancellationToken,
    ) -> Result<(), ClientError> {
        if self.closed.is_cancelled() {
            return Err(ClientError::Closed);
        }

        let span = span!(Level::DEBUG, "session", group_id = self.configuration.group_id);

        let outcome = self.run(handler, token).instrument(span).await;

        if self.closed.is_cancelled() {
            Err(ClientError::Closed)
        } else {
            outcome.map_err(Into::into)
        }
    }

    async fn close(&self) -> Result<(), ClientError> {
        info!(group_id = self.configuration.group_id, "close");
        self.closed.cancel();
        Ok(())
    }
}

#[derive(Debug)]
struct Committer {
    coordinator: Arc<tokio::sync::Mutex<Connection>>,
    group_id: String,
    member_id: String,
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
        let response = self
            .coordinator
            .lock()
            .await
            .call(&OffsetCommitRequest {
                group_id: self.group_id.clone(),
                generation_id,
                member_id: self.member_id.clone(),
                retention_time_ms: DEFAULT_RETENTION_TIME_MS,
                topics: vec![OffsetCommitRequestTopic {
                    name: topic.into(),
                    partitions: vec![OffsetCommitRequestPartition {
                        partition_index: partition,
                        committed_offset: offset,
                        committed_metadata: None,
                    }],
                }],
            })
            .await?;

        response
            .topics
            .iter()
            .flat_map(|topic| topic.partitions.iter())
            .try_for_each(|partition| ErrorCode::ok(partition.error_code))
            .map_err(|code| ClientError::Api(i16::from(code)))
    }
}

#[derive(Debug)]
struct Heartbeat {
    coordinator: Arc<tokio::sync::Mutex<Connection>>,
    request: HeartbeatRequest,
    interval: Duration,
    session: CancellationToken,
    closed: CancellationToken,
}

impl Heartbeat {
    /// Heartbeat until the session is cancelled, ending the session on a
    /// rebalance or when the client is closed
    async fn run(self) {
        loop {
            tokio::select! {
                () = self.session.cancelled() => return,

                () = self.closed.cancelled() => {
                    self.session.cancel();
                    return
                }

                () = sleep(self.interval) => (),
            }

            let response = self.coordinator.lock().await.call(&self.request).await;

            match response.map(|response| ErrorCode::from(response.error_code)) {
                Ok(ErrorCode::None) => debug!(generation_id = self.request.generation_id),

                Ok(code) if code.is_rebalance() || code.is_coordinator() => {
                    info!(generation_id = self.request.generation_id, %code, "rebalance");
                    self.session.cancel();
                    return;
                }

                Ok(code) => warn!(generation_id = self.request.generation_id, %code, "heartbeat"),

                Err(err) => {
                    warn!(generation_id = self.request.generation_id, %err, "heartbeat");
                    self.session.cancel();
                    return;
                }
            }
        }
    }
}

#[derive(Debug)]
struct Fetcher {
    leader: Url,
    client_id: Option<String>,
    request: FetchRequest,
    auto_offset_reset: AutoOffsetReset,
    sender: mpsc::Sender<Record>,
    session: CancellationToken,
}

impl Fetcher {
    /// Fetch records for a claim until the session is cancelled, an error
    /// ends the session and is returned
    async fn run(self) -> Result<()> {
        let session = self.session.clone();

        self.fetch()
            .await
            .inspect_err(|err| {
                warn!(%err, "fetch");
                session.cancel();
            })
    }

    fn offset(&mut self) -> Option<&mut i64> {
        self.request
            .topics
            .first_mut()
            .and_then(|topic| topic.partitions.first_mut())
            .map(|partition| &mut partition.fetch_offset)
    }

    /// Move the fetch offset to the earliest or latest offset of the partition
    async fn reset(
        &mut self,
        connection: &mut Connection,
        topic: &str,
        partition: i32,
    ) -> Result<()> {
        let response = connection
            .call(&list_offsets(topic, partition, self.auto_offset_reset))
            .await?;

        let reset = listed_offset(response, partition)?;
        let auto_offset_reset = self.auto_offset_reset;

        if let Some(offset) = self.offset() {
            warn!(
                from = *offset,
                to = reset,
                ?auto_offset_reset,
                "offset out of range"
            );
            *offset = reset;
        }

        Ok(())
    }

    async fn fetch(mut self) -> Result<()> {
        let mut connection = Connection::connect(&self.leader, self.client_id.clone()).await?;

        let (topic, partition) = self
            .request
            .topics
            .first()
            .and_then(|topic| {
                topic
                    .partitions
                    .first()
                    .map(|partition| (topic.topic.clone(), partition.partition))
            })
            .ok_or_else(|| Error::Message(String::from("empty fetch")))?;

        loop {
            let response = tokio::select! {
                () = self.session.cancelled() => return Ok(()),
                response = connection.call(&self.request) => response?,
            };

            for data in response
                .responses
                .into_iter()
                .filter(|response| response.topic == topic)
                .flat_map(|response| response.partitions)
                .filter(|data| data.partition_index == partition)
            {
                match ErrorCode::from(data.error_code) {
                    ErrorCode::None => (),

                    ErrorCode::OffsetOutOfRange => {
                        self.reset(&mut connection, &topic, partition).await?;
                        continue;
                    }

                    code => return Err(code.into()),
                }

                let Some(records) = data.records else {
                    continue;
                };

                for batch in Batch::decode_all(records)? {
                    let next = batch.last_offset() + 1;

                    if batch.is_control() {
                        debug!(base_offset = batch.base_offset, "control");
                    }

                    for record in batch.records {
                        if self.offset().is_some_and(|offset| record.offset < *offset) {
                            continue;
                        }

                        let record = Record::new(&topic, partition, record.offset)
                            .timestamp(record.timestamp)
                            .key(record.key)
                            .value(record.value)
                            .headers(
                                record
                                    .headers
                                    .into_iter()
                                    .map(|header| Header {
                                        key: header.key,
                                        value: header.value,
                                    })
                                    .collect(),
                            );

                        let offset = record.offset;

                        tokio::select! {
                            () = self.session.cancelled() => return Ok(()),
                            sent = self.sender.send(record) => if sent.is_err() { return Ok(()) },
                        }

                        if let Some(fetch_offset) = self.offset() {
                            *fetch_offset = offset + 1;
                        }
                    }

                    if let Some(fetch_offset) = self.offset() {
                        *fetch_offset = (*fetch_offset).max(next);
                    }
                }
            }
        }
    }
}

/// A builder for [`Kafka`], requiring brokers, a topic and a group
#[derive(Clone, Debug)]
pub struct Builder<B, T, G> {
    brokers: B,
    topic: T,
    group_id: G,
    client_id: Option<String>,
    session_timeout: Duration,
    rebalance_timeout: Duration,
    heartbeat_interval: Duration,
    max_wait: Duration,
    min_bytes: i32,
    partition_max_bytes: i32,
    auto_offset_reset: AutoOffsetReset,
    claim_capacity: usize,
}

impl Default for Builder<PhantomData<Vec<Url>>, PhantomData<String>, PhantomData<String>> {
    fn default() -> Self {
        Self {
            brokers: Default::default(),
            topic: Default::default(),
            group_id: Default::default(),
            client_id: Some(env!("CARGO_PKG_NAME").into()),
            session_timeout: Duration::from_secs(10),
            rebalance_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(3),
            max_wait: Duration::from_millis(500),
            min_bytes: 1,
            partition_max_bytes: 1_048_576,
            auto_offset_reset: AutoOffsetReset::default(),
            claim_capacity: 256,
        }
    }
}

impl<B, T, G> Builder<B, T, G> {
    pub fn brokers(self, brokers: Vec<Url>) -> Builder<Vec<Url>, T, G> {
        Builder {
            brokers,
            topic: self.topic,
            group_id: self.group_id,
            client_id: self.client_id,
            session_timeout: self.session_timeout,
            rebalance_timeout: self.rebalance_timeout,
            heartbeat_interval: self.heartbeat_interval,
            max_wait: self.max_wait,
            min_bytes: self.min_bytes,
            partition_max_bytes: self.partition_max_bytes,
            auto_offset_reset: self.auto_offset_reset,
            claim_capacity: self.claim_capacity,
        }
    }

    pub fn topic(self, topic: impl Into<String>) -> Builder<B, String, G> {
        Builder {
            brokers: self.brokers,
            topic: topic.into(),
            group_id: self.group_id,
            client_id: self.client_id,
            session_timeout: self.session_timeout,
            rebalance_timeout: self.rebalance_timeout,
            heartbeat_interval: self.heartbeat_interval,
            max_wait: self.max_wait,
            min_bytes: self.min_bytes,
            partition_max_bytes: self.partition_max_bytes,
            auto_offset_reset: self.auto_offset_reset,
            claim_capacity: self.claim_capacity,
        }
    }

    pub fn group_id(self, group_id: impl Into<String>) -> Builder<B, T, String> {
        Builder {
            brokers: self.brokers,
            topic: self.topic,
            group_id: group_id.into(),
            client_id: self.client_id,
            session_timeout: self.session_timeout,
            rebalance_timeout: self.rebalance_timeout,
            heartbeat_interval: self.heartbeat_interval,
            max_wait: self.max_wait,
            min_bytes: self.min_bytes,
            partition_max_bytes: self.partition_max_bytes,
            auto_offset_reset: self.auto_offset_reset,
            claim_capacity: self.claim_capacity,
        }
    }

    pub fn client_id(self, client_id: Option<String>) -> Self {
        Self { client_id, ..self }
    }

    pub fn session_timeout(self, session_timeout: Duration) -> Self {
        Self {
            session_timeout,
            ..self
        }
    }

    pub fn rebalance_timeout(self, rebalance_timeout: Duration) -> Self {
        Self {
            rebalance_timeout,
            ..self
        }
    }

    pub fn heartbeat_interval(self, heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            ..self
        }
    }

    pub fn max_wait(self, max_wait: Duration) -> Self {
        Self { max_wait, ..self }
    }

    pub fn min_bytes(self, min_bytes: i32) -> Self {
        Self { min_bytes, ..self }
    }

    pub fn partition_max_bytes(self, partition_max_bytes: i32) -> Self {
        Self {
            partition_max_bytes,
            ..self
        }
    }

    pub fn auto_offset_reset(self, auto_offset_reset: AutoOffsetReset) -> Self {
        Self {
            auto_offset_reset,
            ..self
        }
    }

    /// Records buffered for each claim
    pub fn claim_capacity(self, claim_capacity: usize) -> Self {
        Self {
            claim_capacity,
            ..self
        }
    }
}

impl Builder<Vec<Url>, String, String> {
    pub fn build(self) -> Result<Kafka> {
        if self.brokers.is_empty() {
            return Err(Error::Message(String::from("at least one broker is required")));
        }

        if self.heartbeat_interval >= self.session_timeout {
            return Err(Error::Message(format!(
                "heartbeat interval: {:?}, must be less than the session timeout: {:?}",
                self.heartbeat_interval, self.session_timeout
            )));
        }

        Ok(Kafka {
            configuration: Configuration {
                brokers: self.brokers,
                topic: self.topic,
                group_id: self.group_id,
                client_id: self.client_id,
                session_timeout: self.session_timeout,
                rebalance_timeout: self.rebalance_timeout,
                heartbeat_interval: self.heartbeat_interval,
                max_wait: self.max_wait,
                min_bytes: self.min_bytes,
                partition_max_bytes: self.partition_max_bytes,
                auto_offset_reset: self.auto_offset_reset,
                claim_capacity: self.claim_capacity,
            },
            member_id: Mutex::new(String::new()),
            closed: CancellationToken::new(),
        })
    }
}
