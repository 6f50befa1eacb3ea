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

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::{Buf as _, Bytes};
use muster_group::{Process, Record, Signal, Signals};
use muster_wire::{
    Decode, EARLIEST_TIMESTAMP, Encode, ErrorCode, FetchRequest, FetchResponse,
    FetchableTopicResponse, FindCoordinatorRequest, FindCoordinatorResponse, HeartbeatRequest,
    HeartbeatResponse, JoinGroupRequest, JoinGroupResponse, JoinGroupResponseMember,
    LeaveGroupRequest, LeaveGroupResponse, ListOffsetsPartitionResponse, ListOffsetsRequest,
    ListOffsetsResponse, ListOffsetsTopicResponse, MetadataRequest, MetadataResponse,
    MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
    OffsetCommitRequest, OffsetCommitResponse, OffsetCommitResponsePartition,
    OffsetCommitResponseTopic, OffsetFetchRequest, OffsetFetchResponse,
    OffsetFetchResponsePartition, OffsetFetchResponseTopic, PartitionData, RequestHeader,
    SyncGroupRequest, SyncGroupResponse, frame,
    record::{self, Batch},
};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::sleep,
};
use tracing::{debug, subscriber::DefaultGuard};
use tracing_subscriber::{EnvFilter, filter::ParseError};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("{0}")]
    Client(#[from] muster_group::ClientError),

    #[error("{0}")]
    Elapsed(#[from] tokio::time::error::Elapsed),

    #[error("{0}")]
    Filter(#[from] ParseError),

    #[error("{0}")]
    Group(#[from] muster_group::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Kafka(#[from] muster_client::Error),

    #[error("poison")]
    Poison,

    #[error("{0}")]
    Send(#[from] mpsc::error::SendError<Signal>),

    #[error("{0}")]
    TryFromInt(#[from] std::num::TryFromIntError),

    #[error("{0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Wire(#[from] muster_wire::Error),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_value: std::sync::PoisonError<T>) -> Self {
        Self::Poison
    }
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) fn init_tracing() -> Result<DefaultGuard> {
    Ok(tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_level(true)
            .with_line_number(true)
            .with_thread_names(false)
            .with_target(true)
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(
                    format!("{}=debug", env!("CARGO_PKG_NAME").replace("-", "_")).parse()?,
                ),
            )
            .with_test_writer()
            .finish(),
    ))
}

const NODE_ID: i32 = 111;
const MEMBER_ID: &str = "muster-0001";

#[derive(Debug, Default)]
struct State {
    port: i32,
    topic: String,
    logs: BTreeMap<i32, Vec<Bytes>>,
    generation_id: i32,
    rebalance: bool,
    committed: BTreeMap<i32, i64>,
    commits: Vec<(i32, i32, i64)>,
    joins: u32,
    leaves: u32,
    silent_joins: bool,
    log_start: BTreeMap<i32, i64>,
    fetch_errors: BTreeMap<i32, ErrorCode>,
}

/// A single node cluster hosting one topic, answering the requests made by
/// a consumer group member
#[derive(Clone, Debug)]
pub(crate) struct Cluster {
    port: u16,
    state: Arc<Mutex<State>>,
}

impl Cluster {
    pub(crate) async fn start(topic: &str, partitions: i32) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let state = Arc::new(Mutex::new(State {
            port: i32::from(port),
            topic: topic.into(),
            logs: (0..partitions).map(|partition| (partition, vec![])).collect(),
            ..Default::default()
        }));

        let cluster = Self { port, state };

        {
            let cluster = cluster.clone();

            _ = tokio::spawn(async move {
                while let Ok((stream, peer)) = listener.accept().await {
                    debug!(%peer);

                    let cluster = cluster.clone();
                    _ = tokio::spawn(async move {
                        if let Err(err) = cluster.serve(stream).await {
                            debug!(%err);
                        }
                    });
                }
            });
        }

        Ok(cluster)
    }

    pub(crate) fn url(&self) -> Result<Url> {
        Url::parse(&format!("tcp://127.0.0.1:{}", self.port)).map_err(Into::into)
    }

    /// Append a record, returning its offset
    pub(crate) fn produce(&self, partition: i32, value: &'static [u8]) -> Result<i64> {
        let mut state = self.state.lock()?;
        let log = state.logs.entry(partition).or_default();
        log.push(Bytes::from_static(value));
        Ok(i64::try_from(log.len())? - 1)
    }

    /// Fail the next heartbeat of the current generation with a rebalance
    pub(crate) fn rebalance(&self) -> Result<()> {
        self.state.lock()?.rebalance = true;
        Ok(())
    }

    /// Accept JoinGroup requests without ever answering them
    pub(crate) fn silence_joins(&self) -> Result<()> {
        self.state.lock()?.silent_joins = true;
        Ok(())
    }

    /// Answer every fetch of a partition with an error
    pub(crate) fn fail_fetches(&self, partition: i32, error_code: ErrorCode) -> Result<()> {
        _ = self.state.lock()?.fetch_errors.insert(partition, error_code);
        Ok(())
    }

    /// Remove the records of a partition below an offset, as retention does
    pub(crate) fn truncate(&self, partition: i32, log_start: i64) -> Result<()> {
        _ = self.state.lock()?.log_start.insert(partition, log_start);
        Ok(())
    }

    /// Commit an offset for the group outside of any member
    pub(crate) fn commit(&self, partition: i32, offset: i64) -> Result<()> {
        _ = self.state.lock()?.committed.insert(partition, offset);
        Ok(())
    }

    pub(crate) fn committed(&self, partition: i32) -> Result<Option<i64>> {
        Ok(self.state.lock()?.committed.get(&partition).copied())
    }

    pub(crate) fn commits(&self) -> Result<Vec<(i32, i32, i64)>> {
        Ok(self.state.lock()?.commits.clone())
    }

    pub(crate) fn joins(&self) -> Result<u32> {
        Ok(self.state.lock()?.joins)
    }

    pub(crate) fn leaves(&self) -> Result<u32> {
        Ok(self.state.lock()?.leaves)
    }

    pub(crate) async fn wait_for_commit(&self, partition: i32, offset: i64) -> Result<()> {
        while self.committed(partition)? < Some(offset) {
            sleep(Duration::from_millis(10)).await;
        }

        Ok(())
    }

    pub(crate) async fn wait_for_joins(&self, joins: u32) -> Result<()> {
        while self.joins()? < joins {
            sleep(Duration::from_millis(10)).await;
        }

        Ok(())
    }

    async fn serve(self, mut stream: TcpStream) -> Result<()> {
        loop {
            let mut size = [0u8; frame::SIZE_PREFIX];
            if stream.read_exact(&mut size).await.is_err() {
                return Ok(());
            }

            let mut buffer = vec![0u8; frame::frame_length(size)?];
            _ = stream.read_exact(&mut buffer[..]).await?;

            let mut request = Bytes::from(buffer);
            let header = RequestHeader::decode(&mut request)?;
            debug!(?header);

            let silent_joins = self.state.lock()?.silent_joins;

            let response = match header.api_key {
                1 => self.fetch(header.correlation_id, request).await?,
                2 => self.handle(header.correlation_id, request, Self::list_offsets)?,
                3 => self.handle(header.correlation_id, request, Self::metadata)?,
                8 => self.handle(header.correlation_id, request, Self::offset_commit)?,
                9 => self.handle(header.correlation_id, request, Self::offset_fetch)?,
                10 => self.handle(header.correlation_id, request, Self::find_coordinator)?,
                11 if silent_joins => {
                    debug!(correlation_id = header.correlation_id, "silent join");
                    std::future::pending::<()>().await;
                    return Ok(());
                }

                11 => self.handle(header.correlation_id, request, Self::join_group)?,
                12 => self.handle(header.correlation_id, request, Self::heartbeat)?,
                13 => self.handle(header.correlation_id, request, Self::leave_group)?,
                14 => self.handle(header.correlation_id, request, Self::sync_group)?,
                otherwise => {
                    return Err(Error::Wire(muster_wire::Error::Message(format!(
                        "api key: {otherwise}"
                    ))));
                }
            };

            stream.write_all(&response[..]).await?;
        }
    }

    fn handle<Q, R>(
        &self,
        correlation_id: i32,
        mut request: Bytes,
        f: impl FnOnce(&mut State, Q) -> R,
    ) -> Result<Bytes>
    where
        Q: Decode,
        R: Encode,
    {
        let request = Q::decode(&mut request)?;
        let response = f(&mut *self.state.lock()?, request);
        frame::response_frame(correlation_id, &response).map_err(Into::into)
    }

    fn metadata(state: &mut State, request: MetadataRequest) -> MetadataResponse {
        let port = state.port();

        MetadataResponse {
            brokers: vec![MetadataResponseBroker {
                node_id: NODE_ID,
                host: "127.0.0.1".into(),
                port,
                rack: None,
            }],
            controller_id: NODE_ID,
            topics: request
                .topics
                .unwrap_or_default()
                .into_iter()
                .map(|topic| {
                    if topic.name == state.topic {
                        MetadataResponseTopic {
                            name: topic.name,
                            partitions: state
                                .logs
                                .keys()
                                .map(|partition_index| MetadataResponsePartition {
                                    partition_index: *partition_index,
                                    leader_id: NODE_ID,
                                    replica_nodes: vec![NODE_ID],
                                    isr_nodes: vec![NODE_ID],
                                    ..Default::default()
                                })
                                .collect(),
                            ..Default::default()
                        }
                    } else {
                        MetadataResponseTopic {
                            error_code: ErrorCode::UnknownTopicOrPartition.into(),
                            name: topic.name,
                            ..Default::default()
                        }
                    }
                })
                .collect(),
            ..Default::default()
        }
    }

    fn find_coordinator(
        state: &mut State,
        _request: FindCoordinatorRequest,
    ) -> FindCoordinatorResponse {
        FindCoordinatorResponse {
            node_id: NODE_ID,
            host: "127.0.0.1".into(),
            port: state.port(),
            ..Default::default()
        }
    }

    fn join_group(state: &mut State, request: JoinGroupRequest) -> JoinGroupResponse {
        state.joins += 1;
        state.generation_id += 1;
        state.rebalance = false;

        let protocol = request.protocols.into_iter().next().unwrap_or_default();

        JoinGroupResponse {
            generation_id: state.generation_id,
            protocol_name: protocol.name,
            leader: MEMBER_ID.into(),
            member_id: MEMBER_ID.into(),
            members: vec![JoinGroupResponseMember {
                member_id: MEMBER_ID.into(),
                metadata: protocol.metadata,
            }],
            ..Default::default()
        }
    }

    fn sync_group(state: &mut State, request: SyncGroupRequest) -> SyncGroupResponse {
        if request.generation_id != state.generation_id {
            return SyncGroupResponse {
                error_code: ErrorCode::IllegalGeneration.into(),
                ..Default::default()
            };
        }

        SyncGroupResponse {
            assignment: request
                .assignments
                .into_iter()
                .find(|assignment| assignment.member_id == request.member_id)
                .map(|assignment| assignment.assignment)
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    fn heartbeat(state: &mut State, request: HeartbeatRequest) -> HeartbeatResponse {
        let error_code = if state.rebalance {
            ErrorCode::RebalanceInProgress
        } else if request.generation_id != state.generation_id {
            ErrorCode::IllegalGeneration
        } else {
            ErrorCode::None
        };

        HeartbeatResponse {
            error_code: error_code.into(),
            ..Default::default()
        }
    }

    fn leave_group(state: &mut State, _request: LeaveGroupRequest) -> LeaveGroupResponse {
        state.leaves += 1;
        LeaveGroupResponse::default()
    }

    fn offset_fetch(state: &mut State, request: OffsetFetchRequest) -> OffsetFetchResponse {
        OffsetFetchResponse {
            topics: request
                .topics
                .into_iter()
                .map(|topic| OffsetFetchResponseTopic {
                    name: topic.name,
                    partitions: topic
                        .partition_indexes
                        .into_iter()
                        .map(|partition_index| OffsetFetchResponsePartition {
                            partition_index,
                            committed_offset: state
                                .committed
                                .get(&partition_index)
                                .copied()
                                .unwrap_or(-1),
                            ..Default::default()
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn offset_commit(state: &mut State, request: OffsetCommitRequest) -> OffsetCommitResponse {
        let error_code = if request.generation_id == state.generation_id {
            ErrorCode::None
        } else {
            ErrorCode::IllegalGeneration
        };

        OffsetCommitResponse {
            topics: request
                .topics
                .into_iter()
                .map(|topic| OffsetCommitResponseTopic {
                    name: topic.name,
                    partitions: topic
                        .partitions
                        .into_iter()
                        .map(|partition| {
                            if error_code == ErrorCode::None {
                                _ = state
                                    .committed
                                    .insert(partition.partition_index, partition.committed_offset);

                                state.commits.push((
                                    request.generation_id,
                                    partition.partition_index,
                                    partition.committed_offset,
                                ));
                            }

                            OffsetCommitResponsePartition {
                                partition_index: partition.partition_index,
                                error_code: error_code.into(),
                            }
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn list_offsets(state: &mut State, request: ListOffsetsRequest) -> ListOffsetsResponse {
        ListOffsetsResponse {
            topics: request
                .topics
                .into_iter()
                .map(|topic| ListOffsetsTopicResponse {
                    name: topic.name,
                    partitions: topic
                        .partitions
                        .into_iter()
                        .map(|partition| ListOffsetsPartitionResponse {
                            partition_index: partition.partition_index,
                            offset: if partition.timestamp == EARLIEST_TIMESTAMP {
                                state.log_start(partition.partition_index)
                            } else {
                                state.high_watermark(partition.partition_index)
                            },
                            timestamp: -1,
                            ..Default::default()
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    async fn fetch(&self, correlation_id: i32, mut request: Bytes) -> Result<Bytes> {
        let request = FetchRequest::decode(&mut request)?;
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(u64::try_from(request.max_wait_ms)?);

        loop {
            let response = self.fetched(&request)?;

            let empty = response
                .responses
                .iter()
                .flat_map(|topic| topic.partitions.iter())
                .all(|partition| {
                    partition.error_code == i16::from(ErrorCode::None)
                        && partition
                            .records
                            .as_ref()
                            .is_none_or(|records| !records.has_remaining())
                });

            if !empty || tokio::time::Instant::now() >= deadline {
                return frame::response_frame(correlation_id, &response).map_err(Into::into);
            }

            sleep(Duration::from_millis(10)).await;
        }
    }

    fn fetched(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let state = self.state.lock()?;

        let mut responses = vec![];

        for topic in &request.topics {
            let mut partitions = vec![];

            for partition in &topic.partitions {
                let high_watermark = state.high_watermark(partition.partition);
                let log_start = state.log_start(partition.partition);

                let error_code = state
                    .fetch_errors
                    .get(&partition.partition)
                    .copied()
                    .or((partition.fetch_offset < log_start
                        || partition.fetch_offset > high_watermark)
                        .then_some(ErrorCode::OffsetOutOfRange));

                if let Some(error_code) = error_code {
                    partitions.push(PartitionData {
                        partition_index: partition.partition,
                        error_code: error_code.into(),
                        high_watermark,
                        last_stable_offset: high_watermark,
                        ..Default::default()
                    });

                    continue;
                }

                let log = state
                    .logs
                    .get(&partition.partition)
                    .cloned()
                    .unwrap_or_default();

                let records = log
                    .into_iter()
                    .enumerate()
                    .map(|(offset, value)| {
                        i64::try_from(offset)
                            .map(|offset| record::Record::new(offset).value(Some(value)))
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .filter(|record| record.offset >= partition.fetch_offset.max(log_start))
                    .collect::<Vec<_>>();

                let records = if records.is_empty() {
                    Bytes::new()
                } else {
                    Batch::with_records(records)?.encode()?
                };

                partitions.push(PartitionData {
                    partition_index: partition.partition,
                    high_watermark,
                    last_stable_offset: high_watermark,
                    records: Some(records),
                    ..Default::default()
                });
            }

            responses.push(FetchableTopicResponse {
                topic: topic.topic.clone(),
                partitions,
            });
        }

        Ok(FetchResponse {
            throttle_time_ms: 0,
            responses,
        })
    }
}

impl State {
    fn port(&self) -> i32 {
        self.port
    }

    fn log_start(&self, partition: i32) -> i64 {
        self.log_start.get(&partition).copied().unwrap_or_default()
    }

    fn high_watermark(&self, partition: i32) -> i64 {
        self.logs
            .get(&partition)
            .and_then(|log| i64::try_from(log.len()).ok())
            .unwrap_or_default()
    }
}

/// Collect the value of each processed record
#[derive(Clone, Debug, Default)]
pub(crate) struct Collector {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Collector {
    pub(crate) fn offsets(&self, partition: i32) -> Vec<i64> {
        self.records
            .lock()
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.partition == partition)
                    .map(|record| record.offset)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn values(&self) -> Vec<Option<Bytes>> {
        self.records
            .lock()
            .map(|records| records.iter().map(|record| record.value.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Process for Collector {
    async fn process(&self, record: &Record) -> muster_group::Result<()> {
        self.records
            .lock()
            .map(|mut records| records.push(record.clone()))
            .map_err(Into::into)
    }
}

/// Signals sent by a test
#[derive(Debug)]
pub(crate) struct Injected(pub mpsc::Receiver<Signal>);

pub(crate) fn signals() -> (mpsc::Sender<Signal>, Injected) {
    let (sender, receiver) = mpsc::channel(2);
    (sender, Injected(receiver))
}

#[async_trait]
impl Signals for Injected {
    async fn recv(&mut self) -> Option<Signal> {
        self.0.recv().await
    }
}
