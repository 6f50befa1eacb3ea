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

use bytes::Bytes;

/// Read uncommitted records
pub const READ_UNCOMMITTED: i8 = 0;

/// A consumer is not a replica
pub const CONSUMER_REPLICA_ID: i32 = -1;

/// [`ListOffsetsRequest`] timestamp for the earliest offset of a partition
pub const EARLIEST_TIMESTAMP: i64 = -2;

/// [`ListOffsetsRequest`] timestamp for the next offset to be written to a partition
pub const LATEST_TIMESTAMP: i64 = -1;

/// Use the retention configured on the broker for committed offsets
pub const DEFAULT_RETENTION_TIME_MS: i64 = -1;

/// [`FindCoordinatorRequest`] key type for a consumer group
pub const GROUP_KEY_TYPE: i8 = 0;

message!(
    /// Fetch v4
    FetchRequest {
        replica_id: i32,
        max_wait_ms: i32,
        min_bytes: i32,
        max_bytes: i32,
        isolation_level: i8,
        topics: Vec<FetchTopic>,
    }
);

message!(FetchTopic {
    topic: String,
    partitions: Vec<FetchPartition>,
});

message!(FetchPartition {
    partition: i32,
    fetch_offset: i64,
    partition_max_bytes: i32,
});

message!(FetchResponse {
    throttle_time_ms: i32,
    responses: Vec<FetchableTopicResponse>,
});

message!(FetchableTopicResponse {
    topic: String,
    partitions: Vec<PartitionData>,
});

message!(PartitionData {
    partition_index: i32,
    error_code: i16,
    high_watermark: i64,
    last_stable_offset: i64,
    aborted_transactions: Option<Vec<AbortedTransaction>>,
    records: Option<Bytes>,
});

message!(AbortedTransaction {
    producer_id: i64,
    first_offset: i64,
});

api!(FetchRequest, FetchResponse, 1, 4);

message!(
    /// ListOffsets v1
    ListOffsetsRequest {
        replica_id: i32,
        topics: Vec<ListOffsetsTopic>,
    }
);

message!(ListOffsetsTopic {
    name: String,
    partitions: Vec<ListOffsetsPartition>,
});

message!(ListOffsetsPartition {
    partition_index: i32,
    timestamp: i64,
});

message!(ListOffsetsResponse {
    topics: Vec<ListOffsetsTopicResponse>,
});

message!(ListOffsetsTopicResponse {
    name: String,
    partitions: Vec<ListOffsetsPartitionResponse>,
});

message!(ListOffsetsPartitionResponse {
    partition_index: i32,
    error_code: i16,
    timestamp: i64,
    offset: i64,
});

api!(ListOffsetsRequest, ListOffsetsResponse, 2, 1);

message!(
    /// Metadata v4
    MetadataRequest {
        topics: Option<Vec<MetadataRequestTopic>>,
        allow_auto_topic_creation: bool,
    }
);

message!(MetadataRequestTopic { name: String });

message!(MetadataResponse {
    throttle_time_ms: i32,
    brokers: Vec<MetadataResponseBroker>,
    cluster_id: Option<String>,
    controller_id: i32,
    topics: Vec<MetadataResponseTopic>,
});

message!(MetadataResponseBroker {
    node_id: i32,
    host: String,
    port: i32,
    rack: Option<String>,
});

message!(MetadataResponseTopic {
    error_code: i16,
    name: String,
    is_internal: bool,
    partitions: Vec<MetadataResponsePartition>,
});

message!(MetadataResponsePartition {
    error_code: i16,
    partition_index: i32,
    leader_id: i32,
    replica_nodes: Vec<i32>,
    isr_nodes: Vec<i32>,
});

api!(MetadataRequest, MetadataResponse, 3, 4);

impl MetadataResponse {
    /// The broker with this node id
    pub fn broker(&self, node_id: i32) -> Option<&MetadataResponseBroker> {
        self.brokers.iter().find(|broker| broker.node_id == node_id)
    }

    /// The metadata for a named topic
    pub fn topic(&self, name: &str) -> Option<&MetadataResponseTopic> {
        self.topics.iter().find(|topic| topic.name == name)
    }
}

message!(
    /// OffsetCommit v2
    OffsetCommitRequest {
        group_id: String,
        generation_id: i32,
        member_id: String,
        retention_time_ms: i64,
        topics: Vec<OffsetCommitRequestTopic>,
    }
);

message!(OffsetCommitRequestTopic {
    name: String,
    partitions: Vec<OffsetCommitRequestPartition>,
});

message!(OffsetCommitRequestPartition {
    partition_index: i32,
    committed_offset: i64,
    committed_metadata: Option<String>,
});

message!(OffsetCommitResponse {
    topics: Vec<OffsetCommitResponseTopic>,
});

message!(OffsetCommitResponseTopic {
    name: String,
    partitions: Vec<OffsetCommitResponsePartition>,
});

message!(OffsetCommitResponsePartition {
    partition_index: i32,
    error_code: i16,
});

api!(OffsetCommitRequest, OffsetCommitResponse, 8, 2);

message!(
    /// OffsetFetch v1
    OffsetFetchRequest {
        group_id: String,
        topics: Vec<OffsetFetchRequestTopic>,
    }
);

message!(OffsetFetchRequestTopic {
    name: String,
    partition_indexes: Vec<i32>,
});

message!(OffsetFetchResponse {
    topics: Vec<OffsetFetchResponseTopic>,
});

message!(OffsetFetchResponseTopic {
    name: String,
    partitions: Vec<OffsetFetchResponsePartition>,
});

message!(OffsetFetchResponsePartition {
    partition_index: i32,
    committed_offset: i64,
    metadata: Option<String>,
    error_code: i16,
});

api!(OffsetFetchRequest, OffsetFetchResponse, 9, 1);

message!(
    /// FindCoordinator v1
    FindCoordinatorRequest { key: String, key_type: i8 }
);

message!(FindCoordinatorResponse {
    throttle_time_ms: i32,
    error_code: i16,
    error_message: Option<String>,
    node_id: i32,
    host: String,
    port: i32,
});

api!(FindCoordinatorRequest, FindCoordinatorResponse, 10, 1);

message!(
    /// JoinGroup v2
    JoinGroupRequest {
        group_id: String,
        session_timeout_ms: i32,
        rebalance_timeout_ms: i32,
        member_id: String,
        protocol_type: String,
        protocols: Vec<JoinGroupRequestProtocol>,
    }
);

message!(JoinGroupRequestProtocol {
    name: String,
    metadata: Bytes,
});

message!(JoinGroupResponse {
    throttle_time_ms: i32,
    error_code: i16,
    generation_id: i32,
    protocol_name: String,
    leader: String,
    member_id: String,
    members: Vec<JoinGroupResponseMember>,
});

message!(JoinGroupResponseMember {
    member_id: String,
    metadata: Bytes,
});

api!(JoinGroupRequest, JoinGroupResponse, 11, 2);

message!(
    /// Heartbeat v1
    HeartbeatRequest {
        group_id: String,
        generation_id: i32,
        member_id: String,
    }
);

message!(HeartbeatResponse {
    throttle_time_ms: i32,
    error_code: i16,
});

api!(HeartbeatRequest, HeartbeatResponse, 12, 1);

message!(
    /// LeaveGroup v1
    LeaveGroupRequest {
        group_id: String,
        member_id: String,
    }
);

message!(LeaveGroupResponse {
    throttle_time_ms: i32,
    error_code: i16,
});

api!(LeaveGroupRequest, LeaveGroupResponse, 13, 1);

message!(
    /// SyncGroup v1
    SyncGroupRequest {
        group_id: String,
        generation_id: i32,
        member_id: String,
        assignments: Vec<SyncGroupRequestAssignment>,
    }
);

message!(SyncGroupRequestAssignment {
    member_id: String,
    assignment: Bytes,
});

message!(SyncGroupResponse {
    throttle_time_ms: i32,
    error_code: i16,
    assignment: Bytes,
});

api!(SyncGroupRequest, SyncGroupResponse, 14, 1);
