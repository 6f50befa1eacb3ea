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

use std::{process, sync::Arc, time::Duration};

use clap::Parser;
use muster_client::{AutoOffsetReset, Kafka};
use muster_group::{Backoff, Log, Shutdown, Unix};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::{EnvVarExp, Result};

const DEFAULT_BROKER: &str = "tcp://my-cluster-kafka-brokers.kafka.svc.cluster.local:9092";
const DEFAULT_TOPIC: &str = "access_log";
const DEFAULT_GROUP: &str = "my_consumer_group";

#[derive(Clone, Debug, Parser)]
#[command(name = "muster", version, about, long_about = None)]
pub struct Cli {
    /// Bootstrap broker URLs, either repeated or comma separated
    #[arg(
        long = "broker",
        default_value = DEFAULT_BROKER,
        env = "BROKER",
        value_delimiter = ','
    )]
    brokers: Vec<EnvVarExp<Url>>,

    /// The topic to consume
    #[arg(long, default_value = DEFAULT_TOPIC, env = "TOPIC")]
    topic: String,

    /// The consumer group to join
    #[arg(long, default_value = DEFAULT_GROUP, env = "GROUP")]
    group: String,

    #[arg(long, default_value = "muster", env = "CLIENT_ID")]
    client_id: String,

    /// Members are removed from the group when no heartbeat is received within this time
    #[arg(long, default_value = "10000")]
    session_timeout_ms: u64,

    /// The time allowed for each member to rejoin during a rebalance
    #[arg(long, default_value = "60000")]
    rebalance_timeout_ms: u64,

    #[arg(long, default_value = "3000")]
    heartbeat_interval_ms: u64,

    /// The maximum time a fetch waits for records
    #[arg(long, default_value = "500")]
    max_wait_ms: u64,

    #[arg(long, default_value = "1")]
    min_bytes: i32,

    #[arg(long, default_value = "1048576")]
    partition_max_bytes: i32,

    /// Where to start a partition without a committed offset: earliest or latest
    #[arg(long, default_value = "latest", env = "AUTO_OFFSET_RESET")]
    auto_offset_reset: AutoOffsetReset,

    /// The delay after the first failed join, doubling on each failure
    #[arg(long, default_value = "100")]
    backoff_initial_ms: u64,

    #[arg(long, default_value = "10000")]
    backoff_max_ms: u64,
}

impl Cli {
    pub async fn main() -> Result<()> {
        debug!(pid = process::id());

        Self::parse()
            .consume()
            .await
            .map(|shutdown| debug!(?shutdown))
    }

    async fn consume(self) -> Result<Shutdown> {
        let kafka = self.kafka().map(Arc::new)?;

        crate::consume(
            kafka,
            Log,
            self.backoff(),
            CancellationToken::new(),
            Unix::new()?,
        )
        .await
    }

    fn kafka(&self) -> Result<Kafka> {
        Kafka::builder()
            .brokers(
                self.brokers
                    .iter()
                    .cloned()
                    .map(EnvVarExp::into_inner)
                    .collect(),
            )
            .topic(self.topic.as_str())
            .group_id(self.group.as_str())
            .client_id(Some(self.client_id.clone()))
            .session_timeout(Duration::from_millis(self.session_timeout_ms))
            .rebalance_timeout(Duration::from_millis(self.rebalance_timeout_ms))
            .heartbeat_interval(Duration::from_millis(self.heartbeat_interval_ms))
            .max_wait(Duration::from_millis(self.max_wait_ms))
            .min_bytes(self.min_bytes)
            .partition_max_bytes(self.partition_max_bytes)
            .auto_offset_reset(self.auto_offset_reset)
            .build()
            .map_err(Into::into)
    }

    fn backoff(&self) -> Backoff {
        Backoff::exponential(
            Duration::from_millis(self.backoff_initial_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}
