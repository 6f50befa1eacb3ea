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

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use muster_group::{Process, Record, Signal, Signals, memory::Broker};
use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{EnvFilter, filter::ParseError};

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
    Join(#[from] tokio::task::JoinError),
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

/// A record as it was processed, with the committed offset of its partition
/// at that time
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct Observed {
    pub partition: i32,
    pub offset: i64,
    pub committed: Option<i64>,
}

/// Observe each processed record against the broker
#[derive(Clone, Debug)]
pub(crate) struct Recorder {
    broker: Broker,
    observed: Arc<Mutex<Vec<Observed>>>,
}

impl Recorder {
    pub(crate) fn new(broker: Broker) -> Self {
        Self {
            broker,
            observed: Arc::new(Mutex::new(vec![])),
        }
    }

    pub(crate) fn observed(&self) -> Vec<Observed> {
        self.observed
            .lock()
            .map(|observed| observed.clone())
            .unwrap_or_default()
    }

    pub(crate) fn offsets(&self, partition: i32) -> Vec<i64> {
        self.observed()
            .into_iter()
            .filter(|observed| observed.partition == partition)
            .map(|observed| observed.offset)
            .collect()
    }
}

#[async_trait]
impl Process for Recorder {
    async fn process(&self, record: &Record) -> muster_group::Result<()> {
        let committed = self.broker.committed(record.partition)?;

        self.observed
            .lock()
            .map(|mut observed| {
                observed.push(Observed {
                    partition: record.partition,
                    offset: record.offset,
                    committed,
                })
            })
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
