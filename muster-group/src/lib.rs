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

//! Muster Group
//!
//! Consumer group membership: join a group, process the records of each
//! assigned partition in order, and survive rebalances and shutdown without
//! losing or double committing progress.
//!
//! A [`GroupLoop`] repeatedly asks a [`Client`] to join the group and run one
//! [`Session`], calling a [`SessionHandler`] as the session starts, once for
//! each [`Claim`] (partition), and as it ends. The [`Consumer`] handler drains
//! each claim with a [`ClaimProcessor`] and trips a [`ReadinessGate`] on the
//! first session. A shutdown [`Coordinator`] races cancellation against OS
//! signals, waits for the loop to exit and closes the client exactly once.
//!
//! [`memory::Broker`] is an in-memory [`Client`] with partitions, committed
//! offsets, generations and injected rebalances.

use std::{
    fmt::{self, Display, Formatter},
    io,
    sync::{Arc, PoisonError},
};

use async_trait::async_trait;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

mod backoff;
mod claim;
mod group;
mod handler;
pub mod memory;
mod process;
mod readiness;
mod session;
mod shutdown;

pub use backoff::Backoff;
pub use claim::{ClaimProcessor, Summary};
pub use group::{Exit, ExitKind, GroupLoop};
pub use handler::{Consumer, Phase, SessionHandler};
pub use process::{Log, Process};
pub use readiness::ReadinessGate;
pub use session::{Assignment, Claim, Commit, Header, Record, Session};
pub use shutdown::{Coordinator, Shutdown, Signal, Signals, Trigger, Unix};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    Client(#[from] ClientError),
    Io(Arc<io::Error>),
    Join(#[from] JoinError),
    Message(String),
    Poison,
    ReadinessClosed,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            error => write!(f, "{error:?}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::Poison
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by a broker [`Client`]
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, thiserror::Error)]
pub enum ClientError {
    /// An error code returned by the broker
    Api(i16),

    /// The operation was cancelled
    Cancelled,

    /// The client has been closed, no further sessions are possible
    Closed,

    /// A session handler failed
    Handler(String),

    /// The broker responded with something unexpected
    Protocol(String),

    /// The broker could not be reached
    Unavailable(String),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl ClientError {
    /// Whether the group loop should stop rather than rejoin
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<Error> for ClientError {
    fn from(value: Error) -> Self {
        match value {
            Error::Client(client) => client,
            otherwise => Self::Handler(otherwise.to_string()),
        }
    }
}

/// A connection to the brokers of a consumer group
#[async_trait]
pub trait Client: fmt::Debug + Send + Sync {
    /// Join the group and run one session with this handler, returning when
    /// the session ends through a rebalance or cancellation
    async fn join_and_run(
        &self,
        handler: Arc<dyn SessionHandler>,
        token: CancellationToken,
    ) -> Result<(), ClientError>;

    /// Close the client, after which every join returns [`ClientError::Closed`]
    async fn close(&self) -> Result<(), ClientError>;
}
