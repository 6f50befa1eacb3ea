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

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    signal::unix::{self, SignalKind},
    sync::OnceCell,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{Client, Exit, Result};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Signal {
    Interrupt,
    Terminate,
}

/// A source of process signals
#[async_trait]
pub trait Signals: Send {
    /// The next signal, none when no more signals will be received
    async fn recv(&mut self) -> Option<Signal>;
}

/// SIGINT and SIGTERM
#[derive(Debug)]
pub struct Unix {
    interrupt: unix::Signal,
    terminate: unix::Signal,
}

impl Unix {
    pub fn new() -> Result<Self> {
        let interrupt = unix::signal(SignalKind::interrupt())?;
        debug!(?interrupt);

        let terminate = unix::signal(SignalKind::terminate())?;
        debug!(?terminate);

        Ok(Self {
            interrupt,
            terminate,
        })
    }
}

#[async_trait]
impl Signals for Unix {
    async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(Signal::Interrupt),
            Some(()) = self.terminate.recv() => Some(Signal::Terminate),
            else => None,
        }
    }
}

/// What started the shutdown
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Trigger {
    Cancelled,
    Signal(Signal),
    LoopExited,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Shutdown {
    pub trigger: Trigger,
    pub exit: Exit,
}

/// Stop the group loop and close the client once the loop has exited
#[derive(Clone, Debug)]
pub struct Coordinator {
    client: Arc<dyn Client>,
    token: CancellationToken,
    closed: Arc<OnceCell<()>>,
}

impl Coordinator {
    pub fn new(client: Arc<dyn Client>, token: CancellationToken) -> Self {
        Self {
            client,
            token,
            closed: Arc::new(OnceCell::new()),
        }
    }

    /// Wait for cancellation, a signal or the group loop exiting on its own,
    /// then cancel the loop, wait for it to exit and close the client
    pub async fn run<S>(&self, mut group: JoinHandle<Exit>, mut signals: S) -> Result<Shutdown>
    where
        S: Signals,
    {
        let (trigger, exited) = tokio::select! {
            biased;

            () = self.token.cancelled() => (Trigger::Cancelled, None),

            Some(signal) = signals.recv() => (Trigger::Signal(signal), None),

            exit = &mut group => (Trigger::LoopExited, Some(exit)),
        };

        info!(?trigger, "shutdown");

        self.token.cancel();

        let exit = match exited {
            Some(exit) => exit,
            None => group.await,
        }
        .inspect_err(|err| error!(?err, "group loop"));

        self.close().await;

        exit.map(|exit| Shutdown { trigger, exit })
            .map_err(Into::into)
    }

    /// Close the client, only the first call has any effect
    pub async fn close(&self) {
        self.closed
            .get_or_init(|| async {
                match self.client.close().await {
                    Ok(()) => info!("client closed"),
                    Err(err) => error!(%err, "close"),
                }
            })
            .await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.initialized()
    }
}
