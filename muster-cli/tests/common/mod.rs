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

use async_trait::async_trait;
use muster_group::{Signal, Signals};
use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{EnvFilter, filter::ParseError};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("{0}")]
    Cli(#[from] muster_cli::Error),

    #[error("{0}")]
    Elapsed(#[from] tokio::time::error::Elapsed),

    #[error("{0}")]
    Filter(#[from] ParseError),

    #[error("{0}")]
    Group(#[from] muster_group::Error),

    #[error("{0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Send(#[from] mpsc::error::SendError<Signal>),
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
