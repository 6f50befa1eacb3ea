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

//! Muster CLI
//!
//! Wire a consumer group member to its broker client, then run the group
//! loop until cancelled, signalled or closed.

use std::{collections::HashMap, env::vars, fmt, result, str::FromStr, sync::Arc};

use muster_group::{
    Backoff, Client, Consumer, Coordinator, GroupLoop, Process, ReadinessGate, Shutdown, Signals,
};
use regex::{Regex, Replacer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod cli;

pub use cli::Cli;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    Client(#[from] muster_client::Error),
    Group(#[from] muster_group::Error),
    Regex(#[from] regex::Error),
    Url(#[from] url::ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;

/// Run a consumer group member until shutdown, logging once the first
/// session has started
pub async fn consume<P, S>(
    client: Arc<dyn Client>,
    process: P,
    backoff: Backoff,
    token: CancellationToken,
    signals: S,
) -> Result<Shutdown>
where
    P: Process + 'static,
    S: Signals,
{
    let gate = ReadinessGate::new();

    let group = tokio::spawn(
        GroupLoop::new(
            client.clone(),
            Arc::new(Consumer::new(process, gate.clone())),
            backoff,
            token.clone(),
        )
        .run(),
    );

    let ready = tokio::spawn({
        let token = token.clone();

        async move {
            tokio::select! {
                ready = gate.wait_until_ready() => match ready {
                    Ok(()) => info!("up and running"),
                    Err(err) => debug!(%err),
                },

                () = token.cancelled() => (),
            }
        }
    });

    let shutdown = Coordinator::new(client, token)
        .run(group, signals)
        .await
        .inspect(|shutdown| info!(?shutdown.trigger, ?shutdown.exit));

    ready.abort();

    shutdown.map_err(Into::into)
}

#[derive(Clone, Debug)]
pub struct VarRep(HashMap<String, String>);

impl From<HashMap<String, String>> for VarRep {
    fn from(value: HashMap<String, String>) -> Self {
        Self(value)
    }
}

impl VarRep {
    fn replace(&self, haystack: &str) -> Result<String> {
        Regex::new(r"\$\{(?<var>[^\}]+)\}")
            .map(|re| re.replace_all(haystack, self).into_owned())
            .map_err(Into::into)
    }
}

impl Replacer for &VarRep {
    fn replace_append(&mut self, caps: &regex::Captures<'_>, dst: &mut String) {
        if let Some(variable) = caps.name("var")
            && let Some(value) = self.0.get(variable.as_str())
        {
            dst.push_str(value);
        }
    }
}

/// An argument with `${VAR}` expanded from the environment before parsing
#[derive(Clone, Debug)]
pub struct EnvVarExp<T>(T);

impl<T> EnvVarExp<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> FromStr for EnvVarExp<T>
where
    T: FromStr,
    Error: From<<T as FromStr>::Err>,
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VarRep::from(vars().collect::<HashMap<_, _>>())
            .replace(s)
            .and_then(|s| T::from_str(&s).map_err(Into::into))
            .map(|t| Self(t))
    }
}
