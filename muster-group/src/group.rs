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

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Backoff, Client, ClientError, SessionHandler};

/// Why the group loop stopped
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ExitKind {
    Cancelled,
    Closed,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Exit {
    pub kind: ExitKind,
    pub attempts: u64,
}

/// Join the group, run a session and rejoin until cancelled or closed
#[derive(Clone, Debug)]
pub struct GroupLoop {
    client: Arc<dyn Client>,
    handler: Arc<dyn SessionHandler>,
    backoff: Backoff,
    token: CancellationToken,
}

impl GroupLoop {
    pub fn new(
        client: Arc<dyn Client>,
        handler: Arc<dyn SessionHandler>,
        backoff: Backoff,
        token: CancellationToken,
    ) -> Self {
        Self {
            client,
            handler,
            backoff,
            token,
        }
    }

    pub async fn run(self) -> Exit {
        let mut attempts = 0u64;
        let mut failures = 0u32;

        let exit = |kind, attempts| {
            info!(?kind, attempts, "group loop exit");
            Exit { kind, attempts }
        };

        loop {
            if self.token.is_cancelled() {
                return exit(ExitKind::Cancelled, attempts);
            }

            attempts = attempts.saturating_add(1);
            debug!(attempts, failures);

            match self
                .client
                .join_and_run(self.handler.clone(), self.token.clone())
                .await
            {
                Ok(()) => failures = 0,

                Err(err) if err.is_terminal() => return exit(ExitKind::Closed, attempts),

                Err(ClientError::Cancelled) => debug!(attempts, "cancelled"),

                Err(err) => {
                    failures = failures.saturating_add(1);
                    warn!(%err, attempts, failures, "join");
                }
            }

            if self.token.is_cancelled() {
                return exit(ExitKind::Cancelled, attempts);
            }

            if let Some(delay) = self.backoff.delay(failures) {
                debug!(?delay, failures);

                tokio::select! {
                    () = self.token.cancelled() => return exit(ExitKind::Cancelled, attempts),
                    () = sleep(delay) => (),
                }
            }
        }
    }
}
