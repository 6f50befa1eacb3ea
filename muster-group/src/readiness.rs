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

use tokio::sync::watch;
use tracing::debug;

use crate::{Error, Result};

/// Signals that the first session of this process has started, it is never
/// re-armed
#[derive(Clone, Debug)]
pub struct ReadinessGate {
    started: Arc<watch::Sender<u64>>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self {
            started: Arc::new(watch::Sender::new(0)),
        }
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a session has started
    pub fn trip(&self) {
        self.started.send_modify(|started| *started += 1);
        debug!(sessions_started = self.sessions_started());
    }

    pub fn sessions_started(&self) -> u64 {
        *self.started.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.sessions_started() > 0
    }

    /// Wait until the first session has started
    pub async fn wait_until_ready(&self) -> Result<()> {
        let mut started = self.started.subscribe();

        started
            .wait_for(|started| *started > 0)
            .await
            .map(|_| ())
            .map_err(|_| Error::ReadinessClosed)
    }
}
