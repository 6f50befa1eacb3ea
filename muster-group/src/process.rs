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

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::{Record, Result};

/// Process one record of a claim
#[async_trait]
pub trait Process: fmt::Debug + Send + Sync {
    async fn process(&self, record: &Record) -> Result<()>;
}

/// Log each claimed record
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Log;

#[async_trait]
impl Process for Log {
    async fn process(&self, record: &Record) -> Result<()> {
        let key = record.key.as_deref().map(String::from_utf8_lossy);
        let value = record.value.as_deref().map(String::from_utf8_lossy);

        info!(
            topic = record.topic,
            partition = record.partition,
            offset = record.offset,
            timestamp = record.timestamp,
            key = key.as_deref(),
            value = value.as_deref(),
            "message claimed"
        );

        Ok(())
    }
}
