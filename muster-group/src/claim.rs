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

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Claim, Process, Session};

/// The outcome of draining one claim
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Summary {
    pub processed: u64,
    pub skipped: u64,
    pub process_errors: u64,
    pub commit_errors: u64,
    pub last_offset: Option<i64>,
}

/// Process the records of a claim in offset order, acknowledging each record
/// before taking the next
#[derive(Clone, Debug, Default)]
pub struct ClaimProcessor<P> {
    process: P,
}

impl<P> ClaimProcessor<P>
where
    P: Process,
{
    pub fn new(process: P) -> Self {
        Self { process }
    }

    /// Drain the claim until its record stream ends
    pub async fn drain(&self, session: &Session, mut claim: Claim) -> Summary {
        let mut summary = Summary::default();

        debug!(
            generation_id = session.generation_id(),
            topic = claim.topic(),
            partition = claim.partition(),
            initial_offset = claim.initial_offset()
        );

        while let Some(record) = claim.next().await {
            if record.offset < claim.initial_offset() {
                debug!(offset = record.offset, initial_offset = claim.initial_offset());
                summary.skipped += 1;
                continue;
            }

            if summary
                .last_offset
                .is_some_and(|last_offset| record.offset <= last_offset)
            {
                warn!(
                    topic = record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    last_offset = summary.last_offset,
                    "out of order"
                );
                summary.skipped += 1;
                continue;
            }

            if let Err(err) = self.process.process(&record).await {
                warn!(
                    topic = record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    %err,
                    "process"
                );
                summary.process_errors += 1;
            }

            if let Err(err) = session.mark(&record).await {
                warn!(
                    topic = record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    %err,
                    "commit"
                );
                summary.commit_errors += 1;
            }

            summary.processed += 1;
            summary.last_offset = Some(record.offset);
        }

        debug!(
            generation_id = session.generation_id(),
            topic = claim.topic(),
            partition = claim.partition(),
            ?summary
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Assignment, ClientError, Commit, Error, Record, Result};

    #[derive(Clone, Debug, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn push(&self, entry: String) -> Result<()> {
            self.0.lock().map(|mut entries| entries.push(entry)).map_err(Into::into)
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().map(|entries| entries.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Process for Journal {
        async fn process(&self, record: &Record) -> Result<()> {
            self.push(format!("process {}", record.offset))?;

            if record.value.as_deref() == Some(b"poison") {
                Err(Error::Message("poison".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Commit for Journal {
        async fn commit(
            &self,
            _generation_id: i32,
            _topic: &str,
            _partition: i32,
            offset: i64,
        ) -> Result<(), ClientError> {
            self.push(format!("commit {offset}"))?;

            if offset == 13 {
                Err(ClientError::Api(22))
            } else {
                Ok(())
            }
        }
    }

    async fn drain(journal: &Journal, offsets: &[(i64, Option<&'static [u8]>)]) -> Summary {
        let session = Session::new(1, "m", Assignment::new(), Arc::new(journal.clone()));
        let (sender, claim) = Claim::channel("t", 0, 10, offsets.len());

        for (offset, value) in offsets {
            assert!(
                sender
                    .send(Record::new("t", 0, *offset).value(value.map(bytes::Bytes::from_static)))
                    .await
                    .is_ok()
            );
        }

        drop(sender);

        ClaimProcessor::new(journal.clone()).drain(&session, claim).await
    }

    #[tokio::test]
    async fn each_record_acknowledged_before_next() {
        let journal = Journal::default();
        let summary = drain(&journal, &[(10, None), (11, None), (12, None)]).await;

        assert_eq!(
            vec![
                "process 10",
                "commit 11",
                "process 11",
                "commit 12",
                "process 12",
                "commit 13",
            ],
            journal.entries()
        );

        assert_eq!(3, summary.processed);
        assert_eq!(Some(12), summary.last_offset);
    }

    #[tokio::test]
    async fn errors_do_not_halt_the_stream() {
        let journal = Journal::default();
        let summary = drain(
            &journal,
            &[(10, Some(b"poison")), (11, None), (12, None), (13, None)],
        )
        .await;

        assert_eq!(
            Summary {
                processed: 4,
                skipped: 0,
                process_errors: 1,
                commit_errors: 1,
                last_offset: Some(13),
            },
            summary
        );
    }

    #[tokio::test]
    async fn lower_offsets_are_skipped() {
        let journal = Journal::default();
        let summary = drain(&journal, &[(8, None), (10, None), (12, None), (11, None)]).await;

        assert_eq!(
            vec!["process 10", "commit 11", "process 12", "commit 13"],
            journal.entries()
        );

        assert_eq!(2, summary.skipped);
        assert_eq!(Some(12), summary.last_offset);
    }
}
