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

use std::time::Duration;

use rand::Rng as _;

/// The delay between failed attempts to join a group
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Backoff {
    /// Retry immediately
    #[default]
    None,

    /// Double the delay after each consecutive failure up to a maximum,
    /// optionally keeping a random delay of between half and all of it
    Exponential {
        initial: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Exponential backoff with jitter
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential {
            initial,
            max: max.max(initial),
            jitter: true,
        }
    }

    pub fn without_jitter(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Exponential { initial, max, .. } => Self::Exponential {
                initial,
                max,
                jitter: false,
            },
        }
    }

    /// The delay after this many consecutive failures
    pub fn delay(&self, failures: u32) -> Option<Duration> {
        match self {
            Self::None => None,

            _ if failures == 0 => None,

            Self::Exponential {
                initial,
                max,
                jitter,
            } => {
                let delay = 2u32
                    .checked_pow(failures - 1)
                    .and_then(|factor| initial.checked_mul(factor))
                    .map_or(*max, |delay| delay.min(*max));

                if *jitter {
                    let half = delay / 2;
                    Some(half + rand::rng().random_range(Duration::ZERO..=delay - half))
                } else {
                    Some(delay)
                }
            }
        }
    }
}
