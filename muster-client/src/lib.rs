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

//! Muster Client
//!
//! A Kafka consumer group member over TCP, implementing [`muster_group::Client`].

use std::{
    fmt, io,
    sync::{Arc, PoisonError},
};

use muster_group::ClientError;
use muster_wire::ErrorCode;
use url::Url;

mod connection;
mod kafka;

pub use connection::Connection;
pub use kafka::{AutoOffsetReset, Builder, Configuration, Kafka};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    Api(ErrorCode),
    Client(#[from] ClientError),
    Group(#[from] muster_group::Error),
    Io(Arc<io::Error>),
    Message(String),
    NoAvailableBroker(Vec<Url>),
    Poison,
    UnknownBroker(i32),
    UnknownHost(Url),
    UnknownTopic(String),
    Url(#[from] url::ParseError),
    Wire(#[from] muster_wire::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => write!(f, "{msg}"),
            error => write!(f, "{error:?}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<ErrorCode> for Error {
    fn from(value: ErrorCode) -> Self {
        Self::Api(value)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::Poison
    }
}

impl From<Error> for ClientError {
    fn from(value: Error) -> Self {
        match value {
            Error::Api(code) | Error::Wire(muster_wire::Error::Api(code)) => {
                Self::Api(i16::from(code))
            }

            Error::Client(client) => client,

            Error::Group(group) => Self::from(group),

            error @ (Error::Io(_)
            | Error::NoAvailableBroker(_)
            | Error::UnknownBroker(_)
            | Error::UnknownHost(_)) => Self::Unavailable(error.to_string()),

            error @ (Error::Message(_)
            | Error::Poison
            | Error::UnknownTopic(_)
            | Error::Url(_)
            | Error::Wire(_)) => Self::Protocol(error.to_string()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
