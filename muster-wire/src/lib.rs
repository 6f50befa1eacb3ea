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

//! Muster Wire
//!
//! The subset of the Kafka protocol used by a consumer group member, operating
//! only on bytes (no I/O).
//!
//! Every message is a fixed, non-flexible version of the API that is
//! understood by Kafka 1.0 onwards (and is still accepted by Kafka 4):
//!
//! - group membership: [`FindCoordinatorRequest`], [`JoinGroupRequest`],
//!   [`SyncGroupRequest`], [`HeartbeatRequest`] and [`LeaveGroupRequest`]
//! - offsets: [`OffsetFetchRequest`], [`OffsetCommitRequest`] and [`ListOffsetsRequest`]
//! - data: [`MetadataRequest`] and [`FetchRequest`], with [`record`] batches
//!
//! The [`consumer`] module has the consumer protocol (subscriptions and
//! assignments) carried inside JoinGroup and SyncGroup, together with a range assignor.

use std::{
    fmt::{self, Display, Formatter},
    io, num, str,
    sync::Arc,
};

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut, TryGetError};

/// Define a protocol message: a struct with public fields that are encoded and
/// decoded in declaration order.
macro_rules! message {
    ($(#[$meta:meta])* $name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name {
            $(pub $field: $ty),*
        }

        impl $crate::Encode for $name {
            #[allow(unused_variables)]
            fn encode(&self, encoded: &mut ::bytes::BytesMut) -> $crate::Result<()> {
                $($crate::Encode::encode(&self.$field, encoded)?;)*
                Ok(())
            }
        }

        impl $crate::Decode for $name {
            #[allow(unused_variables)]
            fn decode(encoded: &mut ::bytes::Bytes) -> $crate::Result<Self> {
                Ok(Self {
                    $($field: <$ty as $crate::Decode>::decode(encoded)?),*
                })
            }
        }
    };
}

macro_rules! api {
    ($request:ident, $response:ident, $key:expr, $version:expr) => {
        impl $crate::ApiKey for $request {
            const KEY: i16 = $key;
            const VERSION: i16 = $version;
        }

        impl $crate::Request for $request {
            type Response = $response;
        }
    };
}

mod api;
pub mod consumer;
mod error_code;
pub mod frame;
pub mod primitive;
pub mod record;

pub use api::*;
pub use error_code::ErrorCode;
pub use frame::{RequestHeader, ResponseHeader};

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    Api(ErrorCode),
    Crc { expected: u32, computed: u32 },
    CorrelationId { expected: i32, received: i32 },
    Io(Arc<io::Error>),
    Message(String),
    NullValue(&'static str),
    Overflow(&'static str),
    Snap(#[from] snap::Error),
    Truncated { needed: usize, remaining: usize },
    TryFromInt(#[from] num::TryFromIntError),
    TryGet(Arc<TryGetError>),
    UnknownAssignor(String),
    UnknownCompressionType(i16),
    UnsupportedMagic(i8),
    Utf8(#[from] str::Utf8Error),
    VarIntOverflow,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Message(e) => f.write_str(e),
            e => write!(f, "{e:?}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<TryGetError> for Error {
    fn from(value: TryGetError) -> Self {
        Self::TryGet(Arc::new(value))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub trait Encode {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()>;
}

pub trait Decode: Sized {
    fn decode(encoded: &mut Bytes) -> Result<Self>;
}

/// The API key and the (single) version of that API spoken by this crate
pub trait ApiKey {
    const KEY: i16;
    const VERSION: i16;
}

/// All API requests implement this trait
pub trait Request: ApiKey + Encode + Decode + fmt::Debug + Send + Sync + 'static {
    type Response: Encode + Decode + fmt::Debug + Send + Sync + 'static;
}

/// Split `length` bytes from the front of `encoded`.
pub(crate) fn split(encoded: &mut Bytes, length: usize) -> Result<Bytes> {
    if encoded.remaining() < length {
        Err(Error::Truncated {
            needed: length,
            remaining: encoded.remaining(),
        })
    } else {
        Ok(encoded.split_to(length))
    }
}

impl Encode for i8 {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        encoded.put_i8(*self);
        Ok(())
    }
}

impl Decode for i8 {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        encoded.try_get_i8().map_err(Into::into)
    }
}

impl Encode for i16 {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        encoded.put_i16(*self);
        Ok(())
    }
}

impl Decode for i16 {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        encoded.try_get_i16().map_err(Into::into)
    }
}

impl Encode for i32 {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        encoded.put_i32(*self);
        Ok(())
    }
}

impl Decode for i32 {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        encoded.try_get_i32().map_err(Into::into)
    }
}

impl Encode for i64 {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        encoded.put_i64(*self);
        Ok(())
    }
}

impl Decode for i64 {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        encoded.try_get_i64().map_err(Into::into)
    }
}

impl Encode for bool {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        encoded.put_i8(i8::from(*self));
        Ok(())
    }
}

impl Decode for bool {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        encoded
            .try_get_i8()
            .map(|value| value != 0)
            .map_err(Into::into)
    }
}

impl Encode for str {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        i16::try_from(self.len())
            .map_err(Into::into)
            .and_then(|length| length.encode(encoded))
            .map(|()| encoded.put_slice(self.as_bytes()))
    }
}

impl Encode for String {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        self.as_str().encode(encoded)
    }
}

impl Decode for String {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        Option::<String>::decode(encoded)
            .and_then(|string| string.ok_or(Error::NullValue(stringify!(String))))
    }
}

impl Encode for Option<String> {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        match self {
            Some(string) => string.encode(encoded),
            None => (-1i16).encode(encoded),
        }
    }
}

impl Decode for Option<String> {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        let length = i16::decode(encoded)?;

        if length < 0 {
            return Ok(None);
        }

        usize::try_from(length)
            .map_err(Into::into)
            .and_then(|length| split(encoded, length))
            .and_then(|bytes| {
                str::from_utf8(&bytes[..])
                    .map(String::from)
                    .map_err(Into::into)
            })
            .map(Some)
    }
}

impl Encode for Bytes {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        i32::try_from(self.len())
            .map_err(Into::into)
            .and_then(|length| length.encode(encoded))
            .map(|()| encoded.put_slice(&self[..]))
    }
}

impl Decode for Bytes {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        Option::<Bytes>::decode(encoded)
            .and_then(|bytes| bytes.ok_or(Error::NullValue(stringify!(Bytes))))
    }
}

impl Encode for Option<Bytes> {
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        match self {
            Some(bytes) => bytes.encode(encoded),
            None => (-1i32).encode(encoded),
        }
    }
}

impl Decode for Option<Bytes> {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        let length = i32::decode(encoded)?;

        if length < 0 {
            return Ok(None);
        }

        usize::try_from(length)
            .map_err(Into::into)
            .and_then(|length| split(encoded, length))
            .map(Some)
    }
}

impl<T> Encode for Vec<T>
where
    T: Encode,
{
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        i32::try_from(self.len())
            .map_err(Into::into)
            .and_then(|length| length.encode(encoded))?;

        self.iter().try_for_each(|item| item.encode(encoded))
    }
}

impl<T> Decode for Vec<T>
where
    T: Decode,
{
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        Option::<Vec<T>>::decode(encoded).map(Option::unwrap_or_default)
    }
}

impl<T> Encode for Option<Vec<T>>
where
    T: Encode,
{
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        match self {
            Some(items) => items.encode(encoded),
            None => (-1i32).encode(encoded),
        }
    }
}

impl<T> Decode for Option<Vec<T>>
where
    T: Decode,
{
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        let length = i32::decode(encoded)?;

        if length < 0 {
            return Ok(None);
        }

        (0..length)
            .map(|_| T::decode(encoded))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}
