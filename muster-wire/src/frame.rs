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

//! Size prefixed request and response frames

use bytes::{BufMut as _, Bytes, BytesMut};
use tracing::debug;

use crate::{Decode as _, Encode, Error, Request, Result};

/// Every frame starts with a 32 bit big endian size that excludes itself
pub const SIZE_PREFIX: usize = 4;

message!(
    /// Request header v1
    RequestHeader {
        api_key: i16,
        api_version: i16,
        correlation_id: i32,
        client_id: Option<String>,
    }
);

message!(
    /// Response header v0
    ResponseHeader { correlation_id: i32 }
);

fn with_size_prefix(
    encode: impl FnOnce(&mut BytesMut) -> Result<()>,
) -> Result<Bytes> {
    let mut encoded = BytesMut::new();
    encoded.put_i32(0);

    encode(&mut encoded)?;

    let size = i32::try_from(encoded.len() - SIZE_PREFIX)?;
    encoded[..SIZE_PREFIX].copy_from_slice(&size.to_be_bytes());

    Ok(encoded.freeze())
}

/// Encode a request frame, including the size prefix
pub fn request<Q>(correlation_id: i32, client_id: Option<String>, body: &Q) -> Result<Bytes>
where
    Q: Request,
{
    with_size_prefix(|encoded| {
        RequestHeader {
            api_key: Q::KEY,
            api_version: Q::VERSION,
            correlation_id,
            client_id,
        }
        .encode(encoded)
        .and_then(|()| body.encode(encoded))
    })
}

/// Decode the response to `Q` from a frame that has had its size prefix removed
pub fn response<Q>(correlation_id: i32, mut frame: Bytes) -> Result<Q::Response>
where
    Q: Request,
{
    let header = ResponseHeader::decode(&mut frame)?;

    if header.correlation_id != correlation_id {
        return Err(Error::CorrelationId {
            expected: correlation_id,
            received: header.correlation_id,
        });
    }

    <Q::Response as crate::Decode>::decode(&mut frame)
        .inspect_err(|err| debug!(api_key = Q::KEY, ?err))
}

/// Encode a response frame, including the size prefix
pub fn response_frame<R>(correlation_id: i32, body: &R) -> Result<Bytes>
where
    R: Encode,
{
    with_size_prefix(|encoded| {
        ResponseHeader { correlation_id }
            .encode(encoded)
            .and_then(|()| body.encode(encoded))
    })
}

/// The length of a frame from its size prefix
pub fn frame_length(size: [u8; SIZE_PREFIX]) -> Result<usize> {
    usize::try_from(i32::from_be_bytes(size)).map_err(Into::into)
}
