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

//! Zig-zag variable length integers used within record batches

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};

use crate::{Decode, Encode, Error, Result, split};

const CONTINUATION: u8 = 0b1000_0000;
const MASK: u8 = 0b0111_1111;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VarInt(pub i32);

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VarLong(pub i64);

fn decode_unsigned(encoded: &mut Bytes, max_bytes: u32) -> Result<u64> {
    let mut accumulator = 0u64;

    for shift in (0..max_bytes).map(|index| index * 7) {
        let byte = encoded.try_get_u8()?;
        accumulator |= u64::from(byte & MASK) << shift;

        if byte & CONTINUATION == 0 {
            return Ok(accumulator);
        }
    }

    Err(Error::VarIntOverflow)
}

fn encode_unsigned(mut v: u64, encoded: &mut BytesMut) {
    while v >= u64::from(CONTINUATION) {
        #[allow(clippy::cast_possible_truncation)]
        encoded.put_u8(v as u8 | CONTINUATION);
        v >>= 7;
    }

    #[allow(clippy::cast_possible_truncation)]
    encoded.put_u8(v as u8);
}

impl Decode for VarInt {
    #[allow(clippy::cast_possible_truncation)]
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        decode_unsigned(encoded, 5)
            .map(|unsigned| unsigned as u32)
            .map(|unsigned| Self(((unsigned >> 1) as i32) ^ -((unsigned & 1) as i32)))
    }
}

impl Encode for VarInt {
    #[allow(clippy::cast_sign_loss)]
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        encode_unsigned(u64::from(((self.0 << 1) ^ (self.0 >> 31)) as u32), encoded);
        Ok(())
    }
}

impl Decode for VarLong {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        decode_unsigned(encoded, 10)
            .map(|unsigned| Self(((unsigned >> 1) as i64) ^ -((unsigned & 1) as i64)))
    }
}

impl Encode for VarLong {
    #[allow(clippy::cast_sign_loss)]
    fn encode(&self, encoded: &mut BytesMut) -> Result<()> {
        encode_unsigned(((self.0 << 1) ^ (self.0 >> 63)) as u64, encoded);
        Ok(())
    }
}

/// Bytes with a varint length, where a negative length is null
pub(crate) fn decode_varint_bytes(encoded: &mut Bytes) -> Result<Option<Bytes>> {
    let length = VarInt::decode(encoded)?.0;

    if length < 0 {
        Ok(None)
    } else {
        usize::try_from(length)
            .map_err(Into::into)
            .and_then(|length| split(encoded, length))
            .map(Some)
    }
}

pub(crate) fn encode_varint_bytes(bytes: Option<&Bytes>, encoded: &mut BytesMut) -> Result<()> {
    match bytes {
        Some(bytes) => {
            i32::try_from(bytes.len())
                .map(VarInt)
                .map_err(Error::from)
                .and_then(|length| length.encode(encoded))?;

            encoded.put_slice(&bytes[..]);
            Ok(())
        }

        None => VarInt(-1).encode(encoded),
    }
}
